//! Frame pump
//!
//! One task per session. The capture thread (see [`super::capture`]) reads
//! frames and runs pose detection off the executor; the pump receives its
//! results, runs the analyzer and queues the result for the hub, then sleeps
//! until the next frame deadline. Per-frame failures are reported and
//! skipped; only a lost source, the end of the stream or the stop flag ends
//! the loop.

use super::capture::{self, Captured};
use super::context::{finish_session, SessionContext};
use super::controller::ControllerState;
use super::{SessionDeps, SessionState};
use crate::analysis::{Analyzer, FrameAnalysis};
use crate::collaborators::VideoFrame;
use crate::error::{Error, Result};
use crate::hub::HubSender;
use crate::landmarks::PoseLandmarks;
use base64::prelude::*;
use pv_common::events::FramePayload;
use pv_common::ServerMessage;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpExit {
    Stopped,
    EndOfStream,
    SourceLost,
}

pub(crate) struct FramePump {
    pub id: Uuid,
    pub context: Arc<Mutex<SessionContext>>,
    pub stop_flag: Arc<AtomicBool>,
    pub controller: Arc<Mutex<ControllerState>>,
    pub deps: SessionDeps,
    pub hub: HubSender,
    pub period: Duration,
}

impl FramePump {
    /// Spawn the pump; it runs until stopped or the stream ends
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Frame pump started for session {}", self.id);
            let exit = self.run().await;
            info!("Frame pump for session {} exited: {:?}", self.id, exit);
            if exit != PumpExit::Stopped {
                self.end_session().await;
            }
        })
    }

    async fn run(&self) -> PumpExit {
        let capture = match capture::spawn(
            self.id,
            Arc::clone(&self.deps.video),
            Arc::clone(&self.deps.landmarks),
            Arc::clone(&self.stop_flag),
        ) {
            Ok(capture) => capture,
            Err(e) => {
                error!("Could not start capture for session {}: {}", self.id, e);
                self.hub.broadcast(ServerMessage::error(e.to_string())).await;
                return PumpExit::SourceLost;
            }
        };
        let mut frames = capture.frames;

        let exit = self.pump(&mut frames).await;

        // Unblocks a capture thread waiting to hand over a frame
        drop(frames);
        if capture.done.await.is_err() {
            warn!("Capture thread for session {} ended abnormally", self.id);
        }
        exit
    }

    async fn pump(&self, frames: &mut tokio::sync::mpsc::Receiver<Captured>) -> PumpExit {
        let mut deadline = Instant::now();
        while !self.stop_flag.load(Ordering::Relaxed) {
            // Bounded wait so a stalled camera still sees the stop flag
            let captured = match tokio::time::timeout(self.period, frames.recv()).await {
                Ok(Some(captured)) => captured,
                Ok(None) => return PumpExit::SourceLost,
                Err(_) => {
                    deadline = Instant::now();
                    continue;
                }
            };

            match captured {
                Captured::Frame(frame, pose) => {
                    if let Err(e) = self.process(frame, pose).await {
                        self.frame_failed(e);
                    }
                }
                Captured::Skipped(e) => self.frame_failed(e),
                Captured::EndOfStream => {
                    info!("End of video stream for session {}", self.id);
                    return PumpExit::EndOfStream;
                }
                Captured::Lost(e) => {
                    error!("Session {}: {}", self.id, e);
                    self.hub.broadcast(ServerMessage::error(e.to_string())).await;
                    return PumpExit::SourceLost;
                }
            }

            deadline += self.period;
            let now = Instant::now();
            if now.saturating_duration_since(deadline) > self.period {
                debug!("Frame pump behind schedule, re-anchoring");
                deadline = now;
            }
            tokio::time::sleep_until(deadline).await;
        }
        PumpExit::Stopped
    }

    async fn process(&self, frame: VideoFrame, pose: Option<PoseLandmarks>) -> Result<()> {
        let payload = {
            let mut ctx = self.context.lock().await;
            ctx.sequence += 1;
            let sequence = ctx.sequence;
            let analysis = ctx.analyzer.analyze_frame(pose.as_ref())?;
            if let Some(feedback) = ctx.feedback.as_mut() {
                feedback.observe(&analysis.error_text, std::time::Instant::now());
            }
            frame_payload(sequence, &frame.image, analysis)
        };

        if !self.hub.try_broadcast(ServerMessage::frame(payload)) {
            debug!("Frame {} dropped before reaching the hub", frame.sequence);
        }
        Ok(())
    }

    fn frame_failed(&self, e: Error) {
        warn!("Session {} frame skipped: {}", self.id, e);
        self.hub.try_broadcast(ServerMessage::error(e.to_string()));
    }

    /// Finish a session that ended on its own
    ///
    /// Does nothing if `stop` already claimed the session; the controller
    /// then emits the report.
    async fn end_session(&self) {
        {
            let mut state = self.controller.lock().await;
            let owned = state.active.as_ref().map(|a| a.id) == Some(self.id);
            if !owned {
                return;
            }
            state.active = None;
            state.state = SessionState::Stopping;
        }

        finish_session(&self.context, &self.hub, self.deps.reports.as_ref()).await;

        let mut state = self.controller.lock().await;
        if state.active.is_none() {
            state.state = SessionState::Idle;
        }
        info!("Session {} ended", self.id);
    }
}

/// Wire payload for one analyzed frame
pub fn frame_payload(sequence: u64, image: &[u8], analysis: FrameAnalysis) -> FramePayload {
    FramePayload {
        sequence,
        data: BASE64_STANDARD.encode(image),
        error_text: analysis.error_text,
        errors: analysis.errors,
        metrics: analysis.person_detected.then_some(analysis.metrics),
        good_form_frames: analysis.good_form_frames,
        error_counts: analysis.error_counts,
        recording: analysis.recording,
        frame_count: analysis.recorded_frames,
        countdown: analysis.countdown,
        person_detected: analysis.person_detected,
        reps: analysis.reps,
        target_reps: analysis.target_reps,
        prediction: analysis.prediction,
        confidence: analysis.confidence,
    }
}
