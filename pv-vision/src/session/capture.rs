//! Capture thread
//!
//! Opening the source, reading frames and pose detection are blocking calls
//! (camera drivers, model inference), so they run on a dedicated OS thread.
//! The thread owns the [`VideoLease`] and hands results to the frame pump
//! through a bounded channel; with room for one item it stays at most one
//! frame ahead of the pump.
//!
//! The thread exits when the stop flag is set, when the pump drops its
//! receiver, or after reporting end of stream or a lost source. The source is
//! released before the completion signal fires.

use crate::collaborators::{LandmarkProvider, VideoFrame, VideoLease, VideoOpener};
use crate::error::{Error, Result};
use crate::landmarks::PoseLandmarks;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One result from the capture thread
#[derive(Debug)]
pub(crate) enum Captured {
    /// A frame and its pose (`None`: nobody in view)
    Frame(VideoFrame, Option<PoseLandmarks>),
    /// Reading or detecting this frame failed; the stream continues
    Skipped(Error),
    /// The source could not be opened or went away
    Lost(Error),
    EndOfStream,
}

impl Captured {
    fn is_last(&self) -> bool {
        matches!(self, Captured::Lost(_) | Captured::EndOfStream)
    }
}

/// Receiving side held by the frame pump
pub(crate) struct CaptureHandle {
    pub frames: mpsc::Receiver<Captured>,
    /// Fires once the thread has released the source
    pub done: oneshot::Receiver<()>,
}

/// Spawn the capture thread for session `id`
///
/// # Errors
///
/// `Io` if the OS refuses to start the thread.
pub(crate) fn spawn(
    id: Uuid,
    video: Arc<dyn VideoOpener>,
    landmarks: Arc<dyn LandmarkProvider>,
    stop_flag: Arc<AtomicBool>,
) -> Result<CaptureHandle> {
    let (tx, frames) = mpsc::channel(1);
    let (done_tx, done) = oneshot::channel();

    std::thread::Builder::new()
        .name(format!("capture-{}", id.simple()))
        .spawn(move || {
            run(video.as_ref(), landmarks.as_ref(), &stop_flag, &tx);
            let _ = done_tx.send(());
            debug!("Capture thread for session {} exited", id);
        })?;

    Ok(CaptureHandle { frames, done })
}

fn run(
    video: &dyn VideoOpener,
    landmarks: &dyn LandmarkProvider,
    stop_flag: &AtomicBool,
    tx: &mpsc::Sender<Captured>,
) {
    // Dropped (and released) on every return from here
    let mut lease = match video.open() {
        Ok(source) => VideoLease::new(source),
        Err(e) => {
            let _ = tx.blocking_send(Captured::Lost(e));
            return;
        }
    };
    info!("Capture source opened");

    while !stop_flag.load(Ordering::Relaxed) {
        let captured = match lease.read_frame() {
            Ok(Some(frame)) => detect(landmarks, frame),
            Ok(None) => Captured::EndOfStream,
            Err(e @ Error::VideoSourceDisconnected(_)) => Captured::Lost(e),
            Err(e) => Captured::Skipped(e),
        };

        let last = captured.is_last();
        if tx.blocking_send(captured).is_err() {
            debug!("Frame pump gone, stopping capture");
            return;
        }
        if last {
            return;
        }
    }
}

fn detect(landmarks: &dyn LandmarkProvider, frame: VideoFrame) -> Captured {
    match landmarks.detect(&frame) {
        Ok(pose) => Captured::Frame(frame, pose),
        Err(Error::NoPersonDetected) => Captured::Frame(frame, None),
        Err(e) => {
            warn!("Pose detection failed for frame {}: {}", frame.sequence, e);
            Captured::Skipped(e)
        }
    }
}
