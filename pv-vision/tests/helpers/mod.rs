//! Test helpers for pv-vision integration tests
//!
//! Provides:
//! - ScriptedOpener: capture source that plays a fixed list of steps
//! - FailingOpener: capture source that never opens
//! - StallingOpener: capture source whose reads block after the first frame
//! - RecordingSynthesizer: speech collaborator that records every request
//! - CollectingSink: report sink that keeps every report in memory
//! - Pose builders for a clean and a sloppy Warrior II
//! - Harness: controller + hub + one registered client

#![allow(dead_code)]

use pv_common::events::Language;
use pv_vision::analysis::RuleBasedSquatClassifier;
use pv_vision::collaborators::{
    LandmarkProvider, RecordedLandmarks, ReportSink, SpeechSynthesizer, VideoFrame, VideoOpener,
    VideoSource,
};
use pv_vision::error::{Error, Result};
use pv_vision::hub::{spawn_dispatcher, BroadcastHub, ClientId, HubSender};
use pv_vision::landmarks::{Joint, Landmark, PoseLandmarks};
use pv_vision::report::SessionReport;
use pv_vision::session::{SessionController, SessionDeps, SessionSettings};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use futures::future::BoxFuture;

/// How long a test waits for any single message
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(3);

// ============================================================================
// Capture sources
// ============================================================================

/// One step of a scripted capture
#[derive(Debug, Clone)]
pub enum Step {
    /// A frame carrying this pose (`None`: nobody in view)
    Pose(Option<PoseLandmarks>),
    /// A frame that fails to decode
    Glitch(String),
    /// The camera goes away
    Disconnect,
}

/// Plays `steps` in order; with `repeat_last` the final step repeats forever
pub struct ScriptedOpener {
    steps: Vec<Step>,
    repeat_last: bool,
    pub opened: Arc<AtomicUsize>,
    pub released: Arc<AtomicBool>,
}

impl ScriptedOpener {
    pub fn finite(steps: Vec<Step>) -> Self {
        Self {
            steps,
            repeat_last: false,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn endless(steps: Vec<Step>) -> Self {
        Self {
            repeat_last: true,
            ..Self::finite(steps)
        }
    }
}

impl VideoOpener for ScriptedOpener {
    fn open(&self) -> Result<Box<dyn VideoSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedSource {
            steps: self.steps.clone(),
            repeat_last: self.repeat_last,
            next: 0,
            sequence: 0,
            released: Arc::clone(&self.released),
        }))
    }
}

struct ScriptedSource {
    steps: Vec<Step>,
    repeat_last: bool,
    next: usize,
    sequence: u64,
    released: Arc<AtomicBool>,
}

impl VideoSource for ScriptedSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let step = match self.steps.get(self.next) {
            Some(step) => step.clone(),
            None if self.repeat_last => match self.steps.last() {
                Some(step) => step.clone(),
                None => return Ok(None),
            },
            None => return Ok(None),
        };
        self.next += 1;
        self.sequence += 1;

        match step {
            Step::Pose(landmarks) => Ok(Some(VideoFrame {
                sequence: self.sequence,
                image: vec![0xFF, 0xD8],
                landmarks,
            })),
            Step::Glitch(reason) => Err(Error::FrameProcessing(reason)),
            Step::Disconnect => Err(Error::VideoSourceDisconnected("camera unplugged".to_string())),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Capture source that cannot be opened
pub struct FailingOpener;

impl VideoOpener for FailingOpener {
    fn open(&self) -> Result<Box<dyn VideoSource>> {
        Err(Error::VideoSourceDisconnected("device busy".to_string()))
    }
}

/// First read returns a frame at once; every later read blocks for `stall`
pub struct StallingOpener {
    pub stall: Duration,
    pub released: Arc<AtomicBool>,
}

impl StallingOpener {
    pub fn new(stall: Duration) -> Self {
        Self {
            stall,
            released: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl VideoOpener for StallingOpener {
    fn open(&self) -> Result<Box<dyn VideoSource>> {
        Ok(Box::new(StallingSource {
            stall: self.stall,
            sequence: 0,
            released: Arc::clone(&self.released),
        }))
    }
}

struct StallingSource {
    stall: Duration,
    sequence: u64,
    released: Arc<AtomicBool>,
}

impl VideoSource for StallingSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        if self.sequence > 0 {
            std::thread::sleep(self.stall);
        }
        self.sequence += 1;
        Ok(Some(VideoFrame {
            sequence: self.sequence,
            image: vec![0xFF, 0xD8],
            landmarks: Some(warrior_pose()),
        }))
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Polls `check` until it holds or `within` runs out
pub async fn eventually(within: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

// ============================================================================
// Speech and reports
// ============================================================================

/// Returns the text bytes as audio and remembers every request
#[derive(Default)]
pub struct RecordingSynthesizer {
    pub requests: Mutex<Vec<(String, Language)>>,
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn synthesize<'a>(&'a self, text: &'a str, language: Language) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push((text.to_string(), language));
            }
            Ok(text.as_bytes().to_vec())
        })
    }
}

/// Keeps every stored report
#[derive(Default)]
pub struct CollectingSink {
    pub reports: Mutex<Vec<SessionReport>>,
}

impl CollectingSink {
    pub fn count(&self) -> usize {
        self.reports.lock().map(|r| r.len()).unwrap_or(0)
    }
}

impl ReportSink for CollectingSink {
    fn store(&self, report: &SessionReport) -> Result<Option<PathBuf>> {
        if let Ok(mut reports) = self.reports.lock() {
            reports.push(report.clone());
        }
        Ok(None)
    }
}

// ============================================================================
// Poses
// ============================================================================

fn lm(x: f64, y: f64) -> Landmark {
    Landmark::new(x, y, 1.0)
}

/// Warrior II within every range: front knee at 90°, back leg straight, arms level
pub fn warrior_pose() -> PoseLandmarks {
    PoseLandmarks::new()
        .with(Joint::Nose, lm(0.5, 0.2))
        .with(Joint::LeftShoulder, lm(0.45, 0.3))
        .with(Joint::RightShoulder, lm(0.55, 0.3))
        .with(Joint::LeftElbow, lm(0.3, 0.3))
        .with(Joint::RightElbow, lm(0.7, 0.3))
        .with(Joint::LeftWrist, lm(0.15, 0.3))
        .with(Joint::RightWrist, lm(0.85, 0.3))
        .with(Joint::LeftHip, lm(0.45, 0.55))
        .with(Joint::RightHip, lm(0.55, 0.55))
        .with(Joint::LeftKnee, lm(0.3, 0.55))
        .with(Joint::LeftAnkle, lm(0.3, 0.8))
        .with(Joint::RightKnee, lm(0.65, 0.675))
        .with(Joint::RightAnkle, lm(0.75, 0.8))
}

/// Warrior II with a dropped left arm
pub fn sloppy_warrior_pose() -> PoseLandmarks {
    let mut pose = warrior_pose();
    pose.insert(Joint::LeftWrist, lm(0.3, 0.6));
    pose
}

// ============================================================================
// Harness
// ============================================================================

/// Settings tuned for fast tests: 5 ms frames, no start-up countdowns
pub fn fast_settings() -> SessionSettings {
    let mut settings = SessionSettings::default();
    settings.session.frame_period_ms = 5;
    settings.session.stop_timeout_ms = 1000;
    settings.session.client_queue_capacity = 4096;
    settings.exercises.squat.delay_seconds = 0.0;
    settings.exercises.lunge.delay_seconds = 0.0;
    settings.exercises.leg_raise.delay_seconds = 0.0;
    settings.exercises.warrior.delay_seconds = 0.0;
    settings
}

/// A controller wired to a hub with one registered client
pub struct Harness {
    pub controller: Arc<SessionController>,
    pub hub: Arc<BroadcastHub>,
    pub sender: HubSender,
    pub reports: Arc<CollectingSink>,
    pub client: ClientId,
    pub rx: mpsc::Receiver<Arc<str>>,
}

impl Harness {
    pub async fn new(
        video: Arc<dyn VideoOpener>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        settings: SessionSettings,
    ) -> Self {
        let hub = Arc::new(BroadcastHub::new(settings.session.client_queue_capacity));
        let (sender, _dispatcher) = spawn_dispatcher(Arc::clone(&hub), 1024);
        let reports = Arc::new(CollectingSink::default());
        let landmarks: Arc<dyn LandmarkProvider> = Arc::new(RecordedLandmarks);

        let controller = Arc::new(SessionController::new(
            settings,
            SessionDeps {
                video,
                landmarks,
                speech,
                reports: Arc::clone(&reports) as Arc<dyn ReportSink>,
                classifier: Arc::new(RuleBasedSquatClassifier::default()),
            },
            sender.clone(),
        ));
        let (client, rx) = hub.register().await;

        Self {
            controller,
            hub,
            sender,
            reports,
            client,
            rx,
        }
    }

    pub async fn with_video(video: impl VideoOpener + 'static) -> Self {
        Self::new(Arc::new(video), None, fast_settings()).await
    }

    /// Next message for the client; panics after [`MESSAGE_TIMEOUT`]
    pub async fn next(&mut self) -> Value {
        let text = tokio::time::timeout(MESSAGE_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("client queue closed");
        serde_json::from_str(&text).expect("message is JSON")
    }

    /// Messages up to and including the first with `status`
    pub async fn until_status(&mut self, status: &str) -> Vec<Value> {
        let mut seen = Vec::new();
        loop {
            let message = self.next().await;
            let done = message["status"] == status;
            seen.push(message);
            if done {
                return seen;
            }
        }
    }

    /// Next message of the given `type`, skipping everything else
    pub async fn next_of_type(&mut self, kind: &str) -> Value {
        loop {
            let message = self.next().await;
            if message["type"] == kind {
                return message;
            }
        }
    }

    /// Everything that arrives within `window`
    pub async fn drain_for(&mut self, window: Duration) -> Vec<Value> {
        let mut seen = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(text)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            if let Ok(message) = serde_json::from_str(&text) {
                seen.push(message);
            }
        }
        seen
    }
}

pub fn count_type(messages: &[Value], kind: &str) -> usize {
    messages.iter().filter(|m| m["type"] == kind).count()
}

pub fn position_of_status(messages: &[Value], status: &str) -> Option<usize> {
    messages.iter().position(|m| m["status"] == status)
}
