//! Exercise session engine
//!
//! One session runs per process. The [`SessionController`] owns the lifecycle
//! (`Idle → Running → Stopping → Idle`) and launches a frame pump task per
//! session. Capture and pose detection run on a dedicated thread; the pump
//! runs the active analyzer on what it delivers and pushes results to the
//! broadcast hub at a fixed frame period.
//!
//! Every session end (stop, end of stream, lost source, forced abort) emits
//! exactly one report before the controller returns to `Idle`.

mod capture;
pub mod context;
pub mod controller;
pub mod pump;

pub use context::SessionContext;
pub use controller::{Disposition, SessionController, StartOptions};

use crate::analysis::FormClassifier;
use crate::collaborators::{LandmarkProvider, ReportSink, SpeechSynthesizer, VideoOpener};
use crate::config::{ExerciseConfigs, SessionConfig, SpeechConfig, VisionConfig};
use serde::Serialize;
use std::sync::Arc;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Stopping,
}

/// External collaborators used by every session
#[derive(Clone)]
pub struct SessionDeps {
    pub video: Arc<dyn VideoOpener>,
    pub landmarks: Arc<dyn LandmarkProvider>,
    /// Spoken feedback is unavailable when absent
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub reports: Arc<dyn ReportSink>,
    pub classifier: Arc<dyn FormClassifier>,
}

/// Configuration slices the session engine reads
#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub session: SessionConfig,
    pub speech: SpeechConfig,
    pub exercises: ExerciseConfigs,
}

impl From<&VisionConfig> for SessionSettings {
    fn from(config: &VisionConfig) -> Self {
        Self {
            session: config.session.clone(),
            speech: config.speech.clone(),
            exercises: config.exercises.clone(),
        }
    }
}
