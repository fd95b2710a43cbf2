//! Exercise analyzers
//!
//! Every exercise implements [`Analyzer`]: `reset`, `analyze_frame`, `report`.
//! The session controller holds an [`ExerciseAnalyzer`], a tagged variant
//! chosen from the exercise name through [`ExerciseKind::from_name`].
//!
//! # Frame flow
//!
//! - `None` landmarks: no person; nothing advances
//! - Countdown: the recording delay has not elapsed; the frame is only displayed
//! - Recording: form checks run, counters and reps update

pub mod classifier;
pub mod leg_raise;
pub mod lunge;
pub mod recording;
pub mod squat;
pub mod warrior;

pub use classifier::{FormClassifier, Prediction, RuleBasedSquatClassifier, SquatLabel};
pub use leg_raise::LegRaiseAnalyzer;
pub use lunge::LungeAnalyzer;
pub use recording::{FormTally, Phase, RecordingClock, RepEvent};
pub use squat::SquatAnalyzer;
pub use warrior::WarriorAnalyzer;

use crate::config::ExerciseConfigs;
use crate::error::{Error, Result};
use crate::landmarks::PoseLandmarks;
use crate::report::SessionReport;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maximum errors reported for a single frame
pub const MAX_FRAME_ERRORS: usize = 3;

/// Error reported when required joints are missing or barely visible
pub const OUT_OF_VIEW: &str = "Move fully into camera view";

/// Supported exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExerciseKind {
    Squat,
    Lunge,
    LegRaise,
    Warrior,
}

/// Names accepted in a `start` request, matched case-insensitively
const EXERCISE_TABLE: &[(&str, ExerciseKind)] = &[
    ("Squats", ExerciseKind::Squat),
    ("Squat", ExerciseKind::Squat),
    ("Lunges", ExerciseKind::Lunge),
    ("Lunge", ExerciseKind::Lunge),
    ("LegRaises", ExerciseKind::LegRaise),
    ("LegRaise", ExerciseKind::LegRaise),
    ("leg_raise", ExerciseKind::LegRaise),
    ("Warrior", ExerciseKind::Warrior),
    ("WarriorPose", ExerciseKind::Warrior),
];

impl ExerciseKind {
    pub fn from_name(name: &str) -> Result<Self> {
        let name = name.trim();
        EXERCISE_TABLE
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| Error::InvalidExercise(name.to_string()))
    }

    /// Canonical name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "Squats",
            ExerciseKind::Lunge => "Lunges",
            ExerciseKind::LegRaise => "LegRaises",
            ExerciseKind::Warrior => "Warrior",
        }
    }

    /// Name used in report headings
    pub fn display_name(&self) -> &'static str {
        match self {
            ExerciseKind::Squat => "Squats",
            ExerciseKind::Lunge => "Lunges",
            ExerciseKind::LegRaise => "Leg Raises",
            ExerciseKind::Warrior => "Warrior II",
        }
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Result of analyzing one frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameAnalysis {
    pub person_detected: bool,
    /// Up to [`MAX_FRAME_ERRORS`] errors in priority order
    pub errors: Vec<String>,
    /// Feedback text for the throttler; empty when there is nothing to say
    pub error_text: String,
    pub metrics: BTreeMap<String, f64>,
    pub recording: bool,
    pub countdown: Option<u32>,
    pub recorded_frames: u64,
    pub good_form_frames: u64,
    pub error_counts: BTreeMap<String, u64>,
    pub reps: Option<u32>,
    pub target_reps: Option<u32>,
    pub prediction: Option<String>,
    pub confidence: Option<f64>,
}

impl FrameAnalysis {
    pub fn no_person() -> Self {
        Self::default()
    }

    pub fn countdown(seconds_left: u32) -> Self {
        Self {
            person_detected: true,
            countdown: Some(seconds_left),
            ..Self::default()
        }
    }

    /// Recorded frame with the given errors, truncated to the frame limit
    pub fn scored(mut errors: Vec<String>) -> Self {
        errors.truncate(MAX_FRAME_ERRORS);
        Self {
            person_detected: true,
            recording: true,
            errors,
            ..Self::default()
        }
    }

    pub fn with_metric(mut self, name: &str, degrees: f64) -> Self {
        self.metrics.insert(name.to_string(), degrees);
        self
    }
}

/// Feedback text from the leading errors, or `positive` when there are none
pub(crate) fn feedback_text(errors: &[String], joined: usize, positive: &str) -> String {
    if errors.is_empty() {
        return positive.to_string();
    }
    errors
        .iter()
        .take(joined.max(1))
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Per-exercise form analysis
pub trait Analyzer {
    fn kind(&self) -> ExerciseKind;

    /// Clear counters and rep state for a new session
    fn reset(&mut self);

    /// Analyze one frame; `None` means no person was detected
    fn analyze_frame(&mut self, landmarks: Option<&PoseLandmarks>) -> Result<FrameAnalysis>;

    /// Summary of everything recorded since the last reset
    fn report(&self) -> SessionReport;
}

/// Analyzer for the active exercise
pub enum ExerciseAnalyzer {
    Squat(SquatAnalyzer),
    Lunge(LungeAnalyzer),
    LegRaise(LegRaiseAnalyzer),
    Warrior(WarriorAnalyzer),
}

impl ExerciseAnalyzer {
    /// Build the analyzer for `kind` from its threshold table
    pub fn new(
        kind: ExerciseKind,
        exercises: &ExerciseConfigs,
        fps: f64,
        classifier: Arc<dyn FormClassifier>,
    ) -> Self {
        match kind {
            ExerciseKind::Squat => {
                ExerciseAnalyzer::Squat(SquatAnalyzer::new(exercises.squat.clone(), fps, classifier))
            }
            ExerciseKind::Lunge => {
                ExerciseAnalyzer::Lunge(LungeAnalyzer::new(exercises.lunge.clone(), fps))
            }
            ExerciseKind::LegRaise => {
                ExerciseAnalyzer::LegRaise(LegRaiseAnalyzer::new(exercises.leg_raise.clone(), fps))
            }
            ExerciseKind::Warrior => {
                ExerciseAnalyzer::Warrior(WarriorAnalyzer::new(exercises.warrior.clone(), fps))
            }
        }
    }

    fn inner(&self) -> &dyn Analyzer {
        match self {
            ExerciseAnalyzer::Squat(a) => a as &dyn Analyzer,
            ExerciseAnalyzer::Lunge(a) => a,
            ExerciseAnalyzer::LegRaise(a) => a,
            ExerciseAnalyzer::Warrior(a) => a,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Analyzer {
        match self {
            ExerciseAnalyzer::Squat(a) => a as &mut dyn Analyzer,
            ExerciseAnalyzer::Lunge(a) => a,
            ExerciseAnalyzer::LegRaise(a) => a,
            ExerciseAnalyzer::Warrior(a) => a,
        }
    }
}

impl Analyzer for ExerciseAnalyzer {
    fn kind(&self) -> ExerciseKind {
        self.inner().kind()
    }

    fn reset(&mut self) {
        self.inner_mut().reset()
    }

    fn analyze_frame(&mut self, landmarks: Option<&PoseLandmarks>) -> Result<FrameAnalysis> {
        self.inner_mut().analyze_frame(landmarks)
    }

    fn report(&self) -> SessionReport {
        self.inner().report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_accepts_wire_names_and_aliases() {
        assert_eq!(ExerciseKind::from_name("Squats").unwrap(), ExerciseKind::Squat);
        assert_eq!(ExerciseKind::from_name("lunges").unwrap(), ExerciseKind::Lunge);
        assert_eq!(ExerciseKind::from_name("LegRaises").unwrap(), ExerciseKind::LegRaise);
        assert_eq!(ExerciseKind::from_name(" warrior ").unwrap(), ExerciseKind::Warrior);
    }

    #[test]
    fn lookup_rejects_unknown_names() {
        let err = ExerciseKind::from_name("Yoga").unwrap_err();
        assert_eq!(err.to_string(), "Invalid exercise: Yoga");
    }

    #[test]
    fn wire_names_round_trip() {
        for kind in [
            ExerciseKind::Squat,
            ExerciseKind::Lunge,
            ExerciseKind::LegRaise,
            ExerciseKind::Warrior,
        ] {
            assert_eq!(ExerciseKind::from_name(kind.wire_name()).unwrap(), kind);
        }
    }

    #[test]
    fn scored_frames_keep_three_errors() {
        let errors = (0..5).map(|i| format!("e{}", i)).collect();
        let analysis = FrameAnalysis::scored(errors);
        assert_eq!(analysis.errors, vec!["e0", "e1", "e2"]);
    }

    #[test]
    fn feedback_text_joins_leading_errors() {
        let errors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(feedback_text(&errors, 1, "ok"), "a");
        assert_eq!(feedback_text(&errors, 2, "ok"), "a b");
        assert_eq!(feedback_text(&[], 2, "ok"), "ok");
    }

    #[test]
    fn reset_analyzer_reports_nothing_recorded() {
        let configs = ExerciseConfigs::default();
        let classifier: Arc<dyn FormClassifier> = Arc::new(RuleBasedSquatClassifier::default());
        let mut analyzer = ExerciseAnalyzer::new(ExerciseKind::Lunge, &configs, 30.0, classifier);
        analyzer.reset();
        assert_eq!(analyzer.kind(), ExerciseKind::Lunge);
        assert_eq!(analyzer.report().summary.recorded_frames, 0);
    }
}
