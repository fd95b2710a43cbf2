//! Payload types carried by session events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-frame analysis result sent as `{"type": "frame", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FramePayload {
    /// Monotonic frame number within the session
    pub sequence: u64,

    /// Annotated image, base64 encoded
    pub data: String,

    /// Text the feedback throttler watches (empty during countdown or with no person)
    pub error_text: String,

    /// Up to 3 errors in priority order
    #[serde(default)]
    pub errors: Vec<String>,

    /// Primary metric angles in degrees; `null` when no person was detected
    #[serde(default)]
    pub metrics: Option<BTreeMap<String, f64>>,

    pub good_form_frames: u64,
    pub error_counts: BTreeMap<String, u64>,
    pub recording: bool,

    /// Frames counted toward the report so far
    pub frame_count: u64,

    /// Whole seconds left before recording starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown: Option<u32>,

    pub person_detected: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<u32>,

    /// Smoothed classifier label (squat only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

#[cfg(test)]
impl FramePayload {
    /// Payload with no image and zeroed counters
    pub fn empty(sequence: u64) -> Self {
        Self {
            sequence,
            data: String::new(),
            error_text: String::new(),
            errors: Vec::new(),
            metrics: None,
            good_form_frames: 0,
            error_counts: BTreeMap::new(),
            recording: false,
            frame_count: 0,
            countdown: None,
            person_detected: false,
            reps: None,
            target_reps: None,
            prediction: None,
            confidence: None,
        }
    }
}

/// One row of a report breakdown (an error message or a classifier label)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub name: String,
    pub frames: u64,
    pub seconds: f64,
    pub percent: f64,
}

/// Structured end-of-session summary sent alongside the text report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub exercise: String,
    pub generated_at: DateTime<Utc>,
    pub recorded_frames: u64,
    pub recorded_seconds: f64,
    pub good_form_seconds: f64,
    pub good_form_percent: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_reps: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_achieved: Option<bool>,

    pub shallow_reps: u32,

    /// Sorted by frame count, most frequent first
    pub errors: Vec<Occurrence>,

    /// Classifier label shares (squat only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<Occurrence>,

    pub recommendation: String,
}
