//! Recording lifecycle shared by all analyzers
//!
//! A session shows a countdown for `delay_seconds` worth of frames before any
//! frame is scored. Only frames with a detected person advance the clock.

use crate::report::ReportInput;
use std::collections::BTreeMap;

/// Where a frame falls in the recording lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Countdown { seconds_left: u32 },
    Recording,
}

/// Outcome of a rep-counter update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepEvent {
    None,
    Counted,
    /// The rep completed without reaching the required depth and was not counted
    Shallow,
}

/// Frame counter with a start-up delay
#[derive(Debug, Clone)]
pub struct RecordingClock {
    fps: f64,
    delay_frames: u64,
    frame_count: u64,
    start_frame: Option<u64>,
}

impl RecordingClock {
    pub fn new(delay_seconds: f64, fps: f64) -> Self {
        Self {
            fps,
            delay_frames: (delay_seconds * fps).round().max(0.0) as u64,
            frame_count: 0,
            start_frame: None,
        }
    }

    /// Advance by one frame with a detected person
    pub fn tick(&mut self) -> Phase {
        self.frame_count += 1;
        if self.frame_count <= self.delay_frames {
            let remaining = self.delay_frames - self.frame_count + 1;
            return Phase::Countdown {
                seconds_left: (remaining as f64 / self.fps).ceil() as u32,
            };
        }
        if self.start_frame.is_none() {
            self.start_frame = Some(self.frame_count);
        }
        Phase::Recording
    }

    pub fn is_recording(&self) -> bool {
        self.start_frame.is_some()
    }

    /// Frames counted toward the report
    pub fn recorded_frames(&self) -> u64 {
        self.start_frame
            .map(|start| self.frame_count - start + 1)
            .unwrap_or(0)
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn reset(&mut self) {
        self.frame_count = 0;
        self.start_frame = None;
    }
}

/// Good-form and per-error frame counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormTally {
    good_form_frames: u64,
    error_counts: BTreeMap<String, u64>,
}

impl FormTally {
    /// Count a recorded frame: good when `errors` is empty, otherwise once per error
    pub fn record(&mut self, errors: &[String]) {
        if errors.is_empty() {
            self.good_form_frames += 1;
            return;
        }
        for error in errors {
            self.record_error(error);
        }
    }

    /// Count one occurrence of an error outside the per-frame list (e.g. a shallow rep)
    pub fn record_error(&mut self, error: &str) {
        *self.error_counts.entry(error.to_string()).or_insert(0) += 1;
    }

    pub fn good_form_frames(&self) -> u64 {
        self.good_form_frames
    }

    pub fn error_counts(&self) -> &BTreeMap<String, u64> {
        &self.error_counts
    }

    pub fn reset(&mut self) {
        self.good_form_frames = 0;
        self.error_counts.clear();
    }
}

/// Clock plus tally: the counters every analyzer keeps
#[derive(Debug, Clone)]
pub struct SessionCounters {
    pub clock: RecordingClock,
    pub tally: FormTally,
}

impl SessionCounters {
    pub fn new(delay_seconds: f64, fps: f64) -> Self {
        Self {
            clock: RecordingClock::new(delay_seconds, fps),
            tally: FormTally::default(),
        }
    }

    /// Copy the running counters into a frame result
    pub fn stamp(&self, analysis: &mut super::FrameAnalysis) {
        analysis.recording = self.clock.is_recording();
        analysis.recorded_frames = self.clock.recorded_frames();
        analysis.good_form_frames = self.tally.good_form_frames();
        analysis.error_counts = self.tally.error_counts().clone();
    }

    /// Report input without rep fields
    pub fn report_input<'a>(&'a self, exercise: &'a str) -> ReportInput<'a> {
        ReportInput {
            exercise,
            fps: self.clock.fps(),
            recorded_frames: self.clock.recorded_frames(),
            good_form_frames: self.tally.good_form_frames(),
            error_counts: self.tally.error_counts(),
            reps: None,
            target_reps: None,
            shallow_reps: 0,
            labels: None,
        }
    }

    pub fn reset(&mut self) {
        self.clock.reset();
        self.tally.reset();
    }
}
