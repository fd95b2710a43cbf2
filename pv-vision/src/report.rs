//! End-of-session report generation
//!
//! Turns an analyzer's counters into a [`ReportSummary`] for the wire and a
//! plain-text rendering for viewers and the report sink.

use chrono::Utc;
use pv_common::events::{Occurrence, ReportSummary};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Counters an analyzer hands to the generator
#[derive(Debug, Clone)]
pub struct ReportInput<'a> {
    /// Display name for the heading
    pub exercise: &'a str,
    pub fps: f64,
    pub recorded_frames: u64,
    pub good_form_frames: u64,
    pub error_counts: &'a BTreeMap<String, u64>,
    pub reps: Option<u32>,
    pub target_reps: Option<u32>,
    pub shallow_reps: u32,
    /// Classifier label frame counts, when the exercise uses a classifier
    pub labels: Option<&'a BTreeMap<String, u64>>,
}

/// Finished report
#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub summary: ReportSummary,
    pub text: String,
}

pub const NOTHING_RECORDED: &str = "No exercise session recorded yet.";
pub const NO_ERRORS: &str = "No errors detected! Perfect form!";
pub const KEEP_IT_UP: &str = "Continue with your excellent form!";

/// Build the summary and text for a finished session
pub fn generate(input: &ReportInput<'_>) -> SessionReport {
    let fps = if input.fps > 0.0 { input.fps } else { 1.0 };
    let recorded = input.recorded_frames;

    let seconds = |frames: u64| frames as f64 / fps;
    let percent = |frames: u64| {
        if recorded == 0 {
            0.0
        } else {
            frames as f64 * 100.0 / recorded as f64
        }
    };
    let occurrences = |counts: &BTreeMap<String, u64>| {
        let mut rows: Vec<Occurrence> = counts
            .iter()
            .filter(|(_, &frames)| frames > 0)
            .map(|(name, &frames)| Occurrence {
                name: name.clone(),
                frames,
                seconds: seconds(frames),
                percent: percent(frames),
            })
            .collect();
        // Stable sort keeps name order among equal counts
        rows.sort_by(|a, b| b.frames.cmp(&a.frames));
        rows
    };

    let errors = occurrences(input.error_counts);
    let labels = input.labels.map(|l| occurrences(l)).unwrap_or_default();
    let recommendation = recommendation(errors.first().map(|e| e.name.as_str()));

    let summary = ReportSummary {
        exercise: input.exercise.to_string(),
        generated_at: Utc::now(),
        recorded_frames: recorded,
        recorded_seconds: seconds(recorded),
        good_form_seconds: seconds(input.good_form_frames),
        good_form_percent: percent(input.good_form_frames),
        reps: input.reps,
        target_reps: input.target_reps,
        goal_achieved: match (input.reps, input.target_reps) {
            (Some(reps), Some(target)) => Some(reps >= target),
            _ => None,
        },
        shallow_reps: input.shallow_reps,
        errors,
        labels,
        recommendation,
    };

    let text = render_text(&summary);
    SessionReport { summary, text }
}

/// Coaching line keyed off the most frequent error
pub fn recommendation(top_error: Option<&str>) -> String {
    let Some(error) = top_error else {
        return KEEP_IT_UP.to_string();
    };

    let lower = error.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let advice = if has(&["knee"]) {
        "Work on proper knee alignment and depth"
    } else if has(&["head", "neck"]) {
        "Keep your head aligned with your spine"
    } else if has(&["arm"]) {
        "Keep your arms extended at shoulder level"
    } else if has(&["leg", "raise", "lunge", "shallow"]) {
        "Move through the full range of motion with control"
    } else if has(&["back", "torso", "spine"]) {
        "Focus on keeping your torso upright and your spine neutral"
    } else if has(&["hip"]) {
        "Keep your hips level and square"
    } else if has(&["stance", "foot", "feet", "toe"]) {
        "Adjust your stance width and foot placement"
    } else if has(&["camera"]) {
        "Position yourself fully within the camera view"
    } else {
        return format!("Practice proper form for: {}", error);
    };
    advice.to_string()
}

fn render_text(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "--- {} Exercise Report ---", summary.exercise);

    if summary.recorded_frames == 0 {
        out.push_str(NOTHING_RECORDED);
        out.push('\n');
        return out;
    }

    let _ = writeln!(out, "Total Recorded Time: {:.1} seconds", summary.recorded_seconds);
    let _ = writeln!(
        out,
        "Good Form Duration: {:.1} seconds ({:.1}%)",
        summary.good_form_seconds, summary.good_form_percent
    );

    if let Some(reps) = summary.reps {
        match summary.target_reps {
            Some(target) => {
                let _ = writeln!(out, "Repetitions Completed: {}/{}", reps, target);
                if reps >= target {
                    out.push_str("Goal achieved!\n");
                }
            }
            None => {
                let _ = writeln!(out, "Repetitions Completed: {}", reps);
            }
        }
        if summary.shallow_reps > 0 {
            let _ = writeln!(out, "Shallow Repetitions (not counted): {}", summary.shallow_reps);
        }
    }

    out.push('\n');
    if summary.errors.is_empty() {
        let _ = writeln!(out, "{}", NO_ERRORS);
    } else {
        out.push_str("Errors Detected:\n");
        for row in &summary.errors {
            let _ = writeln!(
                out,
                "- {}: {} frames ({:.1} seconds, {:.1}%)",
                row.name, row.frames, row.seconds, row.percent
            );
        }
    }

    if !summary.labels.is_empty() {
        out.push_str("\nForm Classification:\n");
        for row in &summary.labels {
            let _ = writeln!(out, "- {}: {} frames ({:.1}%)", row.name, row.frames, row.percent);
        }
    }

    let _ = writeln!(out, "\nAreas to Focus On:\n- {}", summary.recommendation);
    out
}
