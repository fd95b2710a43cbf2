//! Squat analyzer
//!
//! Each recorded frame yields a [`SquatFeatures`] vector (10 posture features
//! plus their per-second velocities). Full windows go to the form classifier
//! and the smoothed label becomes the frame's error. Reps are counted from
//! average squat depth with a single crossing threshold.

use super::classifier::{FormClassifier, Prediction, PredictionSmoother};
use super::recording::{Phase, RepEvent, SessionCounters};
use super::{feedback_text, Analyzer, ExerciseKind, FrameAnalysis, OUT_OF_VIEW};
use crate::config::SquatConfig;
use crate::error::{Error, Result};
use crate::geometry::{angle_between, Vec3};
use crate::landmarks::{Joint, PoseLandmarks};
use crate::report::{self, SessionReport};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

const REQUIRED_JOINTS: [Joint; 9] = [
    Joint::Nose,
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
    Joint::LeftKnee,
    Joint::RightKnee,
    Joint::LeftAnkle,
    Joint::RightAnkle,
];

/// Per-frame posture measurements
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SquatPosture {
    /// Angle between hip→knee and knee→ankle (0 when the leg is straight)
    pub left_knee_angle: f64,
    pub right_knee_angle: f64,
    /// Angle between shoulder→hip and hip→knee
    pub left_hip_angle: f64,
    pub right_hip_angle: f64,
    /// Lean of left shoulder→hip from image vertical
    pub torso_vertical_angle: f64,
    pub head_torso_angle: f64,
    /// Knee separation over hip width (x/z plane)
    pub knee_distance: f64,
    pub ankle_distance: f64,
    /// `hip.y - knee.y`; rises toward 0 as the hips drop
    pub left_depth: f64,
    pub right_depth: f64,
}

impl SquatPosture {
    pub fn from_landmarks(pose: &PoseLandmarks) -> Result<Self> {
        let p = |joint| pose.require(joint).map(|lm| lm.xyz());
        let nose = p(Joint::Nose)?;
        let l_shoulder = p(Joint::LeftShoulder)?;
        let r_shoulder = p(Joint::RightShoulder)?;
        let l_hip = p(Joint::LeftHip)?;
        let r_hip = p(Joint::RightHip)?;
        let l_knee = p(Joint::LeftKnee)?;
        let r_knee = p(Joint::RightKnee)?;
        let l_ankle = p(Joint::LeftAnkle)?;
        let r_ankle = p(Joint::RightAnkle)?;

        let hip_width = planar_distance(l_hip, r_hip);
        let normalized = |d: f64| if hip_width > 1e-6 { d / hip_width } else { 0.0 };

        Ok(Self {
            left_knee_angle: angle_between(l_knee.sub(l_hip), l_ankle.sub(l_knee)),
            right_knee_angle: angle_between(r_knee.sub(r_hip), r_ankle.sub(r_knee)),
            left_hip_angle: angle_between(l_hip.sub(l_shoulder), l_knee.sub(l_hip)),
            right_hip_angle: angle_between(r_hip.sub(r_shoulder), r_knee.sub(r_hip)),
            torso_vertical_angle: angle_between(l_hip.sub(l_shoulder), Vec3::xy(0.0, 1.0)),
            head_torso_angle: angle_between(l_shoulder.sub(nose), l_hip.sub(l_shoulder)),
            knee_distance: normalized(planar_distance(l_knee, r_knee)),
            ankle_distance: normalized(planar_distance(l_ankle, r_ankle)),
            left_depth: l_hip.y - l_knee.y,
            right_depth: r_hip.y - r_knee.y,
        })
    }

    pub fn average_depth(&self) -> f64 {
        (self.left_depth + self.right_depth) / 2.0
    }

    fn as_array(&self) -> [f64; 10] {
        [
            self.left_knee_angle,
            self.right_knee_angle,
            self.left_hip_angle,
            self.right_hip_angle,
            self.torso_vertical_angle,
            self.head_torso_angle,
            self.knee_distance,
            self.ankle_distance,
            self.left_depth,
            self.right_depth,
        ]
    }

    fn from_array(v: [f64; 10]) -> Self {
        Self {
            left_knee_angle: v[0],
            right_knee_angle: v[1],
            left_hip_angle: v[2],
            right_hip_angle: v[3],
            torso_vertical_angle: v[4],
            head_torso_angle: v[5],
            knee_distance: v[6],
            ankle_distance: v[7],
            left_depth: v[8],
            right_depth: v[9],
        }
    }
}

/// Distance ignoring the vertical axis
fn planar_distance(a: Vec3, b: Vec3) -> f64 {
    ((a.x - b.x).powi(2) + (a.z - b.z).powi(2)).sqrt()
}

/// Classifier input for one frame: posture plus per-second velocity
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SquatFeatures {
    pub posture: SquatPosture,
    pub velocity: SquatPosture,
}

impl std::ops::Deref for SquatFeatures {
    type Target = SquatPosture;

    fn deref(&self) -> &SquatPosture {
        &self.posture
    }
}

impl SquatFeatures {
    /// Features for `posture` given the previous frame's posture
    pub fn new(posture: SquatPosture, previous: Option<&SquatPosture>, fps: f64) -> Self {
        let velocity = match previous {
            Some(prev) => {
                let cur = posture.as_array();
                let old = prev.as_array();
                let mut v = [0.0; 10];
                for (out, (c, o)) in v.iter_mut().zip(cur.iter().zip(old.iter())) {
                    *out = (c - o) * fps;
                }
                SquatPosture::from_array(v)
            }
            None => SquatPosture::default(),
        };
        Self { posture, velocity }
    }

    /// Flat 20-value vector (posture then velocity) for model services
    pub fn to_vec(&self) -> Vec<f64> {
        let mut v = self.posture.as_array().to_vec();
        v.extend_from_slice(&self.velocity.as_array());
        v
    }
}

/// Squat state for depth hysteresis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SquatStage {
    Standing,
    Squatting,
}

/// Counts a rep on each SQUATTING → STANDING transition
#[derive(Debug, Clone)]
pub struct DepthRepCounter {
    threshold: f64,
    stage: SquatStage,
    reps: u32,
}

impl DepthRepCounter {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            stage: SquatStage::Standing,
            reps: 0,
        }
    }

    pub fn update(&mut self, average_depth: f64) -> RepEvent {
        match self.stage {
            SquatStage::Standing if average_depth >= self.threshold => {
                self.stage = SquatStage::Squatting;
                RepEvent::None
            }
            SquatStage::Squatting if average_depth < self.threshold => {
                self.stage = SquatStage::Standing;
                self.reps += 1;
                RepEvent::Counted
            }
            _ => RepEvent::None,
        }
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn stage(&self) -> SquatStage {
        self.stage
    }

    pub fn reset(&mut self) {
        self.stage = SquatStage::Standing;
        self.reps = 0;
    }
}

pub struct SquatAnalyzer {
    config: SquatConfig,
    counters: SessionCounters,
    classifier: Arc<dyn FormClassifier>,
    window: VecDeque<SquatFeatures>,
    previous: Option<SquatPosture>,
    smoother: PredictionSmoother,
    reps: DepthRepCounter,
    label_counts: BTreeMap<String, u64>,
}

impl SquatAnalyzer {
    pub fn new(config: SquatConfig, fps: f64, classifier: Arc<dyn FormClassifier>) -> Self {
        Self {
            counters: SessionCounters::new(config.delay_seconds, fps),
            window: VecDeque::with_capacity(config.window_size),
            previous: None,
            smoother: PredictionSmoother::new(config.smoothing_window),
            reps: DepthRepCounter::new(config.depth_threshold),
            label_counts: BTreeMap::new(),
            classifier,
            config,
        }
    }

    fn finish(&self, mut analysis: FrameAnalysis) -> FrameAnalysis {
        self.counters.stamp(&mut analysis);
        analysis.reps = Some(self.reps.reps());
        analysis.target_reps = Some(self.config.target_reps);
        analysis
    }

    fn score(&mut self, pose: &PoseLandmarks) -> Result<FrameAnalysis> {
        if pose
            .ensure_visible(&REQUIRED_JOINTS, self.config.visibility_threshold)
            .is_err()
        {
            let errors = vec![OUT_OF_VIEW.to_string()];
            self.counters.tally.record(&errors);
            let mut analysis = FrameAnalysis::scored(errors);
            analysis.error_text = OUT_OF_VIEW.to_string();
            return Ok(analysis);
        }

        let posture = SquatPosture::from_landmarks(pose)?;
        let features = SquatFeatures::new(posture, self.previous.as_ref(), self.counters.clock.fps());
        self.previous = Some(posture);

        if self.window.len() == self.config.window_size {
            self.window.pop_front();
        }
        self.window.push_back(features);

        if self.reps.update(posture.average_depth()) == RepEvent::Counted {
            info!("Squat rep counted: {}", self.reps.reps());
        }

        if self.window.len() == self.config.window_size {
            let window = self.window.make_contiguous();
            if let Some(prediction) = self.classifier.classify(window)? {
                self.smoother.push(prediction);
            }
        }

        let mut analysis = match self.smoother.current() {
            Some(Prediction { label, confidence }) => {
                *self.label_counts.entry(label.as_str().to_string()).or_insert(0) += 1;
                let errors = if label.is_good() {
                    Vec::new()
                } else {
                    vec![label.explanation().to_string()]
                };
                self.counters.tally.record(&errors);

                let mut analysis = FrameAnalysis::scored(errors);
                analysis.error_text = feedback_text(&analysis.errors, 1, label.explanation());
                analysis.prediction = Some(label.as_str().to_string());
                analysis.confidence = Some(confidence);
                analysis
            }
            None => {
                debug!(
                    "Squat window filling: {}/{}",
                    self.window.len(),
                    self.config.window_size
                );
                FrameAnalysis::scored(Vec::new())
            }
        };

        analysis = analysis
            .with_metric("left_knee", posture.left_knee_angle)
            .with_metric("right_knee", posture.right_knee_angle)
            .with_metric("torso_lean", posture.torso_vertical_angle)
            .with_metric("depth", posture.average_depth());
        Ok(analysis)
    }
}

impl Analyzer for SquatAnalyzer {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Squat
    }

    fn reset(&mut self) {
        self.counters.reset();
        self.window.clear();
        self.previous = None;
        self.smoother.reset();
        self.reps.reset();
        self.label_counts.clear();
    }

    fn analyze_frame(&mut self, landmarks: Option<&PoseLandmarks>) -> Result<FrameAnalysis> {
        let Some(pose) = landmarks else {
            return Ok(self.finish(FrameAnalysis::no_person()));
        };

        match self.counters.clock.tick() {
            Phase::Countdown { seconds_left } => {
                Ok(self.finish(FrameAnalysis::countdown(seconds_left)))
            }
            Phase::Recording => {
                let analysis = self.score(pose).map_err(|e| match e {
                    Error::LowVisibilityLandmark(_) | Error::FrameProcessing(_) => e,
                    other => Error::FrameProcessing(other.to_string()),
                })?;
                Ok(self.finish(analysis))
            }
        }
    }

    fn report(&self) -> SessionReport {
        let mut input = self.counters.report_input(ExerciseKind::Squat.display_name());
        input.reps = Some(self.reps.reps());
        input.target_reps = Some(self.config.target_reps);
        input.labels = Some(&self.label_counts);
        report::generate(&input)
    }
}
