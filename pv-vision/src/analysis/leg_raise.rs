//! Straight-leg raise analyzer
//!
//! The subject lies on their back with one knee bent. The straighter leg is
//! the affected (working) leg. The bent knee marks the target height: the
//! target raise angle is measured once, on the first recorded frame, as the
//! angle at the affected hip between the shoulder and the bent knee.
//!
//! Raise angle is shoulder-hip-knee on the affected side: about 180° lying
//! flat, smaller as the leg rises.

use super::recording::{Phase, RepEvent, SessionCounters};
use super::{feedback_text, Analyzer, ExerciseKind, FrameAnalysis, OUT_OF_VIEW};
use crate::config::LegRaiseConfig;
use crate::error::Result;
use crate::geometry::angle;
use crate::landmarks::{Joint, PoseLandmarks};
use crate::report::{self, SessionReport};
use tracing::{debug, info};

pub const KEEP_LEG_STRAIGHT: &str = "Keep your leg straight";
pub const RAISE_HIGHER: &str = "Raise your leg higher";
pub const LEG_TOO_HIGH: &str = "Leg too high";
pub const SHALLOW_RAISE: &str = "Shallow rep: raise your leg higher";
const DOING_WELL: &str = "You are doing well";

const REQUIRED_JOINTS: [Joint; 8] = [
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftHip,
    Joint::RightHip,
    Joint::LeftKnee,
    Joint::RightKnee,
    Joint::LeftAnkle,
    Joint::RightAnkle,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::Left => Side::Right,
            Side::Right => Side::Left,
        }
    }

    fn shoulder(self) -> Joint {
        match self {
            Side::Left => Joint::LeftShoulder,
            Side::Right => Joint::RightShoulder,
        }
    }

    fn hip(self) -> Joint {
        match self {
            Side::Left => Joint::LeftHip,
            Side::Right => Joint::RightHip,
        }
    }

    fn knee(self) -> Joint {
        match self {
            Side::Left => Joint::LeftKnee,
            Side::Right => Joint::RightKnee,
        }
    }

    fn ankle(self) -> Joint {
        match self {
            Side::Left => Joint::LeftAnkle,
            Side::Right => Joint::RightAnkle,
        }
    }
}

/// Hysteresis around the crossing angle with a peak-height check
#[derive(Debug, Clone)]
pub struct RaiseRepCounter {
    crossing_angle: f64,
    shallow_angle: f64,
    raised: bool,
    peak_angle: f64,
    reps: u32,
    shallow_reps: u32,
}

impl RaiseRepCounter {
    pub fn new(crossing_angle: f64, shallow_angle: f64) -> Self {
        Self {
            crossing_angle,
            shallow_angle,
            raised: false,
            peak_angle: 180.0,
            reps: 0,
            shallow_reps: 0,
        }
    }

    pub fn update(&mut self, raise_angle: f64) -> RepEvent {
        if !self.raised {
            if raise_angle < self.crossing_angle {
                self.raised = true;
                self.peak_angle = raise_angle;
            }
            return RepEvent::None;
        }

        self.peak_angle = self.peak_angle.min(raise_angle);
        if raise_angle < self.crossing_angle {
            return RepEvent::None;
        }

        self.raised = false;
        self.reps += 1;
        if self.peak_angle >= self.shallow_angle {
            self.reps -= 1;
            self.shallow_reps += 1;
            return RepEvent::Shallow;
        }
        RepEvent::Counted
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn shallow_reps(&self) -> u32 {
        self.shallow_reps
    }

    pub fn reset(&mut self) {
        self.raised = false;
        self.peak_angle = 180.0;
        self.reps = 0;
        self.shallow_reps = 0;
    }
}

pub struct LegRaiseAnalyzer {
    config: LegRaiseConfig,
    counters: SessionCounters,
    affected: Option<Side>,
    target_angle: Option<f64>,
    reps: RaiseRepCounter,
}

impl LegRaiseAnalyzer {
    pub fn new(config: LegRaiseConfig, fps: f64) -> Self {
        Self {
            counters: SessionCounters::new(config.delay_seconds, fps),
            affected: None,
            target_angle: None,
            reps: RaiseRepCounter::new(config.crossing_angle, config.shallow_angle),
            config,
        }
    }

    pub fn affected_side(&self) -> Option<Side> {
        self.affected
    }

    pub fn target_angle(&self) -> Option<f64> {
        self.target_angle
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

        let at = |a: Joint, b: Joint, c: Joint| -> Result<f64> {
            Ok(angle(pose.require(a)?.xy(), pose.require(b)?.xy(), pose.require(c)?.xy()))
        };
        let knee_angle = |side: Side| at(side.hip(), side.knee(), side.ankle());

        // Sides are locked while the leg is up
        if self.affected.is_none() || !self.reps.is_raised() {
            let left = knee_angle(Side::Left)?;
            let right = knee_angle(Side::Right)?;
            let side = if left >= right { Side::Left } else { Side::Right };
            if self.affected != Some(side) {
                debug!("Affected leg: {:?}", side);
            }
            self.affected = Some(side);
        }
        let side = self.affected.unwrap_or(Side::Left);

        let target = match self.target_angle {
            Some(target) => target,
            None => {
                let target = at(side.shoulder(), side.hip(), side.other().knee())?;
                info!("Leg raise target angle set to {:.1}°", target);
                self.target_angle = Some(target);
                target
            }
        };

        let straightness = knee_angle(side)?;
        let raise = at(side.shoulder(), side.hip(), side.knee())?;

        let mut errors = Vec::new();
        if straightness < self.config.straightness.min {
            errors.push(KEEP_LEG_STRAIGHT.to_string());
        }

        match self.reps.update(raise) {
            RepEvent::Counted => info!("Leg raise rep counted: {}", self.reps.reps()),
            RepEvent::Shallow => {
                info!("Shallow leg raise not counted");
                self.counters.tally.record_error(SHALLOW_RAISE);
            }
            RepEvent::None => {}
        }

        if self.reps.is_raised() {
            if raise > target + self.config.target_tolerance {
                errors.push(RAISE_HIGHER.to_string());
            } else if raise < target - self.config.target_tolerance {
                errors.push(LEG_TOO_HIGH.to_string());
            }
        }

        self.counters.tally.record(&errors);
        let mut analysis = FrameAnalysis::scored(errors)
            .with_metric("raise_angle", raise)
            .with_metric("target_angle", target)
            .with_metric("knee_angle", straightness);
        analysis.error_text = feedback_text(&analysis.errors, 1, DOING_WELL);
        Ok(analysis)
    }
}

impl Analyzer for LegRaiseAnalyzer {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::LegRaise
    }

    fn reset(&mut self) {
        self.counters.reset();
        self.affected = None;
        self.target_angle = None;
        self.reps.reset();
    }

    fn analyze_frame(&mut self, landmarks: Option<&PoseLandmarks>) -> Result<FrameAnalysis> {
        let Some(pose) = landmarks else {
            return Ok(self.finish(FrameAnalysis::no_person()));
        };

        let analysis = match self.counters.clock.tick() {
            Phase::Countdown { seconds_left } => FrameAnalysis::countdown(seconds_left),
            Phase::Recording => self.score(pose)?,
        };
        Ok(self.finish(analysis))
    }

    fn report(&self) -> SessionReport {
        let mut input = self.counters.report_input(ExerciseKind::LegRaise.display_name());
        input.reps = Some(self.reps.reps());
        input.target_reps = Some(self.config.target_reps);
        input.shallow_reps = self.reps.shallow_reps();
        report::generate(&input)
    }
}
