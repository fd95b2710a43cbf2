//! Lunge analyzer
//!
//! The front leg is whichever knee is bent more. Form errors are persistent:
//! a violation is reported only after it holds for `persistence_frames`
//! consecutive frames. Reps follow the smoothed front-knee angle through a
//! down/up cycle detected from a short-window derivative.

use super::recording::{Phase, RepEvent, SessionCounters};
use super::{feedback_text, Analyzer, ExerciseKind, FrameAnalysis, OUT_OF_VIEW};
use crate::config::LungeConfig;
use crate::error::Result;
use crate::geometry::{angle, DEGENERATE_ANGLE};
use crate::landmarks::{Joint, PoseLandmarks};
use crate::report::{self, SessionReport};
use std::collections::VecDeque;
use tracing::{debug, info};

pub const FULL_LUNGE: &str = "Perform a full lunge.";
pub const BEND_FRONT_KNEE: &str = "Bend front knee more";
pub const FRONT_KNEE_TOO_BENT: &str = "Front knee bent too much";
pub const BEND_BACK_KNEE: &str = "Bend back knee more";
pub const BACK_KNEE_TOO_BENT: &str = "Back knee bent too much";
pub const SHALLOW_LUNGE: &str = "Shallow rep: lunge deeper";
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

/// Detection order; earlier entries outrank later ones
const CHECK_ORDER: [&str; 5] = [
    FULL_LUNGE,
    BEND_FRONT_KNEE,
    FRONT_KNEE_TOO_BENT,
    BEND_BACK_KNEE,
    BACK_KNEE_TOO_BENT,
];

/// Consecutive-frame counters for each lunge violation
#[derive(Debug, Clone, Default)]
struct PersistentErrors {
    streaks: [u32; CHECK_ORDER.len()],
}

impl PersistentErrors {
    fn observe(&mut self, index: usize, violated: bool) {
        if violated {
            self.streaks[index] += 1;
        } else {
            self.streaks[index] = 0;
        }
    }

    fn check(&mut self, front: f64, back: f64, config: &LungeConfig) -> Vec<String> {
        if front > config.full_lunge_angle {
            // Standing up: knee checks are skipped and their streaks held
            self.observe(0, true);
        } else {
            self.observe(0, false);
            self.observe(1, front > config.front_knee.max);
            self.observe(2, front < config.front_knee.min);
            self.observe(3, back > config.back_knee.max);
            self.observe(4, back < config.back_knee.min);
        }

        CHECK_ORDER
            .iter()
            .zip(self.streaks.iter())
            .filter(|(_, &streak)| streak >= config.persistence_frames)
            .map(|(msg, _)| msg.to_string())
            .collect()
    }

    fn reset(&mut self) {
        self.streaks = [0; CHECK_ORDER.len()];
    }
}

/// Direction of the front knee over the derivative window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

/// Rep detection from the front-knee angle
#[derive(Debug, Clone)]
pub struct LungeRepCounter {
    history_len: usize,
    samples: usize,
    derivative_threshold: f64,
    start_angle: f64,
    end_angle: f64,
    min_phase_frames: u32,
    depth_threshold: f64,

    history: VecDeque<f64>,
    direction: Option<Direction>,
    phase_frames: u32,
    in_position: bool,
    peak_angle: f64,
    reps: u32,
    shallow_reps: u32,
}

impl LungeRepCounter {
    pub fn new(config: &LungeConfig) -> Self {
        Self {
            history_len: config.history_len,
            samples: config.smoothing_samples,
            derivative_threshold: config.derivative_threshold,
            start_angle: config.rep_start_angle,
            end_angle: config.rep_end_angle,
            min_phase_frames: config.min_phase_frames,
            depth_threshold: config.depth_threshold,
            history: VecDeque::with_capacity(config.history_len),
            direction: None,
            phase_frames: 0,
            in_position: false,
            peak_angle: 180.0,
            reps: 0,
            shallow_reps: 0,
        }
    }

    pub fn update(&mut self, front_knee: f64) -> RepEvent {
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(front_knee);

        let len = self.history.len();
        if len < self.samples {
            return RepEvent::None;
        }

        let smoothed = self.history.range(len - self.samples..).sum::<f64>() / self.samples as f64;
        let derivative = self.history[len - 1] - self.history[len - self.samples];

        let direction = if derivative <= -self.derivative_threshold {
            Some(Direction::Down)
        } else if derivative >= self.derivative_threshold {
            Some(Direction::Up)
        } else {
            self.direction
        };

        if direction != self.direction {
            self.direction = direction;
            self.phase_frames = 0;
        } else {
            self.phase_frames += 1;
        }

        if self.direction == Some(Direction::Down) && smoothed < self.start_angle && !self.in_position {
            self.in_position = true;
            self.peak_angle = smoothed;
            debug!("Lunge rep started at {:.1}°", smoothed);
        }

        if self.in_position {
            self.peak_angle = self.peak_angle.min(smoothed);
        }

        if self.direction == Some(Direction::Up)
            && smoothed > self.end_angle
            && self.in_position
            && self.phase_frames >= self.min_phase_frames
        {
            self.in_position = false;
            self.reps += 1;
            if self.peak_angle >= self.depth_threshold {
                self.reps -= 1;
                self.shallow_reps += 1;
                return RepEvent::Shallow;
            }
            return RepEvent::Counted;
        }

        RepEvent::None
    }

    pub fn direction(&self) -> Option<Direction> {
        self.direction
    }

    pub fn in_position(&self) -> bool {
        self.in_position
    }

    pub fn reps(&self) -> u32 {
        self.reps
    }

    pub fn shallow_reps(&self) -> u32 {
        self.shallow_reps
    }

    pub fn reset(&mut self) {
        self.history.clear();
        self.direction = None;
        self.phase_frames = 0;
        self.in_position = false;
        self.peak_angle = 180.0;
        self.reps = 0;
        self.shallow_reps = 0;
    }
}

/// Knee angle at a hip-knee-ankle triple, 180 when undefined
fn knee_angle(pose: &PoseLandmarks, hip: Joint, knee: Joint, ankle: Joint) -> Result<f64> {
    let a = angle(
        pose.require(hip)?.xy(),
        pose.require(knee)?.xy(),
        pose.require(ankle)?.xy(),
    );
    Ok(if a == DEGENERATE_ANGLE { 180.0 } else { a })
}

pub struct LungeAnalyzer {
    config: LungeConfig,
    counters: SessionCounters,
    errors: PersistentErrors,
    reps: LungeRepCounter,
}

impl LungeAnalyzer {
    pub fn new(config: LungeConfig, fps: f64) -> Self {
        Self {
            counters: SessionCounters::new(config.delay_seconds, fps),
            errors: PersistentErrors::default(),
            reps: LungeRepCounter::new(&config),
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
            let mut analysis = FrameAnalysis::scored(errors).with_metric("front_knee", 180.0);
            analysis.error_text = OUT_OF_VIEW.to_string();
            return Ok(analysis);
        }

        let left = knee_angle(pose, Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle)?;
        let right = knee_angle(pose, Joint::RightHip, Joint::RightKnee, Joint::RightAnkle)?;
        let (front, back) = if left <= right { (left, right) } else { (right, left) };

        let errors = self.errors.check(front, back, &self.config);
        self.counters.tally.record(&errors);

        match self.reps.update(front) {
            RepEvent::Counted => info!("Lunge rep counted: {}", self.reps.reps()),
            RepEvent::Shallow => {
                info!("Shallow lunge rep not counted");
                self.counters.tally.record_error(SHALLOW_LUNGE);
            }
            RepEvent::None => {}
        }

        let mut analysis = FrameAnalysis::scored(errors)
            .with_metric("front_knee", front)
            .with_metric("back_knee", back);
        analysis.error_text = feedback_text(&analysis.errors, 1, DOING_WELL);
        Ok(analysis)
    }
}

impl Analyzer for LungeAnalyzer {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Lunge
    }

    fn reset(&mut self) {
        self.counters.reset();
        self.errors.reset();
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
        let mut input = self.counters.report_input(ExerciseKind::Lunge.display_name());
        input.reps = Some(self.reps.reps());
        input.target_reps = Some(self.config.target_reps);
        input.shallow_reps = self.reps.shallow_reps();
        report::generate(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    fn config() -> LungeConfig {
        LungeConfig {
            delay_seconds: 0.0,
            ..LungeConfig::default()
        }
    }

    /// Pose whose left knee bends to `front` and right knee to `back`
    fn lunge_pose(front: f64, back: f64) -> PoseLandmarks {
        fn leg(pose: PoseLandmarks, hip: (Joint, f64), knee: Joint, ankle: Joint, bend: f64) -> PoseLandmarks {
            let (hip_joint, x) = hip;
            let hip_pos = (x, 0.5);
            let knee_pos = (x, 0.7);
            // Ray knee→ankle at `bend` degrees from knee→hip (which points straight up)
            let theta = bend.to_radians();
            let ankle_pos = (knee_pos.0 + 0.2 * theta.sin(), knee_pos.1 - 0.2 * theta.cos());
            pose.with(hip_joint, Landmark::new(hip_pos.0, hip_pos.1, 1.0))
                .with(knee, Landmark::new(knee_pos.0, knee_pos.1, 1.0))
                .with(ankle, Landmark::new(ankle_pos.0, ankle_pos.1, 1.0))
        }

        let pose = PoseLandmarks::new()
            .with(Joint::LeftShoulder, Landmark::new(0.45, 0.2, 1.0))
            .with(Joint::RightShoulder, Landmark::new(0.55, 0.2, 1.0));
        let pose = leg(pose, (Joint::LeftHip, 0.45), Joint::LeftKnee, Joint::LeftAnkle, front);
        leg(pose, (Joint::RightHip, 0.55), Joint::RightKnee, Joint::RightAnkle, back)
    }

    #[test]
    fn pose_builder_produces_requested_angles() {
        let pose = lunge_pose(90.0, 130.0);
        let left = knee_angle(&pose, Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle).unwrap();
        let right = knee_angle(&pose, Joint::RightHip, Joint::RightKnee, Joint::RightAnkle).unwrap();
        assert!((left - 90.0).abs() < 1e-6);
        assert!((right - 130.0).abs() < 1e-6);
    }

    #[test]
    fn falling_derivative_turns_direction_down() {
        let mut counter = LungeRepCounter::new(&config());
        for a in [170.0, 170.0, 170.0, 170.0, 170.0] {
            counter.update(a);
        }
        assert_eq!(counter.direction(), None);

        // newest - 5th newest = 167 - 170 = -3
        for a in [169.0, 168.0, 168.0, 167.0] {
            counter.update(a);
        }
        assert_eq!(counter.direction(), Some(Direction::Down));
    }

    #[test]
    fn full_cycle_counts_one_rep() {
        let mut counter = LungeRepCounter::new(&config());
        let mut trace = vec![170.0; 5];
        trace.extend((0..7).map(|i| 160.0 - 10.0 * i as f64)); // 160 .. 100
        trace.extend([95.0; 6]);
        trace.extend((0..7).map(|i| 105.0 + 10.0 * i as f64)); // 105 .. 165
        trace.extend([170.0; 5]);

        let events: Vec<RepEvent> = trace.iter().map(|&a| counter.update(a)).collect();
        assert_eq!(counter.reps(), 1);
        assert_eq!(counter.shallow_reps(), 0);
        assert_eq!(events.iter().filter(|e| **e == RepEvent::Counted).count(), 1);
        assert!(!counter.in_position());
    }

    #[test]
    fn rep_needs_enough_frames_in_new_direction() {
        let mut cfg = config();
        cfg.min_phase_frames = 50;
        let mut counter = LungeRepCounter::new(&cfg);
        let mut trace = vec![170.0; 5];
        trace.extend((0..7).map(|i| 160.0 - 10.0 * i as f64));
        trace.extend([95.0; 6]);
        trace.extend((0..7).map(|i| 105.0 + 10.0 * i as f64));
        for a in trace {
            counter.update(a);
        }
        assert_eq!(counter.reps(), 0);
        assert!(counter.in_position());
    }

    #[test]
    fn shallow_rep_is_reversed() {
        // With the defaults a rep only starts below the depth threshold, so
        // demand more depth than the trace reaches
        let mut cfg = config();
        cfg.depth_threshold = 90.0;
        let mut counter = LungeRepCounter::new(&cfg);
        let mut trace = vec![170.0; 5];
        trace.extend((0..7).map(|i| 160.0 - 10.0 * i as f64));
        trace.extend([100.0; 6]);
        trace.extend((0..7).map(|i| 105.0 + 10.0 * i as f64));
        trace.extend([170.0; 5]);

        let events: Vec<RepEvent> = trace.iter().map(|&a| counter.update(a)).collect();
        assert_eq!(counter.reps(), 0);
        assert_eq!(counter.shallow_reps(), 1);
        assert!(events.contains(&RepEvent::Shallow));
    }

    #[test]
    fn errors_need_persistence() {
        let mut analyzer = LungeAnalyzer::new(config(), 30.0);
        // Front knee 115 exceeds the 110 max
        let pose = lunge_pose(115.0, 118.0);

        for _ in 0..4 {
            let analysis = analyzer.analyze_frame(Some(&pose)).unwrap();
            assert!(analysis.errors.is_empty());
            assert_eq!(analysis.error_text, DOING_WELL);
        }
        let analysis = analyzer.analyze_frame(Some(&pose)).unwrap();
        assert_eq!(analysis.errors, vec![BEND_FRONT_KNEE.to_string()]);
        assert_eq!(analysis.error_text, BEND_FRONT_KNEE);
        assert_eq!(analysis.good_form_frames, 4);
        assert_eq!(analysis.error_counts[BEND_FRONT_KNEE], 1);
    }

    #[test]
    fn single_good_frame_breaks_streak() {
        let mut analyzer = LungeAnalyzer::new(config(), 30.0);
        let bad = lunge_pose(115.0, 118.0);
        let good = lunge_pose(95.0, 100.0);
        for _ in 0..4 {
            analyzer.analyze_frame(Some(&bad)).unwrap();
        }
        analyzer.analyze_frame(Some(&good)).unwrap();
        let analysis = analyzer.analyze_frame(Some(&bad)).unwrap();
        assert!(analysis.errors.is_empty());
    }

    #[test]
    fn standing_asks_for_full_lunge() {
        let mut cfg = config();
        cfg.persistence_frames = 1;
        let mut analyzer = LungeAnalyzer::new(cfg, 30.0);
        let analysis = analyzer.analyze_frame(Some(&lunge_pose(170.0, 175.0))).unwrap();
        assert_eq!(analysis.errors, vec![FULL_LUNGE.to_string()]);
    }

    #[test]
    fn standing_frame_holds_knee_streaks() {
        let mut analyzer = LungeAnalyzer::new(config(), 30.0);
        let bad = lunge_pose(115.0, 118.0);
        for _ in 0..5 {
            analyzer.analyze_frame(Some(&bad)).unwrap();
        }

        let standing = analyzer.analyze_frame(Some(&lunge_pose(170.0, 175.0))).unwrap();
        assert_eq!(standing.errors, vec![BEND_FRONT_KNEE.to_string()]);

        // The streak picks up where it left off instead of starting over
        let analysis = analyzer.analyze_frame(Some(&bad)).unwrap();
        assert_eq!(analysis.errors, vec![BEND_FRONT_KNEE.to_string()]);
    }

    #[test]
    fn multiple_errors_in_detection_order() {
        let mut cfg = config();
        cfg.persistence_frames = 1;
        let mut analyzer = LungeAnalyzer::new(cfg, 30.0);
        // front 60 (< 75), back 130 (> 120)
        let analysis = analyzer.analyze_frame(Some(&lunge_pose(60.0, 130.0))).unwrap();
        assert_eq!(
            analysis.errors,
            vec![FRONT_KNEE_TOO_BENT.to_string(), BEND_BACK_KNEE.to_string()]
        );
    }

    #[test]
    fn countdown_frames_are_not_scored() {
        let cfg = LungeConfig {
            delay_seconds: 1.0,
            ..LungeConfig::default()
        };
        let mut analyzer = LungeAnalyzer::new(cfg, 30.0);
        let analysis = analyzer.analyze_frame(Some(&lunge_pose(60.0, 130.0))).unwrap();
        assert_eq!(analysis.countdown, Some(1));
        assert!(!analysis.recording);
        assert!(analysis.error_text.is_empty());
        assert_eq!(analysis.reps, Some(0));
        assert_eq!(analysis.target_reps, Some(8));
    }

    #[test]
    fn low_visibility_reports_out_of_view() {
        let mut analyzer = LungeAnalyzer::new(config(), 30.0);
        let mut pose = lunge_pose(95.0, 100.0);
        pose.insert(Joint::RightAnkle, Landmark::new(0.5, 0.9, 0.2));
        let analysis = analyzer.analyze_frame(Some(&pose)).unwrap();
        assert_eq!(analysis.errors, vec![OUT_OF_VIEW.to_string()]);
        assert_eq!(analysis.metrics["front_knee"], 180.0);
    }

    #[test]
    fn report_after_session() {
        let mut analyzer = LungeAnalyzer::new(config(), 30.0);
        let pose = lunge_pose(95.0, 100.0);
        for _ in 0..30 {
            analyzer.analyze_frame(Some(&pose)).unwrap();
        }
        let report = analyzer.report();
        assert_eq!(report.summary.recorded_frames, 30);
        assert_eq!(report.summary.good_form_percent, 100.0);
        assert_eq!(report.summary.target_reps, Some(8));
        assert!(report.text.starts_with("--- Lunges Exercise Report ---"));
    }
}
