//! Warrior II pose analyzer
//!
//! Static per-frame checks against fixed ranges. There is no rep counting;
//! the only state carried between frames is the start-up countdown.

use super::recording::{Phase, SessionCounters};
use super::{feedback_text, Analyzer, ExerciseKind, FrameAnalysis, OUT_OF_VIEW};
use crate::config::WarriorConfig;
use crate::error::Result;
use crate::geometry::{angle, angle_between, Vec3};
use crate::landmarks::{Joint, PoseLandmarks};
use crate::report::{self, SessionReport};

pub const BEND_FRONT_KNEE: &str = "Bend your front knee more.";
pub const STRAIGHTEN_FRONT_KNEE: &str = "Straighten your front knee slightly.";
pub const STRAIGHTEN_BACK_LEG: &str = "Straighten your back leg.";
pub const RELAX_BACK_LEG: &str = "Relax your back leg slightly.";
pub const LEFT_HIP_HIGH: &str = "Level your hips; left hip is too high.";
pub const RIGHT_HIP_HIGH: &str = "Level your hips; right hip is too high.";
pub const RAISE_ARMS: &str = "Raise your arms to shoulder level.";
const DOING_WELL: &str = "You are doing well.";

const REQUIRED_JOINTS: [Joint; 10] = [
    Joint::LeftShoulder,
    Joint::RightShoulder,
    Joint::LeftWrist,
    Joint::RightWrist,
    Joint::LeftHip,
    Joint::RightHip,
    Joint::LeftKnee,
    Joint::RightKnee,
    Joint::LeftAnkle,
    Joint::RightAnkle,
];

/// Joint angles checked each frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarriorAngles {
    pub front_knee: f64,
    pub back_leg: f64,
    /// Hip line tilt from horizontal
    pub hip_tilt: f64,
    pub left_arm: f64,
    pub right_arm: f64,
    /// Whether the left hip sits higher in the image than the right
    pub left_hip_higher: bool,
}

impl WarriorAngles {
    pub fn measure(pose: &PoseLandmarks) -> Result<Self> {
        let p = |joint| pose.require(joint).map(|lm| lm.xy());
        let l_shoulder = p(Joint::LeftShoulder)?;
        let r_shoulder = p(Joint::RightShoulder)?;
        let l_wrist = p(Joint::LeftWrist)?;
        let r_wrist = p(Joint::RightWrist)?;
        let l_hip = p(Joint::LeftHip)?;
        let r_hip = p(Joint::RightHip)?;

        let left_knee = angle(l_hip, p(Joint::LeftKnee)?, p(Joint::LeftAnkle)?);
        let right_knee = angle(r_hip, p(Joint::RightKnee)?, p(Joint::RightAnkle)?);
        let (front_knee, back_leg) = if left_knee <= right_knee {
            (left_knee, right_knee)
        } else {
            (right_knee, left_knee)
        };

        let hip_line = r_hip.sub(l_hip);
        let hip_tilt = angle_between(
            Vec3::xy(hip_line.x.abs(), hip_line.y.abs()),
            Vec3::xy(1.0, 0.0),
        );

        Ok(Self {
            front_knee,
            back_leg,
            hip_tilt,
            left_arm: angle(r_shoulder, l_shoulder, l_wrist),
            right_arm: angle(l_shoulder, r_shoulder, r_wrist),
            left_hip_higher: l_hip.y < r_hip.y,
        })
    }
}

/// Errors for one frame in priority order
pub fn check_pose(a: &WarriorAngles, config: &WarriorConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if !config.front_knee.contains(a.front_knee) {
        errors.push(if a.front_knee > config.front_knee_pivot {
            BEND_FRONT_KNEE
        } else {
            STRAIGHTEN_FRONT_KNEE
        });
    }

    if !config.back_leg.contains(a.back_leg) {
        errors.push(if a.back_leg < config.back_leg_pivot {
            STRAIGHTEN_BACK_LEG
        } else {
            RELAX_BACK_LEG
        });
    }

    if !config.hip_tilt.contains(a.hip_tilt) {
        errors.push(if a.left_hip_higher {
            LEFT_HIP_HIGH
        } else {
            RIGHT_HIP_HIGH
        });
    }

    if !config.arm.contains(a.left_arm) || !config.arm.contains(a.right_arm) {
        errors.push(RAISE_ARMS);
    }

    errors.into_iter().map(str::to_string).collect()
}

pub struct WarriorAnalyzer {
    config: WarriorConfig,
    counters: SessionCounters,
}

impl WarriorAnalyzer {
    pub fn new(config: WarriorConfig, fps: f64) -> Self {
        Self {
            counters: SessionCounters::new(config.delay_seconds, fps),
            config,
        }
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

        let angles = WarriorAngles::measure(pose)?;
        let errors = check_pose(&angles, &self.config);
        self.counters.tally.record(&errors);

        let mut analysis = FrameAnalysis::scored(errors)
            .with_metric("front_knee", angles.front_knee)
            .with_metric("back_leg", angles.back_leg)
            .with_metric("hip_tilt", angles.hip_tilt)
            .with_metric("left_arm", angles.left_arm)
            .with_metric("right_arm", angles.right_arm);
        analysis.error_text = feedback_text(&analysis.errors, 2, DOING_WELL);
        Ok(analysis)
    }
}

impl Analyzer for WarriorAnalyzer {
    fn kind(&self) -> ExerciseKind {
        ExerciseKind::Warrior
    }

    fn reset(&mut self) {
        self.counters.reset();
    }

    fn analyze_frame(&mut self, landmarks: Option<&PoseLandmarks>) -> Result<FrameAnalysis> {
        let Some(pose) = landmarks else {
            let mut analysis = FrameAnalysis::no_person();
            self.counters.stamp(&mut analysis);
            return Ok(analysis);
        };

        let mut analysis = match self.counters.clock.tick() {
            Phase::Countdown { seconds_left } => FrameAnalysis::countdown(seconds_left),
            Phase::Recording => self.score(pose)?,
        };
        self.counters.stamp(&mut analysis);
        Ok(analysis)
    }

    fn report(&self) -> SessionReport {
        let input = self.counters.report_input(ExerciseKind::Warrior.display_name());
        report::generate(&input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::Landmark;

    fn angles() -> WarriorAngles {
        WarriorAngles {
            front_knee: 95.0,
            back_leg: 172.0,
            hip_tilt: 5.0,
            left_arm: 175.0,
            right_arm: 178.0,
            left_hip_higher: false,
        }
    }

    /// Textbook Warrior II: left knee over ankle at 90°, right leg straight,
    /// arms level with the shoulders
    fn warrior_pose() -> PoseLandmarks {
        let lm = |x: f64, y: f64| Landmark::new(x, y, 1.0);
        PoseLandmarks::new()
            .with(Joint::LeftShoulder, lm(0.45, 0.3))
            .with(Joint::RightShoulder, lm(0.55, 0.3))
            .with(Joint::LeftWrist, lm(0.15, 0.3))
            .with(Joint::RightWrist, lm(0.85, 0.3))
            .with(Joint::LeftHip, lm(0.45, 0.55))
            .with(Joint::RightHip, lm(0.55, 0.55))
            .with(Joint::LeftKnee, lm(0.3, 0.55))
            .with(Joint::LeftAnkle, lm(0.3, 0.8))
            .with(Joint::RightKnee, lm(0.65, 0.675))
            .with(Joint::RightAnkle, lm(0.75, 0.8))
    }

    fn config() -> WarriorConfig {
        WarriorConfig {
            delay_seconds: 0.0,
            ..WarriorConfig::default()
        }
    }

    #[test]
    fn good_pose_has_no_errors() {
        assert!(check_pose(&angles(), &config()).is_empty());
    }

    #[test]
    fn front_knee_direction_depends_on_pivot() {
        let mut a = angles();
        a.front_knee = 130.0;
        assert_eq!(check_pose(&a, &config()), vec![BEND_FRONT_KNEE]);
        a.front_knee = 60.0;
        assert_eq!(check_pose(&a, &config()), vec![STRAIGHTEN_FRONT_KNEE]);
    }

    #[test]
    fn errors_follow_priority_order() {
        let a = WarriorAngles {
            front_knee: 130.0,
            back_leg: 140.0,
            hip_tilt: 40.0,
            left_arm: 120.0,
            right_arm: 178.0,
            left_hip_higher: true,
        };
        assert_eq!(
            check_pose(&a, &config()),
            vec![BEND_FRONT_KNEE, STRAIGHTEN_BACK_LEG, LEFT_HIP_HIGH, RAISE_ARMS]
        );
    }

    #[test]
    fn measured_pose_is_clean() {
        let measured = WarriorAngles::measure(&warrior_pose()).unwrap();
        assert!((measured.front_knee - 90.0).abs() < 1e-6);
        assert!(measured.back_leg > 170.0);
        assert!(measured.hip_tilt < 1e-6);
        assert!((measured.left_arm - 180.0).abs() < 1e-6);

        let mut analyzer = WarriorAnalyzer::new(config(), 30.0);
        let analysis = analyzer.analyze_frame(Some(&warrior_pose())).unwrap();
        assert!(analysis.errors.is_empty());
        assert_eq!(analysis.error_text, DOING_WELL);
        assert_eq!(analysis.reps, None);
        assert_eq!(analysis.good_form_frames, 1);
    }

    #[test]
    fn tilted_hips_name_the_higher_side() {
        let mut pose = warrior_pose();
        pose.insert(Joint::RightHip, Landmark::new(0.55, 0.45, 1.0));
        let measured = WarriorAngles::measure(&pose).unwrap();
        assert!(!measured.left_hip_higher);
        assert!(check_pose(&measured, &config()).contains(&RIGHT_HIP_HIGH.to_string()));
    }

    #[test]
    fn feedback_joins_two_errors() {
        let mut pose = warrior_pose();
        // Drop both wrists and bend the back knee
        pose.insert(Joint::LeftWrist, Landmark::new(0.3, 0.6, 1.0));
        pose.insert(Joint::RightKnee, Landmark::new(0.6, 0.75, 1.0));
        let mut analyzer = WarriorAnalyzer::new(config(), 30.0);
        let analysis = analyzer.analyze_frame(Some(&pose)).unwrap();
        assert!(analysis.errors.len() >= 2);
        assert_eq!(
            analysis.error_text,
            format!("{} {}", analysis.errors[0], analysis.errors[1])
        );
    }

    #[test]
    fn countdown_before_scoring() {
        let mut analyzer = WarriorAnalyzer::new(WarriorConfig::default(), 30.0);
        let analysis = analyzer.analyze_frame(Some(&warrior_pose())).unwrap();
        assert_eq!(analysis.countdown, Some(3));
        assert!(analysis.errors.is_empty());
        assert_eq!(analyzer.report().summary.recorded_frames, 0);
    }
}
