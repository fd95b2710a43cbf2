//! Configuration for the pv-vision session service
//!
//! Bootstrap settings come from a single TOML file (see
//! `pv_common::config`) with every field defaulted, so an empty or missing
//! file yields a working service. Command-line arguments override the file
//! in `main.rs`.
//!
//! Per-exercise thresholds are typed structs with named fields. They are
//! checked once by [`VisionConfig::validate`] before any session starts.

use crate::error::{Error, Result};
use pv_common::config::{load_toml_or_default, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inclusive angle range in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleRange {
    pub min: f64,
    pub max: f64,
}

impl AngleRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    fn validate(&self, name: &str) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(Error::Config(format!(
                "{}: invalid range [{}, {}]",
                name, self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Top-level service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VisionConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub exercises: ExerciseConfigs,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VisionConfig {
    /// Load from TOML (defaults when the file is absent) and validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: VisionConfig = load_toml_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a session misbehave
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.speech.validate()?;
        self.exercises.squat.validate()?;
        self.exercises.lunge.validate()?;
        self.exercises.leg_raise.validate()?;
        self.exercises.warrior.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}

/// HTTP/WebSocket listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Frame pump and broadcast tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Nominal capture rate, used for delays, velocities and report durations
    #[serde(default = "default_fps")]
    pub fps: f64,

    /// Target pump period
    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,

    /// How long `stop` waits for the pump before aborting it
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Result channel between producers and the hub dispatcher
    #[serde(default = "default_hub_channel_capacity")]
    pub hub_channel_capacity: usize,

    /// Per-client outbound queue; a full queue drops the client
    #[serde(default = "default_client_queue_capacity")]
    pub client_queue_capacity: usize,
}

fn default_fps() -> f64 {
    30.0
}

fn default_frame_period_ms() -> u64 {
    33
}

fn default_stop_timeout_ms() -> u64 {
    2000
}

fn default_hub_channel_capacity() -> usize {
    256
}

fn default_client_queue_capacity() -> usize {
    64
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            frame_period_ms: default_frame_period_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            hub_channel_capacity: default_hub_channel_capacity(),
            client_queue_capacity: default_client_queue_capacity(),
        }
    }
}

impl SessionConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(Error::Config(format!("session.fps must be positive, got {}", self.fps)));
        }
        if self.frame_period_ms == 0 {
            return Err(Error::Config("session.frame_period_ms must be positive".to_string()));
        }
        if self.hub_channel_capacity == 0 || self.client_queue_capacity == 0 {
            return Err(Error::Config("session queue capacities must be positive".to_string()));
        }
        Ok(())
    }
}

/// Speech synthesis and feedback throttling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesizer endpoint; spoken feedback is unavailable when absent
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default = "default_speech_timeout_ms")]
    pub timeout_ms: u64,

    /// How long the same text must persist before it is spoken
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Minimum gap between repeats of unchanged text
    #[serde(default = "default_repeat_ms")]
    pub repeat_ms: u64,
}

fn default_speech_timeout_ms() -> u64 {
    10_000
}

fn default_hold_ms() -> u64 {
    2000
}

fn default_repeat_ms() -> u64 {
    5000
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_speech_timeout_ms(),
            hold_ms: default_hold_ms(),
            repeat_ms: default_repeat_ms(),
        }
    }
}

impl SpeechConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            return Err(Error::Config("speech.timeout_ms must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Directory for text reports; reports are not persisted when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoConfig {
    /// JSON-lines pose recording replayed as the capture source
    #[serde(default)]
    pub replay_path: Option<PathBuf>,
}

/// Threshold tables for every exercise
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExerciseConfigs {
    #[serde(default)]
    pub squat: SquatConfig,
    #[serde(default)]
    pub lunge: LungeConfig,
    #[serde(default)]
    pub leg_raise: LegRaiseConfig,
    #[serde(default)]
    pub warrior: WarriorConfig,
}

fn validate_common(name: &str, delay_seconds: f64, visibility: f64) -> Result<()> {
    if !(delay_seconds.is_finite() && delay_seconds >= 0.0) {
        return Err(Error::Config(format!("{}.delay_seconds must be >= 0", name)));
    }
    if !(0.0..=1.0).contains(&visibility) {
        return Err(Error::Config(format!(
            "{}.visibility_threshold must be within [0, 1]",
            name
        )));
    }
    Ok(())
}

/// Squat analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SquatConfig {
    pub delay_seconds: f64,
    pub target_reps: u32,
    pub visibility_threshold: f64,
    /// Feature frames per classifier window
    pub window_size: usize,
    /// Predictions in the smoothing vote
    pub smoothing_window: usize,
    /// Average `hip.y - knee.y` at or above this counts as squatting
    pub depth_threshold: f64,
}

impl Default for SquatConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 3.0,
            target_reps: 10,
            visibility_threshold: 0.5,
            window_size: 30,
            smoothing_window: 5,
            depth_threshold: -0.1,
        }
    }
}

impl SquatConfig {
    fn validate(&self) -> Result<()> {
        validate_common("squat", self.delay_seconds, self.visibility_threshold)?;
        if self.window_size < 2 {
            return Err(Error::Config("squat.window_size must be at least 2".to_string()));
        }
        if self.smoothing_window == 0 {
            return Err(Error::Config("squat.smoothing_window must be positive".to_string()));
        }
        Ok(())
    }
}

/// Lunge analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LungeConfig {
    pub delay_seconds: f64,
    pub target_reps: u32,
    pub visibility_threshold: f64,
    pub front_knee: AngleRange,
    pub back_knee: AngleRange,
    /// Front knee above this means the subject is not lunging at all
    pub full_lunge_angle: f64,
    /// Consecutive frames a violation must hold before it is reported
    pub persistence_frames: u32,
    pub history_len: usize,
    /// Samples averaged for the smoothed angle and spanned by the derivative
    pub smoothing_samples: usize,
    pub derivative_threshold: f64,
    /// Smoothed angle below which a descending rep begins
    pub rep_start_angle: f64,
    /// Smoothed angle above which an ascending rep completes
    pub rep_end_angle: f64,
    pub min_phase_frames: u32,
    /// A rep whose deepest angle never went below this is shallow
    pub depth_threshold: f64,
}

impl Default for LungeConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 3.0,
            target_reps: 8,
            visibility_threshold: 0.6,
            front_knee: AngleRange::new(75.0, 110.0),
            back_knee: AngleRange::new(75.0, 120.0),
            full_lunge_angle: 150.0,
            persistence_frames: 5,
            history_len: 10,
            smoothing_samples: 5,
            derivative_threshold: 3.0,
            rep_start_angle: 110.0,
            rep_end_angle: 140.0,
            min_phase_frames: 5,
            depth_threshold: 110.0,
        }
    }
}

impl LungeConfig {
    fn validate(&self) -> Result<()> {
        validate_common("lunge", self.delay_seconds, self.visibility_threshold)?;
        self.front_knee.validate("lunge.front_knee")?;
        self.back_knee.validate("lunge.back_knee")?;
        if self.smoothing_samples < 2 || self.smoothing_samples > self.history_len {
            return Err(Error::Config(
                "lunge.smoothing_samples must be between 2 and history_len".to_string(),
            ));
        }
        if self.rep_start_angle >= self.rep_end_angle {
            return Err(Error::Config(
                "lunge.rep_start_angle must be below rep_end_angle".to_string(),
            ));
        }
        Ok(())
    }
}

/// Straight-leg raise analyzer thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LegRaiseConfig {
    pub delay_seconds: f64,
    pub target_reps: u32,
    pub visibility_threshold: f64,
    /// Allowed deviation from the target raise angle
    pub target_tolerance: f64,
    /// Knee angle range for a straight leg
    pub straightness: AngleRange,
    /// Raise angle below this means the leg is up
    pub crossing_angle: f64,
    /// A rep whose peak never went below this is shallow
    pub shallow_angle: f64,
}

impl Default for LegRaiseConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 8.0,
            target_reps: 8,
            visibility_threshold: 0.5,
            target_tolerance: 20.0,
            straightness: AngleRange::new(160.0, 180.0),
            crossing_angle: 150.0,
            shallow_angle: 130.0,
        }
    }
}

impl LegRaiseConfig {
    fn validate(&self) -> Result<()> {
        validate_common("leg_raise", self.delay_seconds, self.visibility_threshold)?;
        self.straightness.validate("leg_raise.straightness")?;
        if self.shallow_angle > self.crossing_angle {
            return Err(Error::Config(
                "leg_raise.shallow_angle must not exceed crossing_angle".to_string(),
            ));
        }
        if self.target_tolerance < 0.0 {
            return Err(Error::Config("leg_raise.target_tolerance must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// Warrior II pose thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarriorConfig {
    pub delay_seconds: f64,
    pub visibility_threshold: f64,
    pub front_knee: AngleRange,
    /// Out-of-range front knee above this is told to bend, below it to straighten
    pub front_knee_pivot: f64,
    pub back_leg: AngleRange,
    /// Out-of-range back leg below this is told to straighten, above it to relax
    pub back_leg_pivot: f64,
    /// Hip-line tilt from horizontal
    pub hip_tilt: AngleRange,
    pub arm: AngleRange,
}

impl Default for WarriorConfig {
    fn default() -> Self {
        Self {
            delay_seconds: 3.0,
            visibility_threshold: 0.5,
            front_knee: AngleRange::new(70.0, 120.0),
            front_knee_pivot: 100.0,
            back_leg: AngleRange::new(150.0, 180.0),
            back_leg_pivot: 160.0,
            hip_tilt: AngleRange::new(0.0, 30.0),
            arm: AngleRange::new(155.0, 190.0),
        }
    }
}

impl WarriorConfig {
    fn validate(&self) -> Result<()> {
        validate_common("warrior", self.delay_seconds, self.visibility_threshold)?;
        self.front_knee.validate("warrior.front_knee")?;
        self.back_leg.validate("warrior.back_leg")?;
        self.hip_tilt.validate("warrior.hip_tilt")?;
        self.arm.validate("warrior.arm")?;
        Ok(())
    }
}
