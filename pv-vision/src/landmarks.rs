//! Pose landmarks as supplied by the landmark provider
//!
//! Coordinates are normalized to the image: x grows to the right, y grows
//! downward. `z` is depth relative to the hips when the provider reports it.

use crate::error::{Error, Result};
use crate::geometry::Vec3;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

/// Joints used by the exercise analyzers (MediaPipe naming)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Joint {
    Nose,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
}

impl Joint {
    pub const ALL: [Joint; 13] = [
        Joint::Nose,
        Joint::LeftShoulder,
        Joint::RightShoulder,
        Joint::LeftElbow,
        Joint::RightElbow,
        Joint::LeftWrist,
        Joint::RightWrist,
        Joint::LeftHip,
        Joint::RightHip,
        Joint::LeftKnee,
        Joint::RightKnee,
        Joint::LeftAnkle,
        Joint::RightAnkle,
    ];

    /// Joint for a MediaPipe landmark name; `None` for joints no analyzer reads
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|joint| joint.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Joint::Nose => "NOSE",
            Joint::LeftShoulder => "LEFT_SHOULDER",
            Joint::RightShoulder => "RIGHT_SHOULDER",
            Joint::LeftElbow => "LEFT_ELBOW",
            Joint::RightElbow => "RIGHT_ELBOW",
            Joint::LeftWrist => "LEFT_WRIST",
            Joint::RightWrist => "RIGHT_WRIST",
            Joint::LeftHip => "LEFT_HIP",
            Joint::RightHip => "RIGHT_HIP",
            Joint::LeftKnee => "LEFT_KNEE",
            Joint::RightKnee => "RIGHT_KNEE",
            Joint::LeftAnkle => "LEFT_ANKLE",
            Joint::RightAnkle => "RIGHT_ANKLE",
        }
    }
}

/// A single joint position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
    /// Provider confidence that the joint is visible, in [0, 1]
    #[serde(default = "full_visibility")]
    pub visibility: f64,
}

fn full_visibility() -> f64 {
    1.0
}

impl Landmark {
    pub fn new(x: f64, y: f64, visibility: f64) -> Self {
        Self {
            x,
            y,
            z: None,
            visibility,
        }
    }

    /// Image-plane position
    pub fn xy(&self) -> Vec3 {
        Vec3::xy(self.x, self.y)
    }

    /// Position including depth (0 when unknown)
    pub fn xyz(&self) -> Vec3 {
        Vec3::new(self.x, self.y, self.z.unwrap_or(0.0))
    }
}

/// All landmarks detected in one frame
///
/// Deserializes from a full 33-point MediaPipe export; names the analyzers do
/// not use (heels, eyes, fingers) are dropped. Malformed coordinates are still
/// an error.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PoseLandmarks {
    joints: HashMap<Joint, Landmark>,
}

impl<'de> Deserialize<'de> for PoseLandmarks {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let named = HashMap::<String, Landmark>::deserialize(deserializer)?;
        let joints = named
            .into_iter()
            .filter_map(|(name, landmark)| Joint::from_name(&name).map(|joint| (joint, landmark)))
            .collect();
        Ok(Self { joints })
    }
}

impl PoseLandmarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, joint: Joint, landmark: Landmark) -> Self {
        self.joints.insert(joint, landmark);
        self
    }

    pub fn insert(&mut self, joint: Joint, landmark: Landmark) {
        self.joints.insert(joint, landmark);
    }

    pub fn get(&self, joint: Joint) -> Option<&Landmark> {
        self.joints.get(&joint)
    }

    /// Landmark that must be present, regardless of visibility
    pub fn require(&self, joint: Joint) -> Result<&Landmark> {
        self.joints
            .get(&joint)
            .ok_or_else(|| Error::LowVisibilityLandmark(joint.name().to_string()))
    }

    /// Check that every joint is present with visibility at or above `threshold`
    ///
    /// The error names the first failing joint.
    pub fn ensure_visible(&self, joints: &[Joint], threshold: f64) -> Result<()> {
        for &joint in joints {
            match self.joints.get(&joint) {
                Some(lm) if lm.visibility >= threshold => {}
                _ => return Err(Error::LowVisibilityLandmark(joint.name().to_string())),
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}
