//! Joint-angle geometry
//!
//! All angles are in degrees. Degenerate input (a zero-length ray or
//! non-finite coordinates) yields [`DEGENERATE_ANGLE`] instead of NaN so
//! analyzers can keep running on noisy landmark data.

/// Returned when an angle is undefined
pub const DEGENERATE_ANGLE: f64 = 0.0;

/// Rays shorter than this are treated as zero-length
const MIN_NORM: f64 = 1e-6;

/// Point or direction in normalized image space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Point in the image plane (z = 0)
    pub const fn xy(x: f64, y: f64) -> Self {
        Self { x, y, z: 0.0 }
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn dot(self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn norm(self) -> f64 {
        self.dot(self).sqrt()
    }
}

/// Angle at vertex `p2` between rays `p2→p1` and `p2→p3`, in [0, 180]
pub fn angle(p1: Vec3, p2: Vec3, p3: Vec3) -> f64 {
    angle_between(p1.sub(p2), p3.sub(p2))
}

/// Angle between two direction vectors, in [0, 180]
pub fn angle_between(v1: Vec3, v2: Vec3) -> f64 {
    let n1 = v1.norm();
    let n2 = v2.norm();
    if !(n1.is_finite() && n2.is_finite()) || n1 < MIN_NORM || n2 < MIN_NORM {
        return DEGENERATE_ANGLE;
    }

    let cosine = v1.dot(v2) / (n1 * n2);
    if !cosine.is_finite() {
        return DEGENERATE_ANGLE;
    }

    cosine.clamp(-1.0, 1.0).acos().to_degrees()
}
