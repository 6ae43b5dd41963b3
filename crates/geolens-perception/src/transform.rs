//! Local-frame math: vectors, rotations, rigid transforms.
//!
//! Everything here lives in the observer-centred frame produced by
//! [`geo::project`][crate::geo::project]: a left-handed frame with +x east,
//! +y up and +z north.  The
//! observer's heading turns that frame into a camera-relative one via
//! [`heading_rotation`] and [`camera_relative`].
//!
//! # Example
//!
//! ```rust
//! use geolens_perception::transform::{camera_relative, heading_rotation, Vec3};
//!
//! // Device turned to face west (alpha = 90°, counter-clockwise from north).
//! let camera = heading_rotation(90.0);
//!
//! // An agent 10 m west of the observer is straight ahead (+z) of the camera.
//! let seen = camera_relative(Vec3::new(-10.0, 0.0, 0.0), camera);
//! assert!(seen.x.abs() < 1e-9);
//! assert!((seen.z - 10.0).abs() < 1e-9);
//! ```

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D vector in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    /// The up axis of the local frame.
    pub const UP: Vec3 = Vec3 {
        x: 0.0,
        y: 1.0,
        z: 0.0,
    };

    /// Create a new vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The zero vector.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }

    pub fn scale(self, k: f64) -> Self {
        Self::new(self.x * k, self.y * k, self.z * k)
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Length of the projection onto the ground plane.
    pub fn ground_distance(self) -> f64 {
        (self.x * self.x + self.z * self.z).sqrt()
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation (no rotation).
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Right-handed rotation of `angle_rad` about the unit vector `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_rad: f64) -> Self {
        let (s, c) = (angle_rad / 2.0).sin_cos();
        Self::new(c, axis.x * s, axis.y * s, axis.z * s)
    }

    /// Hamilton product: compose two rotations.
    pub fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
        )
    }

    /// Conjugate (== inverse for a unit quaternion).
    pub fn conjugate(self) -> Self {
        Self::new(self.w, -self.x, -self.y, -self.z)
    }

    /// Rotate a vector by this quaternion: p' = q * p * q*.
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let p = Self::new(0.0, v.x, v.y, v.z);
        let rotated = self.mul(p).mul(self.conjugate());
        Vec3::new(rotated.x, rotated.y, rotated.z)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Transform3D
// ────────────────────────────────────────────────────────────────────────────

/// Placement of a scene object: rotate by `rotation`, scale uniformly, then
/// translate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform3D {
    pub translation: Vec3,
    pub rotation: Quaternion,
    pub scale: f64,
}

impl Transform3D {
    /// Create a unit-scale transform from a translation and rotation.
    pub fn new(translation: Vec3, rotation: Quaternion) -> Self {
        Self {
            translation,
            rotation,
            scale: 1.0,
        }
    }

    /// The identity transform.
    pub fn identity() -> Self {
        Self::new(Vec3::zero(), Quaternion::identity())
    }

    /// A transform at `position` turned about the up axis so its local +z
    /// points back at the observer (the frame origin).
    pub fn facing_origin(position: Vec3) -> Self {
        let yaw = if position.ground_distance() < 1e-9 {
            0.0
        } else {
            (-position.x).atan2(-position.z)
        };
        Self::new(position, Quaternion::from_axis_angle(Vec3::UP, yaw))
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Heading
// ────────────────────────────────────────────────────────────────────────────

/// Camera rotation for a device whose `alpha` reading (degrees,
/// counter-clockwise from north) is given.
///
/// At `alpha = 0` the camera looks along +z (north).
pub fn heading_rotation(alpha_deg: f64) -> Quaternion {
    // +y rotation turns north towards east, i.e. clockwise from above.
    Quaternion::from_axis_angle(Vec3::UP, -alpha_deg.to_radians())
}

/// Express a local-frame position relative to a camera at the origin with
/// the given rotation.  +z is straight ahead, +x to the camera's right.
pub fn camera_relative(world: Vec3, camera_rotation: Quaternion) -> Vec3 {
    camera_rotation.conjugate().rotate(world)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn assert_vec(v: Vec3, x: f64, y: f64, z: f64) {
        assert!((v.x - x).abs() < 1e-9, "x: {} vs {}", v.x, x);
        assert!((v.y - y).abs() < 1e-9, "y: {} vs {}", v.y, y);
        assert!((v.z - z).abs() < 1e-9, "z: {} vs {}", v.z, z);
    }

    // ── Quaternion ──────────────────────────────────────────────────────────

    #[test]
    fn quaternion_identity_rotate_is_noop() {
        let r = Quaternion::identity().rotate(Vec3::new(1.0, 2.0, 3.0));
        assert_vec(r, 1.0, 2.0, 3.0);
    }

    #[test]
    fn quaternion_up_rotation_turns_north_to_east() {
        let q = Quaternion::from_axis_angle(Vec3::UP, FRAC_PI_2);
        assert_vec(q.rotate(Vec3::new(0.0, 0.0, 1.0)), 1.0, 0.0, 0.0);
    }

    #[test]
    fn quaternion_conjugate_is_inverse() {
        let q = Quaternion::from_axis_angle(Vec3::UP, 0.7);
        let prod = q.mul(q.conjugate());
        assert!((prod.w - 1.0).abs() < 1e-12);
        assert!(prod.x.abs() < 1e-12 && prod.y.abs() < 1e-12 && prod.z.abs() < 1e-12);
    }

    // ── Transform3D ─────────────────────────────────────────────────────────

    #[test]
    fn facing_origin_points_local_forward_at_observer() {
        let t = Transform3D::facing_origin(Vec3::new(0.0, 0.0, 20.0));
        // Local +z, rotated, should point back toward -z (south, at origin).
        assert_vec(t.rotation.rotate(Vec3::new(0.0, 0.0, 1.0)), 0.0, 0.0, -1.0);

        let east = Transform3D::facing_origin(Vec3::new(5.0, 0.0, 0.0));
        assert_vec(east.rotation.rotate(Vec3::new(0.0, 0.0, 1.0)), -1.0, 0.0, 0.0);
    }

    #[test]
    fn facing_origin_at_origin_is_unrotated() {
        let t = Transform3D::facing_origin(Vec3::zero());
        assert_eq!(t.rotation, Quaternion::identity());
    }

    // ── Heading ─────────────────────────────────────────────────────────────

    #[test]
    fn north_facing_camera_sees_world_unchanged() {
        let seen = camera_relative(Vec3::new(3.0, 1.0, 7.0), heading_rotation(0.0));
        assert_vec(seen, 3.0, 1.0, 7.0);
    }

    #[test]
    fn west_facing_camera_sees_west_agent_ahead() {
        let seen = camera_relative(Vec3::new(-10.0, 0.0, 0.0), heading_rotation(90.0));
        assert_vec(seen, 0.0, 0.0, 10.0);
    }

    #[test]
    fn heading_preserves_altitude_and_distance() {
        let world = Vec3::new(4.0, 2.5, -3.0);
        let seen = camera_relative(world, heading_rotation(137.0));
        assert!((seen.y - 2.5).abs() < 1e-9);
        assert!((seen.length() - world.length()).abs() < 1e-9);
    }
}
