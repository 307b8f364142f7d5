//! Rigid-body math shared by the writer, the readers, and the predictor.
//!
//! These are the canonical representations stored in shared memory, so they
//! use `f64` throughout: a tracking timestamp in monotonic seconds loses
//! sub-millisecond precision in `f32` after a few hours of uptime.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Numerical margin around the gimbal-lock poles when extracting Euler angles.
const SINGULARITY_RADIUS: f64 = 1e-12;

/// 3D Vector - position, velocity, acceleration
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3d {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
}

impl Vec3d {
    /// Creates a new Vec3d
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector (up)
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f64 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Unit-length copy; the zero vector stays zero.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }
}

impl std::ops::Add for Vec3d {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::AddAssign for Vec3d {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Vec3d {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Neg for Vec3d {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<f64> for Vec3d {
    type Output = Self;
    fn mul(self, rhs: f64) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Quaternion for rotations (x, y, z, w)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quatd {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
    /// Z component
    pub z: f64,
    /// W component
    pub w: f64,
}

impl Quatd {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, w: f64) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis`.
    ///
    /// The axis does not need to be normalized. A zero axis yields identity.
    #[must_use]
    pub fn from_axis_angle(axis: Vec3d, angle: f64) -> Self {
        if axis.length_squared() == 0.0 {
            return Self::IDENTITY;
        }
        let unit = axis.normalized();
        let (sin_half, cos_half) = (angle * 0.5).sin_cos();
        Self::new(unit.x * sin_half, unit.y * sin_half, unit.z * sin_half, cos_half)
    }

    /// Rotation of `angle` radians around the vertical (Y) axis.
    #[must_use]
    pub fn from_yaw(angle: f64) -> Self {
        Self::from_axis_angle(Vec3d::Y, angle)
    }

    /// Converts to `[x, y, z, w]`
    #[must_use]
    pub const fn to_array(self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Creates from `[x, y, z, w]`
    #[must_use]
    pub const fn from_array(arr: [f64; 4]) -> Self {
        Self::new(arr[0], arr[1], arr[2], arr[3])
    }

    /// Vector part
    #[must_use]
    pub const fn xyz(self) -> Vec3d {
        Vec3d::new(self.x, self.y, self.z)
    }

    /// Length of the 4-vector
    #[must_use]
    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w).sqrt()
    }

    /// Unit-length copy; a degenerate quaternion becomes identity.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            let inv = 1.0 / len;
            Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// Inverse of a unit quaternion (its conjugate).
    #[must_use]
    pub const fn inverted(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Rotates a vector by this (unit) quaternion.
    #[must_use]
    pub fn rotate(self, v: Vec3d) -> Vec3d {
        let q = self.xyz();
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Extracts `(yaw, pitch, roll)`: yaw around Y, then pitch around X,
    /// then roll around Z. Right-handed, counter-clockwise positive.
    #[must_use]
    pub fn yaw_pitch_roll(self) -> (f64, f64, f64) {
        let Self { x, y, z, w } = self;
        let ww = w * w;
        let (xx, yy, zz) = (x * x, y * y, z * z);

        let s2 = 2.0 * (w * x - y * z);

        if s2 < -1.0 + SINGULARITY_RADIUS {
            let roll = (2.0 * (w * z - x * y)).atan2(ww + xx - yy - zz);
            (0.0, -std::f64::consts::FRAC_PI_2, roll)
        } else if s2 > 1.0 - SINGULARITY_RADIUS {
            let roll = (2.0 * (w * z - x * y)).atan2(ww + xx - yy - zz);
            (0.0, std::f64::consts::FRAC_PI_2, roll)
        } else {
            let yaw = (2.0 * (w * y + x * z)).atan2(ww - xx - yy + zz);
            let pitch = s2.asin();
            let roll = (2.0 * (w * z + x * y)).atan2(ww - xx + yy - zz);
            (yaw, pitch, roll)
        }
    }
}

impl Default for Quatd {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quatd {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

/// Rigid transform - rotation followed by translation
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Posed {
    /// Orientation
    pub rotation: Quatd,
    /// Position
    pub translation: Vec3d,
}

impl Posed {
    /// Creates a new pose
    #[must_use]
    pub const fn new(rotation: Quatd, translation: Vec3d) -> Self {
        Self { rotation, translation }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Quatd::IDENTITY, Vec3d::ZERO);

    /// Transforms a point from this pose's local frame into its parent frame.
    #[must_use]
    pub fn apply(&self, point: Vec3d) -> Vec3d {
        self.rotation.rotate(point) + self.translation
    }

    /// Inverse transform.
    #[must_use]
    pub fn inverted(&self) -> Self {
        let inv = self.rotation.inverted();
        Self::new(inv, inv.rotate(-self.translation))
    }
}

impl std::ops::Mul for Posed {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.rotation * rhs.rotation, self.apply(rhs.translation))
    }
}
