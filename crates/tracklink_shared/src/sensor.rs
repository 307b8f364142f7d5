//! Tracking payload types.
//!
//! [`LocklessSensorState`] is the value the writer publishes into the shared
//! region; [`TrackingSnapshot`] is what a reader hands to the renderer after
//! prediction and recentering.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::math::{Posed, Vec3d};

/// Tracking status bitmask.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable, Serialize, Deserialize)]
pub struct StatusFlags(pub u32);

impl StatusFlags {
    /// No bits set.
    pub const NONE: Self = Self(0);
    /// Orientation is currently tracked.
    pub const ORIENTATION_TRACKED: Self = Self(0x0001);
    /// Position is currently tracked.
    pub const POSITION_TRACKED: Self = Self(0x0002);
    /// Camera pose is currently tracked.
    pub const CAMERA_POSE_TRACKED: Self = Self(0x0004);
    /// Position tracking hardware is connected.
    pub const POSITION_CONNECTED: Self = Self(0x0020);
    /// Head-mounted display is connected.
    pub const HMD_CONNECTED: Self = Self(0x0080);

    /// Every "currently tracked" bit.
    pub const TRACKING_MASK: Self = Self(0x0007);
    /// Every "hardware connected" bit.
    pub const CONNECTED_MASK: Self = Self(0x00A0);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// True when any bit of `other` is set.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Copy with the bits of `other` cleared.
    #[must_use]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// True when at least one tracking bit is set.
    #[must_use]
    pub const fn is_tracking(self) -> bool {
        self.intersects(Self::TRACKING_MASK)
    }

    /// Clears tracking bits whose hardware is not reported as connected.
    ///
    /// Without the HMD every tracking bit goes; without the position
    /// hardware the position and camera-pose bits go.
    #[must_use]
    pub const fn masked_by_connectivity(self) -> Self {
        let mut flags = self;
        if !flags.intersects(Self::HMD_CONNECTED) {
            flags = flags.without(Self::TRACKING_MASK);
        }
        if !flags.intersects(Self::POSITION_CONNECTED) {
            flags = flags.without(Self(Self::POSITION_TRACKED.0 | Self::CAMERA_POSE_TRACKED.0));
        }
        flags
    }
}

impl std::ops::BitOr for StatusFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One fused pose sample and its first and second derivatives.
///
/// Created by the producer, immutable afterwards.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct PoseSample {
    /// Orientation and position.
    pub pose: Posed,
    /// Angular velocity (rad/s), body frame of `pose`.
    ///
    /// Prediction applies it on the right: `rotation * delta`.
    pub angular_velocity: Vec3d,
    /// Linear velocity (m/s), world frame.
    pub linear_velocity: Vec3d,
    /// Angular acceleration (rad/s²).
    pub angular_acceleration: Vec3d,
    /// Linear acceleration (m/s²).
    pub linear_acceleration: Vec3d,
    /// Absolute monotonic time of the sample (seconds).
    pub time_in_seconds: f64,
}

/// Raw readings from the inertial sensor.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct SensorData {
    /// Acceleration reading (m/s²).
    pub accelerometer: Vec3d,
    /// Rotation rate (rad/s).
    pub gyro: Vec3d,
    /// Magnetic field (Gauss).
    pub magnetometer: Vec3d,
    /// Sensor temperature (°C).
    pub temperature: f64,
    /// Time the reading was taken (seconds).
    pub time_in_seconds: f64,
}

/// State published by the tracking writer.
///
/// Lives inside the shared region, so the layout is frozen: new fields go at
/// the end, never in the middle.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LocklessSensorState {
    /// Most recent fused IMU pose in the world frame.
    pub world_from_imu: PoseSample,
    /// Most recent raw reading.
    pub raw_sensor_data: SensorData,
    /// Pose of the external tracking camera.
    pub world_from_camera: Posed,
    /// Calibration offset from the IMU to the center pupil frame.
    pub imu_from_cpf: Posed,
    /// Time spent processing the last vision frame (seconds).
    pub last_vision_processing_time: f64,
    /// Capture-to-result latency of the last vision frame (seconds).
    pub last_vision_frame_latency: f64,
    /// Tracking status bits.
    pub status_flags: StatusFlags,
    /// Counter advanced once per processed camera frame.
    pub last_camera_frame_counter: u32,
}

/// Result of one reader query: predicted, recentered poses plus telemetry.
///
/// Built fresh on every query, never cached.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackingSnapshot {
    /// Predicted head pose at the query time, with the source derivatives.
    pub head_pose: PoseSample,
    /// Camera pose in the recentered frame.
    pub camera_pose: Posed,
    /// Gravity-aligned camera pose (no pitch or roll) in the recentered frame.
    pub leveled_camera_pose: Posed,
    /// Raw readings carried through from the writer.
    pub raw_sensor_data: SensorData,
    /// Status bits after connectivity masking.
    pub status_flags: StatusFlags,
    /// Camera frame counter carried through from the writer.
    pub last_camera_frame_counter: u32,
    /// Time spent processing the last vision frame (seconds).
    pub last_vision_processing_time: f64,
    /// Capture-to-result latency of the last vision frame (seconds).
    pub last_vision_frame_latency: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_state_is_abi_stable() {
        // 20 + 11 + 7 + 7 + 2 doubles, then two u32 words
        assert_eq!(std::mem::size_of::<LocklessSensorState>(), 47 * 8 + 8);
        assert_eq!(std::mem::align_of::<LocklessSensorState>(), 8);
    }

    #[test]
    fn test_connectivity_masking() {
        let all = StatusFlags::TRACKING_MASK | StatusFlags::CONNECTED_MASK;
        assert_eq!(all.masked_by_connectivity(), all);

        let no_hmd = all.without(StatusFlags::HMD_CONNECTED);
        assert!(!no_hmd.masked_by_connectivity().is_tracking());

        let no_camera = all.without(StatusFlags::POSITION_CONNECTED);
        let masked = no_camera.masked_by_connectivity();
        assert!(masked.contains(StatusFlags::ORIENTATION_TRACKED));
        assert!(!masked.intersects(StatusFlags::POSITION_TRACKED));
        assert!(!masked.intersects(StatusFlags::CAMERA_POSE_TRACKED));
    }
}
