//! Synthetic head motion for the publisher.
//!
//! The head circles a fixed point while yawing back and forth; positions,
//! velocities and accelerations are analytic so readers can check prediction
//! against ground truth.

use std::f64::consts::{PI, TAU};

use tracklink_shared::{
    LocklessSensorState, PoseSample, Posed, Quatd, SensorData, StatusFlags, Vec3d,
};

const GRAVITY: Vec3d = Vec3d::new(0.0, 9.81, 0.0);

/// Status bits of a fully tracked, fully connected headset.
pub const FULL_TRACKING: StatusFlags = StatusFlags(
    StatusFlags::ORIENTATION_TRACKED.0
        | StatusFlags::POSITION_TRACKED.0
        | StatusFlags::CAMERA_POSE_TRACKED.0
        | StatusFlags::POSITION_CONNECTED.0
        | StatusFlags::HMD_CONNECTED.0,
);

/// Orbit plus yaw oscillation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrbitMotion {
    /// Orbit center, meters.
    pub center: Vec3d,
    /// Orbit radius, meters.
    pub radius: f64,
    /// Seconds per orbit.
    pub orbit_period: f64,
    /// Peak yaw, radians.
    pub yaw_amplitude: f64,
    /// Seconds per yaw oscillation.
    pub yaw_period: f64,
    /// Simulated camera frames per second.
    pub camera_rate: f64,
}

impl Default for OrbitMotion {
    fn default() -> Self {
        Self {
            center: Vec3d::new(0.0, 1.6, 0.0),
            radius: 0.1,
            orbit_period: 4.0,
            yaw_amplitude: 0.5,
            yaw_period: 3.0,
            camera_rate: 60.0,
        }
    }
}

impl OrbitMotion {
    /// Sensor state at `time` seconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn sample(&self, time: f64) -> LocklessSensorState {
        let orbit_rate = TAU / self.orbit_period;
        let (sin_o, cos_o) = (orbit_rate * time).sin_cos();

        let yaw_rate = TAU / self.yaw_period;
        let (sin_y, cos_y) = (yaw_rate * time).sin_cos();
        let yaw = self.yaw_amplitude * sin_y;

        let angular_velocity = Vec3d::new(0.0, self.yaw_amplitude * yaw_rate * cos_y, 0.0);
        let angular_acceleration =
            Vec3d::new(0.0, -self.yaw_amplitude * yaw_rate * yaw_rate * sin_y, 0.0);
        let linear_velocity = Vec3d::new(-sin_o, 0.0, cos_o) * (self.radius * orbit_rate);
        let linear_acceleration =
            Vec3d::new(cos_o, 0.0, sin_o) * (-self.radius * orbit_rate * orbit_rate);

        let world_from_imu = PoseSample {
            pose: Posed::new(
                Quatd::from_yaw(yaw),
                self.center + Vec3d::new(cos_o, 0.0, sin_o) * self.radius,
            ),
            angular_velocity,
            linear_velocity,
            angular_acceleration,
            linear_acceleration,
            time_in_seconds: time,
        };

        LocklessSensorState {
            world_from_imu,
            raw_sensor_data: SensorData {
                accelerometer: linear_acceleration + GRAVITY,
                gyro: angular_velocity,
                magnetometer: Vec3d::new(0.2, -0.4, 0.1),
                temperature: 35.0,
                time_in_seconds: time,
            },
            world_from_camera: Posed::new(Quatd::from_yaw(PI), Vec3d::new(0.0, 1.5, 1.5)),
            imu_from_cpf: Posed::new(Quatd::IDENTITY, Vec3d::new(0.0, 0.0, -0.08)),
            last_vision_processing_time: 0.004,
            last_vision_frame_latency: 0.025,
            status_flags: FULL_TRACKING,
            last_camera_frame_counter: (time.max(0.0) * self.camera_rate) as u32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_velocity_matches_position_derivative() {
        let motion = OrbitMotion::default();
        let h = 1e-6;
        let t = 1.3;
        let before = motion.sample(t - h).world_from_imu.pose.translation;
        let after = motion.sample(t + h).world_from_imu.pose.translation;
        let numeric = (after - before) * (1.0 / (2.0 * h));
        let analytic = motion.sample(t).world_from_imu.linear_velocity;

        assert!((numeric - analytic).length() < 1e-6);
    }

    #[test]
    fn test_yaw_follows_oscillation() {
        let motion = OrbitMotion::default();
        let quarter = motion.yaw_period / 4.0;
        let rotation = motion.sample(quarter).world_from_imu.pose.rotation;
        let (yaw, pitch, roll) = rotation.yaw_pitch_roll();

        assert!((yaw - motion.yaw_amplitude).abs() < 1e-9);
        assert!(pitch.abs() < 1e-9);
        assert!(roll.abs() < 1e-9);
    }

    #[test]
    fn test_camera_counter_advances() {
        let motion = OrbitMotion::default();
        let first = motion.sample(10.0);
        let second = motion.sample(10.0 + 1.0 / 30.0);

        assert!(first.status_flags.is_tracking());
        assert_eq!(first.status_flags.masked_by_connectivity(), FULL_TRACKING);
        assert!(second.last_camera_frame_counter > first.last_camera_frame_counter);
    }
}
