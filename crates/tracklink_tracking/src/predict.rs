//! Motion-adaptive pose extrapolation.
//!
//! The prediction horizon shrinks as the head moves faster: a long horizon at
//! high speed amplifies sensor noise into visible jitter, while at low speed
//! the full horizon hides latency.

use serde::{Deserialize, Serialize};
use tracklink_shared::{
    PoseSample, Posed, Quatd, MIN_ANGULAR_SPEED, PREDICTION_LINEAR_COEFFICIENT, PREDICTION_SLOPE,
};

/// First-order pose predictor.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictiveFilter {
    /// Seconds of horizon granted per unit of combined speed.
    pub slope: f64,
    /// Weight of linear speed (m/s) against angular speed (rad/s).
    pub linear_coefficient: f64,
    /// Angular speeds at or below this are treated as no rotation.
    pub min_angular_speed: f64,
}

impl Default for PredictiveFilter {
    fn default() -> Self {
        Self {
            slope: PREDICTION_SLOPE,
            linear_coefficient: PREDICTION_LINEAR_COEFFICIENT,
            min_angular_speed: MIN_ANGULAR_SPEED,
        }
    }
}

impl PredictiveFilter {
    /// Filter with explicit tuning.
    #[must_use]
    pub const fn new(slope: f64, linear_coefficient: f64, min_angular_speed: f64) -> Self {
        Self {
            slope,
            linear_coefficient,
            min_angular_speed,
        }
    }

    /// Interval actually extrapolated over when `dt` is requested:
    /// `min(dt, slope * speed)`.
    #[must_use]
    pub fn effective_dt(&self, sample: &PoseSample, dt: f64) -> f64 {
        let speed = sample.angular_velocity.length()
            + self.linear_coefficient * sample.linear_velocity.length();
        let candidate = self.slope * speed;
        if candidate < dt {
            candidate
        } else {
            dt
        }
    }

    /// Pose of `sample` extrapolated `dt` seconds ahead.
    ///
    /// Velocities and accelerations are not advanced.
    #[must_use]
    pub fn extrapolate(&self, sample: &PoseSample, dt: f64) -> Posed {
        let dt = self.effective_dt(sample, dt);
        let mut pose = sample.pose;

        let angular_speed = sample.angular_velocity.length();
        if angular_speed > self.min_angular_speed {
            let delta = Quatd::from_axis_angle(sample.angular_velocity, angular_speed * dt);
            pose.rotation = pose.rotation * delta;
        }
        pose.translation += sample.linear_velocity * dt;
        pose
    }
}

/// [`PredictiveFilter::extrapolate`] with the default tuning.
#[must_use]
pub fn extrapolate(sample: &PoseSample, dt: f64) -> Posed {
    PredictiveFilter::default().extrapolate(sample, dt)
}
