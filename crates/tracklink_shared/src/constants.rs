//! # Tracking Constants
//!
//! Defaults baked into both sides of the shared region. Everything tunable at
//! runtime is also exposed through the configuration sections, these are the
//! values used when nothing is configured.

// =============================================================================
// SHARED REGION
// =============================================================================

/// Name of the region carrying the fused head-tracking state.
pub const DEFAULT_REGION_NAME: &str = "tracklink_sensor_state";

// =============================================================================
// PREDICTION
// =============================================================================

/// Longest interval (seconds) a sample is extrapolated forward.
pub const MAX_PREDICTION_DT: f64 = 0.1;

/// Rate at which the motion-adaptive prediction interval grows with speed.
pub const PREDICTION_SLOPE: f64 = 0.2;

/// Weight of linear speed relative to angular speed.
pub const PREDICTION_LINEAR_COEFFICIENT: f64 = 1.0;

/// Below this angular speed (rad/s) orientation is not extrapolated.
pub const MIN_ANGULAR_SPEED: f64 = 1e-3;
