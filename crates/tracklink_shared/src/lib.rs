//! # TRACKLINK Shared
//!
//! Common types used by the tracking writer, every reader process, and the
//! rendering engine that consumes predicted poses.
//!
//! ## CRITICAL RULE
//!
//! Types that travel through shared memory must be `#[repr(C)]` and
//! [`bytemuck::Pod`]. A 32-bit reader and a 64-bit writer must agree on every
//! byte, so no `usize`, no pointers, no implicit padding.

#![deny(unsafe_code)]

pub mod constants;
pub mod math;
pub mod sensor;

pub use constants::{
    DEFAULT_REGION_NAME, MAX_PREDICTION_DT, MIN_ANGULAR_SPEED, PREDICTION_LINEAR_COEFFICIENT,
    PREDICTION_SLOPE,
};
pub use math::{Posed, Quatd, Vec3d};
pub use sensor::{LocklessSensorState, PoseSample, SensorData, StatusFlags, TrackingSnapshot};
