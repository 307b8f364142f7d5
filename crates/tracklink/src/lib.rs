//! # TRACKLINK
//!
//! Configuration, logging and synthetic motion shared by the
//! `tracklink-publisher` and `tracklink-monitor` binaries.
//!
//! ```text
//! tracklink-publisher ──set_state──► [ shared region ] ──get_state──► tracklink-monitor
//!        1 kHz                                                      per frame: predict,
//!                                                                   latency epochs, CSV
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod logging;
pub mod motion;

pub use config::{
    BackendKind, ConfigError, ConfigResult, LatencyConfig, LoggingConfig, PredictionConfig,
    RegionConfig, TrackLinkConfig,
};
pub use motion::{OrbitMotion, FULL_TRACKING};
