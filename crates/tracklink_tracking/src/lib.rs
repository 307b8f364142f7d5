//! # TRACKLINK Tracking
//!
//! Reader-side tracking: pose prediction, recentering, status masking.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tracklink_core::{monotonic_seconds, RegionFactory, StateReader};
//! use tracklink_tracking::TrackingReader;
//!
//! let factory = RegionFactory::platform();
//! let source = StateReader::open(&factory, tracklink_shared::DEFAULT_REGION_NAME)?;
//! let mut reader = TrackingReader::new(source);
//! reader.recenter_pose()?;
//! let pose = reader.get_pose_at_time(monotonic_seconds() + render_latency)?;
//! ```

#![deny(unsafe_code)]

pub mod error;
pub mod predict;
pub mod profile;
pub mod reader;

pub use error::{ProfileError, TrackingError, TrackingResult};
pub use predict::{extrapolate, PredictiveFilter};
pub use profile::{CenteredFrame, CenteredFrameProfile};
pub use reader::{SensorStateSource, TrackingReader};
