//! # TRACKLINK Latency
//!
//! Frame timing and motion-to-photon statistics, averaged per one-second
//! epoch and broadcast to observers.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut stats = LatencyAggregator::new();
//! let sink = Arc::new(LatencyCsvSink::new());
//! sink.start(&log_dir, "latency.csv", "session-a")?;
//! stats.add_observer(sink.clone());
//!
//! loop {
//!     stats.instrument_frame_start(monotonic_seconds());
//!     let snapshot = reader.get_sensor_state_at_time(target)?;
//!     stats.instrument_pose(&snapshot);
//!     stats.instrument_latency_timings(render, timewarp, post_present);
//!     stats.instrument_frame_end(monotonic_seconds());
//! }
//! ```

#![deny(unsafe_code)]

pub mod aggregator;
pub mod csv;
pub mod error;
pub mod observer;
pub mod results;

pub use aggregator::{
    AggregatorConfig, LatencyAggregator, DEFAULT_EPOCH_SECONDS, DEFAULT_RESET_LIMIT_SECONDS,
};
pub use csv::{LatencyCsvSink, SessionInfo, CSV_HEADER};
pub use error::{LatencyError, LatencyResult};
pub use observer::{LatencyObserver, ObserverId, ObserverRegistry, SUBSCRIPTION_CAPACITY};
pub use results::LatencyStatisticsResults;
