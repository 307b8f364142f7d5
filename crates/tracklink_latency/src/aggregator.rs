//! # Epoch Aggregator
//!
//! Sums per-frame timings and averages them once per epoch.
//!
//! ```text
//!  frame_end ──► interval = end - epoch_start
//!                  │
//!                  ├─ interval >= reset_limit ──► discard, epoch_start = end
//!                  │
//!                  ├─ count frame
//!                  │
//!                  └─ interval >= epoch ──► emit, epoch_start = end
//! ```
//!
//! The aggregator is owned by the frame loop and mutated through `&mut self`.
//! Results leave through a lock-free cell for polling and through the
//! observer registry, the only mutex in this crate.

use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tracklink_core::{LocklessCell, LocklessPublisher};
use tracklink_shared::TrackingSnapshot;

use crate::error::{LatencyError, LatencyResult};
use crate::observer::{LatencyObserver, ObserverId, ObserverRegistry};
use crate::results::LatencyStatisticsResults;

/// Default epoch length in seconds.
pub const DEFAULT_EPOCH_SECONDS: f64 = 1.0;

/// Default inactivity gap, in seconds, after which a partial epoch is dropped.
pub const DEFAULT_RESET_LIMIT_SECONDS: f64 = 2.0;

/// Camera counter value meaning "no camera frame seen yet".
const NO_CAMERA_FRAME: u32 = u32::MAX;

/// Epoch timing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Length of one statistics epoch.
    pub epoch_seconds: f64,
    /// Gap that discards the running epoch instead of emitting it.
    pub reset_limit_seconds: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            epoch_seconds: DEFAULT_EPOCH_SECONDS,
            reset_limit_seconds: DEFAULT_RESET_LIMIT_SECONDS,
        }
    }
}

impl AggregatorConfig {
    /// Checks that an epoch can complete before the reset limit.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` for a non-positive epoch or a reset limit not above it.
    pub fn validate(&self) -> LatencyResult<()> {
        if self.epoch_seconds.is_nan() || self.epoch_seconds <= 0.0 {
            return Err(LatencyError::InvalidConfig("epoch_seconds must be positive"));
        }
        if self.reset_limit_seconds.is_nan() || self.reset_limit_seconds <= self.epoch_seconds {
            return Err(LatencyError::InvalidConfig(
                "reset_limit_seconds must exceed epoch_seconds",
            ));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct Sums {
    end_frame: f64,
    render: f64,
    timewarp: f64,
    post_present: f64,
    vision_proc: f64,
    vision_frame: f64,
}

/// Per-process frame and tracking latency statistics.
pub struct LatencyAggregator {
    config: AggregatorConfig,
    epoch_start: f64,
    frame_start: f64,
    frame_count: u32,
    vision_frames: u32,
    last_camera_frame_counter: u32,
    sums: Sums,
    results: LocklessPublisher<LatencyStatisticsResults>,
    observers: Arc<ObserverRegistry>,
}

impl LatencyAggregator {
    /// Aggregator with the default 1 s epoch and 2 s reset limit.
    #[must_use]
    pub fn new() -> Self {
        Self::build(AggregatorConfig::default())
    }

    /// Aggregator with custom epoch timing.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when `config` fails [`AggregatorConfig::validate`].
    pub fn with_config(config: AggregatorConfig) -> LatencyResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: AggregatorConfig) -> Self {
        let mut aggregator = Self {
            config,
            epoch_start: 0.0,
            frame_start: 0.0,
            frame_count: 0,
            vision_frames: 0,
            last_camera_frame_counter: NO_CAMERA_FRAME,
            sums: Sums::default(),
            results: LocklessPublisher::new(LatencyStatisticsResults::default()),
            observers: Arc::new(ObserverRegistry::default()),
        };
        aggregator.reset(0.0);
        aggregator
    }

    /// Epoch timing in use.
    #[must_use]
    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Marks the start of the measured end-of-frame work.
    pub fn instrument_frame_start(&mut self, timestamp: f64) {
        self.frame_start = timestamp;
    }

    /// Adds one frame's render, timewarp and post-present latencies.
    ///
    /// Call before [`instrument_frame_end`](Self::instrument_frame_end) of
    /// the same frame.
    pub fn instrument_latency_timings(&mut self, render: f64, timewarp: f64, post_present: f64) {
        self.sums.render += render;
        self.sums.timewarp += timewarp;
        self.sums.post_present += post_present;
    }

    /// Adds vision latencies when the snapshot carries a new camera frame.
    pub fn instrument_pose(&mut self, snapshot: &TrackingSnapshot) {
        if snapshot.last_camera_frame_counter == self.last_camera_frame_counter {
            return;
        }
        if snapshot.status_flags.bits() != 0 {
            self.sums.vision_proc += snapshot.last_vision_processing_time;
            self.sums.vision_frame += snapshot.last_vision_frame_latency;
        }
        self.vision_frames += 1;
        self.last_camera_frame_counter = snapshot.last_camera_frame_counter;
    }

    /// Closes a frame. Returns the epoch results when this frame completed one.
    pub fn instrument_frame_end(&mut self, timestamp: f64) -> Option<LatencyStatisticsResults> {
        let interval = timestamp - self.epoch_start;

        if interval >= self.config.reset_limit_seconds {
            debug!(
                interval,
                frames = self.frame_count,
                "latency epoch discarded after inactivity"
            );
            self.reset(timestamp);
            return None;
        }

        self.sums.end_frame += timestamp - self.frame_start;
        self.frame_count += 1;

        if interval < self.config.epoch_seconds {
            return None;
        }

        let results = self.compute(interval);
        self.results.publish(results);
        self.observers.notify(&results);
        info!(
            fps = results.fps,
            frames = results.frame_count,
            end_frame_ms = results.end_frame_execution_time * 1e3,
            vision_frame_ms = results.latency_vision_frame * 1e3,
            "latency epoch"
        );
        self.reset(timestamp);
        Some(results)
    }

    fn compute(&self, interval: f64) -> LatencyStatisticsResults {
        let frames = f64::from(self.frame_count);
        let per_frame = |sum: f64| sum / frames;
        let per_vision_frame = |sum: f64| {
            if self.vision_frames == 0 {
                0.0
            } else {
                sum / f64::from(self.vision_frames)
            }
        };

        LatencyStatisticsResults {
            interval_seconds: interval,
            fps: frames / interval,
            end_frame_execution_time: per_frame(self.sums.end_frame),
            latency_render: per_frame(self.sums.render),
            latency_timewarp: per_frame(self.sums.timewarp),
            latency_post_present: per_frame(self.sums.post_present),
            latency_vision_proc: per_vision_frame(self.sums.vision_proc),
            latency_vision_frame: per_vision_frame(self.sums.vision_frame),
            frame_count: self.frame_count,
            vision_frames: self.vision_frames,
        }
    }

    fn reset(&mut self, epoch_start: f64) {
        self.epoch_start = epoch_start;
        self.frame_start = epoch_start;
        self.frame_count = 0;
        self.vision_frames = 0;
        self.last_camera_frame_counter = NO_CAMERA_FRAME;
        self.sums = Sums::default();
    }

    /// Most recently emitted results, zeroed before the first epoch.
    #[must_use]
    pub fn latest_results(&self) -> LatencyStatisticsResults {
        self.results.latest()
    }

    /// Lock-free handle to the results for other threads.
    #[must_use]
    pub fn results_reader(&self) -> Arc<LocklessCell<LatencyStatisticsResults>> {
        self.results.reader()
    }

    /// Registers an observer called once per emitted epoch.
    pub fn add_observer(&self, observer: Arc<dyn LatencyObserver>) -> ObserverId {
        self.observers.add(observer)
    }

    /// Removes an observer. Returns false if it was not registered.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers.remove(id)
    }

    /// Channel receiving every emitted epoch.
    pub fn subscribe(&self) -> Receiver<LatencyStatisticsResults> {
        self.observers.subscribe()
    }

    /// Shared registry, for registering from threads that do not own the aggregator.
    #[must_use]
    pub fn observers(&self) -> Arc<ObserverRegistry> {
        Arc::clone(&self.observers)
    }
}

impl Default for LatencyAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LatencyAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyAggregator")
            .field("config", &self.config)
            .field("epoch_start", &self.epoch_start)
            .field("frame_count", &self.frame_count)
            .field("vision_frames", &self.vision_frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklink_shared::StatusFlags;

    fn snapshot(counter: u32, status: StatusFlags) -> TrackingSnapshot {
        TrackingSnapshot {
            status_flags: status,
            last_camera_frame_counter: counter,
            last_vision_processing_time: 0.004,
            last_vision_frame_latency: 0.020,
            ..TrackingSnapshot::default()
        }
    }

    #[test]
    fn test_first_frame_rebaselines() {
        let mut aggregator = LatencyAggregator::new();
        assert_eq!(aggregator.instrument_frame_end(50.0), None);
        assert_eq!(aggregator.frame_count, 0);
        assert_eq!(aggregator.epoch_start, 50.0);
    }

    #[test]
    fn test_vision_counted_once_per_camera_frame() {
        let mut aggregator = LatencyAggregator::new();
        let tracked = StatusFlags::ORIENTATION_TRACKED;

        aggregator.instrument_pose(&snapshot(7, tracked));
        aggregator.instrument_pose(&snapshot(7, tracked));
        aggregator.instrument_pose(&snapshot(8, tracked));

        assert_eq!(aggregator.vision_frames, 2);
        assert!((aggregator.sums.vision_frame - 0.040).abs() < 1e-12);
    }

    #[test]
    fn test_untracked_camera_frame_counts_without_latency() {
        let mut aggregator = LatencyAggregator::new();
        aggregator.instrument_pose(&snapshot(1, StatusFlags::NONE));

        assert_eq!(aggregator.vision_frames, 1);
        assert_eq!(aggregator.sums.vision_proc, 0.0);
    }

    #[test]
    fn test_no_vision_frames_yields_zero_means() {
        let mut aggregator = LatencyAggregator::new();
        aggregator.instrument_frame_end(10.0);
        aggregator.instrument_frame_start(10.5);
        aggregator.instrument_latency_timings(0.010, 0.002, 0.001);
        let results = aggregator.instrument_frame_end(11.0).unwrap_or_default();

        assert_eq!(results.frame_count, 1);
        assert_eq!(results.latency_vision_proc, 0.0);
        assert_eq!(results.latency_vision_frame, 0.0);
        assert!((results.latency_render - 0.010).abs() < 1e-12);
        assert!((results.end_frame_execution_time - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_config_validation() {
        assert!(AggregatorConfig::default().validate().is_ok());

        let zero = AggregatorConfig {
            epoch_seconds: 0.0,
            ..AggregatorConfig::default()
        };
        assert!(LatencyAggregator::with_config(zero).is_err());

        let inverted = AggregatorConfig {
            epoch_seconds: 2.0,
            reset_limit_seconds: 1.0,
        };
        assert!(matches!(
            inverted.validate(),
            Err(LatencyError::InvalidConfig(_))
        ));
    }
}
