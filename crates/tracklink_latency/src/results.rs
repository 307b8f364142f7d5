//! Per-epoch statistics.

use bytemuck::{Pod, Zeroable};

/// Averages over one emitted epoch. All times in seconds.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LatencyStatisticsResults {
    /// Length of the epoch.
    pub interval_seconds: f64,
    /// Frames per second over the epoch.
    pub fps: f64,
    /// Mean duration of the instrumented end-of-frame work.
    pub end_frame_execution_time: f64,
    /// Mean render latency.
    pub latency_render: f64,
    /// Mean timewarp latency.
    pub latency_timewarp: f64,
    /// Mean post-present latency.
    pub latency_post_present: f64,
    /// Mean vision processing time over frames that saw a new camera frame.
    pub latency_vision_proc: f64,
    /// Mean vision frame latency over frames that saw a new camera frame.
    pub latency_vision_frame: f64,
    /// Frames counted in the epoch.
    pub frame_count: u32,
    /// New camera frames seen in the epoch.
    pub vision_frames: u32,
}
