//! # Tracking Reader
//!
//! Turns the latest published sensor state into a predicted, recentered
//! snapshot for a given query time.
//!
//! ```text
//!   SensorStateSource ──► mask status ──► clamp pdt ──► PredictiveFilter
//!                                                            │
//!   head = CenteredFromWorld * predicted * ImuFromCpf  ◄─────┘
//! ```
//!
//! The recentering frame and the clamp-warning bookkeeping are private to
//! one reader; nothing here writes to shared memory.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use tracklink_core::{LocklessCell, StateReader};
use tracklink_shared::{
    LocklessSensorState, PoseSample, Posed, Quatd, StatusFlags, TrackingSnapshot,
    MAX_PREDICTION_DT,
};

use crate::error::{TrackingError, TrackingResult};
use crate::predict::PredictiveFilter;
use crate::profile::{CenteredFrame, CenteredFrameProfile};

/// Anything that yields the latest [`LocklessSensorState`].
pub trait SensorStateSource: Send + Sync {
    /// Latest complete state. Must not block.
    fn sensor_state(&self) -> LocklessSensorState;
}

impl SensorStateSource for StateReader<LocklessSensorState> {
    fn sensor_state(&self) -> LocklessSensorState {
        self.get_state()
    }
}

impl SensorStateSource for LocklessCell<LocklessSensorState> {
    fn sensor_state(&self) -> LocklessSensorState {
        self.get_state()
    }
}

impl<S: SensorStateSource + ?Sized> SensorStateSource for Arc<S> {
    fn sensor_state(&self) -> LocklessSensorState {
        (**self).sensor_state()
    }
}

/// Per-process view of the shared tracking state.
pub struct TrackingReader<S> {
    source: Option<S>,
    filter: PredictiveFilter,
    max_prediction_dt: f64,
    centered_from_world: Posed,
    /// Bits of the sample time last reported as clamped.
    last_clamp_warning: AtomicU64,
}

impl<S: SensorStateSource> TrackingReader<S> {
    /// Reader with no source; every query fails with `NotAttached`.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            source: None,
            filter: PredictiveFilter::default(),
            max_prediction_dt: MAX_PREDICTION_DT,
            centered_from_world: Posed::IDENTITY,
            last_clamp_warning: AtomicU64::new(0.0f64.to_bits()),
        }
    }

    /// Reader over `source`.
    #[must_use]
    pub fn new(source: S) -> Self {
        let mut reader = Self::detached();
        reader.source = Some(source);
        reader
    }

    /// Replaces the predictor tuning.
    #[must_use]
    pub fn with_filter(mut self, filter: PredictiveFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Replaces the prediction horizon cap (seconds).
    #[must_use]
    pub fn with_max_prediction_dt(mut self, max_prediction_dt: f64) -> Self {
        self.max_prediction_dt = max_prediction_dt.max(0.0);
        self
    }

    /// Attaches, replaces, or (with `None`) removes the source.
    pub fn set_source(&mut self, source: Option<S>) {
        self.source = source;
    }

    /// True when a source is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.source.is_some()
    }

    fn state(&self) -> TrackingResult<LocklessSensorState> {
        self.source
            .as_ref()
            .map(|source| source.sensor_state())
            .ok_or(TrackingError::NotAttached)
    }

    /// Makes the device's current yaw and position the new origin.
    ///
    /// Pitch and roll are left untouched.
    ///
    /// # Errors
    ///
    /// [`TrackingError::NotAttached`] without a source.
    pub fn recenter_pose(&mut self) -> TrackingResult<()> {
        let state = self.state()?;
        let world_from_cpf = state.world_from_imu.pose * state.imu_from_cpf;
        let (yaw, _pitch, _roll) = world_from_cpf.rotation.yaw_pitch_roll();
        let world_from_centered = Posed::new(Quatd::from_yaw(yaw), world_from_cpf.translation);
        self.centered_from_world = world_from_centered.inverted();
        info!(yaw, "tracking origin recentered");
        Ok(())
    }

    /// Current recentering transform.
    #[must_use]
    pub fn centered_from_world(&self) -> Posed {
        self.centered_from_world
    }

    /// Overrides the recentering transform.
    pub fn set_centered_from_world(&mut self, centered_from_world: Posed) {
        self.centered_from_world = centered_from_world;
    }

    /// Clamps the prediction interval to `[0, max_prediction_dt]`, warning
    /// once per sample when the upper bound kicks in.
    fn prediction_interval(&self, query_time: f64, sample_time: f64) -> f64 {
        let pdt = query_time - sample_time;
        if pdt.is_nan() || pdt < 0.0 {
            // Clock skew between processes.
            return 0.0;
        }
        if pdt > self.max_prediction_dt {
            let previous = self
                .last_clamp_warning
                .swap(sample_time.to_bits(), Ordering::Relaxed);
            if previous != sample_time.to_bits() {
                warn!(
                    pdt,
                    max = self.max_prediction_dt,
                    "prediction interval too high, clamping"
                );
            }
            return self.max_prediction_dt;
        }
        pdt
    }

    /// Predicted, recentered tracking state at `query_time` (monotonic
    /// seconds).
    ///
    /// # Errors
    ///
    /// [`TrackingError::NoTracking`] when the masked status has no tracking
    /// bit, [`TrackingError::NotAttached`] without a source.
    pub fn get_sensor_state_at_time(&self, query_time: f64) -> TrackingResult<TrackingSnapshot> {
        let state = self.state()?;

        let status_flags = state.status_flags.masked_by_connectivity();
        if !status_flags.is_tracking() {
            return Err(TrackingError::NoTracking);
        }

        let sample = state.world_from_imu;
        let pdt = self.prediction_interval(query_time, sample.time_in_seconds);
        let predicted = self.filter.extrapolate(&sample, pdt);

        let head_pose = PoseSample {
            pose: self.centered_from_world * predicted * state.imu_from_cpf,
            time_in_seconds: query_time,
            ..sample
        };
        let world_from_leveled_camera =
            Posed::new(Quatd::IDENTITY, state.world_from_camera.translation);

        Ok(TrackingSnapshot {
            head_pose,
            camera_pose: self.centered_from_world * state.world_from_camera,
            leveled_camera_pose: self.centered_from_world * world_from_leveled_camera,
            raw_sensor_data: state.raw_sensor_data,
            status_flags,
            last_camera_frame_counter: state.last_camera_frame_counter,
            last_vision_processing_time: state.last_vision_processing_time,
            last_vision_frame_latency: state.last_vision_frame_latency,
        })
    }

    /// Head pose only.
    ///
    /// # Errors
    ///
    /// See [`TrackingReader::get_sensor_state_at_time`].
    pub fn get_pose_at_time(&self, query_time: f64) -> TrackingResult<Posed> {
        self.get_sensor_state_at_time(query_time)
            .map(|snapshot| snapshot.head_pose.pose)
    }

    /// Raw status bits, or none when no tracking bit is set or no source is
    /// attached.
    #[must_use]
    pub fn status(&self) -> StatusFlags {
        match self.state() {
            Ok(state) if state.status_flags.is_tracking() => state.status_flags,
            _ => StatusFlags::NONE,
        }
    }

    /// Loads the recentering transform from a profile file; identity when
    /// the file does not exist.
    ///
    /// # Errors
    ///
    /// [`TrackingError::Profile`] for unreadable or malformed files.
    pub fn load_profile(&mut self, path: &Path) -> TrackingResult<()> {
        let profile = CenteredFrameProfile::load(path)?;
        self.centered_from_world = profile.centered_from_world.to_pose();
        Ok(())
    }

    /// Saves the recentering transform to a profile file.
    ///
    /// # Errors
    ///
    /// [`TrackingError::Profile`] when the file cannot be written.
    pub fn save_profile(&self, path: &Path) -> TrackingResult<()> {
        let profile = CenteredFrameProfile {
            centered_from_world: CenteredFrame::from_pose(&self.centered_from_world),
        };
        profile.save(path)?;
        Ok(())
    }
}

impl<S> std::fmt::Debug for TrackingReader<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingReader")
            .field("attached", &self.source.is_some())
            .field("filter", &self.filter)
            .field("max_prediction_dt", &self.max_prediction_dt)
            .field("centered_from_world", &self.centered_from_world)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracklink_shared::Vec3d;

    fn tracked(sample: PoseSample) -> LocklessSensorState {
        LocklessSensorState {
            world_from_imu: sample,
            status_flags: StatusFlags::ORIENTATION_TRACKED
                | StatusFlags::POSITION_TRACKED
                | StatusFlags::HMD_CONNECTED
                | StatusFlags::POSITION_CONNECTED,
            ..LocklessSensorState::default()
        }
    }

    fn reader_over(state: LocklessSensorState) -> TrackingReader<LocklessCell<LocklessSensorState>> {
        TrackingReader::new(LocklessCell::new(state))
    }

    #[test]
    fn test_detached_reader() {
        let mut reader = TrackingReader::<LocklessCell<LocklessSensorState>>::detached();
        assert!(matches!(
            reader.get_pose_at_time(0.0),
            Err(TrackingError::NotAttached)
        ));
        assert!(matches!(reader.recenter_pose(), Err(TrackingError::NotAttached)));
        assert_eq!(reader.status(), StatusFlags::NONE);
    }

    #[test]
    fn test_no_hmd_means_no_tracking() {
        let mut state = tracked(PoseSample::default());
        state.status_flags = state.status_flags.without(StatusFlags::HMD_CONNECTED);
        let reader = reader_over(state);
        assert!(matches!(
            reader.get_sensor_state_at_time(0.0),
            Err(TrackingError::NoTracking)
        ));
    }

    #[test]
    fn test_status_zero_without_tracking_bits() {
        let mut state = tracked(PoseSample::default());
        state.status_flags = StatusFlags::HMD_CONNECTED;
        assert_eq!(reader_over(state).status(), StatusFlags::NONE);

        let state = tracked(PoseSample::default());
        assert_eq!(reader_over(state).status(), state.status_flags);
    }

    #[test]
    fn test_camera_bits_masked_without_position_hardware() {
        let mut state = tracked(PoseSample::default());
        state.status_flags = (state.status_flags | StatusFlags::CAMERA_POSE_TRACKED)
            .without(StatusFlags::POSITION_CONNECTED);
        let snapshot = reader_over(state).get_sensor_state_at_time(0.0).unwrap();
        assert!(snapshot.status_flags.contains(StatusFlags::ORIENTATION_TRACKED));
        assert!(!snapshot.status_flags.intersects(StatusFlags::POSITION_TRACKED));
        assert!(!snapshot.status_flags.intersects(StatusFlags::CAMERA_POSE_TRACKED));
    }

    #[test]
    fn test_snapshot_applies_cpf_offset_and_leveling() {
        let mut state = tracked(PoseSample::default());
        state.imu_from_cpf = Posed::new(Quatd::IDENTITY, Vec3d::new(0.0, 0.0, -0.1));
        state.world_from_camera =
            Posed::new(Quatd::from_axis_angle(Vec3d::X, 0.3), Vec3d::new(0.0, 1.0, 2.0));
        let snapshot = reader_over(state).get_sensor_state_at_time(0.0).unwrap();

        assert!((snapshot.head_pose.pose.translation.z + 0.1).abs() < 1e-12);
        assert_eq!(snapshot.camera_pose, state.world_from_camera);
        assert_eq!(snapshot.leveled_camera_pose.rotation, Quatd::IDENTITY);
        assert_eq!(
            snapshot.leveled_camera_pose.translation,
            state.world_from_camera.translation
        );
        assert_eq!(snapshot.head_pose.time_in_seconds, 0.0);
    }

    #[test]
    fn test_query_time_recorded_in_snapshot() {
        let reader = reader_over(tracked(PoseSample {
            time_in_seconds: 10.0,
            ..PoseSample::default()
        }));
        let snapshot = reader.get_sensor_state_at_time(10.02).unwrap();
        assert_eq!(snapshot.head_pose.time_in_seconds, 10.02);
    }

    #[test]
    fn test_clamp_warning_tracks_sample_time() {
        let reader = reader_over(tracked(PoseSample {
            linear_velocity: Vec3d::X,
            time_in_seconds: 5.0,
            ..PoseSample::default()
        }));
        assert_eq!(reader.prediction_interval(6.0, 5.0), MAX_PREDICTION_DT);
        assert_eq!(
            f64::from_bits(reader.last_clamp_warning.load(Ordering::Relaxed)),
            5.0
        );
        assert_eq!(reader.prediction_interval(4.0, 5.0), 0.0);
        assert_eq!(reader.prediction_interval(5.05, 5.0), 5.05 - 5.0);
    }

    #[test]
    fn test_recenter_removes_yaw_and_position() {
        let sample = PoseSample {
            pose: Posed::new(
                Quatd::from_yaw(0.8) * Quatd::from_axis_angle(Vec3d::X, 0.2),
                Vec3d::new(0.5, 1.6, -0.3),
            ),
            ..PoseSample::default()
        };
        let mut reader = reader_over(tracked(sample));
        reader.recenter_pose().unwrap();

        let pose = reader.get_pose_at_time(0.0).unwrap();
        let (yaw, pitch, _roll) = pose.rotation.yaw_pitch_roll();
        assert!(yaw.abs() < 1e-9);
        assert!((pitch - 0.2).abs() < 1e-9);
        assert!(pose.translation.length() < 1e-9);
    }
}
