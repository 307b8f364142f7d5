//! CSV statistics log.
//!
//! One header row per file, one row per emitted epoch. Rows from several
//! sessions accumulate in the same file; the GUID column tells them apart.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use sysinfo::System;
use tracing::{info, warn};
use tracklink_core::monotonic_seconds;
use uuid::Uuid;

use crate::error::{LatencyError, LatencyResult};
use crate::observer::LatencyObserver;
use crate::results::LatencyStatisticsResults;

/// Column names, in row order.
pub const CSV_HEADER: &str = "GUID,OS,OSVersion,Process,DisplayDriver,CameraDriver,GPU,\
Time,Interval,FPS,EndFrameExecutionTime,LatencyRender,LatencyTimewarp,LatencyPostPresent,\
LatencyVisionProc,LatencyVisionFrame,UserData1";

/// Columns describing the machine and session, fixed for one `start`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionInfo {
    /// Random per-session identifier.
    pub guid: String,
    /// Operating system name.
    pub os: String,
    /// Operating system version.
    pub os_version: String,
    /// Executable name and pid.
    pub process: String,
    /// Display driver version, empty when unknown.
    pub display_driver: String,
    /// Camera driver version, empty when unknown.
    pub camera_driver: String,
    /// Graphics adapters, `; `-separated, empty when unknown.
    pub gpu: String,
}

impl SessionInfo {
    /// Describes the current machine and process under a fresh GUID.
    #[must_use]
    pub fn collect() -> Self {
        let exe = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
            .unwrap_or_default();

        Self {
            guid: Uuid::new_v4().to_string(),
            os: System::name().unwrap_or_default(),
            os_version: System::os_version().unwrap_or_default(),
            process: format!("{exe} ({})", std::process::id()),
            ..Self::default()
        }
    }
}

struct OpenLog {
    path: PathBuf,
    file_name: String,
    user_data1: String,
    session: SessionInfo,
    out: BufWriter<File>,
}

/// Appends every emitted epoch to a CSV file while started.
///
/// Register it with [`LatencyAggregator::add_observer`](crate::LatencyAggregator::add_observer);
/// epochs arriving while stopped are ignored.
#[derive(Default)]
pub struct LatencyCsvSink {
    log: Mutex<Option<OpenLog>>,
}

impl LatencyCsvSink {
    /// Stopped sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens `dir/file_name` for appending, writing the header if the file is new.
    ///
    /// Restarting with the file already open only replaces `user_data1`;
    /// a different name closes the current file first.
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be opened, created or written.
    pub fn start(&self, dir: &Path, file_name: &str, user_data1: &str) -> LatencyResult<()> {
        let mut log = self.log.lock();

        if let Some(open) = log.as_mut() {
            if open.file_name == file_name {
                open.user_data1 = user_data1.to_owned();
                return Ok(());
            }
        }
        if let Some(previous) = log.take() {
            close(previous);
        }

        let path = dir.join(file_name);
        let out = open_or_create(&path).map_err(|source| LatencyError::Io {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), "latency log started");

        *log = Some(OpenLog {
            path,
            file_name: file_name.to_owned(),
            user_data1: user_data1.to_owned(),
            session: SessionInfo::collect(),
            out,
        });
        Ok(())
    }

    /// Flushes and closes the file. Returns false if it was not started.
    pub fn stop(&self) -> bool {
        match self.log.lock().take() {
            Some(open) => {
                close(open);
                true
            }
            None => false,
        }
    }

    /// True between `start` and `stop`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.log.lock().is_some()
    }

    /// Path of the open file.
    #[must_use]
    pub fn path(&self) -> Option<PathBuf> {
        self.log.lock().as_ref().map(|open| open.path.clone())
    }

    /// Session columns of the open file.
    #[must_use]
    pub fn session(&self) -> Option<SessionInfo> {
        self.log.lock().as_ref().map(|open| open.session.clone())
    }

    /// Writes one row for `results`. Does nothing while stopped.
    ///
    /// # Errors
    ///
    /// `Io` when the row cannot be written.
    pub fn write_results(&self, results: &LatencyStatisticsResults) -> LatencyResult<()> {
        let mut log = self.log.lock();
        let Some(open) = log.as_mut() else {
            return Ok(());
        };
        let row = format_row(&open.session, monotonic_seconds(), results, &open.user_data1);
        open.out
            .write_all(row.as_bytes())
            .and_then(|()| open.out.flush())
            .map_err(|source| LatencyError::Io {
                path: open.path.clone(),
                source,
            })
    }
}

impl LatencyObserver for LatencyCsvSink {
    fn on_results(&self, results: &LatencyStatisticsResults) {
        if let Err(error) = self.write_results(results) {
            warn!(%error, "latency row dropped");
        }
    }
}

impl Drop for LatencyCsvSink {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for LatencyCsvSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LatencyCsvSink")
            .field("path", &self.path())
            .finish()
    }
}

fn open_or_create(path: &Path) -> io::Result<BufWriter<File>> {
    match OpenOptions::new().append(true).open(path) {
        Ok(file) => Ok(BufWriter::new(file)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            let mut out = BufWriter::new(File::create(path)?);
            writeln!(out, "{CSV_HEADER}")?;
            out.flush()?;
            Ok(out)
        }
        Err(error) => Err(error),
    }
}

fn close(mut open: OpenLog) {
    if let Err(error) = open.out.flush() {
        warn!(path = %open.path.display(), %error, "latency log flush failed");
    }
    info!(path = %open.path.display(), "latency log stopped");
}

fn format_row(
    session: &SessionInfo,
    time: f64,
    results: &LatencyStatisticsResults,
    user_data1: &str,
) -> String {
    format!(
        "{},{},{},{},{},{},{},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{:.6},{}\n",
        field(&session.guid),
        field(&session.os),
        field(&session.os_version),
        field(&session.process),
        field(&session.display_driver),
        field(&session.camera_driver),
        field(&session.gpu),
        time,
        results.interval_seconds,
        results.fps,
        results.end_frame_execution_time,
        results.latency_render,
        results.latency_timewarp,
        results.latency_post_present,
        results.latency_vision_proc,
        results.latency_vision_frame,
        field(user_data1),
    )
}

/// Quotes a text column when it would break the row.
fn field(text: &str) -> std::borrow::Cow<'_, str> {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\"")).into()
    } else {
        text.into()
    }
}
