//! Latency error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the aggregator configuration and the CSV sink.
#[derive(Debug, Error)]
pub enum LatencyError {
    /// Epoch lengths that cannot produce a result.
    #[error("invalid aggregator config: {0}")]
    InvalidConfig(&'static str),

    /// The statistics file could not be opened or written.
    #[error("latency log {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: io::Error,
    },
}

/// Convenience alias.
pub type LatencyResult<T> = Result<T, LatencyError>;
