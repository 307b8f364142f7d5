//! Tracking error types.

use std::io;

use thiserror::Error;

/// Errors raised while reading or persisting tracking state.
#[derive(Debug, Error)]
pub enum TrackingError {
    /// Status bits report no connected hardware or no tracking.
    ///
    /// Recoverable: keep rendering with a default pose.
    #[error("no tracking available")]
    NoTracking,

    /// The reader has no sensor state source.
    #[error("tracking reader is not attached to a sensor state source")]
    NotAttached,

    /// The centered-frame profile could not be read or written.
    #[error("centered frame profile: {0}")]
    Profile(#[from] ProfileError),
}

/// Profile persistence failures.
#[derive(Debug, Error)]
pub enum ProfileError {
    /// File system failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// File contents are not a valid profile.
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Profile could not be encoded.
    #[error("serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Convenience alias.
pub type TrackingResult<T> = Result<T, TrackingError>;
