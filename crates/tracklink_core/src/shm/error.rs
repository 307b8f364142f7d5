//! Shared memory error types.

use std::io;

use thiserror::Error;

/// Errors raised while creating, opening, or mapping a named region.
#[derive(Debug, Error)]
pub enum ShmError {
    /// No region with that name exists (yet).
    #[error("shared region is not available")]
    RegionUnavailable,

    /// The region exists but its creator has not sized it yet.
    #[error("shared region is still being created")]
    NotReady,

    /// Exclusive creation found an existing region.
    #[error("shared region already exists")]
    AlreadyExists,

    /// The OS refused the requested access.
    #[error("access to shared region denied")]
    AccessDenied,

    /// The OS could not back or map the region.
    #[error("out of memory while creating shared region")]
    OutOfMemory,

    /// The existing region is smaller than required.
    #[error("shared region is {actual} bytes, need at least {expected}")]
    SizeMismatch {
        /// Minimum size the caller asked for.
        expected: usize,
        /// Size the region actually has.
        actual: usize,
    },

    /// Name, size, or mode combination is not usable.
    #[error("invalid shared region parameters")]
    InvalidParameters,

    /// The region was published by an incompatible writer.
    #[error("shared region layout mismatch: {0}")]
    LayoutMismatch(&'static str),

    /// The writer could not create or map its region.
    #[error("failed to create shared region `{name}`")]
    CreateFailed {
        /// Region name.
        name: String,
        /// What went wrong.
        #[source]
        source: Box<ShmError>,
    },

    /// The platform has no shared memory backend.
    #[error("shared memory is not supported on this platform")]
    Unsupported,

    /// Any other OS failure.
    #[error("shared memory OS error: {0}")]
    Os(#[from] io::Error),
}

impl ShmError {
    /// True when retrying the same open later may succeed.
    ///
    /// A reader that starts before the writer sees [`ShmError::RegionUnavailable`]
    /// or [`ShmError::NotReady`] and is expected to retry; everything else is
    /// a configuration or platform problem.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::RegionUnavailable | Self::NotReady)
    }
}

/// Convenience alias.
pub type ShmResult<T> = Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_missing_or_unsized_region_is_recoverable() {
        assert!(ShmError::RegionUnavailable.is_recoverable());
        assert!(ShmError::NotReady.is_recoverable());
        assert!(!ShmError::AccessDenied.is_recoverable());
        assert!(!ShmError::SizeMismatch { expected: 2, actual: 1 }.is_recoverable());
    }

    #[test]
    fn test_create_failed_keeps_cause() {
        let err = ShmError::CreateFailed {
            name: "pose".to_string(),
            source: Box::new(ShmError::OutOfMemory),
        };
        assert!(err.to_string().contains("pose"));
        let cause = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(cause.as_deref(), Some("out of memory while creating shared region"));
    }
}
