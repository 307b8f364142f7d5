//! # Named Shared Memory
//!
//! ```text
//!   RegionFactory ──► RegionBackend ──► SharedRegion
//!        │              ├─ PosixBackend     (unix)
//!        │              ├─ WindowsBackend   (windows)
//!        │              └─ InProcessBackend (everywhere, tests)
//!        └─ retries create/open (3 attempts by default)
//! ```
//!
//! A writer process creates a region and grants other users read access; a
//! reader process opens it read-only. The region outlives neither side: it
//! is unmapped when the last [`SharedRegion`] in a process drops.

mod error;
mod factory;
mod in_process;
mod region;

#[cfg(unix)]
mod posix;
#[cfg(windows)]
mod windows;

pub use error::{ShmError, ShmResult};
pub use factory::{RegionFactory, DEFAULT_ATTEMPTS};
pub use in_process::InProcessBackend;
pub use region::{AccessMode, OpenMode, OpenParams, RemoteAccess, SharedRegion};

#[cfg(unix)]
pub use posix::PosixBackend;
#[cfg(windows)]
pub use windows::WindowsBackend;

/// The OS-backed implementation for the current target.
#[cfg(unix)]
pub type PlatformBackend = PosixBackend;
/// The OS-backed implementation for the current target.
#[cfg(windows)]
pub type PlatformBackend = WindowsBackend;

/// One way of obtaining named regions.
///
/// Implementations perform a single attempt; retrying and the open-mode
/// policy live in [`RegionFactory`].
pub trait RegionBackend: Send + Sync {
    /// Short name for logs.
    fn kind(&self) -> &'static str;

    /// Maps an existing region.
    ///
    /// # Errors
    ///
    /// [`ShmError::RegionUnavailable`] when nothing by that name exists,
    /// [`ShmError::NotReady`] when it exists but its creator has not sized it.
    fn attempt_open(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
    ) -> ShmResult<SharedRegion>;

    /// Creates and maps a new, zero-filled region of `min_size` bytes.
    ///
    /// `replace` is set only for an explicit create; a backend may then
    /// discard a leftover region of the same name. Without it an existing
    /// region must be left alone.
    ///
    /// # Errors
    ///
    /// [`ShmError::AlreadyExists`] when a region of that name exists and is
    /// not replaced.
    fn attempt_create(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
        remote: RemoteAccess,
        replace: bool,
    ) -> ShmResult<SharedRegion>;
}
