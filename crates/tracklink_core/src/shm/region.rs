//! Mapped named regions and the parameters used to open them.

#![allow(unsafe_code)]

use std::ptr::NonNull;
use std::sync::Arc;

use super::error::{ShmError, ShmResult};
use super::in_process::Block;

/// How a region should be obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OpenMode {
    /// Create a fresh region; an existing one is an error or is replaced,
    /// depending on the backend.
    CreateOnly,
    /// Attach to an existing region, never create.
    OpenOnly,
    /// Attach if present, otherwise create.
    #[default]
    CreateOrOpen,
}

/// Access this process requests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AccessMode {
    /// Map read-only. Writing through the mapping is impossible.
    ReadOnly,
    /// Map read-write.
    #[default]
    ReadWrite,
}

/// Access granted to other users when this process creates the region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RemoteAccess {
    /// Others may only read.
    #[default]
    ReadOnly,
    /// Others may read and write.
    ReadWrite,
}

/// Everything needed to open or create a named region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenParams {
    /// Global region name. Plain name, no path separators.
    pub name: String,
    /// Minimum usable size in bytes.
    pub min_size: usize,
    /// Create / open policy.
    pub open_mode: OpenMode,
    /// Local access.
    pub access: AccessMode,
    /// Access for other users when created here.
    pub remote: RemoteAccess,
}

impl OpenParams {
    /// Read-write, create-or-open parameters for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>, min_size: usize) -> Self {
        Self {
            name: name.into(),
            min_size,
            open_mode: OpenMode::default(),
            access: AccessMode::default(),
            remote: RemoteAccess::default(),
        }
    }

    /// Sets the open mode.
    #[must_use]
    pub fn open_mode(mut self, open_mode: OpenMode) -> Self {
        self.open_mode = open_mode;
        self
    }

    /// Sets the local access mode.
    #[must_use]
    pub fn access(mut self, access: AccessMode) -> Self {
        self.access = access;
        self
    }

    /// Sets the access granted to other users.
    #[must_use]
    pub fn remote(mut self, remote: RemoteAccess) -> Self {
        self.remote = remote;
        self
    }

    /// Rejects empty names, names containing path separators, zero sizes,
    /// and read-only creation.
    ///
    /// # Errors
    ///
    /// Returns [`ShmError::InvalidParameters`].
    pub fn validate(&self) -> ShmResult<()> {
        let bad_name = self.name.is_empty() || self.name.contains(['/', '\\', '\0']);
        // A region cannot be sized through a read-only handle.
        let read_only_create =
            self.open_mode == OpenMode::CreateOnly && self.access == AccessMode::ReadOnly;
        if bad_name || self.min_size == 0 || read_only_create {
            return Err(ShmError::InvalidParameters);
        }
        Ok(())
    }
}

/// What keeps a mapping alive. Dropping it unmaps.
#[allow(dead_code)]
pub(crate) enum Backing {
    #[cfg(unix)]
    ReadOnlyMap(memmap2::Mmap),
    #[cfg(unix)]
    ReadWriteMap(memmap2::MmapMut),
    #[cfg(windows)]
    View(super::windows::MappedView),
    InProcess(Arc<Block>),
}

/// A mapped, named region of shared memory.
///
/// The mapping stays valid for the lifetime of this value and moves with it;
/// the base address never changes.
pub struct SharedRegion {
    name: String,
    len: usize,
    access: AccessMode,
    base: NonNull<u8>,
    _backing: Backing,
}

// SAFETY: the mapping is process-wide and not tied to the creating thread.
unsafe impl Send for SharedRegion {}
// SAFETY: `SharedRegion` only hands out raw pointers; synchronising access
// through them is the caller's job.
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    pub(crate) fn new(
        name: &str,
        len: usize,
        access: AccessMode,
        base: NonNull<u8>,
        backing: Backing,
    ) -> Self {
        Self {
            name: name.to_owned(),
            len,
            access,
            base,
            _backing: backing,
        }
    }

    /// Region name as passed to the factory.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mapped size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the mapping is empty (never for a successfully opened region).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Access mode the region was mapped with.
    #[must_use]
    pub fn access(&self) -> AccessMode {
        self.access
    }

    /// Base address of the mapping.
    #[must_use]
    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Base address for writing, or `None` for a read-only mapping.
    #[must_use]
    pub fn as_mut_ptr(&self) -> Option<NonNull<u8>> {
        match self.access {
            AccessMode::ReadWrite => Some(self.base),
            AccessMode::ReadOnly => None,
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("len", &self.len)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}
