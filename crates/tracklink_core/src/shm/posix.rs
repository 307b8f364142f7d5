//! POSIX shared memory backend (`shm_open` + `mmap`).

#![allow(unsafe_code)]

use std::fs::{File, Permissions};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::ptr::NonNull;

use memmap2::MmapOptions;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::mman::{shm_open, shm_unlink};
use nix::sys::stat::Mode;
use tracing::{debug, warn};

use super::error::{ShmError, ShmResult};
use super::region::{AccessMode, Backing, RemoteAccess, SharedRegion};
use super::RegionBackend;

/// Backend over `/dev/shm`-style named segments.
#[derive(Clone, Copy, Debug)]
pub struct PosixBackend {
    replace_stale: bool,
}

impl Default for PosixBackend {
    fn default() -> Self {
        Self {
            replace_stale: true,
        }
    }
}

impl PosixBackend {
    /// Backend that unlinks a stale segment of the same name before an
    /// explicit create.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Controls whether an explicit create first unlinks an existing segment.
    ///
    /// With `false`, creating over an existing segment fails with
    /// [`ShmError::AlreadyExists`]. Create-or-open never unlinks: the
    /// segment may belong to a creator that is still sizing it.
    #[must_use]
    pub fn with_replace_stale(mut self, replace_stale: bool) -> Self {
        self.replace_stale = replace_stale;
        self
    }

    /// Removes the named segment. Existing mappings stay valid.
    ///
    /// # Errors
    ///
    /// [`ShmError::RegionUnavailable`] when nothing by that name exists.
    pub fn unlink(name: &str) -> ShmResult<()> {
        shm_unlink(segment_path(name).as_str()).map_err(classify_errno)
    }
}

fn segment_path(name: &str) -> String {
    format!("/{name}")
}

fn creation_mode(access: AccessMode, remote: RemoteAccess) -> Mode {
    let owner = match access {
        AccessMode::ReadOnly => Mode::S_IRUSR,
        AccessMode::ReadWrite => Mode::S_IRUSR | Mode::S_IWUSR,
    };
    let others = match remote {
        RemoteAccess::ReadOnly => Mode::S_IRGRP | Mode::S_IROTH,
        RemoteAccess::ReadWrite => {
            Mode::S_IRGRP | Mode::S_IROTH | Mode::S_IWGRP | Mode::S_IWOTH
        }
    };
    owner | others
}

fn classify_errno(errno: Errno) -> ShmError {
    classify_io(io::Error::from(errno))
}

fn classify_io(err: io::Error) -> ShmError {
    match err.kind() {
        io::ErrorKind::NotFound => ShmError::RegionUnavailable,
        io::ErrorKind::AlreadyExists => ShmError::AlreadyExists,
        io::ErrorKind::PermissionDenied => ShmError::AccessDenied,
        io::ErrorKind::OutOfMemory => ShmError::OutOfMemory,
        _ if err.raw_os_error() == Some(Errno::ENOSPC as i32) => ShmError::OutOfMemory,
        _ => ShmError::Os(err),
    }
}

fn map_file(name: &str, file: &File, len: usize, access: AccessMode) -> ShmResult<SharedRegion> {
    match access {
        AccessMode::ReadOnly => {
            // SAFETY: the segment is at least `len` bytes; concurrent writers
            // are expected and every access goes through atomics or volatile
            // copies.
            let map = unsafe { MmapOptions::new().len(len).map(file) }.map_err(classify_io)?;
            let base = NonNull::new(map.as_ptr().cast_mut()).ok_or(ShmError::OutOfMemory)?;
            Ok(SharedRegion::new(name, len, access, base, Backing::ReadOnlyMap(map)))
        }
        AccessMode::ReadWrite => {
            // SAFETY: as above.
            let mut map =
                unsafe { MmapOptions::new().len(len).map_mut(file) }.map_err(classify_io)?;
            let base = NonNull::new(map.as_mut_ptr()).ok_or(ShmError::OutOfMemory)?;
            Ok(SharedRegion::new(name, len, access, base, Backing::ReadWriteMap(map)))
        }
    }
}

impl RegionBackend for PosixBackend {
    fn kind(&self) -> &'static str {
        "posix"
    }

    fn attempt_open(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
    ) -> ShmResult<SharedRegion> {
        let flags = match access {
            AccessMode::ReadOnly => OFlag::O_RDONLY,
            AccessMode::ReadWrite => OFlag::O_RDWR,
        };
        let fd = shm_open(segment_path(name).as_str(), flags, Mode::empty())
            .map_err(classify_errno)?;
        let file = File::from(fd);

        let actual = usize::try_from(file.metadata()?.len()).map_err(|_| ShmError::OutOfMemory)?;
        if actual == 0 {
            // Creator has not sized it yet.
            return Err(ShmError::NotReady);
        }
        if actual < min_size {
            match access {
                AccessMode::ReadWrite => file.set_len(min_size as u64).map_err(classify_io)?,
                AccessMode::ReadOnly => {
                    return Err(ShmError::SizeMismatch {
                        expected: min_size,
                        actual,
                    })
                }
            }
        }
        map_file(name, &file, min_size, access)
    }

    fn attempt_create(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
        remote: RemoteAccess,
        replace: bool,
    ) -> ShmResult<SharedRegion> {
        let path = segment_path(name);
        if replace && self.replace_stale {
            match shm_unlink(path.as_str()) {
                Ok(()) => debug!(name, "unlinked stale segment"),
                Err(Errno::ENOENT) => {}
                Err(errno) => debug!(name, %errno, "could not unlink stale segment"),
            }
        }

        // Sizing needs a writable descriptor even for a read-only mapping.
        let mode = creation_mode(access, remote);
        let fd = shm_open(
            path.as_str(),
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_RDWR,
            mode,
        )
        .map_err(classify_errno)?;
        let file = File::from(fd);

        // The umask may have stripped the remote bits.
        if let Err(err) = file.set_permissions(Permissions::from_mode(u32::from(mode.bits()))) {
            warn!(name, error = %err, "could not apply segment permissions");
        }
        file.set_len(min_size as u64).map_err(classify_io)?;
        debug!(name, size = min_size, "created posix segment");
        map_file(name, &file, min_size, access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_mode_bits() {
        let ro = creation_mode(AccessMode::ReadWrite, RemoteAccess::ReadOnly);
        assert_eq!(u32::from(ro.bits()), 0o644);
        let rw = creation_mode(AccessMode::ReadWrite, RemoteAccess::ReadWrite);
        assert_eq!(u32::from(rw.bits()), 0o666);
        let owner_ro = creation_mode(AccessMode::ReadOnly, RemoteAccess::ReadOnly);
        assert_eq!(u32::from(owner_ro.bits()), 0o444);
    }

    #[test]
    fn test_errno_classification() {
        assert!(matches!(classify_errno(Errno::ENOENT), ShmError::RegionUnavailable));
        assert!(matches!(classify_errno(Errno::EEXIST), ShmError::AlreadyExists));
        assert!(matches!(classify_errno(Errno::EACCES), ShmError::AccessDenied));
        assert!(matches!(classify_errno(Errno::ENOMEM), ShmError::OutOfMemory));
        assert!(matches!(classify_errno(Errno::ENOSPC), ShmError::OutOfMemory));
        assert!(matches!(classify_errno(Errno::EBADF), ShmError::Os(_)));
    }

    #[test]
    fn test_path_prefix() {
        assert_eq!(segment_path("pose"), "/pose");
    }
}
