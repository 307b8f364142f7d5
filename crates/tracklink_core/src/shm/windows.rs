//! Windows named file mapping backend (pagefile-backed sections).

#![allow(unsafe_code)]

use std::ffi::OsStr;
use std::io;
use std::iter;
use std::os::windows::ffi::OsStrExt;
use std::ptr::{self, NonNull};

use tracing::debug;
use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, LocalFree, ERROR_ACCESS_DENIED, ERROR_ALREADY_EXISTS,
    ERROR_FILE_NOT_FOUND, ERROR_INVALID_PARAMETER, ERROR_NOT_ENOUGH_MEMORY, ERROR_OUTOFMEMORY,
    HANDLE, INVALID_HANDLE_VALUE, WIN32_ERROR,
};
use windows_sys::Win32::Security::Authorization::{
    ConvertStringSecurityDescriptorToSecurityDescriptorW, SDDL_REVISION_1,
};
use windows_sys::Win32::Security::SECURITY_ATTRIBUTES;
use windows_sys::Win32::System::Memory::{
    CreateFileMappingW, MapViewOfFile, OpenFileMappingW, UnmapViewOfFile, VirtualQuery,
    FILE_MAP_READ, FILE_MAP_WRITE, MEMORY_BASIC_INFORMATION, MEMORY_MAPPED_VIEW_ADDRESS,
    PAGE_READONLY, PAGE_READWRITE,
};

use super::error::{ShmError, ShmResult};
use super::region::{AccessMode, Backing, RemoteAccess, SharedRegion};
use super::RegionBackend;

// Full control for SYSTEM and administrators; interactive users get read
// (GR) or read-write (GWGR).
const DACL_REMOTE_READ_ONLY: &str = "D:P(A;OICI;GA;;;SY)(A;OICI;GA;;;BA)(A;OICI;GR;;;IU)";
const DACL_REMOTE_READ_WRITE: &str = "D:P(A;OICI;GA;;;SY)(A;OICI;GA;;;BA)(A;OICI;GWGR;;;IU)";

/// A mapped view plus the section handle that keeps it alive.
pub(crate) struct MappedView {
    handle: HANDLE,
    view: MEMORY_MAPPED_VIEW_ADDRESS,
}

impl Drop for MappedView {
    fn drop(&mut self) {
        // SAFETY: both were obtained in `map_view` and are released once.
        unsafe {
            UnmapViewOfFile(self.view);
            CloseHandle(self.handle);
        }
    }
}

/// Backend over named, pagefile-backed file mappings.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    /// New backend.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Sections vanish with their last handle; nothing to unlink.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn unlink(_name: &str) -> ShmResult<()> {
        Ok(())
    }
}

fn wide(name: &str) -> Vec<u16> {
    OsStr::new(name).encode_wide().chain(iter::once(0)).collect()
}

fn last_error() -> ShmError {
    // SAFETY: reads thread-local error state.
    classify(unsafe { GetLastError() })
}

fn classify(code: WIN32_ERROR) -> ShmError {
    match code {
        ERROR_FILE_NOT_FOUND => ShmError::RegionUnavailable,
        ERROR_ALREADY_EXISTS => ShmError::AlreadyExists,
        ERROR_ACCESS_DENIED => ShmError::AccessDenied,
        ERROR_NOT_ENOUGH_MEMORY | ERROR_OUTOFMEMORY => ShmError::OutOfMemory,
        ERROR_INVALID_PARAMETER => ShmError::InvalidParameters,
        other => ShmError::Os(io::Error::from_raw_os_error(other as i32)),
    }
}

/// Maps the whole section and checks it holds at least `min_size` bytes.
///
/// Sections cannot grow, so a read-write open of a smaller one fails like a
/// read-only one.
fn map_view(
    name: &str,
    handle: HANDLE,
    min_size: usize,
    access: AccessMode,
) -> ShmResult<SharedRegion> {
    let desired = match access {
        AccessMode::ReadOnly => FILE_MAP_READ,
        AccessMode::ReadWrite => FILE_MAP_WRITE,
    };
    // SAFETY: `handle` is a valid section handle owned by this function.
    // A zero length maps the whole section.
    let view = unsafe { MapViewOfFile(handle, desired, 0, 0, 0) };
    let Some(base) = NonNull::new(view.Value.cast::<u8>()) else {
        let err = last_error();
        // SAFETY: closing the handle we own.
        unsafe { CloseHandle(handle) };
        return Err(err);
    };
    let mapped = MappedView { handle, view };

    let actual = view_len(base)?;
    if actual < min_size {
        return Err(ShmError::SizeMismatch {
            expected: min_size,
            actual,
        });
    }
    Ok(SharedRegion::new(name, min_size, access, base, Backing::View(mapped)))
}

/// Size of the view starting at `base`, rounded up to whole pages.
fn view_len(base: NonNull<u8>) -> ShmResult<usize> {
    // SAFETY: all-zero is a valid MEMORY_BASIC_INFORMATION.
    let mut info: MEMORY_BASIC_INFORMATION = unsafe { std::mem::zeroed() };
    // SAFETY: `info` is writable and sized as passed.
    let written = unsafe {
        VirtualQuery(
            base.as_ptr().cast_const().cast(),
            &mut info,
            std::mem::size_of::<MEMORY_BASIC_INFORMATION>(),
        )
    };
    if written == 0 {
        return Err(last_error());
    }
    Ok(info.RegionSize)
}

impl RegionBackend for WindowsBackend {
    fn kind(&self) -> &'static str {
        "windows"
    }

    fn attempt_open(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
    ) -> ShmResult<SharedRegion> {
        let desired = match access {
            AccessMode::ReadOnly => FILE_MAP_READ,
            AccessMode::ReadWrite => FILE_MAP_WRITE,
        };
        let wide_name = wide(name);
        // SAFETY: `wide_name` is NUL-terminated and outlives the call.
        let handle = unsafe { OpenFileMappingW(desired, 0, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(last_error());
        }
        map_view(name, handle, min_size, access)
    }

    fn attempt_create(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
        remote: RemoteAccess,
        _replace: bool,
    ) -> ShmResult<SharedRegion> {
        let size = u32::try_from(min_size).map_err(|_| ShmError::InvalidParameters)?;
        let dacl = wide(match remote {
            RemoteAccess::ReadOnly => DACL_REMOTE_READ_ONLY,
            RemoteAccess::ReadWrite => DACL_REMOTE_READ_WRITE,
        });

        let mut security = SECURITY_ATTRIBUTES {
            nLength: std::mem::size_of::<SECURITY_ATTRIBUTES>() as u32,
            lpSecurityDescriptor: ptr::null_mut(),
            bInheritHandle: 0,
        };
        // SAFETY: `dacl` is NUL-terminated; the descriptor is LocalAlloc'd
        // by the call and freed below.
        let converted = unsafe {
            ConvertStringSecurityDescriptorToSecurityDescriptorW(
                dacl.as_ptr(),
                SDDL_REVISION_1,
                &mut security.lpSecurityDescriptor,
                ptr::null_mut(),
            )
        };
        if converted == 0 {
            return Err(last_error());
        }

        let protect = match access {
            AccessMode::ReadOnly => PAGE_READONLY,
            AccessMode::ReadWrite => PAGE_READWRITE,
        };
        let wide_name = wide(name);
        // SAFETY: pagefile-backed section; every pointer outlives the call.
        let handle = unsafe {
            CreateFileMappingW(
                INVALID_HANDLE_VALUE,
                &security,
                protect,
                0,
                size,
                wide_name.as_ptr(),
            )
        };
        // Read before LocalFree can clobber it.
        // SAFETY: reads thread-local error state.
        let create_error = unsafe { GetLastError() };
        // SAFETY: allocated by the conversion above.
        unsafe { LocalFree(security.lpSecurityDescriptor) };

        if handle.is_null() {
            return Err(classify(create_error));
        }
        if create_error == ERROR_ALREADY_EXISTS {
            // SAFETY: closing the handle we own.
            unsafe { CloseHandle(handle) };
            return Err(ShmError::AlreadyExists);
        }
        debug!(name, size = min_size, "created file mapping");
        map_view(name, handle, min_size, access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wide_is_nul_terminated() {
        assert_eq!(wide("ab"), vec![u16::from(b'a'), u16::from(b'b'), 0]);
    }

    #[test]
    fn test_error_classification() {
        assert!(matches!(classify(ERROR_FILE_NOT_FOUND), ShmError::RegionUnavailable));
        assert!(matches!(classify(ERROR_ALREADY_EXISTS), ShmError::AlreadyExists));
        assert!(matches!(classify(ERROR_ACCESS_DENIED), ShmError::AccessDenied));
    }

    #[test]
    fn test_open_rejects_small_section() {
        let name = format!("tracklink_small_{}", std::process::id());
        let backend = WindowsBackend::new();
        let created = backend
            .attempt_create(&name, 4096, AccessMode::ReadWrite, RemoteAccess::ReadOnly, true)
            .unwrap();
        assert_eq!(created.len(), 4096);

        let opened = backend.attempt_open(&name, 64, AccessMode::ReadOnly).unwrap();
        assert_eq!(opened.len(), 64);
        for access in [AccessMode::ReadOnly, AccessMode::ReadWrite] {
            assert!(matches!(
                backend.attempt_open(&name, 1 << 20, access),
                Err(ShmError::SizeMismatch { expected, actual: 4096 }) if expected == 1 << 20
            ));
        }
    }
}
