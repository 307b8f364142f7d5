//! # Typed State Handles
//!
//! [`StateWriter`] and [`StateReader`] put a [`LocklessCell`] inside a named
//! region behind a small header:
//!
//! ```text
//!   offset 0   ┌────────────────────────────────┐
//!              │ RegionHeader (16 bytes)        │  magic published last
//!   offset 16  ├────────────────────────────────┤
//!              │ LocklessCell<T>                │  begin, end, 2 envelopes
//!              └────────────────────────────────┘
//! ```
//!
//! The block size does not depend on `T`, so writers and readers built from
//! different revisions of the payload still agree on the region size.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::Pod;
use tracing::{debug, error, info};

use crate::shm::{
    AccessMode, OpenMode, OpenParams, RegionFactory, RemoteAccess, SharedRegion, ShmError,
    ShmResult,
};
use crate::sync::{LocklessCell, ENVELOPE_CAPACITY};

/// Marks a region whose header has been written ("TKLN").
pub const REGION_MAGIC: u32 = 0x544B_4C4E;

/// Bumped whenever the block layout changes.
pub const LAYOUT_VERSION: u32 = 1;

/// Header at the start of every state region.
#[repr(C)]
#[derive(Debug)]
pub struct RegionHeader {
    magic: AtomicU32,
    layout_version: AtomicU32,
    envelope_capacity: AtomicU32,
    payload_size: AtomicU32,
}

impl RegionHeader {
    fn publish(&self, payload_size: usize) {
        self.layout_version.store(LAYOUT_VERSION, Ordering::Relaxed);
        self.envelope_capacity
            .store(ENVELOPE_CAPACITY as u32, Ordering::Relaxed);
        self.payload_size.store(payload_size as u32, Ordering::Relaxed);
        self.magic.store(REGION_MAGIC, Ordering::Release);
    }

    fn is_published(&self) -> bool {
        self.magic.load(Ordering::Acquire) == REGION_MAGIC
    }

    fn validate(&self) -> ShmResult<()> {
        if !self.is_published() {
            return Ok(());
        }
        if self.layout_version.load(Ordering::Relaxed) != LAYOUT_VERSION {
            return Err(ShmError::LayoutMismatch("layout version"));
        }
        if self.envelope_capacity.load(Ordering::Relaxed) != ENVELOPE_CAPACITY as u32 {
            return Err(ShmError::LayoutMismatch("envelope capacity"));
        }
        Ok(())
    }

    /// Payload size recorded by the writer, if published.
    fn payload_size(&self) -> Option<usize> {
        self.is_published()
            .then(|| self.payload_size.load(Ordering::Relaxed) as usize)
    }
}

#[repr(C)]
struct SharedBlock<T> {
    header: RegionHeader,
    cell: LocklessCell<T>,
}

/// Bytes a state region occupies.
#[must_use]
pub const fn region_size<T>() -> usize {
    size_of::<SharedBlock<T>>()
}

fn block_ptr<T>(base: NonNull<u8>) -> ShmResult<NonNull<SharedBlock<T>>> {
    if base.as_ptr() as usize % align_of::<SharedBlock<T>>() != 0 {
        return Err(ShmError::LayoutMismatch("misaligned region"));
    }
    Ok(base.cast())
}

/// Publishing side of a named state region.
///
/// One per region. Not `Sync`; `set_state` takes `&mut self`.
pub struct StateWriter<T: Pod> {
    block: NonNull<SharedBlock<T>>,
    region: SharedRegion,
    _payload: PhantomData<T>,
}

// SAFETY: the mapping is process-wide; the handle can move between threads.
unsafe impl<T: Pod + Send> Send for StateWriter<T> {}

impl<T: Pod + Default> StateWriter<T> {
    /// Creates (or reattaches to) the named region, constructs the cell with
    /// `T::default()`, and publishes the header.
    ///
    /// Other users get read-only access to a region created here.
    ///
    /// # Errors
    ///
    /// [`ShmError::CreateFailed`] wrapping the backend failure.
    pub fn open(factory: &RegionFactory, name: &str) -> ShmResult<Self> {
        let params = OpenParams::new(name, region_size::<T>())
            .open_mode(OpenMode::CreateOrOpen)
            .access(AccessMode::ReadWrite)
            .remote(RemoteAccess::ReadOnly);

        let create_failed = |source: ShmError| {
            error!(name, error = %source, "unable to create shared state region");
            ShmError::CreateFailed {
                name: name.to_owned(),
                source: Box::new(source),
            }
        };

        let region = factory.open(&params).map_err(create_failed)?;
        let base = region
            .as_mut_ptr()
            .ok_or(ShmError::AccessDenied)
            .map_err(create_failed)?;
        let block = block_ptr::<T>(base).map_err(create_failed)?;

        let writer = Self {
            block,
            region,
            _payload: PhantomData,
        };
        writer.construct();
        info!(name, size = writer.region.len(), "shared state writer ready");
        Ok(writer)
    }

    fn construct(&self) {
        let block = self.block();
        // A reattached region may carry a dead writer's counters and values.
        // SAFETY: this writer is the only one for the region.
        unsafe { block.cell.reset(T::default()) };
        block.header.publish(size_of::<T>());
    }
}

impl<T: Pod> StateWriter<T> {
    fn block(&self) -> &SharedBlock<T> {
        // SAFETY: `block` points into `region`, which is mapped read-write,
        // aligned, at least `region_size::<T>()` bytes, and lives as long as
        // `self`. Every field is atomics or `UnsafeCell`.
        unsafe { self.block.as_ref() }
    }

    /// Publishes `value` to every reader. Never blocks.
    pub fn set_state(&mut self, value: T) {
        // SAFETY: `&mut self` and `!Sync` keep this the only writer in-process.
        unsafe { self.block().cell.set_state(value) };
    }

    /// Number of completed publishes, modulo 2^32.
    #[must_use]
    pub fn update_count(&self) -> u32 {
        self.block().cell.update_count()
    }

    /// Region name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.region.name()
    }
}

impl<T: Pod> std::fmt::Debug for StateWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWriter")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

/// Reading side of a named state region.
///
/// Maps the region read-only and never writes to it. Safe to share between
/// threads.
pub struct StateReader<T: Pod> {
    block: NonNull<SharedBlock<T>>,
    region: SharedRegion,
    _payload: PhantomData<T>,
}

// SAFETY: reads go through atomics and validated volatile copies.
unsafe impl<T: Pod + Send> Send for StateReader<T> {}
// SAFETY: see above.
unsafe impl<T: Pod + Send> Sync for StateReader<T> {}

impl<T: Pod> StateReader<T> {
    /// Attaches read-only to an existing region. Never creates one.
    ///
    /// # Errors
    ///
    /// [`ShmError::RegionUnavailable`] or [`ShmError::NotReady`] when no
    /// writer has created the region yet (retry later),
    /// [`ShmError::LayoutMismatch`] when it was published
    /// by an incompatible writer.
    pub fn open(factory: &RegionFactory, name: &str) -> ShmResult<Self> {
        let params = OpenParams::new(name, region_size::<T>())
            .open_mode(OpenMode::OpenOnly)
            .access(AccessMode::ReadOnly);

        let region = factory.open(&params)?;
        let base = NonNull::new(region.as_ptr().cast_mut()).ok_or(ShmError::OutOfMemory)?;
        let block = block_ptr::<T>(base)?;

        let reader = Self {
            block,
            region,
            _payload: PhantomData,
        };
        reader.block().header.validate()?;
        if let Some(size) = reader.block().header.payload_size() {
            if size != size_of::<T>() {
                debug!(
                    name,
                    writer = size,
                    reader = size_of::<T>(),
                    "payload size differs from writer"
                );
            }
        }
        Ok(reader)
    }

    fn block(&self) -> &SharedBlock<T> {
        // SAFETY: `block` points into `region`, which stays mapped for the
        // lifetime of `self`. Only loads are performed through it.
        unsafe { self.block.as_ref() }
    }

    /// Latest complete value. Lock-free, never torn.
    #[must_use]
    pub fn get_state(&self) -> T {
        self.block().cell.get_state()
    }

    /// True once a writer has constructed the region.
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.block().header.is_published()
    }

    /// Number of completed publishes, modulo 2^32.
    #[must_use]
    pub fn update_count(&self) -> u32 {
        self.block().cell.update_count()
    }

    /// Region name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.region.name()
    }
}

impl<T: Pod> std::fmt::Debug for StateReader<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateReader")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}
