//! In-process stand-in for named shared memory.
//!
//! Used on platforms without OS shared memory and by tests. Names are
//! case-insensitive; a block lives as long as any region maps it and
//! vanishes from the registry when the last one drops.
//!
//! Blocks reserve whole pages the way OS mappings do. A read-write open may
//! grow a block within its reservation; the larger size wins.

#![allow(unsafe_code)]

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use super::error::{ShmError, ShmResult};
use super::region::{AccessMode, Backing, RemoteAccess, SharedRegion};
use super::RegionBackend;

/// Alignment of every block, one cache line.
const BLOCK_ALIGN: usize = 64;

/// Reservation granularity.
const PAGE_SIZE: usize = 4096;

/// Heap memory behind one in-process region.
pub(crate) struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
    len: AtomicUsize,
}

// SAFETY: the block is plain zero-initialised memory; access through it is
// synchronised by whatever lives inside.
unsafe impl Send for Block {}
// SAFETY: see above.
unsafe impl Sync for Block {}

impl Block {
    fn allocate(len: usize) -> ShmResult<Self> {
        let reserved = len
            .checked_next_multiple_of(PAGE_SIZE)
            .ok_or(ShmError::InvalidParameters)?;
        let layout = Layout::from_size_align(reserved, BLOCK_ALIGN)
            .map_err(|_| ShmError::InvalidParameters)?;
        // SAFETY: `len` is non-zero, checked by `OpenParams::validate`.
        let ptr = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(ptr).ok_or(ShmError::OutOfMemory)?;
        Ok(Self {
            ptr,
            layout,
            len: AtomicUsize::new(len),
        })
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// Raises the size to `min_size` if the reservation allows it.
    fn grow(&self, min_size: usize) -> bool {
        if min_size > self.layout.size() {
            return false;
        }
        self.len.fetch_max(min_size, Ordering::AcqRel);
        true
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        // SAFETY: allocated in `allocate` with this exact layout.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Registry of in-process blocks, keyed by lower-cased name.
#[derive(Default)]
pub struct InProcessBackend {
    blocks: Mutex<HashMap<String, Weak<Block>>>,
}

impl InProcessBackend {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live blocks.
    #[must_use]
    pub fn live_regions(&self) -> usize {
        let mut blocks = self.blocks.lock();
        blocks.retain(|_, block| block.strong_count() > 0);
        blocks.len()
    }

    fn region(name: &str, block: Arc<Block>, access: AccessMode) -> SharedRegion {
        let len = block.len();
        let base = block.ptr;
        SharedRegion::new(name, len, access, base, Backing::InProcess(block))
    }
}

impl RegionBackend for InProcessBackend {
    fn kind(&self) -> &'static str {
        "in-process"
    }

    fn attempt_open(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
    ) -> ShmResult<SharedRegion> {
        let key = name.to_lowercase();
        let block = self
            .blocks
            .lock()
            .get(&key)
            .and_then(Weak::upgrade)
            .ok_or(ShmError::RegionUnavailable)?;
        let actual = block.len();
        if actual < min_size {
            let grown = access == AccessMode::ReadWrite && block.grow(min_size);
            if !grown {
                return Err(ShmError::SizeMismatch {
                    expected: min_size,
                    actual,
                });
            }
            debug!(name, from = actual, to = min_size, "grew in-process region");
        }
        Ok(Self::region(name, block, access))
    }

    fn attempt_create(
        &self,
        name: &str,
        min_size: usize,
        access: AccessMode,
        _remote: RemoteAccess,
        _replace: bool,
    ) -> ShmResult<SharedRegion> {
        let key = name.to_lowercase();
        let mut blocks = self.blocks.lock();
        if blocks.get(&key).is_some_and(|block| block.strong_count() > 0) {
            return Err(ShmError::AlreadyExists);
        }
        let block = Arc::new(Block::allocate(min_size)?);
        blocks.insert(key, Arc::downgrade(&block));
        debug!(name, size = min_size, "created in-process region");
        Ok(Self::region(name, block, access))
    }
}

impl std::fmt::Debug for InProcessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessBackend")
            .field("blocks", &self.blocks.lock().len())
            .finish()
    }
}
