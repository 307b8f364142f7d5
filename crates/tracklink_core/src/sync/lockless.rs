//! # Lockless Single-Writer Cell
//!
//! Wait-free publishing, lock-free reading of one POD value.
//!
//! ## Safety Note
//!
//! This module requires unsafe code: the slots are plain memory that the
//! writer overwrites while readers copy them. Torn copies are detected by the
//! two counters and discarded, never returned.

#![allow(unsafe_code)]
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────────────────────────────────────┐
//!   │               LocklessCell<T>                │
//!   │                                              │
//!   │   begin: u32 ──┐              ┌── end: u32   │
//!   │                ▼              ▼              │
//!   │   ┌──────────────────┐ ┌──────────────────┐  │
//!   │   │ slot[0] Envelope │ │ slot[1] Envelope │  │
//!   │   └──────────────────┘ └──────────────────┘  │
//!   └──────────────────────────────────────────────┘
//!
//!   writer:  begin += 1 ─► write slot[begin & 1] ─► end += 1
//!   reader:  e = end ─► copy slot[e & 1] ─► begin == e ? done
//!                     └► else copy slot[(begin & 1) ^ 1], recheck begin
//! ```
//!
//! The counters are 32-bit so a 32-bit reader and a 64-bit writer agree on
//! the layout. Readers only ever load, so a cell can live in a mapping the
//! reader has no write access to.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::sync::Arc;

use bytemuck::Pod;

use super::envelope::Envelope;

/// Single-writer, multi-reader cell holding a `T`.
///
/// `T` travels through an [`Envelope`], so the cell's size and layout do not
/// depend on `T`.
#[repr(C)]
pub struct LocklessCell<T> {
    begin: AtomicU32,
    end: AtomicU32,
    slots: [UnsafeCell<Envelope>; 2],
    _payload: PhantomData<T>,
}

// SAFETY: slots are only written through `set_state`, whose contract admits a
// single writer; readers copy with volatile loads and validate the copy.
unsafe impl<T: Pod + Send> Send for LocklessCell<T> {}
// SAFETY: see above.
unsafe impl<T: Pod + Send> Sync for LocklessCell<T> {}

impl<T: Pod> LocklessCell<T> {
    /// Creates a cell whose both slots hold `initial`.
    #[must_use]
    pub fn new(initial: T) -> Self {
        let envelope = Envelope::pack(&initial);
        Self {
            begin: AtomicU32::new(0),
            end: AtomicU32::new(0),
            slots: [UnsafeCell::new(envelope), UnsafeCell::new(envelope)],
            _payload: PhantomData,
        }
    }

    /// Publishes `value`.
    ///
    /// Never blocks and never allocates.
    ///
    /// # Safety
    ///
    /// At most one thread (in at most one process) may be inside
    /// `set_state` for a given cell at any time.
    #[inline]
    pub unsafe fn set_state(&self, value: T) {
        let envelope = Envelope::pack(&value);
        let slot = self.begin.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        fence(Ordering::Release);
        // SAFETY: the caller guarantees no other writer; readers tolerate a
        // concurrent overwrite of this slot by revalidating `begin`.
        unsafe { ptr::write_volatile(self.slots[(slot & 1) as usize].get(), envelope) };
        self.end.fetch_add(1, Ordering::Release);
    }

    /// Zeroes both counters, then publishes `initial` into both slots.
    ///
    /// Used by a writer taking over a cell whose previous writer may have
    /// stopped between its two counter increments. Readers keep getting
    /// complete values throughout.
    ///
    /// # Safety
    ///
    /// Same contract as [`LocklessCell::set_state`].
    pub(crate) unsafe fn reset(&self, initial: T) {
        self.begin.store(0, Ordering::Release);
        self.end.store(0, Ordering::Release);
        for _ in 0..2 {
            // SAFETY: forwarded from the caller.
            unsafe { self.set_state(initial) };
        }
    }

    /// Publishes `value` through exclusive access.
    #[inline]
    pub fn set_state_exclusive(&mut self, value: T) {
        // SAFETY: `&mut self` rules out every other writer.
        unsafe { self.set_state(value) };
    }

    /// Returns the most recently completed value.
    ///
    /// Lock-free: retries only while the writer keeps overwriting the slot
    /// being copied. Never returns a torn value.
    #[inline]
    #[must_use]
    pub fn get_state(&self) -> T {
        loop {
            let end = self.end.load(Ordering::Acquire);
            let state = self.copy_slot(end);
            fence(Ordering::Acquire);
            let begin = self.begin.load(Ordering::Relaxed);
            if begin == end {
                return state;
            }

            // A write is in progress into slot[begin & 1]; the other slot
            // holds the value that write is replacing.
            let state = self.copy_slot(begin ^ 1);
            fence(Ordering::Acquire);
            if self.begin.load(Ordering::Relaxed) == begin {
                return state;
            }
            std::hint::spin_loop();
        }
    }

    /// Number of completed publishes, modulo 2^32.
    #[must_use]
    pub fn update_count(&self) -> u32 {
        self.end.load(Ordering::Acquire)
    }

    fn copy_slot(&self, counter: u32) -> T {
        // SAFETY: the slot is always a valid Envelope (every bit pattern is);
        // a concurrent overwrite can only tear the copy, which the caller
        // detects through the counters.
        let envelope = unsafe { ptr::read_volatile(self.slots[(counter & 1) as usize].get()) };
        envelope.unpack()
    }
}

/// The unique publishing handle of an in-process cell.
///
/// Readers hold `Arc<LocklessCell<T>>` clones and can only read; the
/// publisher is not `Clone` and publishes through `&mut self`.
pub struct LocklessPublisher<T> {
    cell: Arc<LocklessCell<T>>,
}

impl<T: Pod> LocklessPublisher<T> {
    /// New cell holding `initial`, with this handle as its only writer.
    #[must_use]
    pub fn new(initial: T) -> Self {
        Self {
            cell: Arc::new(LocklessCell::new(initial)),
        }
    }

    /// Publishes `value`.
    #[inline]
    pub fn publish(&mut self, value: T) {
        // SAFETY: this handle is the only path to `set_state` for the cell
        // and `&mut self` serialises its callers.
        unsafe { self.cell.set_state(value) };
    }

    /// Latest published value.
    #[must_use]
    pub fn latest(&self) -> T {
        self.cell.get_state()
    }

    /// Read handle for other threads.
    #[must_use]
    pub fn reader(&self) -> Arc<LocklessCell<T>> {
        Arc::clone(&self.cell)
    }
}

impl<T> std::fmt::Debug for LocklessPublisher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocklessPublisher")
            .field("cell", &self.cell)
            .finish()
    }
}

impl<T: Pod + Default> Default for LocklessCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::fmt::Debug for LocklessCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocklessCell")
            .field("begin", &self.begin.load(Ordering::Relaxed))
            .field("end", &self.end.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
