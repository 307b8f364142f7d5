//! # Lock-Free Publication
//!
//! One tracking thread publishes; any number of render threads, in any
//! number of processes, read.
//!
//! ## The Problem
//!
//! ```text
//! Writer (1 kHz):   publish pose sample
//! Readers (N):      read latest sample at frame start
//!
//! With a mutex:     a reader preempted while holding it stalls the writer
//! Across processes: a crashed reader holding it stalls everyone
//! ```
//!
//! ## The Solution: Two Slots, Two Counters
//!
//! The writer bumps `begin`, fills one slot, bumps `end`. A reader that
//! catches the writer mid-copy falls back to the other slot. Nobody waits on
//! anybody.

mod envelope;
mod lockless;

pub use envelope::{Envelope, ENVELOPE_CAPACITY, ENVELOPE_WORDS};
pub use lockless::{LocklessCell, LocklessPublisher};
