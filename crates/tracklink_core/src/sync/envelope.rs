//! Fixed-capacity, version-tolerant payload envelope.
//!
//! Writers and readers compiled at different times share the same named
//! region. The region therefore never stores a `T` directly: it stores an
//! [`Envelope`] of [`ENVELOPE_CAPACITY`] bytes and the value is copied into
//! its low bytes. A reader built against a larger `T` sees the new trailing
//! fields as zero; a reader built against a smaller `T` ignores them.

use std::marker::PhantomData;
use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

/// Number of 64-bit words in one envelope.
pub const ENVELOPE_WORDS: usize = 64;

/// Capacity of one envelope in bytes.
pub const ENVELOPE_CAPACITY: usize = ENVELOPE_WORDS * size_of::<u64>();

/// Compile-time proof that `T` fits an envelope.
struct AssertFits<T>(PhantomData<T>);

impl<T> AssertFits<T> {
    const OK: () = assert!(
        size_of::<T>() <= ENVELOPE_CAPACITY,
        "payload type does not fit the shared envelope"
    );
}

/// Padded storage for one published value.
#[repr(C, align(8))]
#[derive(Clone, Copy, Pod, Zeroable)]
pub struct Envelope {
    words: [u64; ENVELOPE_WORDS],
}

impl Envelope {
    /// All-zero envelope.
    pub const ZERO: Self = Self {
        words: [0; ENVELOPE_WORDS],
    };

    /// Returns true when `T` fits an envelope.
    #[must_use]
    pub const fn fits<T>() -> bool {
        size_of::<T>() <= ENVELOPE_CAPACITY
    }

    /// Copies `value` into the low bytes of a zeroed envelope.
    #[inline]
    #[must_use]
    pub fn pack<T: Pod>(value: &T) -> Self {
        let () = AssertFits::<T>::OK;
        let mut envelope = Self::ZERO;
        let src = bytemuck::bytes_of(value);
        bytemuck::bytes_of_mut(&mut envelope.words)[..src.len()].copy_from_slice(src);
        envelope
    }

    /// Reads a `T` back out of the low bytes.
    #[inline]
    #[must_use]
    pub fn unpack<T: Pod>(&self) -> T {
        let () = AssertFits::<T>::OK;
        bytemuck::pod_read_unaligned(&bytemuck::bytes_of(&self.words)[..size_of::<T>()])
    }

    /// Raw bytes of the envelope.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(&self.words)
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("capacity", &ENVELOPE_CAPACITY)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct V1 {
        a: f64,
        b: u32,
        c: u32,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    struct V2 {
        a: f64,
        b: u32,
        c: u32,
        added: f64,
    }

    #[test]
    fn test_envelope_size() {
        assert_eq!(size_of::<Envelope>(), ENVELOPE_CAPACITY);
        assert_eq!(ENVELOPE_CAPACITY % size_of::<u64>(), 0);
        assert!(Envelope::fits::<[u8; ENVELOPE_CAPACITY]>());
        assert!(!Envelope::fits::<[u8; ENVELOPE_CAPACITY + 1]>());
    }

    #[test]
    fn test_older_writer_newer_reader() {
        let old = V1 { a: 1.5, b: 7, c: 9 };
        let read: V2 = Envelope::pack(&old).unpack();
        assert_eq!(read, V2 { a: 1.5, b: 7, c: 9, added: 0.0 });
    }

    #[test]
    fn test_newer_writer_older_reader() {
        let new = V2 { a: -2.0, b: 1, c: 2, added: 42.0 };
        let read: V1 = Envelope::pack(&new).unpack();
        assert_eq!(read, V1 { a: -2.0, b: 1, c: 2 });
    }
}
