//! Binary serialization primitives and small numeric helpers shared by the
//! index file formats and the partitioning code.
//!
//! All multi-byte integers are written little-endian, scalars as IEEE-754.

mod serialize;

pub use self::serialize::{BinarySerializable, FixedSize, VInt};

use std::ops::Range;

use crate::error::SpatialIndexError;

/// Splits `n` items into `k` chunks whose sizes differ by at most one, and
/// returns the half-open range of chunk `chunk_idx`.
///
/// The first `n % k` chunks receive one extra item.
pub fn balanced_chunks(n: usize, k: usize, chunk_idx: usize) -> Range<usize> {
    assert!(k > 0, "cannot split into zero chunks");
    assert!(chunk_idx < k, "chunk index out of range");
    let base = n / k;
    let remainder = n % k;
    let low = chunk_idx * base + chunk_idx.min(remainder);
    let size = base + usize::from(chunk_idx < remainder);
    low..low + size
}

/// Boundaries of all `k` balanced chunks of `n` items, of length `k + 1`.
pub fn balanced_chunk_boundaries(n: usize, k: usize) -> Vec<usize> {
    let mut boundaries = Vec::with_capacity(k + 1);
    boundaries.push(0);
    for chunk_idx in 0..k {
        boundaries.push(balanced_chunks(n, k, chunk_idx).end);
    }
    boundaries
}

/// Converts between integer types, failing with `InvalidArgument` instead of
/// silently truncating.
pub fn safe_integer_cast<Src, Dst>(value: Src) -> crate::Result<Dst>
where
    Src: Copy + TryInto<Dst> + std::fmt::Display,
{
    value
        .try_into()
        .map_err(|_| SpatialIndexError::InvalidArgument(format!("integer out of range: {value}")))
}
