//! Sort-Tile-Recursion (STR) partitioning.
//!
//! STR splits n-dimensional points into parts such that each part has
//! roughly the same number of points and the parts have non-overlapping
//! bounding boxes: sort by the first coordinate, split evenly, then recurse
//! on the next coordinate inside every part.

mod distributed;

pub use self::distributed::{
    distributed_sort_tile_recursion, infer_local_str_params, rank_distribution,
    two_level_str_heuristic, DistributedMemorySorter, DistributedSTRParams, LocalSTRParams,
    TwoLevelSTRParams,
};

use crate::common::balanced_chunks;
use crate::element::TreeValue;

/// Parameters of a serial STR: the number of parts per space dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSTRParams {
    /// Total number of elements undergoing STR.
    pub n_points: usize,
    /// Number of parts per space dimension.
    pub n_parts_per_dim: [usize; 3],
}

impl SerialSTRParams {
    /// Creates STR parameters; every dimension needs at least one part.
    pub fn new(n_points: usize, n_parts_per_dim: [usize; 3]) -> SerialSTRParams {
        assert!(
            n_parts_per_dim.iter().all(|&parts| parts > 0),
            "every dimension needs at least one part"
        );
        SerialSTRParams {
            n_points,
            n_parts_per_dim,
        }
    }

    /// Overall number of parts after STR.
    pub fn n_parts(&self) -> usize {
        self.n_parts_per_dim.iter().product()
    }

    /// Number of parts in a slice where the axes up to and including `dim`
    /// are fixed.
    pub fn n_parts_per_slice(&self, dim: usize) -> usize {
        self.n_parts_per_dim[dim + 1..].iter().product()
    }

    /// Boundaries of the parts after STR, of length `n_parts() + 1`:
    /// elements in `boundaries[k]..boundaries[k + 1]` form part `k`. Sizes
    /// differ from `n_points / n_parts()` by at most one.
    pub fn partition_boundaries(&self) -> Vec<usize> {
        let mut boundaries = Vec::with_capacity(self.n_parts() + 1);
        boundaries.push(0);
        boundaries_recurse(0, self.n_points, &self.n_parts_per_dim, 0, &mut boundaries);
        boundaries
    }

    /// Parameters suited for building a multi-index: about `cbrt(n_points)`
    /// parts overall, spread evenly over the dimensions.
    pub fn from_heuristic(n_points: usize) -> SerialSTRParams {
        let parts_per_dim = ((n_points as f64).powf(1.0 / 9.0).ceil() as usize).max(1);
        SerialSTRParams::new(n_points, [parts_per_dim; 3])
    }
}

fn boundaries_recurse(
    low: usize,
    high: usize,
    n_parts_per_dim: &[usize; 3],
    dim: usize,
    boundaries: &mut Vec<usize>,
) {
    if dim == 3 {
        boundaries.push(high);
        return;
    }
    let n = high - low;
    let parts = n_parts_per_dim[dim];
    for part_idx in 0..parts {
        let chunk = balanced_chunks(n, parts, part_idx);
        boundaries_recurse(
            low + chunk.start,
            low + chunk.end,
            n_parts_per_dim,
            dim + 1,
            boundaries,
        );
    }
}

/// Reorders `values` in place so that the ranges given by
/// [`SerialSTRParams::partition_boundaries`] hold spatially coherent parts.
pub fn serial_sort_tile_recursion<T: TreeValue>(values: &mut [T], params: &SerialSTRParams) {
    debug_assert_eq!(values.len(), params.n_points);
    str_recurse(values, &params.n_parts_per_dim, 0);
}

fn str_recurse<T: TreeValue>(values: &mut [T], n_parts_per_dim: &[usize; 3], dim: usize) {
    if dim == 3 || values.is_empty() {
        return;
    }
    // Stable sort keeps equal-coordinate runs deterministic.
    values.sort_by(|a, b| a.centroid()[dim].total_cmp(&b.centroid()[dim]));
    let n = values.len();
    let parts = n_parts_per_dim[dim];
    for part_idx in 0..parts {
        let chunk = balanced_chunks(n, parts, part_idx);
        str_recurse(&mut values[chunk], n_parts_per_dim, dim + 1);
    }
}
