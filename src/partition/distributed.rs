//! MPI-style distributed Sort-Tile-Recursion.
//!
//! The recursion mirrors the serial STR over a grid of ranks: perform a
//! distributed balanced sort along the current dimension, split the
//! communicator into one color per slab, recurse. On the one-rank
//! [`SelfComm`](crate::comm::SelfComm) every step degenerates to a local
//! sort, so single-process builds share the entry points.

use std::io::Cursor;

use crate::comm::Communicator;
use crate::common::{balanced_chunk_boundaries, BinarySerializable};
use crate::element::TreeValue;
use crate::error::SpatialIndexError;
use crate::geometry::CoordType;
use crate::partition::SerialSTRParams;

/// Parameters for the distributed STR: ranks per space dimension. Their
/// product must equal the communicator size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedSTRParams {
    /// Number of ranks per space dimension.
    pub n_ranks_per_dim: [usize; 3],
}

/// The on-rank serial STR that follows a distributed STR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSTRParams {
    /// Number of local parts per space dimension.
    pub n_parts_per_dim: [usize; 3],
}

/// A distributed STR (one slab per rank) followed by a serial STR inside
/// each slab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwoLevelSTRParams {
    /// The cross-rank level.
    pub distributed: DistributedSTRParams,
    /// The within-rank level.
    pub local: LocalSTRParams,
}

/// Evenly distributes `comm_size` ranks over the three dimensions by
/// dealing the factors of two round-robin.
///
/// Only powers of two are supported; anything else is an
/// `InvalidArgument`.
pub fn rank_distribution(comm_size: usize) -> crate::Result<[usize; 3]> {
    if comm_size == 0 || !comm_size.is_power_of_two() {
        return Err(SpatialIndexError::InvalidArgument(format!(
            "communicator size must be a power of two, got {comm_size}"
        )));
    }
    let mut n_ranks_per_dim = [1usize; 3];
    for factor_idx in 0..comm_size.trailing_zeros() as usize {
        n_ranks_per_dim[factor_idx % 3] *= 2;
    }
    Ok(n_ranks_per_dim)
}

/// Number of local parts per dimension so that the two-level partitioning
/// approximates `overall`.
pub fn infer_local_str_params(
    overall: &SerialSTRParams,
    distributed: &DistributedSTRParams,
) -> LocalSTRParams {
    let mut n_parts_per_dim = [1usize; 3];
    for dim in 0..3 {
        n_parts_per_dim[dim] = overall.n_parts_per_dim[dim]
            .div_ceil(distributed.n_ranks_per_dim[dim])
            .max(1);
    }
    LocalSTRParams { n_parts_per_dim }
}

/// The standard heuristic for multi-index builds: distributed STR to one
/// slab per rank, serial STR within the slab, for about `cbrt(n_elements)`
/// subtrees overall.
pub fn two_level_str_heuristic(
    n_elements: usize,
    comm_size: usize,
) -> crate::Result<TwoLevelSTRParams> {
    let overall = SerialSTRParams::from_heuristic(n_elements);
    let distributed = DistributedSTRParams {
        n_ranks_per_dim: rank_distribution(comm_size)?,
    };
    let local = infer_local_str_params(&overall, &distributed);
    Ok(TwoLevelSTRParams { distributed, local })
}

/// A distributed, balanced sorting algorithm: sample-based splitter
/// selection, an all-to-all exchange, then a re-balancing pass that leaves
/// every rank with counts differing by at most one.
pub struct DistributedMemorySorter;

impl DistributedMemorySorter {
    /// Sorts `values` by the centroid coordinate `dim` across all ranks of
    /// `comm` and balances the per-rank counts.
    pub fn sort_and_balance<T, C>(
        mut values: Vec<T>,
        dim: usize,
        comm: &C,
    ) -> crate::Result<Vec<T>>
    where
        T: TreeValue + BinarySerializable,
        C: Communicator,
    {
        values.sort_by(|a, b| a.centroid()[dim].total_cmp(&b.centroid()[dim]));
        if comm.size() == 1 {
            return Ok(values);
        }

        let splitters = Self::select_splitters(&values, dim, comm)?;
        let values = Self::exchange_by_splitters(values, &splitters, dim, comm)?;
        Self::rebalance(values, comm)
    }

    /// Gathers evenly spaced local samples at rank 0, which picks
    /// `size - 1` global splitters and broadcasts them.
    fn select_splitters<T, C>(
        sorted: &[T],
        dim: usize,
        comm: &C,
    ) -> crate::Result<Vec<CoordType>>
    where
        T: TreeValue + BinarySerializable,
        C: Communicator,
    {
        let n_ranks = comm.size();
        let samples: Vec<CoordType> = (0..n_ranks.min(sorted.len()))
            .map(|sample_idx| {
                let position = sample_idx * sorted.len() / n_ranks.min(sorted.len());
                sorted[position].centroid()[dim]
            })
            .collect();
        let mut send = Vec::new();
        samples.serialize(&mut send)?;

        let splitters = match comm.gather(send, 0)? {
            Some(buffers) => {
                let mut all_samples: Vec<CoordType> = Vec::new();
                for buffer in buffers {
                    let mut reader = Cursor::new(buffer);
                    all_samples.extend(Vec::<CoordType>::deserialize(&mut reader)?);
                }
                all_samples.sort_by(|a, b| a.total_cmp(b));
                if all_samples.is_empty() {
                    Vec::new()
                } else {
                    (1..n_ranks)
                        .map(|rank| all_samples[rank * all_samples.len() / n_ranks])
                        .collect::<Vec<CoordType>>()
                }
            }
            None => Vec::new(),
        };
        let mut send = Vec::new();
        splitters.serialize(&mut send)?;
        let received = comm.broadcast(send, 0)?;
        let mut reader = Cursor::new(received);
        Ok(Vec::<CoordType>::deserialize(&mut reader)?)
    }

    /// Routes every locally sorted run to the rank owning its splitter
    /// interval; the concatenation of the received runs is sorted again to
    /// merge them.
    fn exchange_by_splitters<T, C>(
        sorted: Vec<T>,
        splitters: &[CoordType],
        dim: usize,
        comm: &C,
    ) -> crate::Result<Vec<T>>
    where
        T: TreeValue + BinarySerializable,
        C: Communicator,
    {
        let n_ranks = comm.size();
        let mut buckets: Vec<Vec<T>> = (0..n_ranks).map(|_| Vec::new()).collect();
        for value in sorted {
            let key = value.centroid()[dim];
            let target = splitters.partition_point(|&splitter| splitter <= key);
            buckets[target].push(value);
        }
        let mut send = Vec::with_capacity(n_ranks);
        for bucket in &buckets {
            let mut buffer = Vec::new();
            bucket.serialize(&mut buffer)?;
            send.push(buffer);
        }
        let received = comm.all_to_all(send)?;
        let mut merged: Vec<T> = Vec::new();
        for buffer in received {
            let mut reader = Cursor::new(buffer);
            merged.extend(Vec::<T>::deserialize(&mut reader)?);
        }
        merged.sort_by(|a, b| a.centroid()[dim].total_cmp(&b.centroid()[dim]));
        Ok(merged)
    }

    /// Moves elements between neighbouring ranks so every rank ends with a
    /// balanced share of the global (sorted) sequence.
    fn rebalance<T, C>(values: Vec<T>, comm: &C) -> crate::Result<Vec<T>>
    where
        T: TreeValue + BinarySerializable,
        C: Communicator,
    {
        let n_ranks = comm.size();
        let mut send = Vec::new();
        (values.len() as u64).serialize(&mut send)?;
        let counts_bytes = match comm.gather(send, 0)? {
            Some(buffers) => {
                let mut counts: Vec<u64> = Vec::with_capacity(n_ranks);
                for buffer in buffers {
                    let mut reader = Cursor::new(buffer);
                    counts.push(u64::deserialize(&mut reader)?);
                }
                let mut bytes = Vec::new();
                counts.serialize(&mut bytes)?;
                bytes
            }
            None => Vec::new(),
        };
        let received = comm.broadcast(counts_bytes, 0)?;
        let mut reader = Cursor::new(received);
        let counts = Vec::<u64>::deserialize(&mut reader)?;

        let total: usize = counts.iter().map(|&count| count as usize).sum();
        let my_offset: usize = counts[..comm.rank()]
            .iter()
            .map(|&count| count as usize)
            .sum();
        let targets = balanced_chunk_boundaries(total, n_ranks);

        let mut send = Vec::with_capacity(n_ranks);
        for rank in 0..n_ranks {
            let target_low = targets[rank].max(my_offset);
            let target_high = targets[rank + 1].min(my_offset + values.len());
            let slice: Vec<T> = if target_low < target_high {
                values[target_low - my_offset..target_high - my_offset].to_vec()
            } else {
                Vec::new()
            };
            let mut buffer = Vec::new();
            slice.serialize(&mut buffer)?;
            send.push(buffer);
        }
        let received = comm.all_to_all(send)?;
        let mut balanced: Vec<T> = Vec::new();
        for buffer in received {
            let mut reader = Cursor::new(buffer);
            balanced.extend(Vec::<T>::deserialize(&mut reader)?);
        }
        Ok(balanced)
    }
}

/// Runs the distributed STR: after it returns, each rank owns one balanced
/// slab of the `n_ranks_per_dim` grid.
pub fn distributed_sort_tile_recursion<T, C>(
    values: Vec<T>,
    params: &DistributedSTRParams,
    comm: &C,
) -> crate::Result<Vec<T>>
where
    T: TreeValue + BinarySerializable,
    C: Communicator,
{
    if params.n_ranks_per_dim.iter().product::<usize>() != comm.size() {
        return Err(SpatialIndexError::InvalidArgument(format!(
            "rank grid {:?} does not match the communicator size {}",
            params.n_ranks_per_dim,
            comm.size()
        )));
    }
    str_level(values, &params.n_ranks_per_dim, 0, comm)
}

fn str_level<T, C>(
    values: Vec<T>,
    n_ranks_per_dim: &[usize; 3],
    dim: usize,
    comm: &C,
) -> crate::Result<Vec<T>>
where
    T: TreeValue + BinarySerializable,
    C: Communicator,
{
    if dim == 3 {
        return Ok(values);
    }
    let values = DistributedMemorySorter::sort_and_balance(values, dim, comm)?;
    let ranks_per_slab: usize = n_ranks_per_dim[dim + 1..].iter().product();
    if ranks_per_slab == comm.size() {
        // This dimension is not split across ranks.
        return str_level(values, n_ranks_per_dim, dim + 1, comm);
    }
    let color = comm.rank() / ranks_per_slab;
    let key = comm.rank() % ranks_per_slab;
    let sub_comm = comm.split(color, key)?;
    str_level(values, n_ranks_per_dim, dim + 1, &sub_comm)
}
