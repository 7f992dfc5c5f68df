//! The distributed bulk builder: two-level Sort-Tile-Recursion into
//! balanced partitions, one persisted R-tree per partition, a top-level
//! tree over the partition bounding boxes, and the meta-data commit record
//! written last.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::debug;

use crate::comm::Communicator;
use crate::common::BinarySerializable;
use crate::element::{ElementValue, TaggedValue};
use crate::geometry::Box3D;
use crate::grid::SpatialGrid;
use crate::multi::meta::{voxel2name, MetaData, TOP_TREE_FILENAME};
use crate::multi::IndexedSubtreeBox;
use crate::partition::{
    distributed_sort_tile_recursion, serial_sort_tile_recursion, two_level_str_heuristic,
    SerialSTRParams,
};
use crate::rtree::IndexTree;

/// Builds a multi-index directory from a stream of elements.
///
/// The build is collective: every rank of the communicator contributes its
/// buffered elements and persists its own partitions; rank 0 writes the
/// top-level tree and, last of all, the meta-data file. A directory
/// without meta-data is not a committed index.
pub struct MultiIndexBuilder<T> {
    output_dir: PathBuf,
    voxel_length: u32,
    elements: Vec<T>,
}

impl<T> MultiIndexBuilder<T>
where
    T: ElementValue + TaggedValue + BinarySerializable,
{
    /// Creates a builder writing into `output_dir`.
    pub fn new(output_dir: &Path) -> MultiIndexBuilder<T> {
        MultiIndexBuilder {
            output_dir: output_dir.to_path_buf(),
            voxel_length: 0,
            elements: Vec::new(),
        }
    }

    /// Records the voxel edge length in the meta-data (for indexes whose
    /// elements went through a [`SpatialGrid`]).
    pub fn with_voxel_length(mut self, voxel_length: u32) -> MultiIndexBuilder<T> {
        self.voxel_length = voxel_length;
        self
    }

    /// Buffers one element on this rank.
    pub fn insert(&mut self, element: T) {
        self.elements.push(element);
    }

    /// Buffers every element of `elements` on this rank.
    pub fn extend(&mut self, elements: impl IntoIterator<Item = T>) {
        self.elements.extend(elements);
    }

    /// Number of elements buffered on this rank.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether this rank buffered no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Runs the collective build.
    pub fn build<C: Communicator>(self, comm: &C) -> crate::Result<()> {
        let MultiIndexBuilder {
            output_dir,
            voxel_length,
            elements,
        } = self;
        std::fs::create_dir_all(&output_dir)?;
        // Invalidate any previous index while files are rewritten.
        remove_if_present(&output_dir.join(crate::multi::meta::META_FILENAME))?;

        let global_count = global_element_count(elements.len(), comm)?;
        let params = two_level_str_heuristic(global_count, comm.size())?;
        let mut values = distributed_sort_tile_recursion(elements, &params.distributed, comm)?;
        let local_params = SerialSTRParams::new(values.len(), params.local.n_parts_per_dim);
        serial_sort_tile_recursion(&mut values, &local_params);
        let boundaries = local_params.partition_boundaries();

        // Partition triples combine the rank's grid coordinates with the
        // local part coordinates.
        let ranks = params.distributed.n_ranks_per_dim;
        let locals = local_params.n_parts_per_dim;
        let rank = comm.rank();
        let rank_coords = [
            rank / (ranks[1] * ranks[2]),
            (rank / ranks[2]) % ranks[1],
            rank % ranks[2],
        ];

        let mut local_entries: Vec<(String, Box3D)> = Vec::new();
        for (part_idx, window) in boundaries.windows(2).enumerate() {
            if window[0] == window[1] {
                continue;
            }
            let part_coords = [
                part_idx / (locals[1] * locals[2]),
                (part_idx / locals[2]) % locals[1],
                part_idx % locals[2],
            ];
            let triple = [
                (rank_coords[0] * locals[0] + part_coords[0]) as i32,
                (rank_coords[1] * locals[1] + part_coords[1]) as i32,
                (rank_coords[2] * locals[2] + part_coords[2]) as i32,
            ];
            let subtree = IndexTree::bulk_load(values[window[0]..window[1]].to_vec());
            let Some(bounds) = subtree.bounds() else {
                continue;
            };
            let filename = voxel2name(triple);
            subtree.dump(&output_dir.join(&filename))?;
            debug!(
                "persisted subtree {filename} with {} elements",
                subtree.len()
            );
            local_entries.push((filename, bounds));
        }

        // Rank 0 gathers every (filename, bbox) pair and commits the index.
        let mut send = Vec::new();
        local_entries.serialize(&mut send)?;
        let Some(buffers) = comm.gather(send, 0)? else {
            return Ok(());
        };
        let mut entries: Vec<(String, Box3D)> = Vec::new();
        for buffer in buffers {
            let mut reader = Cursor::new(buffer);
            entries.extend(Vec::<(String, Box3D)>::deserialize(&mut reader)?);
        }

        let top_entries: Vec<IndexedSubtreeBox> = entries
            .iter()
            .enumerate()
            .map(|(subtree_idx, (_, bbox))| IndexedSubtreeBox::new(subtree_idx as u64, *bbox))
            .collect();
        let top = IndexTree::bulk_load(top_entries);
        top.dump(&output_dir.join(TOP_TREE_FILENAME))?;

        let meta = MetaData {
            voxel_length,
            subtrees: entries.into_iter().map(|(filename, _)| filename).collect(),
        };
        meta.write(&output_dir)
    }
}

/// Builds a multi-index with one subtree per occupied voxel of `grid`.
///
/// Unlike the STR build, straddling elements live in every voxel they
/// touch; queries deduplicate by id.
pub fn build_from_grid<T>(output_dir: &Path, grid: &SpatialGrid<T>) -> crate::Result<()>
where
    T: ElementValue + TaggedValue,
{
    std::fs::create_dir_all(output_dir)?;
    remove_if_present(&output_dir.join(crate::multi::meta::META_FILENAME))?;

    let mut entries: Vec<(String, Box3D)> = Vec::new();
    for (voxel, elements) in grid.items() {
        let subtree = IndexTree::bulk_load(elements.clone());
        let Some(bounds) = subtree.bounds() else {
            continue;
        };
        let filename = voxel2name(*voxel);
        subtree.dump(&output_dir.join(&filename))?;
        entries.push((filename, bounds));
    }

    let top_entries: Vec<IndexedSubtreeBox> = entries
        .iter()
        .enumerate()
        .map(|(subtree_idx, (_, bbox))| IndexedSubtreeBox::new(subtree_idx as u64, *bbox))
        .collect();
    let top = IndexTree::bulk_load(top_entries);
    top.dump(&output_dir.join(TOP_TREE_FILENAME))?;

    MetaData {
        voxel_length: grid.voxel_length(),
        subtrees: entries.into_iter().map(|(filename, _)| filename).collect(),
    }
    .write(output_dir)
}

fn remove_if_present(path: &Path) -> crate::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(io_err) => Err(io_err.into()),
    }
}

/// The element count over all ranks, known on every rank.
fn global_element_count<C: Communicator>(local_count: usize, comm: &C) -> crate::Result<usize> {
    let mut send = Vec::new();
    (local_count as u64).serialize(&mut send)?;
    let total_bytes = match comm.gather(send, 0)? {
        Some(buffers) => {
            let mut total = 0u64;
            for buffer in buffers {
                let mut reader = Cursor::new(buffer);
                total += u64::deserialize(&mut reader)?;
            }
            let mut bytes = Vec::new();
            total.serialize(&mut bytes)?;
            bytes
        }
        None => Vec::new(),
    };
    let received = comm.broadcast(total_bytes, 0)?;
    let mut reader = Cursor::new(received);
    Ok(u64::deserialize(&mut reader)? as usize)
}
