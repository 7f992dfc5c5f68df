//! The voxel grid (`SpatialGrid`): a deterministic partition of elements
//! into fixed-size cubical voxels aligned at the origin.
//!
//! Voxel `(i, j, k)` covers the half-open region
//! `[iL, (i+1)L) x [jL, (j+1)L) x [kL, (k+1)L)` for the grid's edge length
//! `L`. Elements straddling voxel boundaries are inserted into every voxel
//! they touch; queries downstream deduplicate by id.

use std::collections::BTreeMap;
use std::ops::AddAssign;

use smallvec::SmallVec;

use crate::element::{TaggedValue, TreeValue};
use crate::error::SpatialIndexError;
use crate::geometry::{CoordType, Cylinder, Point3D, Shape, Sphere};

/// A voxel coordinate triple.
pub type VoxelId = [i32; 3];

/// Fraction of the radius used for the sphere expansion probes. The shrink
/// avoids spurious corner voxels; it can under-approximate when a sphere
/// ends barely inside a voxel corner (known, accepted).
const SPHERE_PROBE_SHRINK: CoordType = 0.95;

/// The voxel containing `point` for edge length `voxel_length`.
pub fn point2voxel(point: Point3D, voxel_length: u32) -> VoxelId {
    let length = voxel_length as CoordType;
    [
        (point[0] / length).floor() as i32,
        (point[1] / length).floor() as i32,
        (point[2] / length).floor() as i32,
    ]
}

/// The set of voxels an element expands into. At most 7 probes, so the set
/// stays inline.
type VoxelSet = SmallVec<[VoxelId; 7]>;

fn voxels_add(point: Point3D, voxel_length: u32, voxels: &mut VoxelSet) {
    let voxel = point2voxel(point, voxel_length);
    if !voxels.contains(&voxel) {
        voxels.push(voxel);
    }
}

/// Voxels touched by a sphere: its center plus six axis-extreme probes at
/// `0.95 * radius`.
fn sphere_voxels(sphere: &Sphere, voxel_length: u32) -> VoxelSet {
    let mut voxels = VoxelSet::new();
    voxels_add(sphere.centroid, voxel_length, &mut voxels);
    let probe_radius = sphere.radius * SPHERE_PROBE_SHRINK;
    for dim in 0..3 {
        voxels_add(
            sphere.centroid.offset_along(dim, probe_radius),
            voxel_length,
            &mut voxels,
        );
        voxels_add(
            sphere.centroid.offset_along(dim, -probe_radius),
            voxel_length,
            &mut voxels,
        );
    }
    voxels
}

/// Voxels touched by a capsule: both endpoints and the midpoint. Assumes
/// `radius` is small against the voxel length; the grid guards the
/// assumption at insertion time.
fn cylinder_voxels(cylinder: &Cylinder, voxel_length: u32) -> VoxelSet {
    let mut voxels = VoxelSet::new();
    voxels_add(cylinder.p1, voxel_length, &mut voxels);
    voxels_add(cylinder.p2, voxel_length, &mut voxels);
    voxels_add(cylinder.midpoint(), voxel_length, &mut voxels);
    voxels
}

fn intersected_voxels(shape: &Shape, voxel_length: u32) -> VoxelSet {
    match shape {
        Shape::Sphere(sphere) => sphere_voxels(sphere, voxel_length),
        Shape::Cylinder(cylinder) => cylinder_voxels(cylinder, voxel_length),
        Shape::Box(bbox) => {
            let mut voxels = VoxelSet::new();
            voxels_add(bbox.min_corner, voxel_length, &mut voxels);
            voxels_add(bbox.max_corner, voxel_length, &mut voxels);
            voxels_add(bbox.center(), voxel_length, &mut voxels);
            voxels
        }
    }
}

/// A grid of spatially split elements, mutable during ingestion and
/// read-only afterwards.
///
/// Parallel ingestion builds one grid per thread and merges them with
/// `+=`, which re-sorts every touched voxel list by id so the merged grid
/// is deterministic regardless of thread interleaving.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialGrid<T> {
    voxel_length: u32,
    grid: BTreeMap<VoxelId, Vec<T>>,
}

impl<T: TreeValue> SpatialGrid<T> {
    /// Creates an empty grid with the given positive voxel edge length.
    pub fn new(voxel_length: u32) -> SpatialGrid<T> {
        assert!(voxel_length > 0, "voxel length must be positive");
        SpatialGrid {
            voxel_length,
            grid: BTreeMap::new(),
        }
    }

    /// The voxel edge length.
    pub fn voxel_length(&self) -> u32 {
        self.voxel_length
    }

    /// Inserts `element` into every voxel its geometry expands into.
    ///
    /// Elements larger than a voxel violate the expansion rules'
    /// assumptions and are rejected with `InvalidArgument`.
    pub fn insert(&mut self, element: T) -> crate::Result<()> {
        let geometry = element.geometry();
        if geometry.characteristic_length() > self.voxel_length as CoordType {
            return Err(SpatialIndexError::InvalidArgument(format!(
                "element characteristic length {} exceeds the voxel length {}",
                geometry.characteristic_length(),
                self.voxel_length
            )));
        }
        for voxel in intersected_voxels(&geometry, self.voxel_length) {
            self.grid.entry(voxel).or_default().push(element.clone());
        }
        Ok(())
    }

    /// Inserts every element of `elements`.
    pub fn extend(&mut self, elements: impl IntoIterator<Item = T>) -> crate::Result<()> {
        for element in elements {
            self.insert(element)?;
        }
        Ok(())
    }

    /// Total number of stored entries, straddling duplicates included.
    pub fn size(&self) -> usize {
        self.grid.values().map(Vec::len).sum()
    }

    /// The occupied voxel ids, in lexicographic order.
    pub fn voxels(&self) -> Vec<VoxelId> {
        self.grid.keys().copied().collect()
    }

    /// The per-voxel element lists.
    pub fn items(&self) -> &BTreeMap<VoxelId, Vec<T>> {
        &self.grid
    }

    /// The elements of one voxel, empty if the voxel is unoccupied.
    pub fn voxel_elements(&self, voxel: &VoxelId) -> &[T] {
        self.grid.get(voxel).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl<T: TaggedValue> AddAssign for SpatialGrid<T> {
    /// Concatenates `other`'s per-voxel lists into `self` (no dedup), then
    /// re-sorts every merged list by id.
    fn add_assign(&mut self, other: SpatialGrid<T>) {
        assert_eq!(
            self.voxel_length, other.voxel_length,
            "cannot merge grids of different voxel lengths"
        );
        for (voxel, mut elements) in other.grid {
            let list = self.grid.entry(voxel).or_default();
            list.append(&mut elements);
            list.sort_by_key(TaggedValue::id);
        }
    }
}
