//! The multi-index: many per-partition R-trees persisted in a directory,
//! indexed by a small top-level tree over their bounding boxes, loaded
//! eagerly, by region, or in disjoint slices.

mod builder;
mod meta;

pub use self::builder::{build_from_grid, MultiIndexBuilder};
pub use self::meta::{filename2id, voxel2name, MetaData, META_FILENAME, TOP_TREE_FILENAME};

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use itertools::Itertools;
use rustc_hash::FxHashMap;

use crate::comm::CancelToken;
use crate::common::{balanced_chunks, BinarySerializable, FixedSize};
use crate::element::{ElementKind, ElementValue, ShapeId, TaggedValue, TreeValue};
use crate::error::SpatialIndexError;
use crate::executor::Executor;
use crate::geometry::{Box3D, Point3D, Shape};
use crate::rtree::IndexTree;

/// A leaf of the top-level tree: one subtree's bounding box, tagged with
/// the subtree's position in the meta-data list.
#[derive(Debug, Clone, Copy)]
pub struct IndexedSubtreeBox {
    /// The subtree id.
    pub id: ShapeId,
    /// The subtree's bounding box.
    pub bbox: Box3D,
}

impl IndexedSubtreeBox {
    /// Creates a top-level entry.
    pub fn new(id: u64, bbox: Box3D) -> IndexedSubtreeBox {
        IndexedSubtreeBox {
            id: ShapeId(id),
            bbox,
        }
    }
}

impl PartialEq for IndexedSubtreeBox {
    fn eq(&self, other: &IndexedSubtreeBox) -> bool {
        self.id == other.id
    }
}

impl TreeValue for IndexedSubtreeBox {
    fn geometry(&self) -> Shape {
        Shape::Box(self.bbox)
    }
    fn translate(&mut self, offset: Point3D) {
        self.bbox.translate(offset);
    }
}

impl TaggedValue for IndexedSubtreeBox {
    type Id = ShapeId;
    fn id(&self) -> ShapeId {
        self.id
    }
}

impl BinarySerializable for IndexedSubtreeBox {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.0.serialize(writer)?;
        self.bbox.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = ShapeId(u64::deserialize(reader)?);
        let bbox = Box3D::deserialize(reader)?;
        Ok(IndexedSubtreeBox { id, bbox })
    }
}

impl ElementValue for IndexedSubtreeBox {
    const ELEMENT_KIND: ElementKind = ElementKind::SubtreeBox;
    fn serialized_len(&self) -> usize {
        u64::SIZE_IN_BYTES + Box3D::SIZE_IN_BYTES
    }
}

/// How the set of resident subtrees evolves after opening.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MountPolicy {
    /// Everything is resident; nothing more to mount.
    Complete,
    /// Queries transparently mount missing subtrees.
    OnDemand,
    /// Only the opened slice is resident; queries never mount more.
    Fixed,
}

/// A read-only view over a multi-index directory.
pub struct MultiIndex<T: ElementValue + TaggedValue> {
    root: PathBuf,
    meta: MetaData,
    top: IndexTree<IndexedSubtreeBox>,
    subtrees: RwLock<FxHashMap<u64, Arc<IndexTree<T>>>>,
    mount_policy: MountPolicy,
    executor: Executor,
    cancel: CancelToken,
}

impl<T: ElementValue + TaggedValue> MultiIndex<T> {
    /// Opens the multi-index at `root`, loading every subtree eagerly.
    pub fn open(root: &Path) -> crate::Result<MultiIndex<T>> {
        let mut index = Self::open_skeleton(root, MountPolicy::Complete)?;
        let all: Vec<u64> = (0..index.meta.subtrees.len() as u64).collect();
        index.mount_all(&all)?;
        Ok(index)
    }

    /// Opens the multi-index at `root`, loading only the subtrees
    /// intersecting `region`. Later queries reaching outside the region
    /// transparently pull additional subtrees.
    pub fn open_region(root: &Path, region: &Box3D) -> crate::Result<MultiIndex<T>> {
        let mut index = Self::open_skeleton(root, MountPolicy::OnDemand)?;
        let wanted = index.top.find_intersecting(*region);
        let wanted: Vec<u64> = wanted.into_iter().map(|id| id.0).collect();
        index.mount_all(&wanted)?;
        Ok(index)
    }

    /// Opens slice `part_index` of `part_total` contiguous slices of the
    /// subtree list, for worker pools operating on disjoint shards.
    pub fn open_slice(
        root: &Path,
        part_index: usize,
        part_total: usize,
    ) -> crate::Result<MultiIndex<T>> {
        if part_total == 0 || part_index >= part_total {
            return Err(SpatialIndexError::InvalidArgument(format!(
                "slice {part_index}/{part_total} is out of range"
            )));
        }
        let mut index = Self::open_skeleton(root, MountPolicy::Fixed)?;
        let slice = balanced_chunks(index.meta.subtrees.len(), part_total, part_index);
        let wanted: Vec<u64> = slice.map(|subtree_idx| subtree_idx as u64).collect();
        index.mount_all(&wanted)?;
        Ok(index)
    }

    fn open_skeleton(root: &Path, mount_policy: MountPolicy) -> crate::Result<MultiIndex<T>> {
        let meta = MetaData::read(root)?;
        let top = IndexTree::load(&root.join(TOP_TREE_FILENAME)).map_err(|err| match err {
            SpatialIndexError::MissingSubtree(path) => SpatialIndexError::CorruptIndex {
                path,
                reason: "the top-level tree file is missing".to_string(),
            },
            other => other,
        })?;
        Ok(MultiIndex {
            root: root.to_path_buf(),
            meta,
            top,
            subtrees: RwLock::new(FxHashMap::default()),
            mount_policy,
            executor: Executor::single_thread(),
            cancel: CancelToken::new(),
        })
    }

    /// The voxel edge length recorded at build time, `0` for STR builds.
    pub fn voxel_length(&self) -> u32 {
        self.meta.voxel_length
    }

    /// Number of subtrees of the whole index.
    pub fn subtree_count(&self) -> usize {
        self.meta.subtrees.len()
    }

    /// Number of currently resident subtrees.
    pub fn loaded_count(&self) -> usize {
        self.read_cache().len()
    }

    /// The joint bounding box of the whole index.
    pub fn bounds(&self) -> Option<Box3D> {
        self.top.bounds()
    }

    /// Installs the executor used by [`apply_par`](Self::apply_par).
    pub fn set_executor(&mut self, executor: Executor) {
        self.executor = executor;
    }

    /// Installs a host-supplied cancellation token, checked between
    /// subtree traversals.
    pub fn set_cancel_token(&mut self, cancel: CancelToken) {
        self.cancel = cancel;
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, FxHashMap<u64, Arc<IndexTree<T>>>> {
        self.subtrees
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn mount_all(&mut self, subtree_ids: &[u64]) -> crate::Result<()> {
        for &subtree_id in subtree_ids {
            self.mount(subtree_id)?;
        }
        Ok(())
    }

    /// Returns the resident subtree `subtree_id`, loading it from disk
    /// when the mount policy allows. `Ok(None)` means the subtree is
    /// intentionally out of scope (fixed slice).
    fn mount(&self, subtree_id: u64) -> crate::Result<Option<Arc<IndexTree<T>>>> {
        if let Some(subtree) = self.read_cache().get(&subtree_id) {
            return Ok(Some(Arc::clone(subtree)));
        }
        match self.mount_policy {
            MountPolicy::Fixed => return Ok(None),
            MountPolicy::Complete | MountPolicy::OnDemand => {}
        }
        let filename = self.meta.subtrees.get(subtree_id as usize).ok_or_else(|| {
            SpatialIndexError::CorruptIndex {
                path: self.root.join(META_FILENAME),
                reason: format!("subtree id {subtree_id} is not in the meta-data"),
            }
        })?;
        let subtree = Arc::new(IndexTree::<T>::load(&self.root.join(filename))?);
        let mut cache = self
            .subtrees
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(Some(Arc::clone(
            cache.entry(subtree_id).or_insert(subtree),
        )))
    }

    /// The resident subtrees, ordered by subtree id.
    fn loaded_subtrees(&self) -> Vec<Arc<IndexTree<T>>> {
        let cache = self.read_cache();
        cache
            .iter()
            .sorted_by_key(|(&subtree_id, _)| subtree_id)
            .map(|(_, subtree)| Arc::clone(subtree))
            .collect()
    }

    /// Ids of all elements within `region`, over every relevant subtree.
    ///
    /// Straddling elements may live in several subtrees; the result is
    /// sorted by id and deduplicated.
    pub fn find_within(&self, region: &Box3D) -> crate::Result<Vec<T::Id>> {
        self.find_within_mode(region, crate::geometry::GeometryMode::default())
    }

    /// Ids of all elements within `region`, with an explicit geometry
    /// accuracy.
    pub fn find_within_mode(
        &self,
        region: &Box3D,
        mode: crate::geometry::GeometryMode,
    ) -> crate::Result<Vec<T::Id>> {
        let candidates = self.top.find_intersecting(*region);
        let mut ids: Vec<T::Id> = Vec::new();
        for subtree_id in candidates {
            self.cancel.check()?;
            let Some(subtree) = self.mount(subtree_id.0)? else {
                continue;
            };
            ids.extend(subtree.find_intersecting_mode(*region, mode));
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    /// Folds `fold` over every resident subtree sequentially.
    pub fn apply<R>(
        &self,
        mut fold: impl FnMut(&IndexTree<T>) -> crate::Result<R>,
    ) -> crate::Result<Vec<R>> {
        let mut results = Vec::new();
        for subtree in self.loaded_subtrees() {
            self.cancel.check()?;
            results.push(fold(&subtree)?);
        }
        Ok(results)
    }

    /// Runs `task` over every resident subtree concurrently, one task per
    /// subtree on the installed executor.
    ///
    /// The accumulated results are always returned; the first failure is
    /// propagated after all outstanding tasks have completed.
    pub fn apply_par<R>(
        &self,
        task: impl Fn(&IndexTree<T>) -> crate::Result<R> + Sync,
    ) -> crate::Result<Vec<R>>
    where
        T: Send + Sync,
        R: Send,
    {
        let cancel = &self.cancel;
        self.executor.map(
            |subtree: Arc<IndexTree<T>>| {
                cancel.check()?;
                task(&subtree)
            },
            self.loaded_subtrees().into_iter(),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::comm::SelfComm;
    use crate::element::IndexedSphere;
    use crate::geometry::{CoordType, Point3D};

    fn six_spheres() -> Vec<IndexedSphere> {
        // Pairs around the yz-plane plus a duplicated position at x = 7,
        // radius 0.9 each.
        [
            (0u64, 1.0),
            (1, -1.0),
            (2, 2.0),
            (3, -2.0),
            (4, 7.0),
            (5, 7.0),
        ]
        .into_iter()
        .map(|(id, x)| IndexedSphere::new(id, Point3D::new(x as CoordType, 1.0, 0.0), 0.9))
        .collect()
    }

    fn build_six_sphere_index(dir: &Path) {
        let mut builder = MultiIndexBuilder::new(dir);
        builder.extend(six_spheres());
        builder.build(&SelfComm).unwrap();
    }

    fn ids(raw: Vec<ShapeId>) -> Vec<u64> {
        raw.into_iter().map(|id| id.0).collect()
    }

    #[test]
    fn test_indexed_subtree_box_roundtrip() {
        let entry = IndexedSubtreeBox::new(
            3,
            Box3D::new(Point3D::ZERO, Point3D::new(1.0, 2.0, 3.0)),
        );
        let mut buffer = Vec::new();
        entry.serialize(&mut buffer).unwrap();
        assert_eq!(buffer.len(), entry.serialized_len());
        let restored = IndexedSubtreeBox::deserialize(&mut Cursor::new(&buffer[..])).unwrap();
        assert_eq!(restored, entry);
        assert_eq!(restored.bbox, entry.bbox);
    }

    #[test]
    fn test_build_and_query_eager() {
        let dir = tempfile::tempdir().unwrap();
        build_six_sphere_index(dir.path());

        let index = MultiIndex::<IndexedSphere>::open(dir.path()).unwrap();
        assert_eq!(index.loaded_count(), index.subtree_count());

        let positive = index
            .find_within(&Box3D::new(Point3D::ZERO, Point3D::new(10.0, 10.0, 10.0)))
            .unwrap();
        assert_eq!(ids(positive), vec![0, 2, 4, 5]);

        let negative = index
            .find_within(&Box3D::new(
                Point3D::new(-10.0, 0.0, 0.0),
                Point3D::new(0.0, 10.0, 10.0),
            ))
            .unwrap();
        assert_eq!(ids(negative), vec![1, 3]);
    }

    #[test]
    fn test_multi_index_matches_flat_tree() {
        let dir = tempfile::tempdir().unwrap();
        let elements: Vec<IndexedSphere> = (0..500)
            .map(|i| {
                IndexedSphere::new(
                    i,
                    Point3D::new(
                        (i % 29) as CoordType,
                        (i % 17) as CoordType,
                        (i % 11) as CoordType,
                    ),
                    0.45,
                )
            })
            .collect();
        let mut builder = MultiIndexBuilder::new(dir.path());
        builder.extend(elements.clone());
        builder.build(&SelfComm).unwrap();

        let index = MultiIndex::<IndexedSphere>::open(dir.path()).unwrap();
        assert!(index.subtree_count() > 1);
        let flat = IndexTree::bulk_load(elements);

        for region in [
            Box3D::new(Point3D::ZERO, Point3D::new(30.0, 20.0, 12.0)),
            Box3D::new(Point3D::new(5.0, 5.0, 5.0), Point3D::new(9.0, 9.0, 9.0)),
            Box3D::new(Point3D::new(100.0, 0.0, 0.0), Point3D::new(200.0, 1.0, 1.0)),
        ] {
            let mut expected = flat.find_intersecting(region);
            expected.sort_unstable();
            expected.dedup();
            assert_eq!(index.find_within(&region).unwrap(), expected);
        }
    }

    #[test]
    fn test_open_region_mounts_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let elements: Vec<IndexedSphere> = (0..400)
            .map(|i| {
                IndexedSphere::new(i, Point3D::new((i % 100) as CoordType, 0.0, 0.0), 0.4)
            })
            .collect();
        let mut builder = MultiIndexBuilder::new(dir.path());
        builder.extend(elements);
        builder.build(&SelfComm).unwrap();

        let region = Box3D::new(Point3D::ZERO, Point3D::new(5.0, 1.0, 1.0));
        let index = MultiIndex::<IndexedSphere>::open_region(dir.path(), &region).unwrap();
        assert!(index.loaded_count() < index.subtree_count());

        // A query outside the opened region transparently mounts more.
        let far = Box3D::new(
            Point3D::new(90.0, -1.0, -1.0),
            Point3D::new(99.0, 1.0, 1.0),
        );
        let hits = index.find_within(&far).unwrap();
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_open_slice_covers_disjoint_shards() {
        let dir = tempfile::tempdir().unwrap();
        let elements: Vec<IndexedSphere> = (0..400)
            .map(|i| {
                IndexedSphere::new(i, Point3D::new((i % 100) as CoordType, 0.0, 0.0), 0.4)
            })
            .collect();
        let mut builder = MultiIndexBuilder::new(dir.path());
        builder.extend(elements);
        builder.build(&SelfComm).unwrap();

        let whole = MultiIndex::<IndexedSphere>::open(dir.path()).unwrap();
        let everything = Box3D::new(
            Point3D::new(-1.0, -1.0, -1.0),
            Point3D::new(101.0, 1.0, 1.0),
        );
        let mut from_slices: Vec<u64> = Vec::new();
        let part_total = 3;
        let mut loaded_total = 0;
        for part_index in 0..part_total {
            let slice =
                MultiIndex::<IndexedSphere>::open_slice(dir.path(), part_index, part_total)
                    .unwrap();
            loaded_total += slice.loaded_count();
            from_slices.extend(ids(slice.find_within(&everything).unwrap()));
        }
        assert_eq!(loaded_total, whole.subtree_count());
        from_slices.sort_unstable();
        from_slices.dedup();
        assert_eq!(
            from_slices,
            ids(whole.find_within(&everything).unwrap())
        );

        assert!(matches!(
            MultiIndex::<IndexedSphere>::open_slice(dir.path(), 3, 3),
            Err(SpatialIndexError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_apply_and_apply_par_agree() {
        let dir = tempfile::tempdir().unwrap();
        let elements: Vec<IndexedSphere> = (0..300)
            .map(|i| {
                IndexedSphere::new(i, Point3D::new((i % 50) as CoordType, 0.0, 0.0), 0.3)
            })
            .collect();
        let mut builder = MultiIndexBuilder::new(dir.path());
        builder.extend(elements);
        builder.build(&SelfComm).unwrap();

        let mut index = MultiIndex::<IndexedSphere>::open(dir.path()).unwrap();
        let sequential: usize = index.apply(|subtree| Ok(subtree.len())).unwrap().iter().sum();
        assert_eq!(sequential, 300);

        index.set_executor(Executor::multi_thread(4, "apply-test").unwrap());
        let parallel: usize = index
            .apply_par(|subtree| Ok(subtree.len()))
            .unwrap()
            .iter()
            .sum();
        assert_eq!(parallel, 300);
    }

    #[test]
    fn test_cancellation_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        build_six_sphere_index(dir.path());
        let mut index = MultiIndex::<IndexedSphere>::open(dir.path()).unwrap();
        let token = CancelToken::new();
        index.set_cancel_token(token.clone());
        token.cancel();
        assert!(matches!(
            index.find_within(&Box3D::new(Point3D::ZERO, Point3D::new(1.0, 1.0, 1.0))),
            Err(SpatialIndexError::Cancelled)
        ));
        assert!(matches!(
            index.apply(|subtree| Ok(subtree.len())),
            Err(SpatialIndexError::Cancelled)
        ));
    }

    #[test]
    fn test_partial_directory_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        build_six_sphere_index(dir.path());
        std::fs::remove_file(dir.path().join(META_FILENAME)).unwrap();
        assert!(matches!(
            MultiIndex::<IndexedSphere>::open(dir.path()),
            Err(SpatialIndexError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_missing_subtree_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        build_six_sphere_index(dir.path());
        let meta = MetaData::read(dir.path()).unwrap();
        std::fs::remove_file(dir.path().join(&meta.subtrees[0])).unwrap();
        assert!(matches!(
            MultiIndex::<IndexedSphere>::open(dir.path()),
            Err(SpatialIndexError::MissingSubtree(_))
        ));
    }
}
