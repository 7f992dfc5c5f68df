//! The in-memory R-tree (`IndexTree`): bulk-load and incremental insert,
//! bounding-box indexed queries refined by exact geometry, nearest-K,
//! counting, non-overlapping placement and binary serialization.

mod node;
mod serialize;

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::element::{GroupedValue, TaggedValue, TreeValue};
use crate::geometry::{Box3D, CoordType, GeometryMode, Point3D, Shape};

use self::node::{Node, MAX_CHILDREN};

/// A balanced R-tree of fan-out 16 over elements of type `T`.
///
/// Distinct trees are independent; one tree must not be shared mutably
/// across threads.
#[derive(Debug, Clone, Default)]
pub struct IndexTree<T> {
    root: Option<Node<T>>,
    len: usize,
}

impl<T: TreeValue> IndexTree<T> {
    /// Creates an empty tree.
    pub fn new() -> IndexTree<T> {
        IndexTree { root: None, len: 0 }
    }

    /// Builds a tree from `elements` with Sort-Tile-Recursion packing.
    pub fn bulk_load(mut elements: Vec<T>) -> IndexTree<T> {
        let len = elements.len();
        if len == 0 {
            return IndexTree::new();
        }
        let leaf_count = len.div_ceil(MAX_CHILDREN);
        let parts_per_dim = (leaf_count as f64).cbrt().ceil() as usize;
        let params = crate::partition::SerialSTRParams::new(len, [parts_per_dim; 3]);
        crate::partition::serial_sort_tile_recursion(&mut elements, &params);

        let boundaries = params.partition_boundaries();
        let mut level: Vec<Node<T>> = Vec::with_capacity(leaf_count);
        let mut elements = elements.into_iter();
        for window in boundaries.windows(2) {
            let part_len = window[1] - window[0];
            if part_len == 0 {
                continue;
            }
            let part: Vec<T> = elements.by_ref().take(part_len).collect();
            for chunk_range in balanced_leaf_runs(part_len) {
                let chunk: Vec<T> = part[chunk_range].to_vec();
                level.push(Node::leaf_with(chunk));
            }
        }

        // Pack upper levels by grouping consecutive nodes; the STR order
        // keeps consecutive nodes spatially coherent, and balanced groups
        // keep every node between 2 and 16 children.
        while level.len() > 1 {
            let level_len = level.len();
            let group_count = level_len.div_ceil(MAX_CHILDREN);
            let mut nodes = level.into_iter();
            let mut upper: Vec<Node<T>> = Vec::with_capacity(group_count);
            for group_idx in 0..group_count {
                let take = crate::common::balanced_chunks(level_len, group_count, group_idx).len();
                let group: Vec<Node<T>> = (&mut nodes).take(take).collect();
                upper.push(Node::internal_with(group));
            }
            level = upper;
        }

        IndexTree {
            root: level.pop(),
            len,
        }
    }

    /// Number of elements in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no element.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The joint bounding box of all elements, `None` for an empty tree.
    pub fn bounds(&self) -> Option<Box3D> {
        self.root.as_ref().map(|root| *root.bbox())
    }

    /// Inserts a single element.
    pub fn insert(&mut self, element: T) {
        self.len += 1;
        match self.root.take() {
            None => {
                self.root = Some(Node::leaf_with(vec![element]));
            }
            Some(mut root) => {
                if let Some(sibling) = root.insert(element) {
                    root = Node::internal_with(vec![root, sibling]);
                }
                self.root = Some(root);
            }
        }
    }

    /// Visits every element whose bounding box intersects the query box,
    /// refined by the exact predicate in `Exact` mode. The visitor returns
    /// `false` to stop the traversal early.
    fn visit_intersecting<'a>(
        &'a self,
        query: &Shape,
        mode: GeometryMode,
        visit: &mut impl FnMut(&'a T) -> bool,
    ) {
        let Some(root) = self.root.as_ref() else {
            return;
        };
        let query_box = query.bounding_box();
        let mut stack: Vec<&'a Node<T>> = vec![root];
        while let Some(node) = stack.pop() {
            match node {
                Node::Internal(internal) => {
                    for child in &internal.children {
                        if child.bbox().intersects(&query_box) {
                            stack.push(child);
                        }
                    }
                }
                Node::Leaf(leaf) => {
                    for element in &leaf.elements {
                        if !element.bounding_box().intersects(&query_box) {
                            continue;
                        }
                        if mode == GeometryMode::Exact && !query.intersects(&element.geometry()) {
                            continue;
                        }
                        if !visit(element) {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// References to all elements intersecting `shape`.
    pub fn find_intersecting_objs(
        &self,
        shape: impl Into<Shape>,
        mode: GeometryMode,
    ) -> Vec<&T> {
        let query = shape.into();
        let mut results = Vec::new();
        self.visit_intersecting(&query, mode, &mut |element| {
            results.push(element);
            true
        });
        results
    }

    /// Centroids of all elements intersecting `shape` (exact geometry).
    pub fn find_intersecting_pos(&self, shape: impl Into<Shape>) -> Vec<Point3D> {
        self.find_intersecting_pos_mode(shape, GeometryMode::default())
    }

    /// Centroids of all elements intersecting `shape`.
    pub fn find_intersecting_pos_mode(
        &self,
        shape: impl Into<Shape>,
        mode: GeometryMode,
    ) -> Vec<Point3D> {
        let query = shape.into();
        let mut results = Vec::new();
        self.visit_intersecting(&query, mode, &mut |element| {
            results.push(element.centroid());
            true
        });
        results
    }

    /// Number of elements intersecting `shape` (exact geometry).
    pub fn count_intersecting(&self, shape: impl Into<Shape>) -> usize {
        self.count_intersecting_mode(shape, GeometryMode::default())
    }

    /// Number of elements intersecting `shape`.
    pub fn count_intersecting_mode(&self, shape: impl Into<Shape>, mode: GeometryMode) -> usize {
        let query = shape.into();
        let mut count = 0;
        self.visit_intersecting(&query, mode, &mut |_| {
            count += 1;
            true
        });
        count
    }

    /// Whether any element intersects `shape` (exact geometry);
    /// short-circuits on the first hit.
    pub fn is_intersecting(&self, shape: impl Into<Shape>) -> bool {
        self.is_intersecting_mode(shape, GeometryMode::default())
    }

    /// Whether any element intersects `shape`; short-circuits on the first
    /// hit.
    pub fn is_intersecting_mode(&self, shape: impl Into<Shape>, mode: GeometryMode) -> bool {
        let query = shape.into();
        let mut hit = false;
        self.visit_intersecting(&query, mode, &mut |_| {
            hit = true;
            false
        });
        hit
    }

    /// Tries to place `shape` inside `region` without overlapping any
    /// element already in the tree.
    ///
    /// The shape's bounding box is first aligned to the region's minimum
    /// corner; each axis is then stepped at most 8 times (at most 512
    /// candidate positions), in lexicographic (x, y, z) order, translating
    /// the shape relative to the previous position. The first
    /// non-overlapping position is kept and inserted. On failure the shape
    /// is left at the last tried position.
    pub fn place(&mut self, region: &Box3D, shape: &mut T) -> bool {
        let offset = region.min_corner - shape.bounding_box().min_corner;
        shape.translate(offset);

        let diffs = region.max_corner - region.min_corner;
        let base_step = diffs[0].max(diffs[1]).max(diffs[2]) / 8.0;
        if base_step <= 0.0 {
            // Degenerate region: a single candidate position.
            if self.is_intersecting(shape.geometry()) {
                return false;
            }
            self.insert(shape.clone());
            return true;
        }
        let nsteps: [usize; 3] = [
            ((diffs[0] / base_step) as usize).max(1),
            ((diffs[1] / base_step) as usize).max(1),
            ((diffs[2] / base_step) as usize).max(1),
        ];
        let step = [
            diffs[0] / nsteps[0] as CoordType,
            diffs[1] / nsteps[1] as CoordType,
            diffs[2] / nsteps[2] as CoordType,
        ];

        let mut previous = Point3D::ZERO;
        for x_i in 0..nsteps[0] {
            for y_i in 0..nsteps[1] {
                for z_i in 0..nsteps[2] {
                    let offset = Point3D::new(
                        x_i as CoordType * step[0],
                        y_i as CoordType * step[1],
                        z_i as CoordType * step[2],
                    );
                    shape.translate(offset - previous);
                    previous = offset;
                    if !self.is_intersecting(shape.geometry()) {
                        self.insert(shape.clone());
                        return true;
                    }
                }
            }
        }
        false
    }

    /// Iterates over all elements in unspecified order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            stack: self.root.as_ref().into_iter().collect(),
            pending: &[],
        }
    }
}

impl<T: TaggedValue> IndexTree<T> {
    /// Ids of all elements intersecting `shape` (exact geometry).
    pub fn find_intersecting(&self, shape: impl Into<Shape>) -> Vec<T::Id> {
        self.find_intersecting_mode(shape, GeometryMode::default())
    }

    /// Ids of all elements intersecting `shape`.
    pub fn find_intersecting_mode(&self, shape: impl Into<Shape>, mode: GeometryMode) -> Vec<T::Id> {
        let query = shape.into();
        let mut results = Vec::new();
        self.visit_intersecting(&query, mode, &mut |element| {
            results.push(element.id());
            true
        });
        results
    }

    /// The `k` element ids closest to `point` by squared distance between
    /// `point` and the element centroid.
    ///
    /// Results come in ascending distance, ties broken by ascending id, and
    /// at most `min(k, len)` of them; `k == 0` yields an empty vector.
    pub fn find_nearest(&self, point: Point3D, k: usize) -> Vec<T::Id> {
        let mut results = Vec::with_capacity(k.min(self.len));
        if k == 0 {
            return results;
        }
        let Some(root) = self.root.as_ref() else {
            return results;
        };
        let mut heap: BinaryHeap<NearestEntry<'_, T>> = BinaryHeap::new();
        heap.push(NearestEntry {
            dist_sq: root.bbox().min_dist_sq(point),
            kind: NearestKind::Node(root),
        });
        while let Some(entry) = heap.pop() {
            match entry.kind {
                NearestKind::Node(Node::Internal(internal)) => {
                    for child in &internal.children {
                        heap.push(NearestEntry {
                            dist_sq: child.bbox().min_dist_sq(point),
                            kind: NearestKind::Node(child),
                        });
                    }
                }
                NearestKind::Node(Node::Leaf(leaf)) => {
                    for element in &leaf.elements {
                        heap.push(NearestEntry {
                            dist_sq: element.centroid().dist_sq(point),
                            kind: NearestKind::Element(element.id()),
                        });
                    }
                }
                NearestKind::Element(id) => {
                    results.push(id);
                    if results.len() == k {
                        break;
                    }
                }
            }
        }
        results
    }

    /// All ids, in ascending id order.
    pub fn all_ids(&self) -> Vec<T::Id> {
        let mut ids: Vec<T::Id> = self.iter().map(TaggedValue::id).collect();
        ids.sort_unstable();
        ids
    }
}

impl<T: GroupedValue> IndexTree<T> {
    /// Counts elements intersecting `shape`, aggregated per neuron gid
    /// (exact geometry). No element list is materialized.
    pub fn count_intersecting_agg_gid(&self, shape: impl Into<Shape>) -> FxHashMap<u64, usize> {
        self.count_intersecting_agg_gid_mode(shape, GeometryMode::default())
    }

    /// Counts elements intersecting `shape`, aggregated per neuron gid.
    pub fn count_intersecting_agg_gid_mode(
        &self,
        shape: impl Into<Shape>,
        mode: GeometryMode,
    ) -> FxHashMap<u64, usize> {
        let query = shape.into();
        let mut counts: FxHashMap<u64, usize> = FxHashMap::default();
        self.visit_intersecting(&query, mode, &mut |element| {
            *counts.entry(element.gid()).or_insert(0) += 1;
            true
        });
        counts
    }
}

/// Iterator over all elements of an [`IndexTree`].
pub struct Iter<'a, T> {
    stack: Vec<&'a Node<T>>,
    pending: &'a [T],
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        loop {
            if let Some((element, rest)) = self.pending.split_first() {
                self.pending = rest;
                return Some(element);
            }
            match self.stack.pop()? {
                Node::Internal(internal) => self.stack.extend(internal.children.iter()),
                Node::Leaf(leaf) => self.pending = &leaf.elements,
            }
        }
    }
}

/// Ranges chunking `part_len` consecutive elements into leaf runs of at
/// most [`MAX_CHILDREN`] elements, sizes differing by at most one.
fn balanced_leaf_runs(part_len: usize) -> Vec<std::ops::Range<usize>> {
    let runs = part_len.div_ceil(MAX_CHILDREN);
    (0..runs)
        .map(|run_idx| crate::common::balanced_chunks(part_len, runs, run_idx))
        .collect()
}

struct NearestEntry<'a, T: TaggedValue> {
    dist_sq: CoordType,
    kind: NearestKind<'a, T>,
}

enum NearestKind<'a, T: TaggedValue> {
    Node(&'a Node<T>),
    Element(T::Id),
}

impl<T: TaggedValue> PartialEq for NearestEntry<'_, T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T: TaggedValue> Eq for NearestEntry<'_, T> {}

impl<T: TaggedValue> PartialOrd for NearestEntry<'_, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TaggedValue> Ord for NearestEntry<'_, T> {
    // `BinaryHeap` pops the maximum: order entries so that the smallest
    // distance pops first, nodes pop before elements at equal distance, and
    // equal-distance elements pop in ascending id order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .dist_sq
            .total_cmp(&self.dist_sq)
            .then_with(|| match (&self.kind, &other.kind) {
                (NearestKind::Node(_), NearestKind::Element(_)) => Ordering::Greater,
                (NearestKind::Element(_), NearestKind::Node(_)) => Ordering::Less,
                (NearestKind::Node(_), NearestKind::Node(_)) => Ordering::Equal,
                (NearestKind::Element(a), NearestKind::Element(b)) => b.cmp(a),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{IndexedSphere, MorphoEntry, Segment, Soma};
    use crate::geometry::{Cylinder, Sphere};

    fn sphere(x: CoordType, y: CoordType, z: CoordType, r: CoordType) -> Sphere {
        Sphere::new(Point3D::new(x, y, z), r)
    }

    fn three_spheres() -> IndexTree<IndexedSphere> {
        let mut tree = IndexTree::new();
        tree.insert(IndexedSphere::new(0, Point3D::new(0.0, 0.0, 0.0), 2.0));
        tree.insert(IndexedSphere::new(1, Point3D::new(10.0, 0.0, 0.0), 2.5));
        tree.insert(IndexedSphere::new(2, Point3D::new(20.0, 0.0, 0.0), 4.0));
        tree
    }

    #[test]
    fn test_empty_tree_queries() {
        let tree: IndexTree<IndexedSphere> = IndexTree::new();
        assert!(tree.is_empty());
        assert!(tree.bounds().is_none());
        assert!(tree.find_intersecting(sphere(0.0, 0.0, 0.0, 100.0)).is_empty());
        assert!(tree.find_nearest(Point3D::ZERO, 5).is_empty());
        assert_eq!(tree.count_intersecting(sphere(0.0, 0.0, 0.0, 1.0)), 0);
    }

    #[test]
    fn test_sphere_index_queries() {
        let tree = three_spheres();
        let hits = tree.find_intersecting(sphere(15.0, 0.0, 0.0, 2.0));
        assert_eq!(hits, vec![crate::element::ShapeId(2)]);
        assert!(tree.find_intersecting(sphere(5.0, 0.0, 0.0, 2.0)).is_empty());
        let hits = tree.find_intersecting(sphere(0.0, -3.0, 0.0, 2.0));
        assert_eq!(hits, vec![crate::element::ShapeId(0)]);
    }

    #[test]
    fn test_bounding_box_mode_overcounts() {
        let mut tree = IndexTree::new();
        // A long diagonal capsule: its bbox is much larger than itself.
        tree.insert(MorphoEntry::Segment(
            Segment::new(
                1,
                1,
                1,
                Cylinder::new(Point3D::ZERO, Point3D::new(10.0, 10.0, 10.0), 0.1),
            )
            .unwrap(),
        ));
        let probe = sphere(9.0, 1.0, 1.0, 0.5);
        assert_eq!(tree.count_intersecting_mode(probe, GeometryMode::BoundingBox), 1);
        assert_eq!(tree.count_intersecting_mode(probe, GeometryMode::Exact), 0);
    }

    #[test]
    fn test_capsule_index_queries() {
        let mut tree: IndexTree<MorphoEntry> = IndexTree::new();
        for (i, x) in [0.0, 10.0, 20.0].into_iter().enumerate() {
            let segment = Segment::new(
                10 + i as u64,
                1,
                1,
                Cylinder::new(
                    Point3D::new(x, 0.0, 0.0),
                    Point3D::new(x, 5.0, 0.0),
                    0.5,
                ),
            )
            .unwrap();
            tree.insert(MorphoEntry::Segment(segment));
        }
        let hits = tree.find_intersecting(sphere(0.0, 6.0, 0.0, 2.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].gid(), 10);
        assert!(tree.find_intersecting(sphere(0.0, -3.0, 0.0, 2.0)).is_empty());
    }

    #[test]
    fn test_mixed_variant_index() {
        let mut tree: IndexTree<MorphoEntry> = IndexTree::new();
        tree.insert(MorphoEntry::Soma(
            Soma::new(0, sphere(0.0, 0.0, 0.0, 2.0)).unwrap(),
        ));
        tree.insert(MorphoEntry::Soma(
            Soma::new(1, sphere(10.0, 0.0, 0.0, 2.5)).unwrap(),
        ));
        tree.insert(MorphoEntry::Soma(
            Soma::new(2, sphere(20.0, 0.0, 0.0, 4.0)).unwrap(),
        ));
        let segment = Segment::new(
            20,
            0,
            1,
            Cylinder::new(Point3D::ZERO, Point3D::new(20.0, 0.0, 0.0), 10.0),
        )
        .unwrap();
        tree.insert(MorphoEntry::Segment(segment));

        let gids = |hits: Vec<crate::element::MorphPartId>| {
            let mut gids: Vec<u64> = hits.into_iter().map(|id| id.gid()).collect();
            gids.sort_unstable();
            gids
        };
        assert_eq!(gids(tree.find_intersecting(sphere(5.0, 0.0, 0.0, 2.0))), vec![20]);
        assert_eq!(
            gids(tree.find_intersecting(sphere(15.0, 0.0, 0.0, 2.0))),
            vec![2, 20]
        );
    }

    #[test]
    fn test_count_matches_find() {
        let tree = three_spheres();
        for probe in [
            sphere(0.0, 0.0, 0.0, 1.0),
            sphere(10.0, 0.0, 0.0, 15.0),
            sphere(-50.0, 0.0, 0.0, 1.0),
        ] {
            assert_eq!(
                tree.count_intersecting(probe),
                tree.find_intersecting(probe).len()
            );
            assert_eq!(
                tree.is_intersecting(probe),
                tree.count_intersecting(probe) > 0
            );
        }
    }

    #[test]
    fn test_count_agg_gid() {
        let mut tree: IndexTree<MorphoEntry> = IndexTree::new();
        for section in 1..4u64 {
            let segment = Segment::new(
                7,
                section,
                1,
                Cylinder::new(Point3D::ZERO, Point3D::new(1.0, 0.0, 0.0), 0.5),
            )
            .unwrap();
            tree.insert(MorphoEntry::Segment(segment));
        }
        tree.insert(MorphoEntry::Soma(
            Soma::new(8, sphere(0.5, 0.0, 0.0, 0.5)).unwrap(),
        ));
        let counts = tree.count_intersecting_agg_gid(sphere(0.5, 0.0, 0.0, 10.0));
        assert_eq!(counts.get(&7), Some(&3));
        assert_eq!(counts.get(&8), Some(&1));
        assert_eq!(
            counts.values().sum::<usize>(),
            tree.count_intersecting(sphere(0.5, 0.0, 0.0, 10.0))
        );
    }

    #[test]
    fn test_find_nearest_order_and_size() {
        let tree = three_spheres();
        let ids = tree.find_nearest(Point3D::new(9.0, 0.0, 0.0), 3);
        assert_eq!(
            ids,
            vec![
                crate::element::ShapeId(1),
                crate::element::ShapeId(0),
                crate::element::ShapeId(2)
            ]
        );
        // k larger than the tree yields everything.
        assert_eq!(tree.find_nearest(Point3D::ZERO, 1000).len(), 3);
        assert!(tree.find_nearest(Point3D::ZERO, 0).is_empty());
    }

    #[test]
    fn test_find_nearest_ties_break_by_id() {
        let mut tree = IndexTree::new();
        // Two elements at the same distance from the probe.
        tree.insert(IndexedSphere::new(5, Point3D::new(1.0, 0.0, 0.0), 0.1));
        tree.insert(IndexedSphere::new(3, Point3D::new(-1.0, 0.0, 0.0), 0.1));
        let ids = tree.find_nearest(Point3D::ZERO, 2);
        assert_eq!(ids, vec![crate::element::ShapeId(3), crate::element::ShapeId(5)]);
    }

    #[test]
    fn test_bulk_load_matches_incremental() {
        let elements: Vec<IndexedSphere> = (0..300)
            .map(|i| {
                IndexedSphere::new(
                    i,
                    Point3D::new(
                        (i % 17) as CoordType,
                        (i % 13) as CoordType,
                        (i % 7) as CoordType,
                    ),
                    0.3,
                )
            })
            .collect();
        let bulk = IndexTree::bulk_load(elements.clone());
        let mut incremental = IndexTree::new();
        for element in elements {
            incremental.insert(element);
        }
        assert_eq!(bulk.len(), incremental.len());
        assert_eq!(bulk.all_ids(), incremental.all_ids());
        for probe in [
            sphere(3.0, 3.0, 3.0, 2.0),
            sphere(8.0, 6.0, 2.0, 5.0),
            sphere(100.0, 0.0, 0.0, 1.0),
        ] {
            let mut a = bulk.find_intersecting(probe);
            let mut b = incremental.find_intersecting(probe);
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_place_respects_existing_elements() {
        let region = Box3D::new(Point3D::ZERO, Point3D::new(10.0, 10.0, 10.0));
        let mut tree: IndexTree<IndexedSphere> = IndexTree::new();
        let mut first = IndexedSphere::new(0, Point3D::new(50.0, 50.0, 50.0), 1.0);
        assert!(tree.place(&region, &mut first));
        // The placed shape starts at the region's minimum corner.
        assert_eq!(first.geometry.centroid, Point3D::new(1.0, 1.0, 1.0));
        assert!(region.contains_box(&first.bounding_box()));

        let mut second = IndexedSphere::new(1, Point3D::ZERO, 1.0);
        assert!(tree.place(&region, &mut second));
        assert!(region.contains_box(&second.bounding_box()));
        assert!(!first.geometry().intersects(&second.geometry()));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_place_fails_when_region_is_full() {
        let region = Box3D::new(Point3D::ZERO, Point3D::new(4.0, 4.0, 4.0));
        let mut tree: IndexTree<IndexedSphere> = IndexTree::new();
        // One big sphere blocking the whole region.
        tree.insert(IndexedSphere::new(0, Point3D::new(2.0, 2.0, 2.0), 10.0));
        let mut shape = IndexedSphere::new(1, Point3D::ZERO, 1.0);
        assert!(!tree.place(&region, &mut shape));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_single_element_nearest_returns_it() {
        let mut tree = IndexTree::new();
        tree.insert(IndexedSphere::new(42, Point3D::new(5.0, 5.0, 5.0), 1.0));
        let ids = tree.find_nearest(Point3D::ZERO, 1000);
        assert_eq!(ids, vec![crate::element::ShapeId(42)]);
    }

    #[test]
    fn test_id_less_geometry_tree() {
        use crate::element::GeometryEntry;
        let mut tree: IndexTree<GeometryEntry> = IndexTree::new();
        tree.insert(GeometryEntry::Sphere(sphere(0.0, 0.0, 0.0, 1.0)));
        tree.insert(GeometryEntry::Cylinder(Cylinder::new(
            Point3D::new(5.0, 0.0, 0.0),
            Point3D::new(9.0, 0.0, 0.0),
            0.5,
        )));
        let probe = sphere(7.0, 0.0, 0.0, 1.0);
        assert_eq!(tree.count_intersecting(probe), 1);
        let positions = tree.find_intersecting_pos(probe);
        assert_eq!(positions, vec![Point3D::new(7.0, 0.0, 0.0)]);
        assert!(tree.is_intersecting(probe));
        assert_eq!(tree.find_intersecting_objs(probe, GeometryMode::Exact).len(), 1);
    }

    #[test]
    fn test_all_ids_sorted() {
        let tree = three_spheres();
        let ids: Vec<u64> = tree.all_ids().into_iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
