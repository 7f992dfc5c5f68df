//! Randomized consistency checks of the R-tree against brute force.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spatial_index::{
    Box3D, CoordType, Cylinder, GeometryMode, IndexTree, MorphoEntry, Point3D, Segment, Shape,
    Soma, Sphere, TaggedValue, TreeValue,
};

fn random_point(rng: &mut StdRng, extent: CoordType) -> Point3D {
    Point3D::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

fn random_morpho_elements(rng: &mut StdRng, n: usize) -> Vec<MorphoEntry> {
    (0..n)
        .map(|i| {
            let gid = i as u64;
            if rng.gen_bool(0.3) {
                let soma = Soma::new(gid, Sphere::new(random_point(rng, 50.0), rng.gen_range(0.1..3.0)))
                    .unwrap();
                MorphoEntry::Soma(soma)
            } else {
                let p1 = random_point(rng, 50.0);
                let direction = random_point(rng, 4.0);
                let segment = Segment::new(
                    gid,
                    rng.gen_range(0..100),
                    rng.gen_range(0..100),
                    Cylinder::new(p1, p1 + direction, rng.gen_range(0.1..1.5)),
                )
                .unwrap();
                MorphoEntry::Segment(segment)
            }
        })
        .collect()
}

fn brute_force_intersecting(
    elements: &[MorphoEntry],
    query: &Shape,
    mode: GeometryMode,
) -> Vec<<MorphoEntry as TaggedValue>::Id> {
    let query_box = query.bounding_box();
    let mut ids: Vec<_> = elements
        .iter()
        .filter(|element| {
            element.bounding_box().intersects(&query_box)
                && (mode == GeometryMode::BoundingBox || query.intersects(&element.geometry()))
        })
        .map(TaggedValue::id)
        .collect();
    ids.sort_unstable();
    ids
}

#[test]
fn test_random_queries_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(20_230_613);
    let elements = random_morpho_elements(&mut rng, 800);
    let tree = IndexTree::bulk_load(elements.clone());
    assert_eq!(tree.len(), elements.len());

    for _ in 0..50 {
        let query: Shape = if rng.gen_bool(0.5) {
            Sphere::new(random_point(&mut rng, 55.0), rng.gen_range(0.5..10.0)).into()
        } else {
            let corner = random_point(&mut rng, 50.0);
            let span = Point3D::new(
                rng.gen_range(0.5..20.0),
                rng.gen_range(0.5..20.0),
                rng.gen_range(0.5..20.0),
            );
            Box3D::new(corner, corner + span).into()
        };
        for mode in [GeometryMode::Exact, GeometryMode::BoundingBox] {
            let mut found = tree.find_intersecting_mode(query, mode);
            found.sort_unstable();
            assert_eq!(found, brute_force_intersecting(&elements, &query, mode));
            assert_eq!(tree.count_intersecting_mode(query, mode), found.len());
            assert_eq!(tree.is_intersecting_mode(query, mode), !found.is_empty());
        }
    }
}

#[test]
fn test_random_inserts_match_bulk_load() {
    let mut rng = StdRng::seed_from_u64(7);
    let elements = random_morpho_elements(&mut rng, 400);
    let bulk = IndexTree::bulk_load(elements.clone());
    let mut incremental = IndexTree::new();
    for element in elements {
        incremental.insert(element);
    }
    assert_eq!(bulk.all_ids(), incremental.all_ids());
    for _ in 0..20 {
        let probe = Sphere::new(random_point(&mut rng, 55.0), rng.gen_range(1.0..8.0));
        let mut a = bulk.find_intersecting(probe);
        let mut b = incremental.find_intersecting(probe);
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }
}

#[test]
fn test_random_nearest_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(99);
    let elements = random_morpho_elements(&mut rng, 300);
    let tree = IndexTree::bulk_load(elements.clone());

    for _ in 0..25 {
        let probe = random_point(&mut rng, 60.0);
        let k = rng.gen_range(1..20);
        let found = tree.find_nearest(probe, k);
        assert_eq!(found.len(), k.min(elements.len()));

        let mut expected: Vec<_> = elements
            .iter()
            .map(|element| (element.centroid().dist_sq(probe), element.id()))
            .collect();
        expected.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
        let expected_ids: Vec<_> = expected.into_iter().take(k).map(|(_, id)| id).collect();
        assert_eq!(found, expected_ids);
    }
}

#[test]
fn test_random_serialization_roundtrip() {
    let mut rng = StdRng::seed_from_u64(4242);
    let elements = random_morpho_elements(&mut rng, 250);
    let tree = IndexTree::bulk_load(elements);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("morpho.rtree");
    tree.dump(&path).unwrap();
    let restored = IndexTree::<MorphoEntry>::load(&path).unwrap();

    assert_eq!(restored.len(), tree.len());
    assert_eq!(restored.all_ids(), tree.all_ids());
    assert_eq!(restored.bounds(), tree.bounds());
    for _ in 0..20 {
        let probe = Sphere::new(random_point(&mut rng, 55.0), rng.gen_range(1.0..8.0));
        let mut a = tree.find_intersecting(probe);
        let mut b = restored.find_intersecting(probe);
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }
}

#[test]
fn test_random_placement_never_overlaps() {
    let mut rng = StdRng::seed_from_u64(31337);
    let region = Box3D::new(Point3D::ZERO, Point3D::new(40.0, 40.0, 40.0));
    let mut tree: IndexTree<spatial_index::IndexedSphere> = IndexTree::new();
    let mut placed = Vec::new();
    for id in 0..200u64 {
        let mut shape =
            spatial_index::IndexedSphere::new(id, random_point(&mut rng, 100.0), rng.gen_range(0.5..2.0));
        if tree.place(&region, &mut shape) {
            // A placed shape lies inside the region and clear of all
            // previously placed shapes.
            assert!(region.contains_box(&shape.bounding_box()));
            for other in &placed {
                assert!(!shape.geometry().intersects(other));
            }
            placed.push(shape.geometry());
        }
    }
    assert!(!placed.is_empty());
    assert_eq!(tree.len(), placed.len());
}
