//! Element streams from structure-of-arrays inputs.
//!
//! Circuit and morphology readers hand the builders flat coordinate,
//! radius and id arrays; the functions here turn those into element
//! streams, validating the array shapes. Mis-sized arrays fail with
//! `InvalidArgument` before any element is built.

use crate::element::{MorphoEntry, Segment, Soma, Synapse};
use crate::error::SpatialIndexError;
use crate::geometry::{CoordType, Cylinder, Point3D, Sphere};

fn check_same_length(what: &str, expected: usize, actual: usize) -> crate::Result<()> {
    if expected != actual {
        return Err(SpatialIndexError::InvalidArgument(format!(
            "mis-sized {what} array: expected {expected} entries, got {actual}"
        )));
    }
    Ok(())
}

/// Builds one soma per entry of the input arrays.
pub fn somas_from_arrays(
    gids: &[u64],
    centroids: &[Point3D],
    radii: &[CoordType],
) -> crate::Result<Vec<Soma>> {
    check_same_length("centroid", gids.len(), centroids.len())?;
    check_same_length("radius", gids.len(), radii.len())?;
    gids.iter()
        .zip(centroids)
        .zip(radii)
        .map(|((&gid, &centroid), &radius)| Soma::new(gid, Sphere::new(centroid, radius)))
        .collect()
}

/// Builds one segment per entry of the input arrays.
pub fn segments_from_arrays(
    gids: &[u64],
    section_ids: &[u64],
    segment_ids: &[u64],
    p1s: &[Point3D],
    p2s: &[Point3D],
    radii: &[CoordType],
) -> crate::Result<Vec<Segment>> {
    check_same_length("section id", gids.len(), section_ids.len())?;
    check_same_length("segment id", gids.len(), segment_ids.len())?;
    check_same_length("first endpoint", gids.len(), p1s.len())?;
    check_same_length("second endpoint", gids.len(), p2s.len())?;
    check_same_length("radius", gids.len(), radii.len())?;
    (0..gids.len())
        .map(|i| {
            Segment::new(
                gids[i],
                section_ids[i],
                segment_ids[i],
                Cylinder::new(p1s[i], p2s[i], radii[i]),
            )
        })
        .collect()
}

/// Builds one synapse per entry of the input arrays.
pub fn synapses_from_arrays(
    ids: &[u64],
    post_gids: &[u64],
    pre_gids: &[u64],
    positions: &[Point3D],
) -> crate::Result<Vec<Synapse>> {
    check_same_length("post gid", ids.len(), post_gids.len())?;
    check_same_length("pre gid", ids.len(), pre_gids.len())?;
    check_same_length("position", ids.len(), positions.len())?;
    Ok((0..ids.len())
        .map(|i| Synapse::new(ids[i], post_gids[i], pre_gids[i], positions[i]))
        .collect())
}

/// Builds the morphology entries of one whole neuron from its sample
/// points.
///
/// `points` and `radii` hold every sample of the neuron; `section_offsets`
/// delimits the sections: section `s` (1-based in the resulting ids) spans
/// samples `section_offsets[s]..section_offsets[s + 1]`, and each pair of
/// consecutive samples becomes one segment. The soma, when given, comes
/// first.
pub fn neuron_entries(
    gid: u64,
    soma: Option<(Point3D, CoordType)>,
    points: &[Point3D],
    radii: &[CoordType],
    section_offsets: &[usize],
) -> crate::Result<Vec<MorphoEntry>> {
    check_same_length("radius", points.len(), radii.len())?;
    let mut entries = Vec::new();
    if let Some((centroid, radius)) = soma {
        entries.push(MorphoEntry::Soma(Soma::new(
            gid,
            Sphere::new(centroid, radius),
        )?));
    }
    for (section_idx, window) in section_offsets.windows(2).enumerate() {
        let (section_begin, section_end) = (window[0], window[1]);
        if section_end > points.len() || section_begin > section_end {
            return Err(SpatialIndexError::InvalidArgument(format!(
                "section offsets {section_begin}..{section_end} exceed the {} sample points",
                points.len()
            )));
        }
        let section_id = section_idx as u64 + 1;
        for (segment_idx, sample) in (section_begin..section_end.saturating_sub(1)).enumerate() {
            entries.push(MorphoEntry::Segment(Segment::new(
                gid,
                section_id,
                segment_idx as u64,
                Cylinder::new(points[sample], points[sample + 1], radii[sample]),
            )?));
        }
    }
    Ok(entries)
}
