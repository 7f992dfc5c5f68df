//! The multi-index meta-data file, the commit record of a build.
//!
//! `_meta.txt` starts with `length=<L>` (the voxel edge length, `0` for
//! STR-partitioned builds), followed by one subtree filename per line. It
//! is written last, after every subtree and the top-level tree, so a
//! directory without it is detectably invalid.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::SpatialIndexError;
use crate::grid::VoxelId;

/// Name of the meta-data file inside a multi-index directory.
pub const META_FILENAME: &str = "_meta.txt";

/// Name of the top-level tree file inside a multi-index directory.
pub const TOP_TREE_FILENAME: &str = "top.rtree";

/// Translates a voxel (or partition) id to its subtree filename.
pub fn voxel2name(voxel: VoxelId) -> String {
    format!("VX_{}_{}_{}.rtree", voxel[0], voxel[1], voxel[2])
}

/// Recovers the voxel id encoded in a subtree filename.
pub fn filename2id(filename: &str) -> crate::Result<VoxelId> {
    let invalid = || {
        SpatialIndexError::InvalidArgument(format!("invalid rtree filename: {filename}"))
    };
    let triple = filename
        .strip_prefix("VX_")
        .and_then(|rest| rest.strip_suffix(".rtree"))
        .ok_or_else(&invalid)?;
    let mut parts = triple.split('_');
    let mut next = || -> crate::Result<i32> {
        parts
            .next()
            .and_then(|part| part.parse::<i32>().ok())
            .ok_or_else(&invalid)
    };
    let voxel = [next()?, next()?, next()?];
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok(voxel)
}

/// The parsed content of `_meta.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaData {
    /// The voxel edge length, `0` when the build was not voxel-based.
    pub voxel_length: u32,
    /// Subtree filenames; a subtree's id is its position in this list.
    pub subtrees: Vec<String>,
}

impl MetaData {
    /// Reads and validates the meta file of the multi-index at `root`.
    ///
    /// An absent or malformed file means the directory holds no committed
    /// index: `CorruptIndexError`.
    pub fn read(root: &Path) -> crate::Result<MetaData> {
        let meta_path = root.join(META_FILENAME);
        let corrupt = |reason: &str| SpatialIndexError::CorruptIndex {
            path: meta_path.clone(),
            reason: reason.to_string(),
        };
        let content = fs::read_to_string(&meta_path).map_err(|io_err| {
            if io_err.kind() == std::io::ErrorKind::NotFound {
                corrupt("the meta-data file is missing")
            } else {
                SpatialIndexError::Storage(io_err)
            }
        })?;

        let mut lines = content.lines();
        let voxel_length = lines
            .next()
            .and_then(|line| line.strip_prefix("length="))
            .and_then(|value| value.trim().parse::<u32>().ok())
            .ok_or_else(|| corrupt("the first line must be `length=<L>`"))?;

        let mut subtrees = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            filename2id(line)
                .map_err(|_| corrupt(&format!("invalid subtree filename: {line}")))?;
            subtrees.push(line.to_string());
        }
        Ok(MetaData {
            voxel_length,
            subtrees,
        })
    }

    /// Writes the meta file at `root` atomically (temporary file plus
    /// rename), committing the index.
    pub fn write(&self, root: &Path) -> crate::Result<()> {
        let tmp_path = root.join(format!("{META_FILENAME}.tmp"));
        {
            let mut file = fs::File::create(&tmp_path)?;
            writeln!(file, "length={}", self.voxel_length)?;
            for subtree in &self.subtrees {
                writeln!(file, "{subtree}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, root.join(META_FILENAME))?;
        Ok(())
    }
}
