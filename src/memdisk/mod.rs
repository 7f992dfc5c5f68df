//! A memory-mapped `IndexTree` backing: the tree lives inside a single
//! managed file together with a versioned header, so an index can be
//! reopened by other processes without rebuilding it from its sources.
//!
//! The handle owns the mapped region and hands the tree out by borrow, so
//! the tree cannot outlive its storage. Closing flushes and optionally
//! shrinks the file to its used size; dropping flushes. Several processes
//! may map the same file read-only; writers need exclusive access, which
//! the library does not mediate.

use std::fs::{File, OpenOptions};
use std::io::Cursor;
use std::path::{Path, PathBuf};

use log::warn;
use memmap2::{Mmap, MmapMut, MmapOptions};
use serde::{Deserialize, Serialize};

use crate::element::ElementValue;
use crate::error::SpatialIndexError;
use crate::rtree::IndexTree;
use crate::STRUCTURE_VERSION;

/// Magic bytes at offset zero of a memory-mapped index file.
const MEMDISK_MAGIC: &[u8; 8] = b"SI-MEMD\0";

/// The version string of the mmap runtime the file was written with. A
/// mismatch on open is only a warning; the structure version decides
/// compatibility.
pub const RUNTIME_MMAP_VERSION: &str = "memmap2/0.9";

/// Fixed span reserved for the header; the tree payload starts here.
const HEADER_SPAN: usize = 4096;

/// Byte offset of the payload length within the header.
const PAYLOAD_LEN_OFFSET: usize = MEMDISK_MAGIC.len();
/// Byte offset of the version record within the header.
const VERSION_RECORD_OFFSET: usize = PAYLOAD_LEN_OFFSET + 8;

/// The version record stored in the header, as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// The index structure version.
    pub structure_version: u16,
    /// The mmap runtime the file was written with.
    pub runtime_version: String,
}

impl Version {
    fn current() -> Version {
        Version {
            structure_version: STRUCTURE_VERSION,
            runtime_version: RUNTIME_MMAP_VERSION.to_string(),
        }
    }
}

/// An `IndexTree` stored inside a memory-mapped file.
#[derive(Debug)]
pub struct MemDiskIndex<T: ElementValue> {
    path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    tree: IndexTree<T>,
    close_shrink: bool,
    read_only: bool,
}

impl<T: ElementValue> MemDiskIndex<T> {
    /// Opens `path` read-write, creating a file of `size_mib` MiB when it
    /// does not exist (or unconditionally with `truncate`). With
    /// `close_shrink`, [`close`](Self::close) trims the file to its used
    /// size.
    pub fn open_or_create(
        path: &Path,
        size_mib: usize,
        truncate: bool,
        close_shrink: bool,
    ) -> crate::Result<MemDiskIndex<T>> {
        if truncate {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {}
                Err(io_err) => return Err(SpatialIndexError::Storage(io_err)),
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let current_len = file.metadata()?.len();
        let target_len = (size_mib * 1024 * 1024).max(HEADER_SPAN) as u64;
        if current_len < target_len {
            file.set_len(target_len)?;
        }
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };

        let tree = if current_len == 0 || mmap[..MEMDISK_MAGIC.len()] != MEMDISK_MAGIC[..] {
            write_header(&mut mmap, 0)?;
            IndexTree::new()
        } else {
            read_payload(&mmap, path)?
        };

        Ok(MemDiskIndex {
            path: path.to_path_buf(),
            file,
            mmap: Some(mmap),
            tree,
            close_shrink,
            read_only: false,
        })
    }

    /// Opens an existing file read-only.
    pub fn open(path: &Path) -> crate::Result<MemDiskIndex<T>> {
        let file = File::open(path)?;
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        let tree = read_payload(&mmap, path)?;
        Ok(MemDiskIndex {
            path: path.to_path_buf(),
            file,
            mmap: None,
            tree,
            close_shrink: false,
            read_only: true,
        })
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The tree, borrowed from the handle.
    pub fn tree(&self) -> &IndexTree<T> {
        &self.tree
    }

    /// The tree, mutably. Fails on a read-only handle.
    pub fn tree_mut(&mut self) -> crate::Result<&mut IndexTree<T>> {
        if self.read_only {
            return Err(SpatialIndexError::InvalidArgument(
                "the memory-mapped index was opened read-only".to_string(),
            ));
        }
        Ok(&mut self.tree)
    }

    /// Serializes the tree into the mapped region and flushes it to disk,
    /// growing the file when the payload outgrew it.
    pub fn flush(&mut self) -> crate::Result<()> {
        if self.read_only {
            return Ok(());
        }
        let payload_len = self.tree.serialized_len();
        let needed = (HEADER_SPAN + payload_len) as u64;
        if self.file.metadata()?.len() < needed {
            // Unmap before growing the file, then map the new span.
            self.mmap = None;
            self.file.set_len(needed)?;
        }
        let mut mmap = match self.mmap.take() {
            Some(mmap) => mmap,
            None => unsafe { MmapOptions::new().map_mut(&self.file)? },
        };
        let mut cursor = Cursor::new(&mut mmap[HEADER_SPAN..HEADER_SPAN + payload_len]);
        self.tree.write_to(&mut cursor)?;
        write_header(&mut mmap, payload_len as u64)?;
        mmap.flush()?;
        self.mmap = Some(mmap);
        Ok(())
    }

    /// Flushes and releases the mapping; with `close_shrink` the file is
    /// trimmed to its used size.
    pub fn close(mut self) -> crate::Result<()> {
        self.close_internal()
    }

    fn close_internal(&mut self) -> crate::Result<()> {
        if self.read_only {
            return Ok(());
        }
        self.flush()?;
        let payload_len = self.tree.serialized_len();
        self.mmap = None;
        if self.close_shrink {
            self.file.set_len((HEADER_SPAN + payload_len) as u64)?;
        }
        self.read_only = true;
        Ok(())
    }
}

impl<T: ElementValue> Drop for MemDiskIndex<T> {
    fn drop(&mut self) {
        if let Err(err) = self.close_internal() {
            warn!(
                "failed to flush the memory-mapped index at {:?} on drop: {err}",
                self.path
            );
        }
    }
}

fn write_header(mmap: &mut MmapMut, payload_len: u64) -> crate::Result<()> {
    let record = serde_json::to_vec(&Version::current())?;
    if VERSION_RECORD_OFFSET + 2 + record.len() > HEADER_SPAN {
        return Err(SpatialIndexError::Internal(
            "version record does not fit the header span".to_string(),
        ));
    }
    mmap[..MEMDISK_MAGIC.len()].copy_from_slice(MEMDISK_MAGIC);
    mmap[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 8].copy_from_slice(&payload_len.to_le_bytes());
    let record_len = record.len() as u16;
    mmap[VERSION_RECORD_OFFSET..VERSION_RECORD_OFFSET + 2]
        .copy_from_slice(&record_len.to_le_bytes());
    mmap[VERSION_RECORD_OFFSET + 2..VERSION_RECORD_OFFSET + 2 + record.len()]
        .copy_from_slice(&record);
    Ok(())
}

fn read_payload<T: ElementValue>(bytes: &[u8], path: &Path) -> crate::Result<IndexTree<T>> {
    if bytes.len() < HEADER_SPAN || bytes[..MEMDISK_MAGIC.len()] != MEMDISK_MAGIC[..] {
        return Err(SpatialIndexError::CorruptIndex {
            path: path.to_path_buf(),
            reason: "not a memory-mapped index file".to_string(),
        });
    }
    let mut payload_len_bytes = [0u8; 8];
    payload_len_bytes.copy_from_slice(&bytes[PAYLOAD_LEN_OFFSET..PAYLOAD_LEN_OFFSET + 8]);
    let payload_len = u64::from_le_bytes(payload_len_bytes) as usize;

    let mut record_len_bytes = [0u8; 2];
    record_len_bytes.copy_from_slice(&bytes[VERSION_RECORD_OFFSET..VERSION_RECORD_OFFSET + 2]);
    let record_len = u16::from_le_bytes(record_len_bytes) as usize;
    if VERSION_RECORD_OFFSET + 2 + record_len > HEADER_SPAN {
        return Err(SpatialIndexError::CorruptIndex {
            path: path.to_path_buf(),
            reason: "version record overruns the header".to_string(),
        });
    }
    let record: Version = serde_json::from_slice(
        &bytes[VERSION_RECORD_OFFSET + 2..VERSION_RECORD_OFFSET + 2 + record_len],
    )?;
    if record.structure_version != STRUCTURE_VERSION {
        return Err(SpatialIndexError::VersionMismatch {
            found: record.structure_version,
            supported: STRUCTURE_VERSION,
        });
    }
    if record.runtime_version != RUNTIME_MMAP_VERSION {
        warn!(
            "memory-mapped index {:?} was written with {}, reading it with {}",
            path, record.runtime_version, RUNTIME_MMAP_VERSION
        );
    }

    if payload_len == 0 {
        return Ok(IndexTree::new());
    }
    if HEADER_SPAN + payload_len > bytes.len() {
        return Err(SpatialIndexError::CorruptIndex {
            path: path.to_path_buf(),
            reason: "payload length exceeds the mapped file".to_string(),
        });
    }
    let mut cursor = Cursor::new(&bytes[HEADER_SPAN..HEADER_SPAN + payload_len]);
    IndexTree::read_from(&mut cursor, path)
}
