//! Binary serialization of `IndexTree` into the `.rtree` file format.
//!
//! Layout: the 5-byte magic `"SI-RT"`, a u16 structure version, a u16
//! element-kind tag, a u8 coordinate-precision tag, then the tree nodes in
//! depth-first order. Each node starts with a u8 tag; an internal node is
//! `(child_count, [bbox, child_offset]*)` with absolute byte offsets, a
//! leaf is `(element_count, [element]*)`. Integers are little-endian,
//! scalars IEEE-754, and the stream ends at hard EOF.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::common::{BinarySerializable, FixedSize};
use crate::element::ElementValue;
use crate::error::SpatialIndexError;
use crate::geometry::{Box3D, COORD_PRECISION_TAG};
use crate::rtree::node::{bbox_of_elements, bbox_of_nodes, InternalNode, LeafNode, Node};
use crate::rtree::IndexTree;
use crate::STRUCTURE_VERSION;

/// Magic bytes identifying a serialized tree.
pub const INDEX_MAGIC: &[u8; 5] = b"SI-RT";

const NODE_TAG_INTERNAL: u8 = 0;
const NODE_TAG_LEAF: u8 = 1;

/// Serialized byte length of the file header.
pub(crate) const HEADER_LEN: usize = INDEX_MAGIC.len() + 2 + 2 + 1;

impl<T: ElementValue> IndexTree<T> {
    /// Serializes the tree to `path`, truncating any existing file.
    pub fn dump(&self, path: &Path) -> crate::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Reconstructs a tree from `path`, validating magic, structure
    /// version, element kind and coordinate precision.
    pub fn load(path: &Path) -> crate::Result<IndexTree<T>> {
        let file = File::open(path).map_err(|io_err| {
            if io_err.kind() == io::ErrorKind::NotFound {
                SpatialIndexError::MissingSubtree(path.to_path_buf())
            } else {
                SpatialIndexError::Storage(io_err)
            }
        })?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader, path)
    }

    /// Writes the serialized tree into `writer`.
    pub(crate) fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(INDEX_MAGIC)?;
        STRUCTURE_VERSION.serialize(writer)?;
        (T::ELEMENT_KIND as u16).serialize(writer)?;
        COORD_PRECISION_TAG.serialize(writer)?;
        if let Some(root) = self.root.as_ref() {
            write_node(root, writer, HEADER_LEN as u64)?;
        }
        Ok(())
    }

    /// Exact byte length `write_to` will produce.
    pub(crate) fn serialized_len(&self) -> usize {
        HEADER_LEN
            + self
                .root
                .as_ref()
                .map(|root| node_size(root) as usize)
                .unwrap_or(0)
    }

    /// Reads a serialized tree from `reader`; `path` names the source in
    /// errors.
    pub(crate) fn read_from<R: Read>(reader: &mut R, path: &Path) -> crate::Result<IndexTree<T>> {
        let mut magic = [0u8; 5];
        reader
            .read_exact(&mut magic)
            .map_err(|_| corrupt(path, "file too short for the index magic"))?;
        if &magic != INDEX_MAGIC {
            return Err(corrupt(path, "bad index magic"));
        }
        let version = u16::deserialize(reader).map_err(|_| corrupt(path, "truncated header"))?;
        if version != STRUCTURE_VERSION {
            return Err(SpatialIndexError::VersionMismatch {
                found: version,
                supported: STRUCTURE_VERSION,
            });
        }
        let kind_tag = u16::deserialize(reader).map_err(|_| corrupt(path, "truncated header"))?;
        if kind_tag != T::ELEMENT_KIND as u16 {
            return Err(corrupt(
                path,
                &format!(
                    "element kind mismatch: found tag {kind_tag}, expected {}",
                    T::ELEMENT_KIND as u16
                ),
            ));
        }
        let precision = u8::deserialize(reader).map_err(|_| corrupt(path, "truncated header"))?;
        if precision != COORD_PRECISION_TAG {
            return Err(corrupt(
                path,
                &format!(
                    "coordinate precision mismatch: found tag {precision}, expected \
                     {COORD_PRECISION_TAG}"
                ),
            ));
        }

        let root = match read_u8_or_eof(reader)? {
            None => None,
            Some(tag) => {
                Some(read_node_body(tag, reader).map_err(|io_err| match io_err.kind() {
                    io::ErrorKind::UnexpectedEof => corrupt(path, "truncated node payload"),
                    io::ErrorKind::InvalidData => corrupt(path, "invalid node payload"),
                    _ => SpatialIndexError::Storage(io_err),
                })?)
            }
        };
        // Hard EOF: trailing bytes mean a corrupt file.
        if read_u8_or_eof(reader)?.is_some() {
            return Err(corrupt(path, "trailing bytes after the tree payload"));
        }

        let len = root.as_ref().map(count_elements).unwrap_or(0);
        Ok(IndexTree { root, len })
    }
}

fn corrupt(path: &Path, reason: &str) -> SpatialIndexError {
    SpatialIndexError::CorruptIndex {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_u8_or_eof<R: Read>(reader: &mut R) -> crate::Result<Option<u8>> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(ref io_err) if io_err.kind() == io::ErrorKind::Interrupted => continue,
            Err(io_err) => return Err(SpatialIndexError::Storage(io_err)),
        }
    }
}

/// Serialized byte length of `node`, children included.
fn node_size<T: ElementValue>(node: &Node<T>) -> u64 {
    match node {
        Node::Leaf(leaf) => {
            let payload: usize = leaf.elements.iter().map(ElementValue::serialized_len).sum();
            (1 + 2 + payload) as u64
        }
        Node::Internal(internal) => {
            let header =
                1 + 2 + internal.children.len() * (Box3D::SIZE_IN_BYTES + u64::SIZE_IN_BYTES);
            header as u64 + internal.children.iter().map(node_size).sum::<u64>()
        }
    }
}

/// Writes `node` whose first byte sits at absolute offset `offset`.
fn write_node<T: ElementValue, W: Write>(
    node: &Node<T>,
    writer: &mut W,
    offset: u64,
) -> io::Result<()> {
    match node {
        Node::Leaf(leaf) => {
            NODE_TAG_LEAF.serialize(writer)?;
            (leaf.elements.len() as u16).serialize(writer)?;
            for element in &leaf.elements {
                element.serialize(writer)?;
            }
        }
        Node::Internal(internal) => {
            NODE_TAG_INTERNAL.serialize(writer)?;
            (internal.children.len() as u16).serialize(writer)?;
            let mut child_offset = offset
                + (1 + 2 + internal.children.len() * (Box3D::SIZE_IN_BYTES + u64::SIZE_IN_BYTES))
                    as u64;
            let mut offsets = Vec::with_capacity(internal.children.len());
            for child in &internal.children {
                child.bbox().serialize(writer)?;
                child_offset.serialize(writer)?;
                offsets.push(child_offset);
                child_offset += node_size(child);
            }
            for (child, child_offset) in internal.children.iter().zip(offsets) {
                write_node(child, writer, child_offset)?;
            }
        }
    }
    Ok(())
}

/// Reads the node whose tag byte has already been consumed. Children follow
/// their parent in the stream, so the stored offsets need not be chased.
fn read_node_body<T: ElementValue>(tag: u8, reader: &mut impl Read) -> io::Result<Node<T>> {
    match tag {
        NODE_TAG_LEAF => {
            let element_count = u16::deserialize(reader)? as usize;
            let mut elements = Vec::with_capacity(element_count);
            for _ in 0..element_count {
                elements.push(T::deserialize(reader)?);
            }
            let bbox = bbox_of_elements(&elements);
            Ok(Node::Leaf(LeafNode { bbox, elements }))
        }
        NODE_TAG_INTERNAL => {
            let child_count = u16::deserialize(reader)? as usize;
            for _ in 0..child_count {
                let _child_bbox = Box3D::deserialize(reader)?;
                let _child_offset = u64::deserialize(reader)?;
            }
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let child_tag = u8::deserialize(reader)?;
                children.push(read_node_body(child_tag, reader)?);
            }
            let bbox = bbox_of_nodes(&children);
            Ok(Node::Internal(InternalNode { bbox, children }))
        }
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid node tag",
        )),
    }
}

fn count_elements<T>(node: &Node<T>) -> usize {
    match node {
        Node::Leaf(leaf) => leaf.elements.len(),
        Node::Internal(internal) => internal.children.iter().map(count_elements).sum(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::element::{IndexedSphere, MorphoEntry, Segment, Soma};
    use crate::geometry::{CoordType, Cylinder, Point3D, Sphere};

    fn sample_tree(n: u64) -> IndexTree<IndexedSphere> {
        let mut tree = IndexTree::new();
        for i in 0..n {
            tree.insert(IndexedSphere::new(
                i,
                Point3D::new(
                    (i % 23) as CoordType,
                    (i % 11) as CoordType,
                    (i % 5) as CoordType,
                ),
                0.4,
            ));
        }
        tree
    }

    fn roundtrip<T: ElementValue>(tree: &IndexTree<T>) -> IndexTree<T> {
        let mut buffer = Vec::new();
        tree.write_to(&mut buffer).unwrap();
        assert_eq!(buffer.len(), tree.serialized_len());
        IndexTree::read_from(&mut Cursor::new(&buffer[..]), Path::new("buffer")).unwrap()
    }

    #[test]
    fn test_roundtrip_preserves_queries() {
        let tree = sample_tree(200);
        let restored = roundtrip(&tree);
        assert_eq!(restored.len(), tree.len());
        assert_eq!(restored.all_ids(), tree.all_ids());
        assert_eq!(restored.bounds(), tree.bounds());
        for probe in [
            Sphere::new(Point3D::new(5.0, 5.0, 2.0), 3.0),
            Sphere::new(Point3D::new(0.0, 0.0, 0.0), 0.1),
        ] {
            let mut a = tree.find_intersecting(probe);
            let mut b = restored.find_intersecting(probe);
            a.sort_unstable();
            b.sort_unstable();
            assert_eq!(a, b);
        }
        assert_eq!(
            restored.find_nearest(Point3D::ZERO, 7),
            tree.find_nearest(Point3D::ZERO, 7)
        );
    }

    #[test]
    fn test_roundtrip_empty_tree() {
        let tree: IndexTree<IndexedSphere> = IndexTree::new();
        let restored = roundtrip(&tree);
        assert!(restored.is_empty());
        assert_eq!(tree.serialized_len(), HEADER_LEN);
    }

    #[test]
    fn test_roundtrip_variant_elements() {
        let mut tree: IndexTree<MorphoEntry> = IndexTree::new();
        tree.insert(MorphoEntry::Soma(
            Soma::new(1, Sphere::new(Point3D::ZERO, 2.0)).unwrap(),
        ));
        tree.insert(MorphoEntry::Segment(
            Segment::new(
                1,
                1,
                1,
                Cylinder::new(Point3D::ZERO, Point3D::new(4.0, 0.0, 0.0), 0.5),
            )
            .unwrap(),
        ));
        let restored = roundtrip(&tree);
        assert_eq!(restored.all_ids(), tree.all_ids());
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut buffer = Vec::new();
        sample_tree(3).write_to(&mut buffer).unwrap();
        buffer[0] = b'X';
        let err = IndexTree::<IndexedSphere>::read_from(
            &mut Cursor::new(&buffer[..]),
            Path::new("buffer"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialIndexError::CorruptIndex { .. }));
    }

    #[test]
    fn test_version_mismatch() {
        let mut buffer = Vec::new();
        sample_tree(3).write_to(&mut buffer).unwrap();
        // The structure version sits right after the magic.
        buffer[5] = 0xff;
        buffer[6] = 0xff;
        let err = IndexTree::<IndexedSphere>::read_from(
            &mut Cursor::new(&buffer[..]),
            Path::new("buffer"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialIndexError::VersionMismatch { .. }));
    }

    #[test]
    fn test_element_kind_mismatch() {
        let mut buffer = Vec::new();
        sample_tree(3).write_to(&mut buffer).unwrap();
        let err =
            IndexTree::<Soma>::read_from(&mut Cursor::new(&buffer[..]), Path::new("buffer"))
                .unwrap_err();
        assert!(matches!(err, SpatialIndexError::CorruptIndex { .. }));
    }

    #[test]
    fn test_trailing_bytes_are_corrupt() {
        let mut buffer = Vec::new();
        sample_tree(3).write_to(&mut buffer).unwrap();
        buffer.push(0);
        let err = IndexTree::<IndexedSphere>::read_from(
            &mut Cursor::new(&buffer[..]),
            Path::new("buffer"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialIndexError::CorruptIndex { .. }));
    }

    #[test]
    fn test_truncated_file_is_corrupt() {
        let mut buffer = Vec::new();
        sample_tree(40).write_to(&mut buffer).unwrap();
        buffer.truncate(buffer.len() - 7);
        let err = IndexTree::<IndexedSphere>::read_from(
            &mut Cursor::new(&buffer[..]),
            Path::new("buffer"),
        )
        .unwrap_err();
        assert!(matches!(err, SpatialIndexError::CorruptIndex { .. }));
    }

    #[test]
    fn test_dump_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spheres.rtree");
        let tree = sample_tree(50);
        tree.dump(&path).unwrap();
        let restored = IndexTree::<IndexedSphere>::load(&path).unwrap();
        assert_eq!(restored.all_ids(), tree.all_ids());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IndexTree::<IndexedSphere>::load(&dir.path().join("absent.rtree")).unwrap_err();
        assert!(matches!(err, SpatialIndexError::MissingSubtree(_)));
    }
}
