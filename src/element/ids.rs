use std::fmt;

use crate::error::SpatialIndexError;

/// A generic element identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(pub u64);

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of low bits reserved for the segment id.
const SEGMENT_BITS: u32 = 10;
/// Number of bits reserved for the section id, above the segment bits.
const SECTION_BITS: u32 = 14;
/// Number of high bits left for the gid.
const GID_BITS: u32 = 64 - SECTION_BITS - SEGMENT_BITS;

const SEGMENT_MASK: u64 = (1 << SEGMENT_BITS) - 1;
const SECTION_MASK: u64 = (1 << SECTION_BITS) - 1;
const GID_MASK: u64 = (1 << GID_BITS) - 1;

/// A `(gid, section_id, segment_id)` triple packed into one 64-bit word:
/// segment in the low 10 bits, section in the next 14, gid in the remaining
/// high bits.
///
/// The packed word doubles as the element's natural sort key. Packing
/// validates the component ranges and fails loudly instead of truncating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MorphPartId(u64);

impl MorphPartId {
    /// Packs the triple, failing with `OutOfRange` if any component exceeds
    /// its reserved bit width.
    pub fn pack(gid: u64, section_id: u64, segment_id: u64) -> crate::Result<MorphPartId> {
        if gid > GID_MASK {
            return Err(SpatialIndexError::OutOfRange(format!(
                "gid {gid} exceeds {GID_BITS} bits"
            )));
        }
        if section_id > SECTION_MASK {
            return Err(SpatialIndexError::OutOfRange(format!(
                "section id {section_id} exceeds {SECTION_BITS} bits"
            )));
        }
        if segment_id > SEGMENT_MASK {
            return Err(SpatialIndexError::OutOfRange(format!(
                "segment id {segment_id} exceeds {SEGMENT_BITS} bits"
            )));
        }
        Ok(MorphPartId(
            (gid << (SECTION_BITS + SEGMENT_BITS)) | (section_id << SEGMENT_BITS) | segment_id,
        ))
    }

    /// Rebuilds an id from its packed representation.
    pub fn from_raw(raw: u64) -> MorphPartId {
        MorphPartId(raw)
    }

    /// The packed representation.
    pub fn raw(self) -> u64 {
        self.0
    }

    /// The neuron gid.
    pub fn gid(self) -> u64 {
        self.0 >> (SECTION_BITS + SEGMENT_BITS)
    }

    /// The section id within the neuron.
    pub fn section_id(self) -> u64 {
        (self.0 >> SEGMENT_BITS) & SECTION_MASK
    }

    /// The segment id within the section.
    pub fn segment_id(self) -> u64 {
        self.0 & SEGMENT_MASK
    }
}

impl fmt::Display for MorphPartId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "({}, {}, {})",
            self.gid(),
            self.section_id(),
            self.segment_id()
        )
    }
}

/// A synapse identifier: the synapse id plus the post- and pre-synaptic
/// neuron gids, as three independent integers.
///
/// Ordering and equality follow `id` first, so deduplication across
/// subtrees behaves like the other id schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SynapseId {
    /// The synapse id.
    pub id: u64,
    /// The post-synaptic neuron gid.
    pub post_gid: u64,
    /// The pre-synaptic neuron gid.
    pub pre_gid: u64,
}

impl fmt::Display for SynapseId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {}, {})", self.id, self.post_gid, self.pre_gid)
    }
}
