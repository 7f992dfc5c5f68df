//! Indexed elements: geometric primitives annotated with one of the
//! identifier schemes of the circuit data model.
//!
//! Somas and segments carry a bit-packed [`MorphPartId`]
//! (gid / section / segment), synapses a [`SynapseId`], generic shapes a
//! plain [`ShapeId`]. The enums [`GeometryEntry`] and [`MorphoEntry`] are the
//! tagged unions stored in mixed trees; all dispatch is a `match`, no
//! virtual calls.

mod ids;
pub mod soa;

pub use self::ids::{MorphPartId, ShapeId, SynapseId};

use std::fmt;
use std::hash::Hash;
use std::io::{self, Read, Write};

use crate::common::BinarySerializable;
use crate::geometry::{Box3D, Cylinder, Point3D, Shape, Sphere};

/// Discriminator recorded in serialized tree files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ElementKind {
    /// Generic tagged sphere.
    IndexedSphere = 0,
    /// Soma (sphere + morphology id).
    Soma = 1,
    /// Segment (capsule + morphology id).
    Segment = 2,
    /// Synapse (point + synapse id triple).
    Synapse = 3,
    /// Variant entry, either soma or segment.
    MorphoEntry = 4,
    /// Top-level multi-index entry; never a public element kind.
    SubtreeBox = 5,
}

impl ElementKind {
    /// Recovers an element kind from its serialized tag.
    pub fn from_tag(tag: u16) -> Option<ElementKind> {
        match tag {
            0 => Some(ElementKind::IndexedSphere),
            1 => Some(ElementKind::Soma),
            2 => Some(ElementKind::Segment),
            3 => Some(ElementKind::Synapse),
            4 => Some(ElementKind::MorphoEntry),
            5 => Some(ElementKind::SubtreeBox),
            _ => None,
        }
    }
}

/// A value an [`IndexTree`](crate::rtree::IndexTree) can store: anything
/// with a geometry, hence a bounding box and a centroid.
pub trait TreeValue: Clone + fmt::Debug {
    /// The element's geometry.
    fn geometry(&self) -> Shape;

    /// Bounding box covering every point of the geometry.
    fn bounding_box(&self) -> Box3D {
        self.geometry().bounding_box()
    }

    /// The centroid, the reference point for nearest-neighbour distance.
    fn centroid(&self) -> Point3D {
        self.geometry().centroid()
    }

    /// Moves the value by `offset`.
    fn translate(&mut self, offset: Point3D);
}

/// A tree value carrying an identifier. Equality and result deduplication
/// are by id, never by geometry.
pub trait TaggedValue: TreeValue {
    /// The identifier type.
    type Id: Copy + Ord + Eq + Hash + fmt::Debug;

    /// The element's identifier.
    fn id(&self) -> Self::Id;
}

/// A tagged value that belongs to a neuron, enabling count-by-gid
/// aggregation.
pub trait GroupedValue: TaggedValue {
    /// The neuron gid the element belongs to.
    fn gid(&self) -> u64;
}

/// A tree value with a stable binary representation, storable in index
/// files.
pub trait ElementValue: TreeValue + BinarySerializable {
    /// The discriminator written to serialized tree files.
    const ELEMENT_KIND: ElementKind;

    /// Exact byte length of this element's serialized representation.
    fn serialized_len(&self) -> usize;
}

/// A sphere with a generic numeric identifier.
#[derive(Debug, Clone, Copy)]
pub struct IndexedSphere {
    /// The identifier.
    pub id: ShapeId,
    /// The geometry.
    pub geometry: Sphere,
}

impl IndexedSphere {
    /// Creates a tagged sphere.
    pub fn new(id: u64, centroid: Point3D, radius: crate::geometry::CoordType) -> IndexedSphere {
        IndexedSphere {
            id: ShapeId(id),
            geometry: Sphere::new(centroid, radius),
        }
    }
}

impl PartialEq for IndexedSphere {
    fn eq(&self, other: &IndexedSphere) -> bool {
        self.id == other.id
    }
}

impl TreeValue for IndexedSphere {
    fn geometry(&self) -> Shape {
        Shape::Sphere(self.geometry)
    }
    fn translate(&mut self, offset: Point3D) {
        self.geometry.translate(offset);
    }
}

impl TaggedValue for IndexedSphere {
    type Id = ShapeId;
    fn id(&self) -> ShapeId {
        self.id
    }
}

impl BinarySerializable for IndexedSphere {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.0.serialize(writer)?;
        self.geometry.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = ShapeId(u64::deserialize(reader)?);
        let geometry = Sphere::deserialize(reader)?;
        Ok(IndexedSphere { id, geometry })
    }
}

impl ElementValue for IndexedSphere {
    const ELEMENT_KIND: ElementKind = ElementKind::IndexedSphere;
    fn serialized_len(&self) -> usize {
        use crate::common::FixedSize;
        u64::SIZE_IN_BYTES + Sphere::SIZE_IN_BYTES
    }
}

/// A soma: a sphere owned by a neuron. Section and segment ids are zero by
/// convention.
#[derive(Debug, Clone, Copy)]
pub struct Soma {
    /// The packed morphology identifier.
    pub id: MorphPartId,
    /// The geometry.
    pub geometry: Sphere,
}

impl Soma {
    /// Creates a soma for neuron `gid`.
    pub fn new(gid: u64, geometry: Sphere) -> crate::Result<Soma> {
        Ok(Soma {
            id: MorphPartId::pack(gid, 0, 0)?,
            geometry,
        })
    }
}

impl PartialEq for Soma {
    fn eq(&self, other: &Soma) -> bool {
        self.id == other.id
    }
}

impl TreeValue for Soma {
    fn geometry(&self) -> Shape {
        Shape::Sphere(self.geometry)
    }
    fn translate(&mut self, offset: Point3D) {
        self.geometry.translate(offset);
    }
}

impl TaggedValue for Soma {
    type Id = MorphPartId;
    fn id(&self) -> MorphPartId {
        self.id
    }
}

impl GroupedValue for Soma {
    fn gid(&self) -> u64 {
        self.id.gid()
    }
}

impl BinarySerializable for Soma {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.raw().serialize(writer)?;
        self.geometry.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = MorphPartId::from_raw(u64::deserialize(reader)?);
        let geometry = Sphere::deserialize(reader)?;
        Ok(Soma { id, geometry })
    }
}

impl ElementValue for Soma {
    const ELEMENT_KIND: ElementKind = ElementKind::Soma;
    fn serialized_len(&self) -> usize {
        use crate::common::FixedSize;
        u64::SIZE_IN_BYTES + Sphere::SIZE_IN_BYTES
    }
}

/// A morphology segment: a capsule owned by a neuron section.
#[derive(Debug, Clone, Copy)]
pub struct Segment {
    /// The packed morphology identifier.
    pub id: MorphPartId,
    /// The geometry.
    pub geometry: Cylinder,
}

impl Segment {
    /// Creates a segment of neuron `gid`, section `section_id`, segment
    /// `segment_id`.
    pub fn new(
        gid: u64,
        section_id: u64,
        segment_id: u64,
        geometry: Cylinder,
    ) -> crate::Result<Segment> {
        Ok(Segment {
            id: MorphPartId::pack(gid, section_id, segment_id)?,
            geometry,
        })
    }
}

impl PartialEq for Segment {
    fn eq(&self, other: &Segment) -> bool {
        self.id == other.id
    }
}

impl TreeValue for Segment {
    fn geometry(&self) -> Shape {
        Shape::Cylinder(self.geometry)
    }
    fn translate(&mut self, offset: Point3D) {
        self.geometry.translate(offset);
    }
}

impl TaggedValue for Segment {
    type Id = MorphPartId;
    fn id(&self) -> MorphPartId {
        self.id
    }
}

impl GroupedValue for Segment {
    fn gid(&self) -> u64 {
        self.id.gid()
    }
}

impl BinarySerializable for Segment {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.raw().serialize(writer)?;
        self.geometry.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = MorphPartId::from_raw(u64::deserialize(reader)?);
        let geometry = Cylinder::deserialize(reader)?;
        Ok(Segment { id, geometry })
    }
}

impl ElementValue for Segment {
    const ELEMENT_KIND: ElementKind = ElementKind::Segment;
    fn serialized_len(&self) -> usize {
        use crate::common::FixedSize;
        u64::SIZE_IN_BYTES + Cylinder::SIZE_IN_BYTES
    }
}

/// A synapse, point-like, stored as a zero-radius sphere.
#[derive(Debug, Clone, Copy)]
pub struct Synapse {
    /// The synapse identifier triple.
    pub id: SynapseId,
    /// The geometry (radius zero).
    pub geometry: Sphere,
}

impl Synapse {
    /// Creates a synapse at `position`.
    pub fn new(id: u64, post_gid: u64, pre_gid: u64, position: Point3D) -> Synapse {
        Synapse {
            id: SynapseId {
                id,
                post_gid,
                pre_gid,
            },
            geometry: Sphere::from_point(position),
        }
    }
}

impl PartialEq for Synapse {
    fn eq(&self, other: &Synapse) -> bool {
        self.id == other.id
    }
}

impl TreeValue for Synapse {
    fn geometry(&self) -> Shape {
        Shape::Sphere(self.geometry)
    }
    fn translate(&mut self, offset: Point3D) {
        self.geometry.translate(offset);
    }
}

impl TaggedValue for Synapse {
    type Id = SynapseId;
    fn id(&self) -> SynapseId {
        self.id
    }
}

impl GroupedValue for Synapse {
    // Synapse counts aggregate per post-synaptic neuron.
    fn gid(&self) -> u64 {
        self.id.post_gid
    }
}

impl BinarySerializable for Synapse {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        self.id.id.serialize(writer)?;
        self.id.post_gid.serialize(writer)?;
        self.id.pre_gid.serialize(writer)?;
        self.geometry.centroid.serialize(writer)
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let id = u64::deserialize(reader)?;
        let post_gid = u64::deserialize(reader)?;
        let pre_gid = u64::deserialize(reader)?;
        let position = Point3D::deserialize(reader)?;
        Ok(Synapse::new(id, post_gid, pre_gid, position))
    }
}

impl ElementValue for Synapse {
    const ELEMENT_KIND: ElementKind = ElementKind::Synapse;
    fn serialized_len(&self) -> usize {
        use crate::common::FixedSize;
        3 * u64::SIZE_IN_BYTES + Point3D::SIZE_IN_BYTES
    }
}

/// Id-less geometry entry, for trees over raw shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeometryEntry {
    /// A bare sphere.
    Sphere(Sphere),
    /// A bare capsule.
    Cylinder(Cylinder),
}

impl TreeValue for GeometryEntry {
    fn geometry(&self) -> Shape {
        match self {
            GeometryEntry::Sphere(sphere) => Shape::Sphere(*sphere),
            GeometryEntry::Cylinder(cylinder) => Shape::Cylinder(*cylinder),
        }
    }
    fn translate(&mut self, offset: Point3D) {
        match self {
            GeometryEntry::Sphere(sphere) => sphere.translate(offset),
            GeometryEntry::Cylinder(cylinder) => cylinder.translate(offset),
        }
    }
}

/// The normal circuit element: a soma or a segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MorphoEntry {
    /// A soma.
    Soma(Soma),
    /// A segment.
    Segment(Segment),
}

impl TreeValue for MorphoEntry {
    fn geometry(&self) -> Shape {
        match self {
            MorphoEntry::Soma(soma) => soma.geometry(),
            MorphoEntry::Segment(segment) => segment.geometry(),
        }
    }
    fn translate(&mut self, offset: Point3D) {
        match self {
            MorphoEntry::Soma(soma) => soma.translate(offset),
            MorphoEntry::Segment(segment) => segment.translate(offset),
        }
    }
}

impl TaggedValue for MorphoEntry {
    type Id = MorphPartId;
    fn id(&self) -> MorphPartId {
        match self {
            MorphoEntry::Soma(soma) => soma.id,
            MorphoEntry::Segment(segment) => segment.id,
        }
    }
}

impl GroupedValue for MorphoEntry {
    fn gid(&self) -> u64 {
        self.id().gid()
    }
}

impl BinarySerializable for MorphoEntry {
    fn serialize<W: Write + ?Sized>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            MorphoEntry::Soma(soma) => {
                0u8.serialize(writer)?;
                soma.serialize(writer)
            }
            MorphoEntry::Segment(segment) => {
                1u8.serialize(writer)?;
                segment.serialize(writer)
            }
        }
    }
    fn deserialize<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let discriminant = u8::deserialize(reader)?;
        match discriminant {
            0 => Ok(MorphoEntry::Soma(Soma::deserialize(reader)?)),
            1 => Ok(MorphoEntry::Segment(Segment::deserialize(reader)?)),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "invalid morpho entry discriminant",
            )),
        }
    }
}

impl ElementValue for MorphoEntry {
    const ELEMENT_KIND: ElementKind = ElementKind::MorphoEntry;
    fn serialized_len(&self) -> usize {
        1 + match self {
            MorphoEntry::Soma(soma) => soma.serialized_len(),
            MorphoEntry::Segment(segment) => segment.serialized_len(),
        }
    }
}

impl From<Soma> for MorphoEntry {
    fn from(soma: Soma) -> MorphoEntry {
        MorphoEntry::Soma(soma)
    }
}

impl From<Segment> for MorphoEntry {
    fn from(segment: Segment) -> MorphoEntry {
        MorphoEntry::Segment(segment)
    }
}
