//! A 3-D spatial index for neuroscience morphology data.
//!
//! The library ingests large collections of geometric primitives (spheres,
//! capped cylinders, point-like synapses) annotated with hierarchical
//! identifiers (neuron gid, section, segment) and answers range,
//! containment, nearest-neighbour and non-overlapping-placement queries
//! over them.
//!
//! Indexes come in three flavours:
//! - fully in-memory ([`IndexTree`]);
//! - backed by a memory-mapped file, reusable across processes without
//!   rebuilding ([`MemDiskIndex`]);
//! - split into many per-partition sub-indexes persisted in a directory
//!   and loaded on demand ([`MultiIndex`], built by [`MultiIndexBuilder`]
//!   with Sort-Tile-Recursion partitioning, optionally voxelized through
//!   [`SpatialGrid`]).
//!
//! # Example
//!
//! ```
//! use spatial_index::{IndexTree, IndexedSphere, Point3D, Sphere};
//!
//! let mut index = IndexTree::new();
//! index.insert(IndexedSphere::new(0, Point3D::new(0.0, 0.0, 0.0), 2.0));
//! index.insert(IndexedSphere::new(1, Point3D::new(10.0, 0.0, 0.0), 2.5));
//!
//! let probe = Sphere::new(Point3D::new(9.0, 0.0, 0.0), 1.0);
//! let hits = index.find_intersecting(probe);
//! assert_eq!(hits.len(), 1);
//! ```

#![warn(missing_docs)]

pub mod comm;
pub mod common;
pub mod element;
mod error;
pub mod executor;
pub mod geometry;
pub mod grid;
pub mod memdisk;
pub mod multi;
pub mod partition;
pub mod rtree;

pub use crate::comm::{CancelToken, Communicator, SelfComm};
pub use crate::element::{
    ElementKind, GeometryEntry, GroupedValue, IndexedSphere, MorphPartId, MorphoEntry, Segment,
    ShapeId, Soma, Synapse, SynapseId, TaggedValue, TreeValue,
};
pub use crate::error::{Result, SpatialIndexError};
pub use crate::executor::Executor;
pub use crate::geometry::{Box3D, CoordType, Cylinder, GeometryMode, Point3D, Shape, Sphere};
pub use crate::grid::SpatialGrid;
pub use crate::memdisk::MemDiskIndex;
pub use crate::multi::{MultiIndex, MultiIndexBuilder};
pub use crate::rtree::IndexTree;

/// Version of the on-disk structures (tree files, the memory-mapped
/// header, and the multi-index layout). Bumped on breaking layout changes;
/// readers refuse files with another version.
pub const STRUCTURE_VERSION: u16 = 2;
