//! Cloth collection - columnar cloth asset data with scoped facades
//!
//! This crate provides the data layer of a cloth asset:
//! - [`store`] - Generic columnar store with dependency-tracked index columns
//! - [`schema`] - The cloth schema and [`ClothCollection`]
//! - [`ranges`] - (Start, End) range pairs between parent and child groups
//! - [`facade`] - Cloth, LOD, pattern, seam and tether batch views
//! - [`welding`] - Seam welding of 3D vertices
//! - [`unwrap`] - Flattening of 3D meshes into 2D islands
//! - [`pattern_builder`] - LOD creation from an arbitrary triangle mesh
//! - [`archive`] - Versioned JSON persistence

pub mod archive;
pub mod error;
pub mod facade;
pub mod mesh;
pub mod pattern_builder;
pub mod ranges;
mod references;
pub mod schema;
pub mod store;
pub mod unwrap;
pub mod welding;

pub use archive::{ClothArchive, CLOTH_COLLECTION_VERSION};
pub use cloth_config::{ClothConfig, ConfigError, INDEX_NONE};
pub use error::ClothError;
pub use facade::*;
pub use mesh::{BoneInfluence, ReferenceBone, ReferenceSkeleton, SimulationMesh, TriangleMesh};
pub use pattern_builder::build_lod_from_mesh;
pub use schema::{ClothCollection, UserDefinedAttributeType};
pub use unwrap::{unwrap_mesh, UnwrappedIsland};
pub use welding::WeldingGroups;
