//! Cloth collection schema.
//!
//! Declares every group of the cloth collection, its fixed attributes and
//! the range relationships between groups. Range pairs hold absolute row
//! indices and are renumbered by the store; every other cross-reference is
//! LOD-relative and kept consistent by [`crate::references`].

use cloth_config::ClothConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ranges::RangeColumns;
use crate::store::{AttributeCollection, AttributeKind, AttributeType};

/// Group names
pub mod groups {
    pub const LODS: &str = "Lods";
    pub const PATTERNS: &str = "Patterns";
    pub const SEAMS: &str = "Seams";
    pub const SEAM_STITCHES: &str = "SeamStitches";
    pub const TETHER_BATCHES: &str = "TetherBatches";
    pub const TETHERS: &str = "Tethers";
    pub const SIM_VERTICES_2D: &str = "SimVertices2D";
    pub const SIM_VERTICES_3D: &str = "SimVertices3D";
    pub const SIM_FACES: &str = "SimFaces";
    pub const RENDER_VERTICES: &str = "RenderVertices";
    pub const RENDER_FACES: &str = "RenderFaces";
    pub const MATERIALS: &str = "Materials";
}

/// Attribute names
pub mod attributes {
    // Lods
    pub const PATTERN_START: &str = "PatternStart";
    pub const PATTERN_END: &str = "PatternEnd";
    pub const SEAM_START: &str = "SeamStart";
    pub const SEAM_END: &str = "SeamEnd";
    pub const TETHER_BATCH_START: &str = "TetherBatchStart";
    pub const TETHER_BATCH_END: &str = "TetherBatchEnd";
    pub const MATERIAL_START: &str = "MaterialStart";
    pub const MATERIAL_END: &str = "MaterialEnd";
    pub const SIM_VERTICES_3D_START: &str = "SimVertices3DStart";
    pub const SIM_VERTICES_3D_END: &str = "SimVertices3DEnd";
    pub const PHYSICS_ASSET_PATH_NAME: &str = "PhysicsAssetPathName";
    pub const SKELETON_ASSET_PATH_NAME: &str = "SkeletonAssetPathName";

    // Patterns
    pub const SIM_VERTICES_2D_START: &str = "SimVertices2DStart";
    pub const SIM_VERTICES_2D_END: &str = "SimVertices2DEnd";
    pub const SIM_FACES_START: &str = "SimFacesStart";
    pub const SIM_FACES_END: &str = "SimFacesEnd";
    pub const RENDER_VERTICES_START: &str = "RenderVerticesStart";
    pub const RENDER_VERTICES_END: &str = "RenderVerticesEnd";
    pub const RENDER_FACES_START: &str = "RenderFacesStart";
    pub const RENDER_FACES_END: &str = "RenderFacesEnd";
    pub const STATUS_FLAGS: &str = "StatusFlags";

    // Seams
    pub const SEAM_PATTERNS: &str = "SeamPatterns";
    pub const SEAM_STITCH_START: &str = "SeamStitchStart";
    pub const SEAM_STITCH_END: &str = "SeamStitchEnd";

    // SeamStitches
    pub const SEAM_STITCH_2D_END_INDICES: &str = "SeamStitch2DEndIndices";
    pub const SEAM_STITCH_3D_INDEX: &str = "SeamStitch3DIndex";

    // TetherBatches
    pub const TETHER_START: &str = "TetherStart";
    pub const TETHER_END: &str = "TetherEnd";

    // Tethers (one row per tether) and SimVertices3D (one list per vertex)
    pub const TETHER_KINEMATIC_INDEX: &str = "TetherKinematicIndex";
    pub const TETHER_DYNAMIC_INDEX: &str = "TetherDynamicIndex";
    pub const TETHER_REFERENCE_LENGTH: &str = "TetherReferenceLength";

    // SimVertices2D
    pub const SIM_POSITION_2D: &str = "SimPosition2D";
    pub const SIM_VERTEX_3D_LOOKUP: &str = "SimVertex3DLookup";

    // SimVertices3D
    pub const SIM_POSITION_3D: &str = "SimPosition3D";
    pub const SIM_NORMAL: &str = "SimNormal";
    pub const SIM_BONE_INDICES: &str = "SimBoneIndices";
    pub const SIM_BONE_WEIGHTS: &str = "SimBoneWeights";
    pub const SIM_VERTEX_2D_LOOKUP: &str = "SimVertex2DLookup";
    pub const SEAM_STITCH_LOOKUP: &str = "SeamStitchLookup";

    // SimFaces
    pub const SIM_INDICES_2D: &str = "SimIndices2D";
    pub const SIM_INDICES_3D: &str = "SimIndices3D";

    // RenderVertices
    pub const RENDER_POSITION: &str = "RenderPosition";
    pub const RENDER_NORMAL: &str = "RenderNormal";
    pub const RENDER_TANGENT_U: &str = "RenderTangentU";
    pub const RENDER_TANGENT_V: &str = "RenderTangentV";
    pub const RENDER_UVS: &str = "RenderUVs";
    pub const RENDER_COLOR: &str = "RenderColor";
    pub const RENDER_BONE_INDICES: &str = "RenderBoneIndices";
    pub const RENDER_BONE_WEIGHTS: &str = "RenderBoneWeights";

    // RenderFaces
    pub const RENDER_INDICES: &str = "RenderIndices";
    pub const RENDER_MATERIAL_INDEX: &str = "RenderMaterialIndex";

    // Materials
    pub const RENDER_MATERIAL_PATH_NAME: &str = "RenderMaterialPathName";
}

use attributes as attr;

/// One fixed attribute of the schema
#[derive(Debug, Clone, Copy)]
pub struct AttributeSchema {
    pub group: &'static str,
    pub name: &'static str,
    pub kind: AttributeKind,
    /// Group this attribute's values index into (range pairs only)
    pub dependency: Option<&'static str>,
}

const fn fixed(group: &'static str, name: &'static str, kind: AttributeKind) -> AttributeSchema {
    AttributeSchema {
        group,
        name,
        kind,
        dependency: None,
    }
}

const fn range_column(
    group: &'static str,
    name: &'static str,
    dependency: &'static str,
) -> AttributeSchema {
    AttributeSchema {
        group,
        name,
        kind: AttributeKind::Int,
        dependency: Some(dependency),
    }
}

/// Every fixed attribute of the cloth collection
pub const SCHEMA: &[AttributeSchema] = {
    use groups::*;
    use AttributeKind as K;
    &[
        // Lods
        range_column(LODS, attr::PATTERN_START, PATTERNS),
        range_column(LODS, attr::PATTERN_END, PATTERNS),
        range_column(LODS, attr::SEAM_START, SEAMS),
        range_column(LODS, attr::SEAM_END, SEAMS),
        range_column(LODS, attr::TETHER_BATCH_START, TETHER_BATCHES),
        range_column(LODS, attr::TETHER_BATCH_END, TETHER_BATCHES),
        range_column(LODS, attr::MATERIAL_START, MATERIALS),
        range_column(LODS, attr::MATERIAL_END, MATERIALS),
        range_column(LODS, attr::SIM_VERTICES_3D_START, SIM_VERTICES_3D),
        range_column(LODS, attr::SIM_VERTICES_3D_END, SIM_VERTICES_3D),
        fixed(LODS, attr::PHYSICS_ASSET_PATH_NAME, K::String),
        fixed(LODS, attr::SKELETON_ASSET_PATH_NAME, K::String),
        // Patterns
        range_column(PATTERNS, attr::SIM_VERTICES_2D_START, SIM_VERTICES_2D),
        range_column(PATTERNS, attr::SIM_VERTICES_2D_END, SIM_VERTICES_2D),
        range_column(PATTERNS, attr::SIM_FACES_START, SIM_FACES),
        range_column(PATTERNS, attr::SIM_FACES_END, SIM_FACES),
        range_column(PATTERNS, attr::RENDER_VERTICES_START, RENDER_VERTICES),
        range_column(PATTERNS, attr::RENDER_VERTICES_END, RENDER_VERTICES),
        range_column(PATTERNS, attr::RENDER_FACES_START, RENDER_FACES),
        range_column(PATTERNS, attr::RENDER_FACES_END, RENDER_FACES),
        fixed(PATTERNS, attr::STATUS_FLAGS, K::Int),
        // Seams
        fixed(SEAMS, attr::SEAM_PATTERNS, K::IVec2),
        range_column(SEAMS, attr::SEAM_STITCH_START, SEAM_STITCHES),
        range_column(SEAMS, attr::SEAM_STITCH_END, SEAM_STITCHES),
        // SeamStitches
        fixed(SEAM_STITCHES, attr::SEAM_STITCH_2D_END_INDICES, K::IVec2),
        fixed(SEAM_STITCHES, attr::SEAM_STITCH_3D_INDEX, K::Int),
        // TetherBatches
        range_column(TETHER_BATCHES, attr::TETHER_START, TETHERS),
        range_column(TETHER_BATCHES, attr::TETHER_END, TETHERS),
        // Tethers
        fixed(TETHERS, attr::TETHER_KINEMATIC_INDEX, K::Int),
        fixed(TETHERS, attr::TETHER_DYNAMIC_INDEX, K::Int),
        fixed(TETHERS, attr::TETHER_REFERENCE_LENGTH, K::Float),
        // SimVertices2D
        fixed(SIM_VERTICES_2D, attr::SIM_POSITION_2D, K::Vec2),
        fixed(SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP, K::Int),
        // SimVertices3D
        fixed(SIM_VERTICES_3D, attr::SIM_POSITION_3D, K::Vec3),
        fixed(SIM_VERTICES_3D, attr::SIM_NORMAL, K::Vec3),
        fixed(SIM_VERTICES_3D, attr::SIM_BONE_INDICES, K::IntArray),
        fixed(SIM_VERTICES_3D, attr::SIM_BONE_WEIGHTS, K::FloatArray),
        fixed(SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX, K::IntArray),
        fixed(SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH, K::FloatArray),
        fixed(SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP, K::IntArray),
        fixed(SIM_VERTICES_3D, attr::SEAM_STITCH_LOOKUP, K::IntArray),
        // SimFaces
        fixed(SIM_FACES, attr::SIM_INDICES_2D, K::IVec3),
        fixed(SIM_FACES, attr::SIM_INDICES_3D, K::IVec3),
        // RenderVertices
        fixed(RENDER_VERTICES, attr::RENDER_POSITION, K::Vec3),
        fixed(RENDER_VERTICES, attr::RENDER_NORMAL, K::Vec3),
        fixed(RENDER_VERTICES, attr::RENDER_TANGENT_U, K::Vec3),
        fixed(RENDER_VERTICES, attr::RENDER_TANGENT_V, K::Vec3),
        fixed(RENDER_VERTICES, attr::RENDER_UVS, K::Vec2Array),
        fixed(RENDER_VERTICES, attr::RENDER_COLOR, K::Vec4),
        fixed(RENDER_VERTICES, attr::RENDER_BONE_INDICES, K::IntArray),
        fixed(RENDER_VERTICES, attr::RENDER_BONE_WEIGHTS, K::FloatArray),
        // RenderFaces
        fixed(RENDER_FACES, attr::RENDER_INDICES, K::IVec3),
        fixed(RENDER_FACES, attr::RENDER_MATERIAL_INDEX, K::Int),
        // Materials
        fixed(MATERIALS, attr::RENDER_MATERIAL_PATH_NAME, K::String),
    ]
};

/// Range relationships between groups
pub mod ranges {
    use super::{attr, groups::*};
    use crate::ranges::RangeColumns;

    pub const LOD_PATTERNS: RangeColumns = RangeColumns {
        parent_group: LODS,
        child_group: PATTERNS,
        start: attr::PATTERN_START,
        end: attr::PATTERN_END,
    };
    pub const LOD_SEAMS: RangeColumns = RangeColumns {
        parent_group: LODS,
        child_group: SEAMS,
        start: attr::SEAM_START,
        end: attr::SEAM_END,
    };
    pub const LOD_TETHER_BATCHES: RangeColumns = RangeColumns {
        parent_group: LODS,
        child_group: TETHER_BATCHES,
        start: attr::TETHER_BATCH_START,
        end: attr::TETHER_BATCH_END,
    };
    pub const LOD_MATERIALS: RangeColumns = RangeColumns {
        parent_group: LODS,
        child_group: MATERIALS,
        start: attr::MATERIAL_START,
        end: attr::MATERIAL_END,
    };
    pub const LOD_SIM_VERTICES_3D: RangeColumns = RangeColumns {
        parent_group: LODS,
        child_group: SIM_VERTICES_3D,
        start: attr::SIM_VERTICES_3D_START,
        end: attr::SIM_VERTICES_3D_END,
    };
    pub const PATTERN_SIM_VERTICES_2D: RangeColumns = RangeColumns {
        parent_group: PATTERNS,
        child_group: SIM_VERTICES_2D,
        start: attr::SIM_VERTICES_2D_START,
        end: attr::SIM_VERTICES_2D_END,
    };
    pub const PATTERN_SIM_FACES: RangeColumns = RangeColumns {
        parent_group: PATTERNS,
        child_group: SIM_FACES,
        start: attr::SIM_FACES_START,
        end: attr::SIM_FACES_END,
    };
    pub const PATTERN_RENDER_VERTICES: RangeColumns = RangeColumns {
        parent_group: PATTERNS,
        child_group: RENDER_VERTICES,
        start: attr::RENDER_VERTICES_START,
        end: attr::RENDER_VERTICES_END,
    };
    pub const PATTERN_RENDER_FACES: RangeColumns = RangeColumns {
        parent_group: PATTERNS,
        child_group: RENDER_FACES,
        start: attr::RENDER_FACES_START,
        end: attr::RENDER_FACES_END,
    };
    pub const SEAM_STITCHES: RangeColumns = RangeColumns {
        parent_group: SEAMS,
        child_group: super::groups::SEAM_STITCHES,
        start: attr::SEAM_STITCH_START,
        end: attr::SEAM_STITCH_END,
    };
    pub const TETHER_BATCH_TETHERS: RangeColumns = RangeColumns {
        parent_group: TETHER_BATCHES,
        child_group: TETHERS,
        start: attr::TETHER_START,
        end: attr::TETHER_END,
    };

    /// Every range relationship, parents before children
    pub const ALL: &[RangeColumns] = &[
        LOD_PATTERNS,
        LOD_SEAMS,
        LOD_TETHER_BATCHES,
        LOD_MATERIALS,
        LOD_SIM_VERTICES_3D,
        PATTERN_SIM_VERTICES_2D,
        PATTERN_SIM_FACES,
        PATTERN_RENDER_VERTICES,
        PATTERN_RENDER_FACES,
        SEAM_STITCHES,
        TETHER_BATCH_TETHERS,
    ];
}

/// Types allowed for user-defined attributes
pub trait UserDefinedAttributeType: AttributeType {}

impl UserDefinedAttributeType for bool {}
impl UserDefinedAttributeType for i32 {}
impl UserDefinedAttributeType for f32 {}
impl UserDefinedAttributeType for glam::Vec3 {}

/// Whether `name` is a fixed schema attribute of `group`
pub fn is_fixed_attribute(name: &str, group: &str) -> bool {
    SCHEMA.iter().any(|a| a.group == group && a.name == name)
}

/// The cloth collection: attribute store plus the configuration used when
/// editing it.
///
/// Access goes through the facades in [`crate::facade`]; this type only owns
/// the data and the schema-level operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClothCollection {
    pub(crate) collection: AttributeCollection,
    #[serde(default)]
    pub(crate) config: ClothConfig,
}

impl ClothCollection {
    /// Create an empty collection with the schema already defined
    pub fn new() -> Self {
        Self::with_config(ClothConfig::default())
    }

    /// Create an empty collection with the schema defined and a custom config
    pub fn with_config(config: ClothConfig) -> Self {
        let mut cloth = Self {
            collection: AttributeCollection::new(),
            config,
        };
        cloth.define_schema();
        cloth
    }

    /// Declare every group and fixed attribute. Safe to call repeatedly.
    pub fn define_schema(&mut self) {
        for attribute in SCHEMA {
            self.collection.add_attribute_of_kind(
                attribute.kind,
                attribute.name,
                attribute.group,
                attribute.dependency,
            );
        }
        debug!("define_schema: {} fixed attributes", SCHEMA.len());
    }

    /// Whether every fixed attribute exists with its declared type
    pub fn is_valid(&self) -> bool {
        SCHEMA.iter().all(|a| {
            self.collection.attribute_kind(a.name, a.group) == Some(a.kind)
                && self.collection.dependency(a.name, a.group) == a.dependency
        })
    }

    pub fn config(&self) -> &ClothConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ClothConfig) {
        self.config = config;
    }

    /// Read-only access to the underlying store
    pub fn attributes(&self) -> &AttributeCollection {
        &self.collection
    }

    /// Number of rows in a group
    pub fn num_elements(&self, group: &str) -> usize {
        self.collection.num_elements(group)
    }

    // ========================================================================
    // User-defined attributes
    // ========================================================================

    /// Add a user-defined attribute to `group`.
    ///
    /// Returns `false` (and does nothing) if `name` is a fixed attribute of
    /// the group or already exists with another type.
    pub fn add_user_defined_attribute<T: UserDefinedAttributeType>(
        &mut self,
        name: &str,
        group: &str,
    ) -> bool {
        if is_fixed_attribute(name, group) {
            return false;
        }
        match self.collection.attribute_kind(name, group) {
            Some(kind) => kind == T::KIND,
            None => {
                self.collection.add_attribute::<T>(name, group);
                true
            }
        }
    }

    /// Remove a user-defined attribute. Fixed attributes are never removed.
    pub fn remove_user_defined_attribute(&mut self, name: &str, group: &str) -> bool {
        !is_fixed_attribute(name, group) && self.collection.remove_attribute(name, group)
    }

    /// Whether a user-defined attribute of type `T` exists
    pub fn has_user_defined_attribute<T: UserDefinedAttributeType>(
        &self,
        name: &str,
        group: &str,
    ) -> bool {
        !is_fixed_attribute(name, group)
            && self.collection.attribute_kind(name, group) == Some(T::KIND)
    }

    /// Names of the user-defined attributes of type `T` in `group`
    pub fn user_defined_attribute_names<T: UserDefinedAttributeType>(
        &self,
        group: &str,
    ) -> Vec<String> {
        self.collection
            .attribute_names(group)
            .filter(|name| !is_fixed_attribute(name, group))
            .filter(|name| self.collection.attribute_kind(name, group) == Some(T::KIND))
            .map(str::to_string)
            .collect()
    }

    // ========================================================================
    // Column access (crate internal)
    // ========================================================================

    /// Whole column of a schema attribute
    #[track_caller]
    pub(crate) fn column<T: AttributeType>(&self, group: &str, name: &str) -> &[T] {
        match self.collection.find_attribute::<T>(name, group) {
            Some(values) => values,
            None => panic!("cloth collection has no attribute {group}/{name}; define the schema first"),
        }
    }

    /// Whole mutable column of a schema attribute
    #[track_caller]
    pub(crate) fn column_mut<T: AttributeType>(&mut self, group: &str, name: &str) -> &mut [T] {
        match self.collection.find_attribute_mut::<T>(name, group) {
            Some(values) => values,
            None => panic!("cloth collection has no attribute {group}/{name}; define the schema first"),
        }
    }

    /// Range pair of one parent row
    pub(crate) fn range_of(&self, columns: &RangeColumns, index: usize) -> (i32, i32) {
        columns.get(&self.collection, index)
    }
}
