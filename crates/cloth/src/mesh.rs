//! Mesh types exchanged with the outside world.
//!
//! [`TriangleMesh`] is the generic input of the pattern builder and the output
//! of an LOD export, [`SimulationMesh`] the welded buffers a solver consumes.

use cloth_config::NORMAL_EPSILON;
use glam::{IVec3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::ClothError;

/// A single skin weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoneInfluence {
    pub bone: i32,
    pub weight: f32,
}

/// Indexed triangle mesh with optional normals and skin weights
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub positions: Vec<Vec3>,
    /// Empty, or one per position
    pub normals: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    /// Empty, or one list per position
    pub bone_influences: Vec<Vec<BoneInfluence>>,
}

impl TriangleMesh {
    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }

    pub fn num_triangles(&self) -> usize {
        self.indices.len()
    }

    /// Check that indices are in range and optional channels match the
    /// vertex count
    pub fn validate(&self) -> Result<(), ClothError> {
        let num_vertices = self.positions.len();
        if let Some((triangle, _)) = self
            .indices
            .iter()
            .enumerate()
            .find(|(_, tri)| tri.iter().any(|&i| i as usize >= num_vertices))
        {
            return Err(ClothError::InvalidMesh(format!(
                "triangle {triangle} references a vertex outside 0..{num_vertices}"
            )));
        }
        if !self.normals.is_empty() && self.normals.len() != num_vertices {
            return Err(ClothError::InvalidMesh(format!(
                "{} normals for {num_vertices} vertices",
                self.normals.len()
            )));
        }
        if !self.bone_influences.is_empty() && self.bone_influences.len() != num_vertices {
            return Err(ClothError::InvalidMesh(format!(
                "{} skin weight lists for {num_vertices} vertices",
                self.bone_influences.len()
            )));
        }
        Ok(())
    }
}

/// Welded simulation buffers of one LOD
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationMesh {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    /// Flat triangle list into `positions`
    pub indices: Vec<u32>,
    /// For every 2D vertex of the LOD, the welded vertex it maps to
    /// (`INDEX_NONE` for 2D vertices without one)
    pub welding_map: Vec<i32>,
}

impl SimulationMesh {
    pub fn num_triangles(&self) -> usize {
        self.indices.len() / 3
    }

    /// Positions as raw bytes for upload
    pub fn position_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.positions)
    }

    pub fn normal_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.normals)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

/// One bone of a reference skeleton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBone {
    pub name: String,
    /// Parent bone index, or -1 for a root
    pub parent: i32,
    pub reference_pose: Mat4,
}

/// Read-only bone hierarchy consulted when exporting skinned meshes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSkeleton {
    pub bones: Vec<ReferenceBone>,
}

impl ReferenceSkeleton {
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn contains_bone(&self, bone: i32) -> bool {
        bone >= 0 && (bone as usize) < self.bones.len()
    }

    pub fn find_bone(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }
}

// ============================================================================
// Geometry helpers
// ============================================================================

/// Area-weighted vertex normals, `Vec3::Z` where the sum vanishes
pub(crate) fn vertex_normals(positions: &[Vec3], indices: &[IVec3]) -> Vec<Vec3> {
    let mut normals = vec![Vec3::ZERO; positions.len()];
    for tri in indices {
        let [a, b, c] = tri.to_array().map(|i| i as usize);
        let face_normal = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
        normals[a] += face_normal;
        normals[b] += face_normal;
        normals[c] += face_normal;
    }
    normals.iter().map(|&n| normalize_or_z(n)).collect()
}

/// Normalize, falling back to `Vec3::Z` for near-zero vectors
pub(crate) fn normalize_or_z(vector: Vec3) -> Vec3 {
    if vector.length_squared() > NORMAL_EPSILON {
        vector.normalize()
    } else {
        Vec3::Z
    }
}

/// Per-vertex tangents along U and V from one UV channel.
///
/// Triangles with a degenerate UV mapping contribute nothing; vertices that
/// receive no contribution get zero tangents.
pub(crate) fn vertex_tangents(
    positions: &[Vec3],
    uvs: &[Vec2],
    indices: &[IVec3],
) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut tangent_u = vec![Vec3::ZERO; positions.len()];
    let mut tangent_v = vec![Vec3::ZERO; positions.len()];
    for tri in indices {
        let [a, b, c] = tri.to_array().map(|i| i as usize);
        let edge1 = positions[b] - positions[a];
        let edge2 = positions[c] - positions[a];
        let duv1 = uvs[b] - uvs[a];
        let duv2 = uvs[c] - uvs[a];
        let det = duv1.perp_dot(duv2);
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let inv = 1.0 / det;
        let u = (edge1 * duv2.y - edge2 * duv1.y) * inv;
        let v = (edge2 * duv1.x - edge1 * duv2.x) * inv;
        for i in [a, b, c] {
            tangent_u[i] += u;
            tangent_v[i] += v;
        }
    }
    (
        tangent_u.into_iter().map(Vec3::normalize_or_zero).collect(),
        tangent_v.into_iter().map(Vec3::normalize_or_zero).collect(),
    )
}
