//! Build an LOD from an arbitrary triangle mesh.
//!
//! The mesh is unwrapped into islands, each island becomes a pattern, and
//! seams stitch back together the 2D points that came from one source
//! vertex, so welding restores the source topology.

use std::collections::BTreeMap;

use glam::IVec2;
use tracing::debug;

use crate::error::ClothError;
use crate::facade::LodFacadeMut;
use crate::mesh::{normalize_or_z, TriangleMesh};
use crate::unwrap::unwrap_mesh;

/// Replace the content of `lod` with patterns unwrapped from `mesh`.
///
/// Uses the welding tolerance of the collection's config. Normals and skin
/// weights of the source vertices are carried over when the mesh has them.
/// Returns the number of patterns created.
pub fn build_lod_from_mesh(lod: &mut LodFacadeMut<'_>, mesh: &TriangleMesh) -> Result<usize, ClothError> {
    let tolerance = lod.collection().config().welding_tolerance;
    let islands = unwrap_mesh(mesh, tolerance)?;
    lod.reset();

    // Source vertex -> (pattern, LOD-relative 2D vertex) of every point it produced
    let mut points: BTreeMap<u32, Vec<(usize, i32)>> = BTreeMap::new();
    for island in &islands {
        let base_3d = lod.num_sim_vertices_3d();
        let pattern = lod.add_pattern();
        lod.pattern_mut(pattern).initialize(
            &island.positions_2d,
            &island.rest_positions_3d,
            &island.indices,
        );

        let offset_2d = lod.pattern(pattern).sim_vertices_2d_offset() as i32;
        for (point, &source) in island.source_vertices.iter().enumerate() {
            points
                .entry(source)
                .or_default()
                .push((pattern, offset_2d + point as i32));

            let vertex = base_3d + point;
            if let Some(&normal) = mesh.normals.get(source as usize) {
                lod.sim_normal_mut()[vertex] = normalize_or_z(normal);
            }
            if let Some(influences) = mesh.bone_influences.get(source as usize) {
                lod.set_sim_bone_influences(vertex, influences);
            }
        }
    }

    // One seam per pattern pair, stitching every duplicate to the first point
    let mut seams: BTreeMap<(usize, usize), Vec<IVec2>> = BTreeMap::new();
    for duplicates in points.values() {
        let Some((&(first_pattern, first), rest)) = duplicates.split_first() else {
            continue;
        };
        for &(pattern, vertex) in rest {
            let stitch = if first_pattern <= pattern {
                IVec2::new(first, vertex)
            } else {
                IVec2::new(vertex, first)
            };
            seams
                .entry((first_pattern.min(pattern), first_pattern.max(pattern)))
                .or_default()
                .push(stitch);
        }
    }
    for stitches in seams.values() {
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(stitches);
    }

    debug!(
        "build_lod_from_mesh: {} vertices -> {} patterns, {} seams, {} welded vertices",
        mesh.num_vertices(),
        islands.len(),
        seams.len(),
        lod.num_sim_vertices_3d()
    );
    Ok(islands.len())
}
