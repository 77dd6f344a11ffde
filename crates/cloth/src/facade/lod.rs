//! LOD facade: patterns, seams, tethers, materials and the LOD-wide views
//! that simulation and rendering consume.

use std::ops::{Deref, DerefMut};

use cloth_config::INDEX_NONE;
use glam::{IVec3, Vec2, Vec3, Vec4};
use tracing::{debug, trace};

use super::{lod_slice, lod_slice_mut, PatternFacade, RenderVertex, SeamFacade, Tether, TetherBatchFacade};
use crate::mesh::{BoneInfluence, ReferenceSkeleton, SimulationMesh, TriangleMesh};
use crate::ranges::RangeColumns;
use crate::references::{self, lod_num_elements, lod_rows};
use crate::schema::{
    attributes as attr, groups, ranges as schema_ranges, ClothCollection, UserDefinedAttributeType,
};
use crate::welding::{capped_bone_influences, capped_tethers};

/// Groups whose LOD rows are copied verbatim by [`LodFacade::initialize_from`]
const LOD_OWNED_GROUPS: &[&str] = &[
    groups::PATTERNS,
    groups::SEAMS,
    groups::SEAM_STITCHES,
    groups::TETHER_BATCHES,
    groups::TETHERS,
    groups::MATERIALS,
    groups::SIM_VERTICES_2D,
    groups::SIM_VERTICES_3D,
    groups::SIM_FACES,
    groups::RENDER_VERTICES,
    groups::RENDER_FACES,
];

/// Facade over one LOD
pub struct LodFacade<C> {
    cloth: C,
    lod: usize,
}

pub type LodFacadeMut<'a> = LodFacade<&'a mut ClothCollection>;

impl<C: Deref<Target = ClothCollection>> LodFacade<C> {
    pub fn new(cloth: C, lod: usize) -> Self {
        assert!(
            lod < cloth.num_elements(groups::LODS),
            "LOD {lod} out of range ({} LODs)",
            cloth.num_elements(groups::LODS)
        );
        debug_assert!(cloth.is_valid(), "cloth schema is not defined");
        Self { cloth, lod }
    }

    pub fn lod_index(&self) -> usize {
        self.lod
    }

    pub fn collection(&self) -> &ClothCollection {
        &self.cloth
    }

    fn num_children(&self, columns: RangeColumns) -> usize {
        columns.num_elements(&self.cloth.collection, self.lod)
    }

    fn slice<T: crate::store::AttributeType>(&self, group: &str, name: &str) -> &[T] {
        lod_slice(&self.cloth, self.lod, group, name)
    }

    // ========================================================================
    // Children
    // ========================================================================

    pub fn num_patterns(&self) -> usize {
        self.num_children(schema_ranges::LOD_PATTERNS)
    }

    pub fn pattern(&self, index: usize) -> PatternFacade<&ClothCollection> {
        PatternFacade::new(&*self.cloth, self.lod, index)
    }

    pub fn num_seams(&self) -> usize {
        self.num_children(schema_ranges::LOD_SEAMS)
    }

    pub fn seam(&self, index: usize) -> SeamFacade<&ClothCollection> {
        SeamFacade::new(&*self.cloth, self.lod, index)
    }

    pub fn num_tether_batches(&self) -> usize {
        self.num_children(schema_ranges::LOD_TETHER_BATCHES)
    }

    pub fn tether_batch(&self, index: usize) -> TetherBatchFacade<&ClothCollection> {
        TetherBatchFacade::new(&*self.cloth, self.lod, index)
    }

    pub fn num_materials(&self) -> usize {
        self.num_children(schema_ranges::LOD_MATERIALS)
    }

    pub fn material_path_names(&self) -> &[String] {
        self.slice(groups::MATERIALS, attr::RENDER_MATERIAL_PATH_NAME)
    }

    pub fn physics_asset_path_name(&self) -> &str {
        &self.cloth.column::<String>(groups::LODS, attr::PHYSICS_ASSET_PATH_NAME)[self.lod]
    }

    pub fn skeleton_asset_path_name(&self) -> &str {
        &self.cloth.column::<String>(groups::LODS, attr::SKELETON_ASSET_PATH_NAME)[self.lod]
    }

    // ========================================================================
    // LOD-wide views across every pattern
    // ========================================================================

    pub fn num_sim_vertices_2d(&self) -> usize {
        lod_num_elements(&self.cloth, self.lod, groups::SIM_VERTICES_2D)
    }

    pub fn num_sim_vertices_3d(&self) -> usize {
        lod_num_elements(&self.cloth, self.lod, groups::SIM_VERTICES_3D)
    }

    pub fn num_sim_faces(&self) -> usize {
        lod_num_elements(&self.cloth, self.lod, groups::SIM_FACES)
    }

    pub fn num_render_vertices(&self) -> usize {
        lod_num_elements(&self.cloth, self.lod, groups::RENDER_VERTICES)
    }

    pub fn num_render_faces(&self) -> usize {
        lod_num_elements(&self.cloth, self.lod, groups::RENDER_FACES)
    }

    pub fn sim_position_2d(&self) -> &[Vec2] {
        self.slice(groups::SIM_VERTICES_2D, attr::SIM_POSITION_2D)
    }

    /// 3D vertex of every 2D vertex
    pub fn sim_vertex_3d_lookup(&self) -> &[i32] {
        self.slice(groups::SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP)
    }

    pub fn sim_position_3d(&self) -> &[Vec3] {
        self.slice(groups::SIM_VERTICES_3D, attr::SIM_POSITION_3D)
    }

    pub fn sim_normal(&self) -> &[Vec3] {
        self.slice(groups::SIM_VERTICES_3D, attr::SIM_NORMAL)
    }

    pub fn sim_bone_indices(&self) -> &[Vec<i32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::SIM_BONE_INDICES)
    }

    pub fn sim_bone_weights(&self) -> &[Vec<f32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::SIM_BONE_WEIGHTS)
    }

    pub fn tether_kinematic_index(&self) -> &[Vec<i32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)
    }

    pub fn tether_reference_length(&self) -> &[Vec<f32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)
    }

    /// 2D vertices of every 3D vertex
    pub fn sim_vertex_2d_lookup(&self) -> &[Vec<i32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP)
    }

    /// Seam stitches welded into every 3D vertex
    pub fn seam_stitch_lookup(&self) -> &[Vec<i32>] {
        self.slice(groups::SIM_VERTICES_3D, attr::SEAM_STITCH_LOOKUP)
    }

    pub fn sim_indices_2d(&self) -> &[IVec3] {
        self.slice(groups::SIM_FACES, attr::SIM_INDICES_2D)
    }

    pub fn sim_indices_3d(&self) -> &[IVec3] {
        self.slice(groups::SIM_FACES, attr::SIM_INDICES_3D)
    }

    pub fn render_position(&self) -> &[Vec3] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_POSITION)
    }

    pub fn render_normal(&self) -> &[Vec3] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_NORMAL)
    }

    pub fn render_tangent_u(&self) -> &[Vec3] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_TANGENT_U)
    }

    pub fn render_tangent_v(&self) -> &[Vec3] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_TANGENT_V)
    }

    pub fn render_uvs(&self) -> &[Vec<Vec2>] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_UVS)
    }

    pub fn render_color(&self) -> &[Vec4] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_COLOR)
    }

    pub fn render_bone_indices(&self) -> &[Vec<i32>] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_BONE_INDICES)
    }

    pub fn render_bone_weights(&self) -> &[Vec<f32>] {
        self.slice(groups::RENDER_VERTICES, attr::RENDER_BONE_WEIGHTS)
    }

    pub fn render_indices(&self) -> &[IVec3] {
        self.slice(groups::RENDER_FACES, attr::RENDER_INDICES)
    }

    pub fn render_material_index(&self) -> &[i32] {
        self.slice(groups::RENDER_FACES, attr::RENDER_MATERIAL_INDEX)
    }

    /// Values of a weight map over this LOD's 3D vertices
    pub fn weight_map(&self, name: &str) -> Option<&[f32]> {
        self.user_defined_attribute::<f32>(name, groups::SIM_VERTICES_3D)
    }

    /// Values of a user-defined attribute over this LOD's rows of `group`
    pub fn user_defined_attribute<T: UserDefinedAttributeType>(
        &self,
        name: &str,
        group: &str,
    ) -> Option<&[T]> {
        self.cloth
            .has_user_defined_attribute::<T>(name, group)
            .then(|| self.slice::<T>(group, name))
    }

    // ========================================================================
    // Export
    // ========================================================================

    /// Welded simulation buffers.
    ///
    /// Faces with an unresolved or repeated vertex are skipped.
    pub fn build_simulation_mesh(&self) -> SimulationMesh {
        let indices: Vec<u32> = self
            .valid_sim_faces()
            .flat_map(|tri| tri.to_array().map(|i| i as u32))
            .collect();
        SimulationMesh {
            positions: self.sim_position_3d().to_vec(),
            normals: self.sim_normal().to_vec(),
            indices,
            welding_map: self.sim_vertex_3d_lookup().to_vec(),
        }
    }

    /// Export the welded simulation mesh, keeping only skin weights whose
    /// bone exists in `skeleton`
    pub fn to_triangle_mesh(&self, skeleton: &ReferenceSkeleton) -> TriangleMesh {
        let bone_influences = self
            .sim_bone_indices()
            .iter()
            .zip(self.sim_bone_weights())
            .map(|(bones, weights)| {
                let mut influences: Vec<BoneInfluence> = bones
                    .iter()
                    .zip(weights)
                    .filter(|&(&bone, _)| skeleton.contains_bone(bone))
                    .map(|(&bone, &weight)| BoneInfluence { bone, weight })
                    .collect();
                let total: f32 = influences.iter().map(|i| i.weight).sum();
                if total > 0.0 {
                    influences.iter_mut().for_each(|i| i.weight /= total);
                }
                influences
            })
            .collect();
        TriangleMesh {
            positions: self.sim_position_3d().to_vec(),
            normals: self.sim_normal().to_vec(),
            indices: self
                .valid_sim_faces()
                .map(|tri| tri.to_array().map(|i| i as u32))
                .collect(),
            bone_influences,
        }
    }

    fn valid_sim_faces(&self) -> impl Iterator<Item = IVec3> + '_ {
        self.sim_indices_3d().iter().copied().filter(|tri| {
            let valid = tri.min_element() != INDEX_NONE
                && tri.x != tri.y
                && tri.y != tri.z
                && tri.z != tri.x;
            if !valid {
                trace!("skipping degenerate simulation face {tri}");
            }
            valid
        })
    }
}

impl<C: DerefMut<Target = ClothCollection>> LodFacade<C> {
    fn set_num_children(&mut self, columns: RangeColumns, num: usize) {
        references::set_num_lod_elements(&mut self.cloth, self.lod, &columns, self.lod, num);
    }

    fn slice_mut<T: crate::store::AttributeType>(&mut self, group: &str, name: &str) -> &mut [T] {
        lod_slice_mut(&mut self.cloth, self.lod, group, name)
    }

    /// Remove every child of this LOD and clear its asset paths
    pub fn reset(&mut self) {
        self.set_num_seams(0);
        self.set_num_tether_batches(0);
        self.set_num_patterns(0);
        self.set_num_children(schema_ranges::LOD_SIM_VERTICES_3D, 0);
        self.set_num_materials(0);
        self.set_physics_asset_path_name("");
        self.set_skeleton_asset_path_name("");
    }

    // ========================================================================
    // Children
    // ========================================================================

    /// Append an empty pattern and return its index
    pub fn add_pattern(&mut self) -> usize {
        let index = self.num_patterns();
        self.set_num_patterns(index + 1);
        index
    }

    pub fn pattern_mut(&mut self, index: usize) -> PatternFacade<&mut ClothCollection> {
        PatternFacade::new(&mut *self.cloth, self.lod, index)
    }

    pub fn set_num_patterns(&mut self, num: usize) {
        for index in (num..self.num_patterns()).rev() {
            self.pattern_mut(index).reset();
        }
        self.set_num_children(schema_ranges::LOD_PATTERNS, num);
    }

    pub fn add_seam(&mut self) -> usize {
        let index = self.num_seams();
        self.set_num_seams(index + 1);
        index
    }

    pub fn seam_mut(&mut self, index: usize) -> SeamFacade<&mut ClothCollection> {
        SeamFacade::new(&mut *self.cloth, self.lod, index)
    }

    pub fn set_num_seams(&mut self, num: usize) {
        for index in (num..self.num_seams()).rev() {
            self.seam_mut(index).reset();
        }
        self.set_num_children(schema_ranges::LOD_SEAMS, num);
    }

    pub fn add_tether_batch(&mut self) -> usize {
        let index = self.num_tether_batches();
        self.set_num_tether_batches(index + 1);
        index
    }

    pub fn tether_batch_mut(&mut self, index: usize) -> TetherBatchFacade<&mut ClothCollection> {
        TetherBatchFacade::new(&mut *self.cloth, self.lod, index)
    }

    pub fn set_num_tether_batches(&mut self, num: usize) {
        for index in (num..self.num_tether_batches()).rev() {
            self.tether_batch_mut(index).reset();
        }
        self.set_num_children(schema_ranges::LOD_TETHER_BATCHES, num);
    }

    /// Rebuild the tether batches from the per-vertex tethers.
    ///
    /// Batch `k` holds the `k`-th tether of every 3D vertex, so no batch
    /// touches a dynamic vertex twice.
    pub fn build_tether_batches(&mut self) {
        let kinematic = self.tether_kinematic_index().to_vec();
        let lengths = self.tether_reference_length().to_vec();
        let num_batches = kinematic.iter().map(Vec::len).max().unwrap_or(0);

        self.set_num_tether_batches(0);
        self.set_num_tether_batches(num_batches);
        for batch in 0..num_batches {
            let tethers: Vec<Tether> = kinematic
                .iter()
                .zip(&lengths)
                .enumerate()
                .filter_map(|(vertex, (indices, lengths))| {
                    Some(Tether {
                        kinematic: *indices.get(batch)?,
                        dynamic: vertex as i32,
                        reference_length: *lengths.get(batch)?,
                    })
                })
                .collect();
            self.tether_batch_mut(batch).initialize(&tethers);
        }
        debug!("build_tether_batches: lod {} -> {num_batches} batches", self.lod);
    }

    /// Append a material and return its index
    pub fn add_material(&mut self, path_name: &str) -> usize {
        let index = self.num_materials();
        self.set_num_materials(index + 1);
        self.material_path_names_mut()[index] = path_name.to_string();
        index
    }

    pub fn set_num_materials(&mut self, num: usize) {
        self.set_num_children(schema_ranges::LOD_MATERIALS, num);
    }

    pub fn material_path_names_mut(&mut self) -> &mut [String] {
        self.slice_mut(groups::MATERIALS, attr::RENDER_MATERIAL_PATH_NAME)
    }

    pub fn set_physics_asset_path_name(&mut self, path_name: &str) {
        let lod = self.lod;
        self.cloth
            .column_mut::<String>(groups::LODS, attr::PHYSICS_ASSET_PATH_NAME)[lod] =
            path_name.to_string();
    }

    pub fn set_skeleton_asset_path_name(&mut self, path_name: &str) {
        let lod = self.lod;
        self.cloth
            .column_mut::<String>(groups::LODS, attr::SKELETON_ASSET_PATH_NAME)[lod] =
            path_name.to_string();
    }

    // ========================================================================
    // In-place editing
    // ========================================================================

    pub fn sim_position_2d_mut(&mut self) -> &mut [Vec2] {
        self.slice_mut(groups::SIM_VERTICES_2D, attr::SIM_POSITION_2D)
    }

    pub fn sim_position_3d_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(groups::SIM_VERTICES_3D, attr::SIM_POSITION_3D)
    }

    pub fn sim_normal_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(groups::SIM_VERTICES_3D, attr::SIM_NORMAL)
    }

    pub fn render_position_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(groups::RENDER_VERTICES, attr::RENDER_POSITION)
    }

    pub fn render_normal_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(groups::RENDER_VERTICES, attr::RENDER_NORMAL)
    }

    pub fn render_color_mut(&mut self) -> &mut [Vec4] {
        self.slice_mut(groups::RENDER_VERTICES, attr::RENDER_COLOR)
    }

    pub fn weight_map_mut(&mut self, name: &str) -> Option<&mut [f32]> {
        self.user_defined_attribute_mut::<f32>(name, groups::SIM_VERTICES_3D)
    }

    pub fn user_defined_attribute_mut<T: UserDefinedAttributeType>(
        &mut self,
        name: &str,
        group: &str,
    ) -> Option<&mut [T]> {
        if self.cloth.has_user_defined_attribute::<T>(name, group) {
            Some(self.slice_mut::<T>(group, name))
        } else {
            None
        }
    }

    /// Replace the skin weights of 3D vertex `vertex`.
    ///
    /// Duplicate bones are summed, the heaviest influences are kept up to the
    /// configured cap and the result is normalized to sum to one.
    pub fn set_sim_bone_influences(&mut self, vertex: usize, influences: &[BoneInfluence]) {
        let max = self.cloth.config().max_bone_influences;
        let (bones, weights) =
            capped_bone_influences(influences.iter().map(|i| (i.bone, i.weight)), max);
        self.slice_mut::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::SIM_BONE_INDICES)[vertex] = bones;
        self.slice_mut::<Vec<f32>>(groups::SIM_VERTICES_3D, attr::SIM_BONE_WEIGHTS)[vertex] =
            weights;
    }

    /// Replace the tethers of 3D vertex `vertex` with `(kinematic vertex,
    /// reference length)` pairs.
    ///
    /// Invalid and self targets are dropped, duplicates merged, and the
    /// shortest tethers kept up to the configured cap.
    pub fn set_sim_tethers(&mut self, vertex: usize, tethers: &[(i32, f32)]) {
        let max = self.cloth.config().max_tether_attachments;
        let num_vertices = self.num_sim_vertices_3d() as i32;
        let (kinematic, lengths) = capped_tethers(
            tethers
                .iter()
                .filter(|&&(target, _)| (0..num_vertices).contains(&target) && target != vertex as i32)
                .map(|&(target, length)| (target, 1.0, length)),
            max,
        );
        self.slice_mut::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)[vertex] =
            kinematic;
        self.slice_mut::<Vec<f32>>(groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)[vertex] =
            lengths;
    }

    // ========================================================================
    // Derived data
    // ========================================================================

    /// Replace the render data of every pattern with a copy of its simulation
    /// mesh using a single material.
    ///
    /// Render positions, normals and skin weights come from the welded 3D
    /// vertices, UVs from the 2D pattern positions.
    pub fn copy_sim_mesh_to_render_mesh(&mut self, material_path_name: &str) {
        self.set_num_materials(0);
        let material = self.add_material(material_path_name) as i32;

        for index in 0..self.num_patterns() {
            let (vertices, indices) = {
                let pattern = self.pattern(index);
                let offset = pattern.sim_vertices_2d_offset() as i32;
                let positions = self.sim_position_3d();
                let normals = self.sim_normal();
                let bone_indices = self.sim_bone_indices();
                let bone_weights = self.sim_bone_weights();
                let vertices: Vec<RenderVertex> = pattern
                    .sim_position_2d()
                    .iter()
                    .zip(pattern.sim_vertex_3d_lookup())
                    .map(|(&uv, &vertex)| match usize::try_from(vertex) {
                        Ok(v) => RenderVertex {
                            position: positions[v],
                            normal: normals[v],
                            uvs: vec![uv],
                            color: Vec4::ONE,
                            bone_indices: bone_indices[v].clone(),
                            bone_weights: bone_weights[v].clone(),
                        },
                        Err(_) => RenderVertex {
                            uvs: vec![uv],
                            ..RenderVertex::default()
                        },
                    })
                    .collect();
                let indices: Vec<IVec3> = pattern
                    .sim_indices_2d()
                    .iter()
                    .filter(|tri| tri.min_element() != INDEX_NONE)
                    .map(|&tri| tri - IVec3::splat(offset))
                    .collect();
                (vertices, indices)
            };
            self.pattern_mut(index)
                .initialize_render(&vertices, &indices, material);
        }
        debug!(
            "copy_sim_mesh_to_render_mesh: lod {} -> {} render vertices",
            self.lod,
            self.num_render_vertices()
        );
    }

    /// Deep copy of another LOD, possibly from another collection.
    ///
    /// All cross-references are LOD-relative, so rows are copied verbatim once
    /// the destination has the same layout.
    pub fn initialize_from<D: Deref<Target = ClothCollection>>(&mut self, other: &LodFacade<D>) {
        self.reset();
        self.set_physics_asset_path_name(other.physics_asset_path_name());
        self.set_skeleton_asset_path_name(other.skeleton_asset_path_name());

        // Mirror the source layout
        self.set_num_children(schema_ranges::LOD_SIM_VERTICES_3D, other.num_sim_vertices_3d());
        self.set_num_materials(other.num_materials());
        self.set_num_patterns(other.num_patterns());
        for index in 0..other.num_patterns() {
            let source = other.pattern(index);
            let mut pattern = self.pattern_mut(index);
            pattern.set_num_sim_vertices_2d(source.num_sim_vertices_2d());
            pattern.set_num_sim_faces(source.num_sim_faces());
            pattern.set_num_render_vertices(source.num_render_vertices());
            pattern.set_num_render_faces(source.num_render_faces());
        }
        self.set_num_seams(other.num_seams());
        for index in 0..other.num_seams() {
            let num_stitches = other.seam(index).num_stitches();
            self.seam_mut(index).set_num_stitches(num_stitches);
        }
        self.set_num_tether_batches(other.num_tether_batches());
        for index in 0..other.num_tether_batches() {
            let num_tethers = other.tether_batch(index).num_tethers();
            self.tether_batch_mut(index).set_num_tethers(num_tethers);
        }

        // Copy every non-range column, including user-defined attributes that
        // exist on both sides
        let source = other.collection();
        for &group in LOD_OWNED_GROUPS {
            let (Some((source_first, source_last)), Some((first, last))) = (
                lod_rows(source, other.lod_index(), group),
                lod_rows(&self.cloth, self.lod, group),
            ) else {
                continue;
            };
            assert_eq!(source_last - source_first, last - first, "layout mismatch in {group}");
            let names: Vec<&str> = source
                .attributes()
                .attribute_names(group)
                .filter(|name| source.attributes().dependency(name, group).is_none())
                .filter(|name| {
                    self.cloth.attributes().attribute_kind(name, group)
                        == source.attributes().attribute_kind(name, group)
                })
                .collect();
            for name in names {
                self.cloth.collection.copy_rows_from(
                    source.attributes(),
                    name,
                    group,
                    source_first,
                    first,
                    last - first + 1,
                );
            }
        }
        debug!(
            "initialize_from: lod {} <- lod {} ({} patterns)",
            self.lod,
            other.lod_index(),
            other.num_patterns()
        );
    }
}
