//! Pattern facade: one piece of cloth inside an LOD.
//!
//! Index arrays read through this facade hold LOD-relative values; add
//! nothing and subtract nothing when comparing them across patterns.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use cloth_config::INDEX_NONE;
use glam::{IVec3, Vec2, Vec3, Vec4};
use tracing::trace;

use super::{lod_slice, lod_slice_mut};
use crate::mesh::{vertex_normals, vertex_tangents};
use crate::ranges::{self, RangeColumns};
use crate::references;
use crate::schema::{
    attributes as attr, groups, ranges as schema_ranges, ClothCollection,
};
use crate::store::AttributeType;

/// Render vertex data accepted by [`PatternFacade::initialize_render`]
#[derive(Debug, Clone, PartialEq)]
pub struct RenderVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uvs: Vec<Vec2>,
    pub color: Vec4,
    pub bone_indices: Vec<i32>,
    pub bone_weights: Vec<f32>,
}

impl Default for RenderVertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::Z,
            uvs: Vec::new(),
            color: Vec4::ONE,
            bone_indices: Vec::new(),
            bone_weights: Vec::new(),
        }
    }
}

/// Render vertex columns copied as-is between patterns
const RENDER_VERTEX_ATTRIBUTES: &[&str] = &[
    attr::RENDER_POSITION,
    attr::RENDER_NORMAL,
    attr::RENDER_TANGENT_U,
    attr::RENDER_TANGENT_V,
    attr::RENDER_UVS,
    attr::RENDER_COLOR,
    attr::RENDER_BONE_INDICES,
    attr::RENDER_BONE_WEIGHTS,
];

/// 3D vertex columns copied as-is between patterns
const SIM_VERTEX_3D_ATTRIBUTES: &[&str] = &[
    attr::SIM_POSITION_3D,
    attr::SIM_NORMAL,
    attr::SIM_BONE_INDICES,
    attr::SIM_BONE_WEIGHTS,
];

/// Facade over one pattern of an LOD
pub struct PatternFacade<C> {
    cloth: C,
    lod: usize,
    pattern: usize,
}

pub type PatternFacadeMut<'a> = PatternFacade<&'a mut ClothCollection>;

impl<C: Deref<Target = ClothCollection>> PatternFacade<C> {
    pub fn new(cloth: C, lod: usize, pattern: usize) -> Self {
        let num_patterns = schema_ranges::LOD_PATTERNS.num_elements(&cloth.collection, lod);
        assert!(
            pattern < num_patterns,
            "pattern {pattern} out of range ({num_patterns} patterns in LOD {lod})"
        );
        Self { cloth, lod, pattern }
    }

    pub fn pattern_index(&self) -> usize {
        self.pattern
    }

    /// Absolute row of this pattern in the Patterns group
    fn row(&self) -> usize {
        let (start, _) = self.cloth.range_of(&schema_ranges::LOD_PATTERNS, self.lod);
        start as usize + self.pattern
    }

    fn num_children(&self, columns: RangeColumns) -> usize {
        columns.num_elements(&self.cloth.collection, self.row())
    }

    /// Offset of this pattern's first child inside its LOD
    fn children_offset(&self, columns: RangeColumns) -> usize {
        let first_pattern = self.row() - self.pattern;
        (first_pattern..self.row())
            .map(|row| columns.num_elements(&self.cloth.collection, row))
            .sum()
    }

    fn slice<T: AttributeType>(&self, columns: RangeColumns, name: &str) -> &[T] {
        let (start, end) = columns.columns(&self.cloth.collection);
        let data = self.cloth.column::<T>(columns.child_group, name);
        ranges::elements(data, start, end, self.row())
    }

    pub fn num_sim_vertices_2d(&self) -> usize {
        self.num_children(schema_ranges::PATTERN_SIM_VERTICES_2D)
    }

    pub fn num_sim_faces(&self) -> usize {
        self.num_children(schema_ranges::PATTERN_SIM_FACES)
    }

    pub fn num_render_vertices(&self) -> usize {
        self.num_children(schema_ranges::PATTERN_RENDER_VERTICES)
    }

    pub fn num_render_faces(&self) -> usize {
        self.num_children(schema_ranges::PATTERN_RENDER_FACES)
    }

    /// Number of 2D vertices in the patterns before this one
    pub fn sim_vertices_2d_offset(&self) -> usize {
        self.children_offset(schema_ranges::PATTERN_SIM_VERTICES_2D)
    }

    pub fn sim_faces_offset(&self) -> usize {
        self.children_offset(schema_ranges::PATTERN_SIM_FACES)
    }

    pub fn render_vertices_offset(&self) -> usize {
        self.children_offset(schema_ranges::PATTERN_RENDER_VERTICES)
    }

    pub fn render_faces_offset(&self) -> usize {
        self.children_offset(schema_ranges::PATTERN_RENDER_FACES)
    }

    pub fn status_flags(&self) -> i32 {
        self.cloth.column::<i32>(groups::PATTERNS, attr::STATUS_FLAGS)[self.row()]
    }

    pub fn sim_position_2d(&self) -> &[Vec2] {
        self.slice(schema_ranges::PATTERN_SIM_VERTICES_2D, attr::SIM_POSITION_2D)
    }

    pub fn sim_vertex_3d_lookup(&self) -> &[i32] {
        self.slice(schema_ranges::PATTERN_SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP)
    }

    pub fn sim_indices_2d(&self) -> &[IVec3] {
        self.slice(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_2D)
    }

    pub fn sim_indices_3d(&self) -> &[IVec3] {
        self.slice(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_3D)
    }

    pub fn render_position(&self) -> &[Vec3] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_POSITION)
    }

    pub fn render_normal(&self) -> &[Vec3] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_NORMAL)
    }

    pub fn render_tangent_u(&self) -> &[Vec3] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_TANGENT_U)
    }

    pub fn render_tangent_v(&self) -> &[Vec3] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_TANGENT_V)
    }

    pub fn render_uvs(&self) -> &[Vec<Vec2>] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_UVS)
    }

    pub fn render_color(&self) -> &[Vec4] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_COLOR)
    }

    pub fn render_bone_indices(&self) -> &[Vec<i32>] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_BONE_INDICES)
    }

    pub fn render_bone_weights(&self) -> &[Vec<f32>] {
        self.slice(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_BONE_WEIGHTS)
    }

    pub fn render_indices(&self) -> &[IVec3] {
        self.slice(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_INDICES)
    }

    pub fn render_material_index(&self) -> &[i32] {
        self.slice(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_MATERIAL_INDEX)
    }
}

impl<C: DerefMut<Target = ClothCollection>> PatternFacade<C> {
    fn set_num_children(&mut self, columns: RangeColumns, num: usize) {
        let row = self.row();
        references::set_num_lod_elements(&mut self.cloth, self.lod, &columns, row, num);
    }

    fn slice_mut<T: AttributeType>(&mut self, columns: RangeColumns, name: &str) -> &mut [T] {
        let row = self.row();
        let (start, end) = columns.get(&self.cloth.collection, row);
        let data = self.cloth.column_mut::<T>(columns.child_group, name);
        match ranges::range(start, end) {
            Some((first, last)) => &mut data[first..=last],
            None => &mut [],
        }
    }

    /// Remove every vertex and face of this pattern
    pub fn reset(&mut self) {
        self.set_num_render_faces(0);
        self.set_num_render_vertices(0);
        self.set_num_sim_faces(0);
        self.set_num_sim_vertices_2d(0);
        self.set_status_flags(0);
    }

    pub fn set_status_flags(&mut self, flags: i32) {
        let row = self.row();
        self.cloth.column_mut::<i32>(groups::PATTERNS, attr::STATUS_FLAGS)[row] = flags;
    }

    /// Resize the 2D vertices.
    ///
    /// New vertices have no 3D vertex yet. Removing vertices also removes the
    /// 3D vertices that no remaining 2D vertex maps to.
    pub fn set_num_sim_vertices_2d(&mut self, num: usize) {
        let old = self.num_sim_vertices_2d();
        if num >= old {
            self.set_num_children(schema_ranges::PATTERN_SIM_VERTICES_2D, num);
            return;
        }

        let offset = self.sim_vertices_2d_offset() as i32;
        let removed = offset + num as i32..offset + old as i32;
        let mut candidates: Vec<i32> = self.sim_vertex_3d_lookup()[num..]
            .iter()
            .copied()
            .filter(|&v| v != INDEX_NONE)
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        let lookups_2d: &[Vec<i32>] = lod_slice(
            &self.cloth,
            self.lod,
            groups::SIM_VERTICES_3D,
            attr::SIM_VERTEX_2D_LOOKUP,
        );
        let orphans: Vec<usize> = candidates
            .into_iter()
            .map(|v| v as usize)
            .filter(|&v| lookups_2d[v].iter().all(|v2| removed.contains(v2)))
            .collect();

        self.set_num_children(schema_ranges::PATTERN_SIM_VERTICES_2D, num);
        references::remove_sim_vertices_3d(&mut self.cloth, self.lod, &orphans);
        trace!(
            "set_num_sim_vertices_2d: pattern {} {old} -> {num}, {} orphaned 3D vertices",
            self.pattern,
            orphans.len()
        );
    }

    pub fn set_num_sim_faces(&mut self, num: usize) {
        self.set_num_children(schema_ranges::PATTERN_SIM_FACES, num);
    }

    pub fn set_num_render_vertices(&mut self, num: usize) {
        self.set_num_children(schema_ranges::PATTERN_RENDER_VERTICES, num);
    }

    pub fn set_num_render_faces(&mut self, num: usize) {
        self.set_num_children(schema_ranges::PATTERN_RENDER_FACES, num);
    }

    pub fn sim_position_2d_mut(&mut self) -> &mut [Vec2] {
        self.slice_mut(schema_ranges::PATTERN_SIM_VERTICES_2D, attr::SIM_POSITION_2D)
    }

    pub fn render_position_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_POSITION)
    }

    pub fn render_normal_mut(&mut self) -> &mut [Vec3] {
        self.slice_mut(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_NORMAL)
    }

    pub fn render_uvs_mut(&mut self) -> &mut [Vec<Vec2>] {
        self.slice_mut(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_UVS)
    }

    pub fn render_color_mut(&mut self) -> &mut [Vec4] {
        self.slice_mut(schema_ranges::PATTERN_RENDER_VERTICES, attr::RENDER_COLOR)
    }

    /// Build the simulation mesh of this pattern from unwrapped data.
    ///
    /// `indices` are pattern-local. Every 2D vertex gets its own new 3D
    /// vertex; normals are the normalized sum of the adjacent face normals.
    pub fn initialize(&mut self, positions_2d: &[Vec2], positions_3d: &[Vec3], indices: &[IVec3]) {
        assert_eq!(
            positions_2d.len(),
            positions_3d.len(),
            "2D and 3D positions must pair up"
        );
        let num_vertices = positions_2d.len();
        assert!(
            indices
                .iter()
                .all(|tri| tri.min_element() >= 0 && (tri.max_element() as usize) < num_vertices),
            "triangle index out of range"
        );

        self.reset();
        self.set_num_sim_vertices_2d(num_vertices);
        let offset_2d = self.sim_vertices_2d_offset() as i32;
        let base_3d = references::add_sim_vertices_3d(&mut self.cloth, self.lod, num_vertices);

        self.sim_position_2d_mut().copy_from_slice(positions_2d);
        for (i, lookup) in self
            .slice_mut::<i32>(schema_ranges::PATTERN_SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP)
            .iter_mut()
            .enumerate()
        {
            *lookup = (base_3d + i) as i32;
        }

        let normals = vertex_normals(positions_3d, indices);
        let vertices = base_3d..base_3d + num_vertices;
        let lod = self.lod;
        lod_slice_mut::<Vec3>(&mut self.cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_POSITION_3D)
            [vertices.clone()]
        .copy_from_slice(positions_3d);
        lod_slice_mut::<Vec3>(&mut self.cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_NORMAL)
            [vertices.clone()]
        .copy_from_slice(&normals);
        for (i, lookup) in lod_slice_mut::<Vec<i32>>(
            &mut self.cloth,
            lod,
            groups::SIM_VERTICES_3D,
            attr::SIM_VERTEX_2D_LOOKUP,
        )[vertices]
            .iter_mut()
            .enumerate()
        {
            *lookup = vec![offset_2d + i as i32];
        }

        self.set_num_sim_faces(indices.len());
        let offset_2d = IVec3::splat(offset_2d);
        let offset_3d = IVec3::splat(base_3d as i32);
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_2D)
            .iter_mut()
            .zip(indices)
        {
            *face = tri + offset_2d;
        }
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_3D)
            .iter_mut()
            .zip(indices)
        {
            *face = tri + offset_3d;
        }
    }

    /// Replace the render mesh of this pattern.
    ///
    /// `indices` are pattern-local. Tangents are computed from the first UV
    /// channel, zero where the mapping is degenerate.
    pub fn initialize_render(&mut self, vertices: &[RenderVertex], indices: &[IVec3], material_index: i32) {
        let num_vertices = vertices.len();
        assert!(
            indices
                .iter()
                .all(|tri| tri.min_element() >= 0 && (tri.max_element() as usize) < num_vertices),
            "triangle index out of range"
        );
        self.set_num_render_faces(0);
        self.set_num_render_vertices(0);
        self.set_num_render_vertices(num_vertices);

        let positions: Vec<Vec3> = vertices.iter().map(|v| v.position).collect();
        let uvs: Vec<Vec2> = vertices
            .iter()
            .map(|v| v.uvs.first().copied().unwrap_or(Vec2::ZERO))
            .collect();
        let (tangent_u, tangent_v) = vertex_tangents(&positions, &uvs, indices);

        let columns = schema_ranges::PATTERN_RENDER_VERTICES;
        self.render_position_mut().copy_from_slice(&positions);
        for (normal, vertex) in self.render_normal_mut().iter_mut().zip(vertices) {
            *normal = vertex.normal;
        }
        self.slice_mut::<Vec3>(columns, attr::RENDER_TANGENT_U)
            .copy_from_slice(&tangent_u);
        self.slice_mut::<Vec3>(columns, attr::RENDER_TANGENT_V)
            .copy_from_slice(&tangent_v);
        for (uvs, vertex) in self.render_uvs_mut().iter_mut().zip(vertices) {
            uvs.clone_from(&vertex.uvs);
        }
        for (color, vertex) in self.render_color_mut().iter_mut().zip(vertices) {
            *color = vertex.color;
        }
        for (bones, vertex) in self
            .slice_mut::<Vec<i32>>(columns, attr::RENDER_BONE_INDICES)
            .iter_mut()
            .zip(vertices)
        {
            bones.clone_from(&vertex.bone_indices);
        }
        for (weights, vertex) in self
            .slice_mut::<Vec<f32>>(columns, attr::RENDER_BONE_WEIGHTS)
            .iter_mut()
            .zip(vertices)
        {
            weights.clone_from(&vertex.bone_weights);
        }

        self.set_num_render_faces(indices.len());
        let offset = IVec3::splat(self.render_vertices_offset() as i32);
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_INDICES)
            .iter_mut()
            .zip(indices)
        {
            *face = tri + offset;
        }
        self.slice_mut::<i32>(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_MATERIAL_INDEX)
            .fill(material_index);
    }

    /// Deep copy of another pattern, possibly from another collection.
    ///
    /// The 3D vertices the source pattern maps to are recreated in this LOD,
    /// and every index array is shifted to this pattern's offsets. Tethers and
    /// 2D lookups that leave the source pattern are dropped; seams are not
    /// part of a pattern and are not copied.
    pub fn initialize_from<D: Deref<Target = ClothCollection>>(&mut self, other: &PatternFacade<D>) {
        self.reset();
        let source = &*other.cloth;
        let source_lod = other.lod;

        // 2D vertices
        let num_vertices_2d = other.num_sim_vertices_2d();
        self.set_num_sim_vertices_2d(num_vertices_2d);
        self.sim_position_2d_mut()
            .copy_from_slice(other.sim_position_2d());
        let source_offset_2d = other.sim_vertices_2d_offset() as i32;
        let shift_2d = self.sim_vertices_2d_offset() as i32 - source_offset_2d;
        let source_range_2d = source_offset_2d..source_offset_2d + num_vertices_2d as i32;

        // 3D vertices referenced by the source pattern, in source order
        let mut source_3d: Vec<i32> = other
            .sim_vertex_3d_lookup()
            .iter()
            .copied()
            .filter(|&v| v != INDEX_NONE)
            .collect();
        source_3d.sort_unstable();
        source_3d.dedup();
        let base_3d = references::add_sim_vertices_3d(&mut self.cloth, self.lod, source_3d.len());
        let map_3d: BTreeMap<i32, i32> = source_3d
            .iter()
            .enumerate()
            .map(|(k, &v)| (v, (base_3d + k) as i32))
            .collect();
        let remap_3d = |v: i32| map_3d.get(&v).copied().unwrap_or(INDEX_NONE);

        for (lookup, &v) in self
            .slice_mut::<i32>(schema_ranges::PATTERN_SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP)
            .iter_mut()
            .zip(other.sim_vertex_3d_lookup())
        {
            *lookup = remap_3d(v);
        }

        let (Some((source_first, _)), Some((first, _))) = (
            references::lod_rows(source, source_lod, groups::SIM_VERTICES_3D),
            references::lod_rows(&self.cloth, self.lod, groups::SIM_VERTICES_3D),
        ) else {
            self.copy_faces_and_render(other, shift_2d, &remap_3d);
            return;
        };

        // Per-vertex 3D columns, including user-defined attributes present
        // on both sides
        let mut names: Vec<String> = SIM_VERTEX_3D_ATTRIBUTES.iter().map(|s| s.to_string()).collect();
        names.extend(
            source
                .attributes()
                .attribute_names(groups::SIM_VERTICES_3D)
                .filter(|name| !crate::schema::is_fixed_attribute(name, groups::SIM_VERTICES_3D))
                .filter(|name| {
                    self.cloth.attributes().attribute_kind(name, groups::SIM_VERTICES_3D)
                        == source.attributes().attribute_kind(name, groups::SIM_VERTICES_3D)
                })
                .map(str::to_string),
        );
        for (k, &v) in source_3d.iter().enumerate() {
            for name in &names {
                self.cloth.collection.copy_rows_from(
                    source.attributes(),
                    name,
                    groups::SIM_VERTICES_3D,
                    source_first + v as usize,
                    first + base_3d + k,
                    1,
                );
            }
        }

        let source_lookups: &[Vec<i32>] =
            lod_slice(source, source_lod, groups::SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP);
        let source_tethers: &[Vec<i32>] =
            lod_slice(source, source_lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX);
        let source_lengths: &[Vec<f32>] =
            lod_slice(source, source_lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH);
        let lod = self.lod;
        for (k, &v) in source_3d.iter().enumerate() {
            let v = v as usize;
            let lookup: Vec<i32> = source_lookups[v]
                .iter()
                .filter(|&&v2| source_range_2d.contains(&v2))
                .map(|&v2| v2 + shift_2d)
                .collect();
            let (tethers, lengths): (Vec<i32>, Vec<f32>) = source_tethers[v]
                .iter()
                .zip(&source_lengths[v])
                .filter_map(|(&kinematic, &length)| {
                    map_3d.get(&kinematic).map(|&mapped| (mapped, length))
                })
                .unzip();
            let vertex = base_3d + k;
            lod_slice_mut::<Vec<i32>>(&mut self.cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP)
                [vertex] = lookup;
            lod_slice_mut::<Vec<i32>>(&mut self.cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)
                [vertex] = tethers;
            lod_slice_mut::<Vec<f32>>(&mut self.cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)
                [vertex] = lengths;
        }

        self.copy_faces_and_render(other, shift_2d, &remap_3d);
    }

    fn copy_faces_and_render<D: Deref<Target = ClothCollection>>(
        &mut self,
        other: &PatternFacade<D>,
        shift_2d: i32,
        remap_3d: &impl Fn(i32) -> i32,
    ) {
        let shift = |tri: IVec3, by: i32| {
            IVec3::from_array(tri.to_array().map(|v| if v == INDEX_NONE { v } else { v + by }))
        };

        self.set_num_sim_faces(other.num_sim_faces());
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_2D)
            .iter_mut()
            .zip(other.sim_indices_2d())
        {
            *face = shift(tri, shift_2d);
        }
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_SIM_FACES, attr::SIM_INDICES_3D)
            .iter_mut()
            .zip(other.sim_indices_3d())
        {
            *face = IVec3::from_array(tri.to_array().map(|v| if v == INDEX_NONE { v } else { remap_3d(v) }));
        }

        // Render mesh
        let num_render_vertices = other.num_render_vertices();
        self.set_num_render_vertices(num_render_vertices);
        let source = &*other.cloth;
        let (source_start, _) = schema_ranges::PATTERN_RENDER_VERTICES.get(&source.collection, other.row());
        let (start, _) = schema_ranges::PATTERN_RENDER_VERTICES.get(&self.cloth.collection, self.row());
        if num_render_vertices > 0 {
            for name in RENDER_VERTEX_ATTRIBUTES {
                self.cloth.collection.copy_rows_from(
                    &source.collection,
                    name,
                    groups::RENDER_VERTICES,
                    source_start as usize,
                    start as usize,
                    num_render_vertices,
                );
            }
        }
        let shift_render = self.render_vertices_offset() as i32 - other.render_vertices_offset() as i32;
        self.set_num_render_faces(other.num_render_faces());
        for (face, &tri) in self
            .slice_mut::<IVec3>(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_INDICES)
            .iter_mut()
            .zip(other.render_indices())
        {
            *face = shift(tri, shift_render);
        }
        self.slice_mut::<i32>(schema_ranges::PATTERN_RENDER_FACES, attr::RENDER_MATERIAL_INDEX)
            .copy_from_slice(other.render_material_index());
        self.set_status_flags(other.status_flags());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::LodFacadeMut;

    fn create_lod(cloth: &mut ClothCollection) -> LodFacadeMut<'_> {
        let mut facade = cloth.facade_mut();
        let index = facade.add_lod();
        LodFacadeMut::new(cloth, index)
    }

    fn initialize_quad(lod: &mut LodFacadeMut, pattern: usize, origin: Vec3) {
        lod.pattern_mut(pattern).initialize(
            &[Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
            &[origin, origin + Vec3::X, origin + Vec3::new(1.0, 1.0, 0.0), origin + Vec3::Y],
            &[IVec3::new(0, 1, 2), IVec3::new(0, 2, 3)],
        );
    }

    #[test]
    fn test_set_num_sim_vertices_grow_then_clear() {
        let mut cloth = ClothCollection::new();
        let mut lod = create_lod(&mut cloth);
        let pattern = lod.add_pattern();
        lod.pattern_mut(pattern).set_num_sim_vertices_2d(5);
        assert_eq!(lod.num_sim_vertices_2d(), 5);
        // Growth does not create 3D vertices
        assert_eq!(lod.pattern(pattern).sim_vertex_3d_lookup(), &[INDEX_NONE; 5]);

        lod.pattern_mut(pattern).set_num_sim_vertices_2d(0);
        drop(lod);
        assert_eq!(cloth.num_elements(groups::SIM_VERTICES_2D), 0);
        let (start, end) = cloth.range_of(&schema_ranges::PATTERN_SIM_VERTICES_2D, 0);
        assert_eq!((start, end), (INDEX_NONE, INDEX_NONE));
    }

    #[test]
    fn test_initialize_builds_lod_relative_faces() {
        let mut cloth = ClothCollection::new();
        let mut lod = create_lod(&mut cloth);
        lod.set_num_patterns(2);
        initialize_quad(&mut lod, 0, Vec3::ZERO);
        initialize_quad(&mut lod, 1, Vec3::Z);

        let pattern = lod.pattern(1);
        assert_eq!(pattern.sim_vertices_2d_offset(), 4);
        assert_eq!(pattern.sim_faces_offset(), 2);
        assert_eq!(pattern.sim_indices_2d(), &[IVec3::new(4, 5, 6), IVec3::new(4, 6, 7)]);
        assert_eq!(pattern.sim_vertex_3d_lookup(), &[4, 5, 6, 7]);
        assert!(lod.sim_normal().iter().all(|n| (*n - Vec3::Z).length() < 1e-6));
    }

    #[test]
    fn test_reinitialize_first_pattern_shifts_second() {
        let mut cloth = ClothCollection::new();
        let mut lod = create_lod(&mut cloth);
        lod.set_num_patterns(2);
        initialize_quad(&mut lod, 0, Vec3::ZERO);
        initialize_quad(&mut lod, 1, Vec3::Z);

        // A triangle instead of a quad: the second pattern moves down by one
        lod.pattern_mut(0).initialize(
            &[Vec2::ZERO, Vec2::X, Vec2::Y],
            &[Vec3::ZERO, Vec3::X, Vec3::Y],
            &[IVec3::new(0, 1, 2)],
        );
        assert_eq!(lod.num_sim_vertices_2d(), 7);
        assert_eq!(lod.num_sim_vertices_3d(), 7);
        let second = lod.pattern(1);
        assert_eq!(second.sim_vertices_2d_offset(), 3);
        assert_eq!(second.sim_indices_2d(), &[IVec3::new(3, 4, 5), IVec3::new(3, 5, 6)]);
        // The second pattern's 3D vertices were created first and stay in place
        assert_eq!(second.sim_indices_3d(), &[IVec3::new(0, 1, 2), IVec3::new(0, 2, 3)]);
        assert_eq!(lod.sim_vertex_2d_lookup()[0], vec![3]);
        assert_eq!(lod.pattern(0).sim_vertex_3d_lookup(), &[4, 5, 6]);
    }

    #[test]
    fn test_initialize_from_shifts_indices() {
        let mut source = ClothCollection::new();
        {
            let mut lod = create_lod(&mut source);
            lod.set_num_patterns(2);
            initialize_quad(&mut lod, 0, Vec3::ZERO);
            initialize_quad(&mut lod, 1, Vec3::Z);
            lod.pattern_mut(1).set_status_flags(3);
        }

        let mut target = ClothCollection::new();
        let mut lod = create_lod(&mut target);
        let pattern = lod.add_pattern();
        lod.pattern_mut(pattern)
            .initialize_from(&source.facade().lod(0).pattern(1));

        let copy = lod.pattern(pattern);
        let source_facade = source.facade();
        let source_lod = source_facade.lod(0);
        let original = source_lod.pattern(1);
        assert_eq!(copy.sim_position_2d(), original.sim_position_2d());
        assert_eq!(copy.status_flags(), 3);
        let shift = IVec3::splat(4);
        let expected: Vec<IVec3> = original.sim_indices_2d().iter().map(|&t| t - shift).collect();
        assert_eq!(copy.sim_indices_2d(), expected.as_slice());
        assert_eq!(copy.sim_indices_3d(), expected.as_slice());
        assert_eq!(lod.sim_position_3d(), &source_lod.sim_position_3d()[4..]);
        assert_eq!(lod.sim_vertex_2d_lookup()[2], vec![2]);
    }
}
