//! Seam welding.
//!
//! Stitching two 2D vertices merges the 3D vertices they map to. Stitches are
//! grouped with a union-find, each group is collapsed onto its smallest
//! member, attributes of the merged vertices are folded into the survivor and
//! the other members are removed from the LOD.

mod reconcile;

use std::collections::BTreeMap;

use cloth_config::INDEX_NONE;
use glam::IVec2;
use tracing::debug;

use crate::facade::{lod_slice, lod_slice_mut, LodFacade};
use crate::references::{self, lod_num_elements, lod_rows};
use crate::schema::{attributes as attr, groups, ranges as schema_ranges, ClothCollection};

pub(crate) use reconcile::{capped_bone_influences, capped_tethers};

/// Disjoint sets of 3D vertices with a weight per vertex.
///
/// The representative of a set is always its smallest vertex.
#[derive(Debug, Clone, Default)]
pub struct WeldingGroups {
    parent: BTreeMap<i32, i32>,
    weights: BTreeMap<i32, f32>,
}

impl WeldingGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `vertex` with `weight`; a vertex already known keeps its weight
    pub fn add(&mut self, vertex: i32, weight: f32) {
        self.parent.entry(vertex).or_insert(vertex);
        self.weights.entry(vertex).or_insert(weight);
    }

    /// Representative of `vertex`'s set, compressing the path on the way
    pub fn find(&mut self, vertex: i32) -> i32 {
        let mut root = vertex;
        while let Some(&parent) = self.parent.get(&root) {
            if parent == root {
                break;
            }
            root = parent;
        }
        let mut current = vertex;
        while current != root {
            let next = self.parent[&current];
            self.parent.insert(current, root);
            current = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`; `false` if they were already one set
    pub fn union(&mut self, a: i32, b: i32) -> bool {
        self.add(a, 1.0);
        self.add(b, 1.0);
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a == root_b {
            return false;
        }
        let (keep, merged) = (root_a.min(root_b), root_a.max(root_b));
        self.parent.insert(merged, keep);
        true
    }

    /// Every vertex that is not its own representative, mapped to it
    pub fn welding_map(&mut self) -> BTreeMap<i32, i32> {
        let vertices: Vec<i32> = self.parent.keys().copied().collect();
        vertices
            .into_iter()
            .filter_map(|vertex| {
                let root = self.find(vertex);
                (root != vertex).then_some((vertex, root))
            })
            .collect()
    }

    /// Members and weights of every set with more than one vertex, keyed by
    /// representative. Members are in ascending order, representative first.
    pub fn groups(&mut self) -> BTreeMap<i32, Vec<(i32, f32)>> {
        let vertices: Vec<i32> = self.parent.keys().copied().collect();
        let mut groups: BTreeMap<i32, Vec<(i32, f32)>> = BTreeMap::new();
        for vertex in vertices {
            let root = self.find(vertex);
            let weight = self.weights.get(&vertex).copied().unwrap_or(1.0);
            groups.entry(root).or_default().push((vertex, weight));
        }
        groups.retain(|_, members| members.len() > 1);
        groups
    }
}

/// Pattern of the LOD that owns 2D vertex `vertex` (LOD-relative)
fn pattern_of(cloth: &ClothCollection, lod: usize, vertex: i32) -> i32 {
    let lod = LodFacade::new(cloth, lod);
    (0..lod.num_patterns())
        .find(|&index| {
            let pattern = lod.pattern(index);
            let offset = pattern.sim_vertices_2d_offset() as i32;
            (offset..offset + pattern.num_sim_vertices_2d() as i32).contains(&vertex)
        })
        .map_or(INDEX_NONE, |index| index as i32)
}

/// Write `stitches` into seam `seam` of LOD `lod` (whose stitch range must be
/// empty) and weld the 3D vertices they join
pub(crate) fn weld_seam(cloth: &mut ClothCollection, lod: usize, seam: usize, stitches: &[IVec2]) {
    let num_2d = lod_num_elements(cloth, lod, groups::SIM_VERTICES_2D) as i32;
    let lookup_3d: Vec<i32> =
        lod_slice::<i32>(cloth, lod, groups::SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP).to_vec();
    let is_valid = |vertex: i32| (0..num_2d).contains(&vertex) && lookup_3d[vertex as usize] != INDEX_NONE;
    let stitches: Vec<IVec2> = stitches
        .iter()
        .copied()
        .filter(|stitch| stitch.x != stitch.y && is_valid(stitch.x) && is_valid(stitch.y))
        .collect();

    let (seam_start, _) = cloth.range_of(&schema_ranges::LOD_SEAMS, lod);
    let seam_row = seam_start as usize + seam;
    if stitches.is_empty() {
        debug!("weld_seam: lod {lod} seam {seam} has no valid stitch");
        return;
    }

    // Stitch rows
    references::set_num_lod_elements(
        cloth,
        lod,
        &schema_ranges::SEAM_STITCHES,
        seam_row,
        stitches.len(),
    );
    let (stitch_start, _) = cloth.range_of(&schema_ranges::SEAM_STITCHES, seam_row);
    let stitch_start = stitch_start as usize;
    let stitch_offset = lod_rows(cloth, lod, groups::SEAM_STITCHES)
        .map_or(0, |(base, _)| stitch_start - base) as i32;
    cloth.column_mut::<IVec2>(groups::SEAM_STITCHES, attr::SEAM_STITCH_2D_END_INDICES)
        [stitch_start..stitch_start + stitches.len()]
        .copy_from_slice(&stitches);
    let seam_patterns = IVec2::new(
        pattern_of(cloth, lod, stitches[0].x),
        pattern_of(cloth, lod, stitches[0].y),
    );
    cloth.column_mut::<IVec2>(groups::SEAMS, attr::SEAM_PATTERNS)[seam_row] = seam_patterns;

    // Group the 3D vertices, weighted by the number of 2D vertices each stands for
    let mut welding_groups = WeldingGroups::new();
    let mut merged = 0;
    {
        let lookup_2d: &[Vec<i32>] =
            lod_slice(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP);
        for stitch in &stitches {
            let a = lookup_3d[stitch.x as usize];
            let b = lookup_3d[stitch.y as usize];
            welding_groups.add(a, lookup_2d[a as usize].len().max(1) as f32);
            welding_groups.add(b, lookup_2d[b as usize].len().max(1) as f32);
            if welding_groups.union(a, b) {
                merged += 1;
            }
        }
    }

    {
        let indices_3d: Vec<i32> = stitches
            .iter()
            .map(|stitch| welding_groups.find(lookup_3d[stitch.x as usize]))
            .collect();
        cloth.column_mut::<i32>(groups::SEAM_STITCHES, attr::SEAM_STITCH_3D_INDEX)
            [stitch_start..stitch_start + stitches.len()]
            .copy_from_slice(&indices_3d);
        let stitch_lookup: &mut [Vec<i32>] =
            lod_slice_mut(cloth, lod, groups::SIM_VERTICES_3D, attr::SEAM_STITCH_LOOKUP);
        for (index, &vertex) in indices_3d.iter().enumerate() {
            stitch_lookup[vertex as usize].push(stitch_offset + index as i32);
        }
    }

    if merged == 0 {
        debug!(
            "weld_seam: lod {lod} seam {seam}: {} stitches, vertices already welded",
            stitches.len()
        );
        return;
    }

    let welding_map = welding_groups.welding_map();
    let members = welding_groups.groups();
    let had_tether_batches = schema_ranges::LOD_TETHER_BATCHES.num_elements(&cloth.collection, lod) > 0;

    reconcile::reconcile_groups(cloth, lod, &members, &welding_map);
    references::remap_lod_references(cloth, lod, groups::SIM_VERTICES_3D, |vertex| {
        welding_map.get(&vertex).copied().unwrap_or(vertex)
    });
    reconcile::merge_duplicate_tethers(cloth, lod);

    let removed: Vec<usize> = welding_map.keys().map(|&vertex| vertex as usize).collect();
    references::remove_sim_vertices_3d(cloth, lod, &removed);

    if had_tether_batches {
        LodFacade::new(&mut *cloth, lod).build_tether_batches();
    }
    debug!(
        "weld_seam: lod {lod} seam {seam}: {} stitches, {} vertices merged into {} groups",
        stitches.len(),
        removed.len(),
        members.len()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facade::LodFacadeMut;
    use crate::mesh::BoneInfluence;
    use glam::{IVec3, Vec2, Vec3};

    /// Two unit squares side by side, each its own pattern, not yet welded.
    /// Pattern 0 owns 2D vertices 0..4, pattern 1 owns 4..8.
    fn create_cloth() -> ClothCollection {
        let mut cloth = ClothCollection::new();
        let mut facade = cloth.facade_mut();
        facade.add_lod();
        let mut lod = facade.lod_mut(0);
        for origin in [Vec3::ZERO, Vec3::X] {
            let pattern = lod.add_pattern();
            lod.pattern_mut(pattern).initialize(
                &[Vec2::ZERO, Vec2::X, Vec2::ONE, Vec2::Y],
                &[origin, origin + Vec3::X, origin + Vec3::new(1.0, 1.0, 0.0), origin + Vec3::Y],
                &[IVec3::new(0, 1, 2), IVec3::new(0, 2, 3)],
            );
        }
        cloth
    }

    const SHARED_EDGE: [IVec2; 2] = [IVec2::new(1, 4), IVec2::new(2, 7)];

    fn edit_lod(cloth: &mut ClothCollection, edit: impl FnOnce(&mut LodFacadeMut<'_>)) {
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        edit(&mut lod);
    }

    /// Every index of LOD 0 is in range, the 2D and 3D lookups mirror each
    /// other and faces agree with the lookup
    fn assert_lod_consistent(cloth: &ClothCollection) {
        if let Some((reference, row, value)) = references::find_dangling_reference(cloth, 0) {
            panic!("{}/{} row {row} = {value}", reference.owner, reference.attribute);
        }
        let facade = cloth.facade();
        let lod = facade.lod(0);
        let lookup_3d = lod.sim_vertex_3d_lookup();
        let lookup_2d = lod.sim_vertex_2d_lookup();
        for (vertex_2d, &vertex_3d) in lookup_3d.iter().enumerate() {
            assert_ne!(vertex_3d, INDEX_NONE, "2D vertex {vertex_2d} is not welded to 3D");
            assert!(lookup_2d[vertex_3d as usize].contains(&(vertex_2d as i32)));
        }
        for (vertex_3d, list) in lookup_2d.iter().enumerate() {
            for &vertex_2d in list {
                assert_eq!(lookup_3d[vertex_2d as usize], vertex_3d as i32);
            }
        }
        for (face_2d, face_3d) in lod.sim_indices_2d().iter().zip(lod.sim_indices_3d()) {
            for (&vertex_2d, &vertex_3d) in face_2d.to_array().iter().zip(&face_3d.to_array()) {
                if vertex_2d != INDEX_NONE {
                    assert_eq!(lookup_3d[vertex_2d as usize], vertex_3d);
                }
            }
        }
    }

    #[test]
    fn test_union_find_keeps_smallest_representative() {
        let mut groups = WeldingGroups::new();
        assert!(groups.union(5, 3));
        assert!(groups.union(3, 8));
        assert!(groups.union(1, 8));
        assert!(!groups.union(5, 1));
        assert_eq!(groups.find(8), 1);
        assert_eq!(
            groups.welding_map(),
            BTreeMap::from([(3, 1), (5, 1), (8, 1)])
        );
        assert_eq!(groups.groups()[&1].len(), 4);
    }

    #[test]
    fn test_weld_shared_edge_removes_vertices() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&SHARED_EDGE);

        assert_eq!(lod.num_sim_vertices_3d(), 6);
        assert_eq!(lod.sim_vertex_3d_lookup(), &[0, 1, 2, 3, 1, 4, 5, 2]);
        assert_eq!(lod.sim_vertex_2d_lookup()[1], vec![1, 4]);
        assert_eq!(lod.sim_vertex_2d_lookup()[2], vec![2, 7]);
        assert_eq!(lod.sim_indices_3d()[2], IVec3::new(1, 4, 5));
        for (vertex_2d, &vertex_3d) in lod.sim_vertex_3d_lookup().iter().enumerate() {
            assert!(lod.sim_vertex_2d_lookup()[vertex_3d as usize].contains(&(vertex_2d as i32)));
        }
    }

    #[test]
    fn test_welding_is_idempotent() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&SHARED_EDGE);
        let positions = lod.sim_position_3d().to_vec();
        let lookup = lod.sim_vertex_3d_lookup().to_vec();

        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&SHARED_EDGE);
        assert_eq!(lod.sim_position_3d(), positions.as_slice());
        assert_eq!(lod.sim_vertex_3d_lookup(), lookup.as_slice());
        assert_eq!(lod.seam_stitch_lookup()[1], vec![0, 2]);
    }

    #[test]
    fn test_positions_are_weighted_by_2d_count() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        lod.sim_position_3d_mut()[4] = Vec3::new(3.0, 0.0, 0.0);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&[IVec2::new(1, 4)]);
        assert_eq!(lod.sim_position_3d()[1], Vec3::new(2.0, 0.0, 0.0));

        // Vertex 1 now stands for two 2D vertices, the third weld weighs it double
        lod.sim_position_3d_mut()[0] = Vec3::new(5.0, 0.0, 0.0);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&[IVec2::new(0, 1)]);
        assert_eq!(lod.sim_position_3d()[0], Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn test_bone_weights_stay_normalized() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let influence = |bone, weight| BoneInfluence { bone, weight };
        lod.set_sim_bone_influences(1, &[influence(0, 0.5), influence(1, 0.5)]);
        lod.set_sim_bone_influences(4, &[influence(1, 0.25), influence(2, 0.75)]);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&[IVec2::new(1, 4)]);

        assert_eq!(lod.sim_bone_indices()[1], vec![1, 2, 0]);
        let weights = &lod.sim_bone_weights()[1];
        assert!((weights.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!((weights[0] - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_weight_maps_are_averaged() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        facade.add_weight_map("MaxDistance");
        let mut lod = facade.lod_mut(0);
        if let Some(map) = lod.weight_map_mut("MaxDistance") {
            map.fill(1.0);
        }
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&SHARED_EDGE);
        assert_eq!(lod.weight_map("MaxDistance"), Some(&[1.0f32; 6][..]));
    }

    #[test]
    fn test_tethers_follow_the_weld() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        lod.set_sim_tethers(3, &[(1, 1.0), (4, 3.0)]);
        lod.set_sim_tethers(1, &[(4, 0.5)]);
        lod.build_tether_batches();
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&SHARED_EDGE);

        // 1 and 4 merged: the two tethers of vertex 3 collapse into one of
        // averaged length, and vertex 1 no longer tethers to itself
        assert_eq!(lod.tether_kinematic_index()[3], vec![1]);
        assert_eq!(lod.tether_reference_length()[3], vec![2.0]);
        assert!(lod.tether_kinematic_index()[1].is_empty());
        assert_eq!(lod.num_tether_batches(), 1);
        assert_eq!(lod.tether_batch(0).dynamic_indices(), &[3]);
    }

    #[test]
    fn test_other_seams_follow_removed_vertices() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        lod.set_num_seams(2);
        lod.seam_mut(0).initialize(&[IVec2::new(2, 7)]);
        lod.seam_mut(1).initialize(&[IVec2::new(1, 4)]);

        assert_eq!(lod.seam(0).stitch_3d_indices(), &[2]);
        assert_eq!(lod.seam(1).stitch_3d_indices(), &[1]);
        assert_eq!(lod.num_sim_vertices_3d(), 6);
    }

    #[test]
    fn test_bone_cap_applies_to_welded_vertex() {
        let mut cloth = create_cloth();
        cloth.set_config(cloth_config::ClothConfig {
            max_bone_influences: 2,
            ..Default::default()
        });
        let influence = |bone, weight| BoneInfluence { bone, weight };
        edit_lod(&mut cloth, |lod| {
            lod.set_sim_bone_influences(1, &[influence(0, 0.6), influence(1, 0.4)]);
            lod.set_sim_bone_influences(4, &[influence(2, 0.7), influence(3, 0.3)]);
            let seam = lod.add_seam();
            lod.seam_mut(seam).initialize(&[IVec2::new(1, 4)]);
        });

        let lod = cloth.facade();
        let lod = lod.lod(0);
        assert_eq!(lod.sim_bone_indices()[1], vec![2, 0]);
        let weights = &lod.sim_bone_weights()[1];
        assert!((weights[0] - 0.35 / 0.65).abs() < 1e-5);
        assert!((weights[1] - 0.3 / 0.65).abs() < 1e-5);
    }

    #[test]
    fn test_references_stay_valid_through_mixed_edits() {
        let mut cloth = create_cloth();

        edit_lod(&mut cloth, |lod| {
            let seam = lod.add_seam();
            lod.seam_mut(seam).initialize(&SHARED_EDGE);
        });
        assert_lod_consistent(&cloth);

        // Drops 2D vertex 7; its 3D vertex is still used by 2D vertex 2
        edit_lod(&mut cloth, |lod| {
            lod.pattern_mut(1).set_num_sim_vertices_2d(3);
            assert_eq!(lod.num_sim_vertices_2d(), 7);
            assert_eq!(lod.num_sim_vertices_3d(), 6);
        });
        assert_lod_consistent(&cloth);

        edit_lod(&mut cloth, |lod| {
            let pattern = lod.add_pattern();
            lod.pattern_mut(pattern).initialize(
                &[Vec2::ZERO, Vec2::X, Vec2::Y],
                &[Vec3::ZERO, Vec3::NEG_Y, Vec3::new(1.0, -1.0, 0.0)],
                &[IVec3::new(0, 1, 2)],
            );
            assert_eq!(lod.num_sim_vertices_3d(), 9);
        });
        assert_lod_consistent(&cloth);

        edit_lod(&mut cloth, |lod| {
            let seam = lod.add_seam();
            lod.seam_mut(seam).initialize(&[IVec2::new(0, 7)]);
            assert_eq!(lod.num_sim_vertices_3d(), 8);
            assert_eq!(lod.seam(seam).patterns(), IVec2::new(0, 2));
        });
        assert_lod_consistent(&cloth);

        edit_lod(&mut cloth, |lod| {
            lod.set_num_patterns(2);
            assert_eq!(lod.num_sim_vertices_2d(), 7);
            assert_eq!(lod.num_sim_vertices_3d(), 6);
            assert_eq!(lod.sim_vertex_2d_lookup()[0], vec![0]);
        });
        assert_lod_consistent(&cloth);

        let loaded = ClothCollection::from_json(&cloth.to_json().unwrap()).unwrap();
        assert_eq!(loaded, cloth);
        assert_lod_consistent(&loaded);
    }
}
