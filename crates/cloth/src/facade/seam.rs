//! Seam facade: stitches between 2D vertices that welding joins.

use std::ops::{Deref, DerefMut};

use cloth_config::INDEX_NONE;
use glam::IVec2;

use super::lod_slice;
use crate::references::{self, lod_rows};
use crate::schema::{attributes as attr, groups, ranges as schema_ranges, ClothCollection};
use crate::welding;

/// Facade over one seam of an LOD
pub struct SeamFacade<C> {
    cloth: C,
    lod: usize,
    seam: usize,
}

pub type SeamFacadeMut<'a> = SeamFacade<&'a mut ClothCollection>;

impl<C: Deref<Target = ClothCollection>> SeamFacade<C> {
    pub fn new(cloth: C, lod: usize, seam: usize) -> Self {
        let num_seams = schema_ranges::LOD_SEAMS.num_elements(&cloth.collection, lod);
        assert!(seam < num_seams, "seam {seam} out of range ({num_seams} seams in LOD {lod})");
        Self { cloth, lod, seam }
    }

    pub fn seam_index(&self) -> usize {
        self.seam
    }

    fn row(&self) -> usize {
        let (start, _) = self.cloth.range_of(&schema_ranges::LOD_SEAMS, self.lod);
        start as usize + self.seam
    }

    pub fn num_stitches(&self) -> usize {
        schema_ranges::SEAM_STITCHES.num_elements(&self.cloth.collection, self.row())
    }

    /// Offset of this seam's first stitch among the stitches of its LOD
    pub fn stitch_offset(&self) -> usize {
        match (
            ranges_start(&self.cloth, self.row()),
            lod_rows(&self.cloth, self.lod, groups::SEAM_STITCHES),
        ) {
            (Some(start), Some((base, _))) => start - base,
            _ => 0,
        }
    }

    fn stitch_slice<T: crate::store::AttributeType>(&self, name: &str) -> &[T] {
        let offset = self.stitch_offset();
        let stitches: &[T] = lod_slice(&self.cloth, self.lod, groups::SEAM_STITCHES, name);
        &stitches[offset..offset + self.num_stitches()]
    }

    /// Pairs of LOD-relative 2D vertices
    pub fn stitches(&self) -> &[IVec2] {
        self.stitch_slice(attr::SEAM_STITCH_2D_END_INDICES)
    }

    /// Welded 3D vertex of every stitch
    pub fn stitch_3d_indices(&self) -> &[i32] {
        self.stitch_slice(attr::SEAM_STITCH_3D_INDEX)
    }

    /// The two patterns this seam joins, `INDEX_NONE` while empty
    pub fn patterns(&self) -> IVec2 {
        self.cloth.column::<IVec2>(groups::SEAMS, attr::SEAM_PATTERNS)[self.row()]
    }
}

fn ranges_start(cloth: &ClothCollection, seam_row: usize) -> Option<usize> {
    let (start, _) = schema_ranges::SEAM_STITCHES.get(&cloth.collection, seam_row);
    (start != INDEX_NONE).then_some(start as usize)
}

impl<C: DerefMut<Target = ClothCollection>> SeamFacade<C> {
    /// Remove every stitch. Vertices already welded stay welded.
    pub fn reset(&mut self) {
        self.set_num_stitches(0);
        let row = self.row();
        self.cloth.column_mut::<IVec2>(groups::SEAMS, attr::SEAM_PATTERNS)[row] =
            IVec2::splat(INDEX_NONE);
    }

    pub(crate) fn set_num_stitches(&mut self, num: usize) {
        let row = self.row();
        references::set_num_lod_elements(
            &mut self.cloth,
            self.lod,
            &schema_ranges::SEAM_STITCHES,
            row,
            num,
        );
    }

    /// Replace the stitches of this seam and weld the 3D vertices they join.
    ///
    /// Stitches joining a vertex to itself or referencing a 2D vertex outside
    /// the LOD are dropped.
    pub fn initialize(&mut self, stitches: &[IVec2]) {
        self.reset();
        welding::weld_seam(&mut self.cloth, self.lod, self.seam, stitches);
    }

    /// Copy the stitches of another seam, shifted by `sim_vertex_2d_offset`,
    /// and weld them in this LOD
    pub fn initialize_from<D: Deref<Target = ClothCollection>>(
        &mut self,
        other: &SeamFacade<D>,
        sim_vertex_2d_offset: i32,
    ) {
        let stitches: Vec<IVec2> = other
            .stitches()
            .iter()
            .map(|&stitch| stitch + IVec2::splat(sim_vertex_2d_offset))
            .collect();
        self.initialize(&stitches);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec3, Vec2, Vec3};

    /// Two patterns of two triangles each; both share the edge x = 1
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

    #[test]
    fn test_initialize_records_stitches_and_patterns() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam)
            .initialize(&[IVec2::new(1, 4), IVec2::new(2, 7)]);

        let seam = lod.seam(seam);
        assert_eq!(seam.num_stitches(), 2);
        assert_eq!(seam.stitches(), &[IVec2::new(1, 4), IVec2::new(2, 7)]);
        assert_eq!(seam.patterns(), IVec2::new(0, 1));
        assert_eq!(seam.stitch_3d_indices(), &[1, 2]);
    }

    #[test]
    fn test_malformed_stitches_are_dropped() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&[
            IVec2::new(3, 3),
            IVec2::new(-1, 2),
            IVec2::new(0, 8),
            IVec2::new(1, 4),
        ]);
        assert_eq!(lod.seam(seam).stitches(), &[IVec2::new(1, 4)]);
        assert_eq!(lod.num_sim_vertices_3d(), 7);
    }

    #[test]
    fn test_reset_keeps_welds() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam)
            .initialize(&[IVec2::new(1, 4), IVec2::new(2, 7)]);
        lod.seam_mut(seam).reset();

        assert_eq!(lod.seam(seam).num_stitches(), 0);
        assert_eq!(lod.seam(seam).patterns(), IVec2::splat(INDEX_NONE));
        assert_eq!(lod.num_sim_vertices_3d(), 6);
        assert!(lod.seam_stitch_lookup().iter().all(Vec::is_empty));
    }

    #[test]
    fn test_second_seam_offsets() {
        let mut cloth = create_cloth();
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        lod.set_num_seams(2);
        lod.seam_mut(1).initialize(&[IVec2::new(2, 7)]);
        lod.seam_mut(0).initialize(&[IVec2::new(1, 4)]);

        assert_eq!(lod.seam(0).stitch_offset(), 0);
        assert_eq!(lod.seam(1).stitch_offset(), 1);
        assert_eq!(lod.seam(1).stitches(), &[IVec2::new(2, 7)]);
        // The stitch lookup of the first weld moved along with its stitch
        assert_eq!(lod.seam_stitch_lookup()[2], vec![1]);
        assert_eq!(lod.seam_stitch_lookup()[1], vec![0]);
    }

    #[test]
    fn test_initialize_from_shifts_stitches() {
        let mut source = create_cloth();
        {
            let mut facade = source.facade_mut();
            let mut lod = facade.lod_mut(0);
            let seam = lod.add_seam();
            lod.seam_mut(seam).initialize(&[IVec2::new(1, 4)]);
        }

        let mut target = create_cloth();
        let mut facade = target.facade_mut();
        let mut lod = facade.lod_mut(0);
        let seam = lod.add_seam();
        lod.seam_mut(seam)
            .initialize_from(&source.facade().lod(0).seam(0), 1);
        assert_eq!(lod.seam(seam).stitches(), &[IVec2::new(2, 5)]);
    }
}
