//! Tether batch facade.

use std::ops::{Deref, DerefMut};

use cloth_config::INDEX_NONE;

use super::lod_slice;
use crate::references::{self, lod_rows};
use crate::schema::{attributes as attr, groups, ranges as schema_ranges, ClothCollection};

/// Maximum-distance constraint from a kinematic to a dynamic 3D vertex
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tether {
    pub kinematic: i32,
    pub dynamic: i32,
    pub reference_length: f32,
}

/// Facade over one tether batch of an LOD
pub struct TetherBatchFacade<C> {
    cloth: C,
    lod: usize,
    batch: usize,
}

pub type TetherBatchFacadeMut<'a> = TetherBatchFacade<&'a mut ClothCollection>;

impl<C: Deref<Target = ClothCollection>> TetherBatchFacade<C> {
    pub fn new(cloth: C, lod: usize, batch: usize) -> Self {
        let num_batches = schema_ranges::LOD_TETHER_BATCHES.num_elements(&cloth.collection, lod);
        assert!(
            batch < num_batches,
            "tether batch {batch} out of range ({num_batches} batches in LOD {lod})"
        );
        Self { cloth, lod, batch }
    }

    fn row(&self) -> usize {
        let (start, _) = self.cloth.range_of(&schema_ranges::LOD_TETHER_BATCHES, self.lod);
        start as usize + self.batch
    }

    pub fn num_tethers(&self) -> usize {
        schema_ranges::TETHER_BATCH_TETHERS.num_elements(&self.cloth.collection, self.row())
    }

    fn tether_slice<T: crate::store::AttributeType>(&self, name: &str) -> &[T] {
        let (start, _) = self.cloth.range_of(&schema_ranges::TETHER_BATCH_TETHERS, self.row());
        let Some((base, _)) = lod_rows(&self.cloth, self.lod, groups::TETHERS) else {
            return &[];
        };
        if start == INDEX_NONE {
            return &[];
        }
        let offset = start as usize - base;
        &lod_slice(&self.cloth, self.lod, groups::TETHERS, name)[offset..offset + self.num_tethers()]
    }

    pub fn kinematic_indices(&self) -> &[i32] {
        self.tether_slice(attr::TETHER_KINEMATIC_INDEX)
    }

    pub fn dynamic_indices(&self) -> &[i32] {
        self.tether_slice(attr::TETHER_DYNAMIC_INDEX)
    }

    pub fn reference_lengths(&self) -> &[f32] {
        self.tether_slice(attr::TETHER_REFERENCE_LENGTH)
    }

    pub fn tethers(&self) -> Vec<Tether> {
        self.kinematic_indices()
            .iter()
            .zip(self.dynamic_indices())
            .zip(self.reference_lengths())
            .map(|((&kinematic, &dynamic), &reference_length)| Tether {
                kinematic,
                dynamic,
                reference_length,
            })
            .collect()
    }
}

impl<C: DerefMut<Target = ClothCollection>> TetherBatchFacade<C> {
    pub fn reset(&mut self) {
        self.set_num_tethers(0);
    }

    /// Resize the batch. New tethers reference no vertex.
    pub fn set_num_tethers(&mut self, num: usize) {
        let row = self.row();
        references::set_num_lod_elements(
            &mut self.cloth,
            self.lod,
            &schema_ranges::TETHER_BATCH_TETHERS,
            row,
            num,
        );
    }

    /// Replace the tethers of this batch
    pub fn initialize(&mut self, tethers: &[Tether]) {
        self.set_num_tethers(0);
        self.set_num_tethers(tethers.len());
        if tethers.is_empty() {
            return;
        }
        let row = self.row();
        let (start, _) = self.cloth.range_of(&schema_ranges::TETHER_BATCH_TETHERS, row);
        let rows = start as usize..start as usize + tethers.len();
        let kinematic = &mut self.cloth.column_mut::<i32>(groups::TETHERS, attr::TETHER_KINEMATIC_INDEX)
            [rows.clone()];
        for (value, tether) in kinematic.iter_mut().zip(tethers) {
            *value = tether.kinematic;
        }
        let dynamic =
            &mut self.cloth.column_mut::<i32>(groups::TETHERS, attr::TETHER_DYNAMIC_INDEX)[rows.clone()];
        for (value, tether) in dynamic.iter_mut().zip(tethers) {
            *value = tether.dynamic;
        }
        let lengths =
            &mut self.cloth.column_mut::<f32>(groups::TETHERS, attr::TETHER_REFERENCE_LENGTH)[rows];
        for (value, tether) in lengths.iter_mut().zip(tethers) {
            *value = tether.reference_length;
        }
    }

    pub fn initialize_from<D: Deref<Target = ClothCollection>>(
        &mut self,
        other: &TetherBatchFacade<D>,
    ) {
        self.initialize(&other.tethers());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_lod_with_vertices(cloth: &mut ClothCollection, num_vertices: usize) {
        let mut facade = cloth.facade_mut();
        facade.add_lod();
        references::add_sim_vertices_3d(cloth, 0, num_vertices);
    }

    #[test]
    fn test_initialize_and_read_back() {
        let mut cloth = ClothCollection::new();
        create_lod_with_vertices(&mut cloth, 3);
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let batch = lod.add_tether_batch();
        let tethers = [
            Tether { kinematic: 0, dynamic: 1, reference_length: 1.0 },
            Tether { kinematic: 0, dynamic: 2, reference_length: 2.0 },
        ];
        lod.tether_batch_mut(batch).initialize(&tethers);

        let batch = lod.tether_batch(batch);
        assert_eq!(batch.num_tethers(), 2);
        assert_eq!(batch.dynamic_indices(), &[1, 2]);
        assert_eq!(batch.tethers(), tethers.to_vec());
    }

    #[test]
    fn test_new_tethers_reference_nothing() {
        let mut cloth = ClothCollection::new();
        create_lod_with_vertices(&mut cloth, 2);
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        let batch = lod.add_tether_batch();
        lod.tether_batch_mut(batch).set_num_tethers(2);
        assert_eq!(lod.tether_batch(batch).kinematic_indices(), &[INDEX_NONE; 2]);
    }

    #[test]
    fn test_batches_keep_their_own_tethers() {
        let mut cloth = ClothCollection::new();
        create_lod_with_vertices(&mut cloth, 3);
        let mut facade = cloth.facade_mut();
        let mut lod = facade.lod_mut(0);
        lod.set_num_tether_batches(2);
        let tether = |dynamic| Tether { kinematic: 0, dynamic, reference_length: 1.0 };
        lod.tether_batch_mut(1).initialize(&[tether(2)]);
        lod.tether_batch_mut(0).initialize(&[tether(1), tether(2)]);

        assert_eq!(lod.tether_batch(0).dynamic_indices(), &[1, 2]);
        assert_eq!(lod.tether_batch(1).dynamic_indices(), &[2]);

        lod.tether_batch_mut(0).reset();
        assert_eq!(lod.tether_batch(0).num_tethers(), 0);
        assert_eq!(lod.tether_batch(1).dynamic_indices(), &[2]);
    }
}
