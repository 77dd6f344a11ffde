//! Whole-collection facade: LODs and weight maps.

use std::ops::{Deref, DerefMut};

use tracing::debug;

use super::LodFacade;
use crate::schema::{groups, ClothCollection};

/// Facade over the whole cloth collection
pub struct ClothFacade<C> {
    cloth: C,
}

pub type ClothFacadeMut<'a> = ClothFacade<&'a mut ClothCollection>;

impl<C: Deref<Target = ClothCollection>> ClothFacade<C> {
    pub fn new(cloth: C) -> Self {
        Self { cloth }
    }

    pub fn collection(&self) -> &ClothCollection {
        &self.cloth
    }

    pub fn is_valid(&self) -> bool {
        self.cloth.is_valid()
    }

    pub fn num_lods(&self) -> usize {
        self.cloth.num_elements(groups::LODS)
    }

    /// Read-only facade over LOD `index`
    pub fn lod(&self, index: usize) -> LodFacade<&ClothCollection> {
        LodFacade::new(&*self.cloth, index)
    }

    pub fn has_weight_map(&self, name: &str) -> bool {
        self.cloth
            .has_user_defined_attribute::<f32>(name, groups::SIM_VERTICES_3D)
    }

    /// Names of every weight map, in sorted order
    pub fn weight_map_names(&self) -> Vec<String> {
        self.cloth
            .user_defined_attribute_names::<f32>(groups::SIM_VERTICES_3D)
    }
}

impl<C: DerefMut<Target = ClothCollection>> ClothFacade<C> {
    pub fn define_schema(&mut self) {
        self.cloth.define_schema();
    }

    /// Remove every LOD. Weight maps stay declared.
    pub fn reset(&mut self) {
        self.set_num_lods(0);
    }

    /// Append an empty LOD and return its index
    pub fn add_lod(&mut self) -> usize {
        let index = self.num_lods();
        self.set_num_lods(index + 1);
        index
    }

    pub fn lod_mut(&mut self, index: usize) -> LodFacade<&mut ClothCollection> {
        LodFacade::new(&mut *self.cloth, index)
    }

    /// Grow with empty LODs or shrink by resetting and removing trailing LODs
    pub fn set_num_lods(&mut self, num: usize) {
        assert!(self.is_valid(), "cloth schema is not defined");
        let old = self.num_lods();
        if num > old {
            self.cloth.collection.add_elements(num - old, groups::LODS);
        } else if num < old {
            for index in (num..old).rev() {
                self.lod_mut(index).reset();
            }
            self.cloth.collection.remove_elements(groups::LODS, old - num, num);
        }
    }

    /// Add a per-3D-vertex float attribute; `false` if the name is taken
    pub fn add_weight_map(&mut self, name: &str) -> bool {
        self.cloth
            .add_user_defined_attribute::<f32>(name, groups::SIM_VERTICES_3D)
    }

    pub fn remove_weight_map(&mut self, name: &str) -> bool {
        self.has_weight_map(name)
            && self
                .cloth
                .remove_user_defined_attribute(name, groups::SIM_VERTICES_3D)
    }

    /// Deep copy of another cloth, including its weight maps and config
    pub fn initialize_from<D: Deref<Target = ClothCollection>>(&mut self, other: &ClothFacade<D>) {
        self.reset();
        self.cloth.set_config(other.collection().config().clone());
        for name in other.weight_map_names() {
            self.add_weight_map(&name);
        }
        self.set_num_lods(other.num_lods());
        for index in 0..other.num_lods() {
            self.lod_mut(index).initialize_from(&other.lod(index));
        }
        debug!("initialize_from: copied {} LODs", other.num_lods());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_remove_lods() {
        let mut cloth = ClothCollection::new();
        let mut facade = cloth.facade_mut();
        assert_eq!(facade.add_lod(), 0);
        assert_eq!(facade.add_lod(), 1);
        facade.lod_mut(1).add_pattern();
        facade.set_num_lods(1);
        assert_eq!(facade.num_lods(), 1);
        assert_eq!(cloth.num_elements(groups::PATTERNS), 0);
    }

    #[test]
    fn test_weight_maps() {
        let mut cloth = ClothCollection::new();
        let mut facade = cloth.facade_mut();
        assert!(facade.add_weight_map("MaxDistance"));
        assert!(facade.add_weight_map("BackstopRadius"));
        assert!(facade.has_weight_map("MaxDistance"));
        assert_eq!(
            facade.weight_map_names(),
            vec!["BackstopRadius".to_string(), "MaxDistance".to_string()]
        );
        assert!(facade.remove_weight_map("MaxDistance"));
        assert!(!facade.remove_weight_map("MaxDistance"));
        assert!(!facade.has_weight_map("MaxDistance"));
    }

    #[test]
    fn test_reset_keeps_schema_valid() {
        let mut cloth = ClothCollection::new();
        let mut facade = cloth.facade_mut();
        facade.add_lod();
        facade.lod_mut(0).add_seam();
        facade.reset();
        assert!(facade.is_valid());
        assert_eq!(cloth.num_elements(groups::LODS), 0);
        assert_eq!(cloth.num_elements(groups::SEAMS), 0);
    }
}
