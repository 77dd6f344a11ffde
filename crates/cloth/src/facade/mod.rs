//! Scoped views over a [`ClothCollection`].
//!
//! Every facade is generic over its handle: `XFacade<&ClothCollection>` reads,
//! `XFacade<&mut ClothCollection>` (aliased `XFacadeMut`) also writes. A facade
//! borrows the collection and stores only indices, so it cannot outlive it.

mod cloth;
mod lod;
mod pattern;
mod seam;
mod tether_batch;

pub use cloth::{ClothFacade, ClothFacadeMut};
pub use lod::{LodFacade, LodFacadeMut};
pub use pattern::{PatternFacade, PatternFacadeMut, RenderVertex};
pub use seam::{SeamFacade, SeamFacadeMut};
pub use tether_batch::{Tether, TetherBatchFacade, TetherBatchFacadeMut};

use crate::references::lod_rows;
use crate::schema::ClothCollection;
use crate::store::AttributeType;

impl ClothCollection {
    /// Read-only cloth facade
    pub fn facade(&self) -> ClothFacade<&ClothCollection> {
        ClothFacade::new(self)
    }

    /// Read/write cloth facade
    pub fn facade_mut(&mut self) -> ClothFacadeMut<'_> {
        ClothFacade::new(self)
    }
}

/// Rows of one attribute owned by LOD `lod`
pub(crate) fn lod_slice<'a, T: AttributeType>(
    cloth: &'a ClothCollection,
    lod: usize,
    group: &str,
    name: &str,
) -> &'a [T] {
    match lod_rows(cloth, lod, group) {
        Some((first, last)) => &cloth.column::<T>(group, name)[first..=last],
        None => &[],
    }
}

pub(crate) fn lod_slice_mut<'a, T: AttributeType>(
    cloth: &'a mut ClothCollection,
    lod: usize,
    group: &str,
    name: &str,
) -> &'a mut [T] {
    match lod_rows(cloth, lod, group) {
        Some((first, last)) => &mut cloth.column_mut::<T>(group, name)[first..=last],
        None => &mut [],
    }
}
