//! Typed column storage for the attribute collection.
//!
//! The attribute type set is closed, so every column is one variant of
//! [`AttributeValues`] and typed access goes through [`AttributeType`].

use cloth_config::INDEX_NONE;
use glam::{IVec2, IVec3, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Element type of an attribute column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Bool,
    Int,
    Float,
    String,
    Vec2,
    Vec3,
    /// Linear RGBA color
    Vec4,
    IVec2,
    IVec3,
    IntArray,
    FloatArray,
    Vec2Array,
}

impl AttributeKind {
    /// Whether values of this kind can hold row indices into another group
    pub fn supports_dependency(self) -> bool {
        matches!(
            self,
            Self::Int | Self::IVec2 | Self::IVec3 | Self::IntArray
        )
    }
}

/// One attribute column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValues {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<String>),
    Vec2(Vec<Vec2>),
    Vec3(Vec<Vec3>),
    Vec4(Vec<Vec4>),
    IVec2(Vec<IVec2>),
    IVec3(Vec<IVec3>),
    IntArray(Vec<Vec<i32>>),
    FloatArray(Vec<Vec<f32>>),
    Vec2Array(Vec<Vec<Vec2>>),
}

/// Run `$body` with `$values` bound to the inner `Vec` of any variant
macro_rules! with_values {
    ($self:expr, $values:ident => $body:expr) => {
        match $self {
            AttributeValues::Bool($values) => $body,
            AttributeValues::Int($values) => $body,
            AttributeValues::Float($values) => $body,
            AttributeValues::String($values) => $body,
            AttributeValues::Vec2($values) => $body,
            AttributeValues::Vec3($values) => $body,
            AttributeValues::Vec4($values) => $body,
            AttributeValues::IVec2($values) => $body,
            AttributeValues::IVec3($values) => $body,
            AttributeValues::IntArray($values) => $body,
            AttributeValues::FloatArray($values) => $body,
            AttributeValues::Vec2Array($values) => $body,
        }
    };
}

impl AttributeValues {
    /// Create a default-filled column of the given kind
    pub fn new(kind: AttributeKind, len: usize) -> Self {
        match kind {
            AttributeKind::Bool => Self::Bool(vec![false; len]),
            AttributeKind::Int => Self::Int(vec![0; len]),
            AttributeKind::Float => Self::Float(vec![0.0; len]),
            AttributeKind::String => Self::String(vec![String::new(); len]),
            AttributeKind::Vec2 => Self::Vec2(vec![Vec2::ZERO; len]),
            AttributeKind::Vec3 => Self::Vec3(vec![Vec3::ZERO; len]),
            AttributeKind::Vec4 => Self::Vec4(vec![Vec4::ZERO; len]),
            AttributeKind::IVec2 => Self::IVec2(vec![IVec2::ZERO; len]),
            AttributeKind::IVec3 => Self::IVec3(vec![IVec3::ZERO; len]),
            AttributeKind::IntArray => Self::IntArray(vec![Vec::new(); len]),
            AttributeKind::FloatArray => Self::FloatArray(vec![Vec::new(); len]),
            AttributeKind::Vec2Array => Self::Vec2Array(vec![Vec::new(); len]),
        }
    }

    /// Element type of this column
    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Bool(_) => AttributeKind::Bool,
            Self::Int(_) => AttributeKind::Int,
            Self::Float(_) => AttributeKind::Float,
            Self::String(_) => AttributeKind::String,
            Self::Vec2(_) => AttributeKind::Vec2,
            Self::Vec3(_) => AttributeKind::Vec3,
            Self::Vec4(_) => AttributeKind::Vec4,
            Self::IVec2(_) => AttributeKind::IVec2,
            Self::IVec3(_) => AttributeKind::IVec3,
            Self::IntArray(_) => AttributeKind::IntArray,
            Self::FloatArray(_) => AttributeKind::FloatArray,
            Self::Vec2Array(_) => AttributeKind::Vec2Array,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        with_values!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert `count` default rows at `position`.
    ///
    /// Index columns (`index_none == true`) are filled with [`INDEX_NONE`]
    /// instead of zero so that fresh rows never point at a real element.
    pub(crate) fn insert_default(&mut self, position: usize, count: usize, index_none: bool) {
        match self {
            Self::Int(values) if index_none => {
                values.splice(position..position, std::iter::repeat_n(INDEX_NONE, count));
            }
            Self::IVec2(values) if index_none => {
                values.splice(
                    position..position,
                    std::iter::repeat_n(IVec2::splat(INDEX_NONE), count),
                );
            }
            Self::IVec3(values) if index_none => {
                values.splice(
                    position..position,
                    std::iter::repeat_n(IVec3::splat(INDEX_NONE), count),
                );
            }
            _ => with_values!(self, values => {
                values.splice(
                    position..position,
                    std::iter::repeat_with(Default::default).take(count),
                );
            }),
        }
    }

    /// Remove `count` rows starting at `position`
    pub(crate) fn remove_range(&mut self, position: usize, count: usize) {
        with_values!(self, values => {
            values.drain(position..position + count);
        })
    }

    /// Remove the rows listed in `sorted_rows` (ascending, unique)
    pub(crate) fn remove_sorted(&mut self, sorted_rows: &[usize]) {
        with_values!(self, values => retain_unlisted(values, sorted_rows))
    }

    /// Overwrite `count` rows starting at `first` with rows of `source`
    /// starting at `source_first`. Both columns must have the same kind.
    pub(crate) fn copy_rows_from(
        &mut self,
        source: &AttributeValues,
        source_first: usize,
        first: usize,
        count: usize,
    ) {
        macro_rules! copy_rows {
            ($($variant:ident),*) => {
                match (self, source) {
                    $(
                        (Self::$variant(values), Self::$variant(source_values)) => values
                            [first..first + count]
                            .clone_from_slice(&source_values[source_first..source_first + count]),
                    )*
                    (values, source_values) => panic!(
                        "cannot copy {:?} rows into a {:?} column",
                        source_values.kind(),
                        values.kind()
                    ),
                }
            };
        }
        copy_rows!(
            Bool, Int, Float, String, Vec2, Vec3, Vec4, IVec2, IVec3, IntArray, FloatArray,
            Vec2Array
        )
    }

    /// Apply `remap` to every valid index stored in this column.
    ///
    /// [`INDEX_NONE`] entries are left untouched. Columns that cannot hold
    /// indices are ignored.
    pub(crate) fn remap_indices(&mut self, remap: impl Fn(i32) -> i32) {
        let apply = |value: &mut i32| {
            if *value != INDEX_NONE {
                *value = remap(*value);
            }
        };
        match self {
            Self::Int(values) => values.iter_mut().for_each(apply),
            Self::IVec2(values) => values
                .iter_mut()
                .for_each(|v| v.as_mut().iter_mut().for_each(apply)),
            Self::IVec3(values) => values
                .iter_mut()
                .for_each(|v| v.as_mut().iter_mut().for_each(apply)),
            Self::IntArray(values) => values
                .iter_mut()
                .for_each(|list| list.iter_mut().for_each(apply)),
            _ => {}
        }
    }
}

/// Remove the elements whose positions are listed (ascending, unique)
pub(crate) fn retain_unlisted<T>(values: &mut Vec<T>, sorted_rows: &[usize]) {
    let mut index = 0;
    let mut cursor = 0;
    values.retain(|_| {
        let remove = cursor < sorted_rows.len() && sorted_rows[cursor] == index;
        if remove {
            cursor += 1;
        }
        index += 1;
        !remove
    });
}

/// A Rust type that can be stored as an attribute column
pub trait AttributeType: Clone + Default + 'static {
    const KIND: AttributeKind;

    fn values(values: &AttributeValues) -> Option<&Vec<Self>>;

    fn values_mut(values: &mut AttributeValues) -> Option<&mut Vec<Self>>;
}

macro_rules! impl_attribute_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl AttributeType for $ty {
                const KIND: AttributeKind = AttributeKind::$variant;

                fn values(values: &AttributeValues) -> Option<&Vec<Self>> {
                    match values {
                        AttributeValues::$variant(values) => Some(values),
                        _ => None,
                    }
                }

                fn values_mut(values: &mut AttributeValues) -> Option<&mut Vec<Self>> {
                    match values {
                        AttributeValues::$variant(values) => Some(values),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_attribute_type! {
    bool => Bool,
    i32 => Int,
    f32 => Float,
    String => String,
    Vec2 => Vec2,
    Vec3 => Vec3,
    Vec4 => Vec4,
    IVec2 => IVec2,
    IVec3 => IVec3,
    Vec<i32> => IntArray,
    Vec<f32> => FloatArray,
    Vec<Vec2> => Vec2Array,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_default_index_none() {
        let mut values = AttributeValues::Int(vec![1, 2, 3]);
        values.insert_default(1, 2, true);
        assert_eq!(values, AttributeValues::Int(vec![1, -1, -1, 2, 3]));

        let mut values = AttributeValues::Int(vec![1, 2]);
        values.insert_default(2, 1, false);
        assert_eq!(values, AttributeValues::Int(vec![1, 2, 0]));
    }

    #[test]
    fn test_remove_sorted() {
        let mut values = AttributeValues::Float(vec![0.0, 1.0, 2.0, 3.0, 4.0]);
        values.remove_sorted(&[0, 2, 4]);
        assert_eq!(values, AttributeValues::Float(vec![1.0, 3.0]));
    }

    #[test]
    fn test_remap_skips_index_none() {
        let mut values = AttributeValues::IVec3(vec![IVec3::new(0, -1, 2)]);
        values.remap_indices(|i| i + 10);
        assert_eq!(values, AttributeValues::IVec3(vec![IVec3::new(10, -1, 12)]));

        let mut values = AttributeValues::Float(vec![1.0]);
        values.remap_indices(|i| i + 10);
        assert_eq!(values, AttributeValues::Float(vec![1.0]));
    }

    #[test]
    fn test_copy_rows_from() {
        let source = AttributeValues::IntArray(vec![vec![1], vec![2, 3], vec![4]]);
        let mut values = AttributeValues::new(AttributeKind::IntArray, 4);
        values.copy_rows_from(&source, 1, 2, 2);
        assert_eq!(
            values,
            AttributeValues::IntArray(vec![vec![], vec![], vec![2, 3], vec![4]])
        );
    }

    #[test]
    fn test_typed_access_checks_kind() {
        let values = AttributeValues::new(AttributeKind::IntArray, 2);
        assert!(<Vec<i32>>::values(&values).is_some());
        assert!(<i32>::values(&values).is_none());
        assert_eq!(values.kind(), AttributeKind::IntArray);
    }
}
