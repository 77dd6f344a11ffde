//! Range-offset accessors.
//!
//! A parent group describes each of its rows' children with a pair of
//! `Start`/`End` columns (inclusive). Either both are [`INDEX_NONE`] (empty
//! range) or both are valid with `Start <= End`. Sibling ranges are ordered
//! like their parents and packed, so a new sub-range is always inserted right
//! after the nearest non-empty range before it.

use cloth_config::INDEX_NONE;

use crate::store::AttributeCollection;

/// Number of elements in the range of parent row `index`
pub fn num_elements(start: &[i32], end: &[i32], index: usize) -> usize {
    if end[index] == INDEX_NONE {
        0
    } else {
        debug_assert!(start[index] != INDEX_NONE && start[index] <= end[index]);
        (end[index] - start[index] + 1) as usize
    }
}

/// Sub-slice of `data` covered by the range of parent row `index`
pub fn elements<'a, T>(data: &'a [T], start: &[i32], end: &[i32], index: usize) -> &'a [T] {
    match range(start[index], end[index]) {
        Some((first, last)) => &data[first..=last],
        None => &[],
    }
}

/// Mutable sub-slice of `data` covered by the range of parent row `index`
pub fn elements_mut<'a, T>(
    data: &'a mut [T],
    start: &[i32],
    end: &[i32],
    index: usize,
) -> &'a mut [T] {
    match range(start[index], end[index]) {
        Some((first, last)) => &mut data[first..=last],
        None => &mut [],
    }
}

/// Offset of row `index`'s first element relative to row `base_index`'s first
/// element
pub fn elements_offset(start: &[i32], base_index: usize, index: usize) -> i32 {
    debug_assert!(start[index] != INDEX_NONE && start[base_index] != INDEX_NONE);
    start[index] - start[base_index]
}

/// Convert a `(start, end)` pair to an inclusive `usize` range
pub fn range(start: i32, end: i32) -> Option<(usize, usize)> {
    if start == INDEX_NONE || end == INDEX_NONE {
        debug_assert_eq!(start, end, "range pair must be empty on both ends");
        None
    } else {
        debug_assert!(start <= end);
        Some((start as usize, end as usize))
    }
}

/// Position at which elements for an empty parent row `index` are inserted:
/// one past the nearest non-empty range before it, or 0.
pub fn insertion_position(end: &[i32], index: usize) -> usize {
    end[..index]
        .iter()
        .rev()
        .find(|&&e| e != INDEX_NONE)
        .map_or(0, |&e| e as usize + 1)
}

/// Min start and max end over the non-empty child ranges of parent row
/// `parent_index`.
///
/// Returns `(INDEX_NONE, INDEX_NONE)` when the parent has no children or every
/// child range is empty.
pub fn sub_elements_start_end(
    parent_start: &[i32],
    parent_end: &[i32],
    parent_index: usize,
    child_start: &[i32],
    child_end: &[i32],
) -> (i32, i32) {
    let Some((first, last)) = range(parent_start[parent_index], parent_end[parent_index]) else {
        return (INDEX_NONE, INDEX_NONE);
    };
    let mut start = INDEX_NONE;
    let mut end = INDEX_NONE;
    for child in first..=last {
        if child_end[child] == INDEX_NONE {
            continue;
        }
        if start == INDEX_NONE || child_start[child] < start {
            start = child_start[child];
        }
        if end == INDEX_NONE || child_end[child] > end {
            end = child_end[child];
        }
    }
    (start, end)
}

/// Column names describing one parent-to-child range relationship
#[derive(Debug, Clone, Copy)]
pub struct RangeColumns {
    /// Group whose rows own the ranges
    pub parent_group: &'static str,
    /// Group the ranges index into
    pub child_group: &'static str,
    pub start: &'static str,
    pub end: &'static str,
}

impl RangeColumns {
    /// Read the `(start, end)` pair of parent row `index`
    pub fn get(&self, collection: &AttributeCollection, index: usize) -> (i32, i32) {
        let (start, end) = self.columns(collection);
        (start[index], end[index])
    }

    /// Write the `(start, end)` pair of parent row `index`
    pub fn set(&self, collection: &mut AttributeCollection, index: usize, start: i32, end: i32) {
        debug_assert_eq!(start == INDEX_NONE, end == INDEX_NONE);
        self.column_mut(collection, self.start)[index] = start;
        self.column_mut(collection, self.end)[index] = end;
    }

    /// Both columns, panicking if the schema is missing them
    pub fn columns<'a>(&self, collection: &'a AttributeCollection) -> (&'a [i32], &'a [i32]) {
        let start = collection.find_attribute::<i32>(self.start, self.parent_group);
        let end = collection.find_attribute::<i32>(self.end, self.parent_group);
        match (start, end) {
            (Some(start), Some(end)) => (start, end),
            _ => panic!(
                "missing range columns {}/{}..{}",
                self.parent_group, self.start, self.end
            ),
        }
    }

    fn column_mut<'a>(&self, collection: &'a mut AttributeCollection, name: &str) -> &'a mut [i32] {
        match collection.find_attribute_mut::<i32>(name, self.parent_group) {
            Some(column) => column,
            None => panic!("missing range column {}/{name}", self.parent_group),
        }
    }

    /// Number of children of parent row `index`
    pub fn num_elements(&self, collection: &AttributeCollection, index: usize) -> usize {
        let (start, end) = self.columns(collection);
        num_elements(start, end, index)
    }
}

/// Where a resize of one range happens in the child group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeEdit {
    Unchanged,
    /// `count` rows inserted at child row `position`
    Inserted { position: usize, count: usize },
    /// `count` rows removed starting at child row `position`
    Removed { position: usize, count: usize },
}

/// Plan a resize of parent row `index` to `num` children without applying it
pub fn plan_set_num_elements(
    collection: &AttributeCollection,
    columns: &RangeColumns,
    num: usize,
    index: usize,
) -> RangeEdit {
    let (start, end) = columns.columns(collection);
    let old = num_elements(start, end, index);
    if num > old {
        let position = if end[index] == INDEX_NONE {
            insertion_position(end, index)
        } else {
            end[index] as usize + 1
        };
        RangeEdit::Inserted {
            position,
            count: num - old,
        }
    } else if num < old {
        RangeEdit::Removed {
            position: start[index] as usize + num,
            count: old - num,
        }
    } else {
        RangeEdit::Unchanged
    }
}

/// Grow or shrink the range of parent row `index` to `num` children.
///
/// Growth inserts at the end of the range (or at [`insertion_position`] for
/// an empty range); shrinking removes from the tail; a range shrunk to zero
/// becomes `(INDEX_NONE, INDEX_NONE)`. Returns the range start.
pub fn set_num_elements(
    collection: &mut AttributeCollection,
    columns: &RangeColumns,
    num: usize,
    index: usize,
) -> i32 {
    let (start, _) = columns.get(collection, index);
    match plan_set_num_elements(collection, columns, num, index) {
        RangeEdit::Unchanged => start,
        RangeEdit::Inserted { position, count } => {
            collection.insert_elements(count, position, columns.child_group);
            let new_start = if start == INDEX_NONE {
                position as i32
            } else {
                start
            };
            columns.set(collection, index, new_start, new_start + num as i32 - 1);
            new_start
        }
        RangeEdit::Removed { position, count } => {
            collection.remove_elements(columns.child_group, count, position);
            if num == 0 {
                columns.set(collection, index, INDEX_NONE, INDEX_NONE);
                INDEX_NONE
            } else {
                columns.set(collection, index, start, start + num as i32 - 1);
                start
            }
        }
    }
}
