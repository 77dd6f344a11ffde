//! LOD-relative cross-references.
//!
//! Apart from the range pairs, every index column of the cloth collection
//! stores indices relative to the first row its LOD owns in the target group
//! (face indices, 2D/3D lookups, stitches, tethers). The store cannot renumber
//! those, so every structural edit inside an LOD goes through this module,
//! which rewrites the references of that LOD before rows move.

use cloth_config::INDEX_NONE;
use glam::{IVec2, IVec3};
use tracing::trace;

use crate::ranges::{self, RangeColumns, RangeEdit};
use crate::schema::{attributes as attr, groups, ranges as schema_ranges, ClothCollection};
use crate::store::AttributeKind;

/// One LOD-relative reference column
#[derive(Debug, Clone, Copy)]
pub struct LodReference {
    /// Group holding the column
    pub owner: &'static str,
    pub attribute: &'static str,
    /// Group the values index into
    pub target: &'static str,
    /// Float list kept parallel to an index list
    pub paired: Option<&'static str>,
}

const fn reference(
    owner: &'static str,
    attribute: &'static str,
    target: &'static str,
) -> LodReference {
    LodReference {
        owner,
        attribute,
        target,
        paired: None,
    }
}

/// Every LOD-relative reference column of the schema
pub const LOD_REFERENCES: &[LodReference] = &[
    reference(groups::SEAMS, attr::SEAM_PATTERNS, groups::PATTERNS),
    reference(groups::SEAM_STITCHES, attr::SEAM_STITCH_2D_END_INDICES, groups::SIM_VERTICES_2D),
    reference(groups::SEAM_STITCHES, attr::SEAM_STITCH_3D_INDEX, groups::SIM_VERTICES_3D),
    reference(groups::TETHERS, attr::TETHER_KINEMATIC_INDEX, groups::SIM_VERTICES_3D),
    reference(groups::TETHERS, attr::TETHER_DYNAMIC_INDEX, groups::SIM_VERTICES_3D),
    reference(groups::SIM_VERTICES_2D, attr::SIM_VERTEX_3D_LOOKUP, groups::SIM_VERTICES_3D),
    LodReference {
        owner: groups::SIM_VERTICES_3D,
        attribute: attr::TETHER_KINEMATIC_INDEX,
        target: groups::SIM_VERTICES_3D,
        paired: Some(attr::TETHER_REFERENCE_LENGTH),
    },
    reference(groups::SIM_VERTICES_3D, attr::SIM_VERTEX_2D_LOOKUP, groups::SIM_VERTICES_2D),
    reference(groups::SIM_VERTICES_3D, attr::SEAM_STITCH_LOOKUP, groups::SEAM_STITCHES),
    reference(groups::SIM_FACES, attr::SIM_INDICES_2D, groups::SIM_VERTICES_2D),
    reference(groups::SIM_FACES, attr::SIM_INDICES_3D, groups::SIM_VERTICES_3D),
    reference(groups::RENDER_FACES, attr::RENDER_INDICES, groups::RENDER_VERTICES),
    reference(groups::RENDER_FACES, attr::RENDER_MATERIAL_INDEX, groups::MATERIALS),
];

/// How the rows of `group` are reached from an LOD row: the LOD-level range,
/// and for nested groups the per-parent range below it
fn lod_scope(group: &str) -> (RangeColumns, Option<RangeColumns>) {
    use schema_ranges::*;
    match group {
        groups::PATTERNS => (LOD_PATTERNS, None),
        groups::SEAMS => (LOD_SEAMS, None),
        groups::TETHER_BATCHES => (LOD_TETHER_BATCHES, None),
        groups::MATERIALS => (LOD_MATERIALS, None),
        groups::SIM_VERTICES_3D => (LOD_SIM_VERTICES_3D, None),
        groups::SIM_VERTICES_2D => (LOD_PATTERNS, Some(PATTERN_SIM_VERTICES_2D)),
        groups::SIM_FACES => (LOD_PATTERNS, Some(PATTERN_SIM_FACES)),
        groups::RENDER_VERTICES => (LOD_PATTERNS, Some(PATTERN_RENDER_VERTICES)),
        groups::RENDER_FACES => (LOD_PATTERNS, Some(PATTERN_RENDER_FACES)),
        groups::SEAM_STITCHES => (LOD_SEAMS, Some(SEAM_STITCHES)),
        groups::TETHERS => (LOD_TETHER_BATCHES, Some(TETHER_BATCH_TETHERS)),
        _ => panic!("group {group} is not owned by an LOD"),
    }
}

/// Absolute inclusive row range that LOD `lod` owns in `group`, if any
pub(crate) fn lod_rows(cloth: &ClothCollection, lod: usize, group: &str) -> Option<(usize, usize)> {
    let (lod_level, nested) = lod_scope(group);
    let (start, end) = lod_level.columns(&cloth.collection);
    match nested {
        None => ranges::range(start[lod], end[lod]),
        Some(nested) => {
            let (child_start, child_end) = nested.columns(&cloth.collection);
            let (first, last) =
                ranges::sub_elements_start_end(start, end, lod, child_start, child_end);
            ranges::range(first, last)
        }
    }
}

/// Number of rows LOD `lod` owns in `group`
pub(crate) fn lod_num_elements(cloth: &ClothCollection, lod: usize, group: &str) -> usize {
    lod_rows(cloth, lod, group).map_or(0, |(first, last)| last - first + 1)
}

fn remap_value(value: &mut i32, remap: &impl Fn(i32) -> i32) {
    if *value != INDEX_NONE {
        *value = remap(*value);
    }
}

/// Rewrite every reference of LOD `lod` that points into `target`.
///
/// `remap` receives LOD-relative indices and may return [`INDEX_NONE`]; index
/// lists drop such entries together with the matching entries of their
/// paired list.
pub(crate) fn remap_lod_references(
    cloth: &mut ClothCollection,
    lod: usize,
    target: &str,
    remap: impl Fn(i32) -> i32,
) {
    for reference in LOD_REFERENCES.iter().filter(|r| r.target == target) {
        let Some((first, last)) = lod_rows(cloth, lod, reference.owner) else {
            continue;
        };
        remap_rows(cloth, reference, first..last + 1, &remap);
    }
}

fn remap_rows(
    cloth: &mut ClothCollection,
    reference: &LodReference,
    rows: std::ops::Range<usize>,
    remap: &impl Fn(i32) -> i32,
) {
    let (owner, name) = (reference.owner, reference.attribute);
    match cloth.collection.attribute_kind(name, owner) {
        Some(AttributeKind::Int) => {
            for value in &mut cloth.column_mut::<i32>(owner, name)[rows] {
                remap_value(value, remap);
            }
        }
        Some(AttributeKind::IVec2) => {
            for value in &mut cloth.column_mut::<IVec2>(owner, name)[rows] {
                value.as_mut().iter_mut().for_each(|v| remap_value(v, remap));
            }
        }
        Some(AttributeKind::IVec3) => {
            for value in &mut cloth.column_mut::<IVec3>(owner, name)[rows] {
                value.as_mut().iter_mut().for_each(|v| remap_value(v, remap));
            }
        }
        Some(AttributeKind::IntArray) => {
            let start = rows.start;
            let mut dropped: Vec<(usize, Vec<bool>)> = Vec::new();
            for (row, list) in cloth.column_mut::<Vec<i32>>(owner, name)[rows]
                .iter_mut()
                .enumerate()
            {
                list.iter_mut().for_each(|v| remap_value(v, remap));
                if list.contains(&INDEX_NONE) {
                    dropped.push((start + row, list.iter().map(|&v| v != INDEX_NONE).collect()));
                    list.retain(|&v| v != INDEX_NONE);
                }
            }
            if let Some(paired) = reference.paired {
                let paired_column = cloth.column_mut::<Vec<f32>>(owner, paired);
                for (row, keep) in dropped {
                    let mut keep = keep.into_iter();
                    paired_column[row].retain(|_| keep.next().unwrap_or(false));
                }
            }
        }
        kind => panic!("{owner}/{name} is not an index column ({kind:?})"),
    }
}

/// Reset the reference columns of freshly inserted rows of `group`
fn reset_new_rows(cloth: &mut ClothCollection, group: &str, position: usize, count: usize) {
    let rows = position..position + count;
    for reference in LOD_REFERENCES.iter().filter(|r| r.owner == group) {
        let name = reference.attribute;
        match cloth.collection.attribute_kind(name, group) {
            Some(AttributeKind::Int) => {
                cloth.column_mut::<i32>(group, name)[rows.clone()].fill(INDEX_NONE);
            }
            Some(AttributeKind::IVec2) => {
                cloth.column_mut::<IVec2>(group, name)[rows.clone()]
                    .fill(IVec2::splat(INDEX_NONE));
            }
            Some(AttributeKind::IVec3) => {
                cloth.column_mut::<IVec3>(group, name)[rows.clone()]
                    .fill(IVec3::splat(INDEX_NONE));
            }
            _ => {}
        }
    }
}

/// LOD-relative shift for `count` rows inserted at `offset`
pub(crate) fn shift_for_insert(offset: i32, count: i32) -> impl Fn(i32) -> i32 {
    move |index| if index >= offset { index + count } else { index }
}

/// LOD-relative compaction for `count` rows removed at `offset`
pub(crate) fn compact_for_remove(offset: i32, count: i32) -> impl Fn(i32) -> i32 {
    move |index| {
        if index < offset {
            index
        } else if index < offset + count {
            INDEX_NONE
        } else {
            index - count
        }
    }
}

/// Resize the `columns` range of parent row `parent_row` (absolute) inside
/// LOD `lod`, keeping every LOD-relative reference to the child group valid.
///
/// Returns the range start, as [`ranges::set_num_elements`] does.
pub(crate) fn set_num_lod_elements(
    cloth: &mut ClothCollection,
    lod: usize,
    columns: &RangeColumns,
    parent_row: usize,
    num: usize,
) -> i32 {
    let child = columns.child_group;
    let edit = ranges::plan_set_num_elements(&cloth.collection, columns, num, parent_row);
    match edit {
        RangeEdit::Unchanged => {}
        RangeEdit::Inserted { position, count } => {
            if let Some((base, _)) = lod_rows(cloth, lod, child) {
                debug_assert!(position >= base);
                let offset = (position - base) as i32;
                remap_lod_references(cloth, lod, child, shift_for_insert(offset, count as i32));
            }
        }
        RangeEdit::Removed { position, count } => {
            let base = lod_rows(cloth, lod, child).map_or(position, |(base, _)| base);
            let offset = (position - base) as i32;
            remap_lod_references(cloth, lod, child, compact_for_remove(offset, count as i32));
        }
    }

    let start = ranges::set_num_elements(&mut cloth.collection, columns, num, parent_row);
    if let RangeEdit::Inserted { position, count } = edit {
        reset_new_rows(cloth, child, position, count);
    }
    trace!("set_num_lod_elements: lod {lod} {child} row {parent_row} -> {num}");
    start
}

/// Append `count` 3D vertices to LOD `lod`; returns the LOD-relative index of
/// the first one
pub(crate) fn add_sim_vertices_3d(cloth: &mut ClothCollection, lod: usize, count: usize) -> usize {
    let first = lod_num_elements(cloth, lod, groups::SIM_VERTICES_3D);
    set_num_lod_elements(cloth, lod, &schema_ranges::LOD_SIM_VERTICES_3D, lod, first + count);
    first
}

/// Remove the listed 3D vertices (LOD-relative, ascending) from LOD `lod`.
///
/// Every reference is compacted first; references to removed vertices become
/// [`INDEX_NONE`] or are dropped from their list.
pub(crate) fn remove_sim_vertices_3d(cloth: &mut ClothCollection, lod: usize, sorted_rows: &[usize]) {
    if sorted_rows.is_empty() {
        return;
    }
    let columns = schema_ranges::LOD_SIM_VERTICES_3D;
    let (start, end) = columns.get(&cloth.collection, lod);
    let Some((first, last)) = ranges::range(start, end) else {
        panic!("LOD {lod} has no 3D vertices to remove");
    };
    debug_assert!(sorted_rows.windows(2).all(|w| w[0] < w[1]));
    assert!(
        sorted_rows.last().is_some_and(|&row| first + row <= last),
        "3D vertex removal out of range for LOD {lod}"
    );

    remap_lod_references(cloth, lod, groups::SIM_VERTICES_3D, |index| {
        let below = sorted_rows.partition_point(|&row| (row as i32) < index);
        if sorted_rows.get(below).is_some_and(|&row| row as i32 == index) {
            INDEX_NONE
        } else {
            index - below as i32
        }
    });

    let absolute: Vec<usize> = sorted_rows.iter().map(|&row| first + row).collect();
    cloth
        .collection
        .remove_sorted_elements(groups::SIM_VERTICES_3D, &absolute);

    let remaining = last + 1 - first - sorted_rows.len();
    if remaining == 0 {
        columns.set(&mut cloth.collection, lod, INDEX_NONE, INDEX_NONE);
    } else {
        let first = first as i32;
        columns.set(&mut cloth.collection, lod, first, first + remaining as i32 - 1);
    }
    trace!("remove_sim_vertices_3d: lod {lod} removed {}", sorted_rows.len());
}

/// First value of LOD `lod` that is neither [`INDEX_NONE`] nor a row the LOD
/// owns in the reference's target group, as `(reference, absolute row, value)`
pub(crate) fn find_dangling_reference(
    cloth: &ClothCollection,
    lod: usize,
) -> Option<(LodReference, usize, i32)> {
    for reference in LOD_REFERENCES {
        let Some((first, last)) = lod_rows(cloth, lod, reference.owner) else {
            continue;
        };
        let len = lod_num_elements(cloth, lod, reference.target) as i32;
        let (owner, name) = (reference.owner, reference.attribute);
        let rows = first..last + 1;
        let mut values: Box<dyn Iterator<Item = (usize, i32)> + '_> =
            match cloth.collection.attribute_kind(name, owner) {
                Some(AttributeKind::Int) => Box::new(
                    cloth.column::<i32>(owner, name)[rows]
                        .iter()
                        .enumerate()
                        .map(|(row, &value)| (row, value)),
                ),
                Some(AttributeKind::IVec2) => Box::new(
                    cloth.column::<IVec2>(owner, name)[rows]
                        .iter()
                        .enumerate()
                        .flat_map(|(row, value)| value.to_array().map(|value| (row, value))),
                ),
                Some(AttributeKind::IVec3) => Box::new(
                    cloth.column::<IVec3>(owner, name)[rows]
                        .iter()
                        .enumerate()
                        .flat_map(|(row, value)| value.to_array().map(|value| (row, value))),
                ),
                Some(AttributeKind::IntArray) => Box::new(
                    cloth.column::<Vec<i32>>(owner, name)[rows]
                        .iter()
                        .enumerate()
                        .flat_map(|(row, list)| list.iter().map(move |&value| (row, value))),
                ),
                _ => continue,
            };
        if let Some((row, value)) =
            values.find(|&(_, value)| value != INDEX_NONE && !(0..len).contains(&value))
        {
            return Some((*reference, first + row, value));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_lods(num_lods: usize) -> ClothCollection {
        let mut cloth = ClothCollection::new();
        cloth.collection.add_elements(num_lods, groups::LODS);
        cloth
    }

    #[test]
    fn test_every_reference_column_is_in_schema() {
        for reference in LOD_REFERENCES {
            assert!(cloth_has(reference.owner, reference.attribute));
            if let Some(paired) = reference.paired {
                assert!(cloth_has(reference.owner, paired));
            }
            // Every owner and target must be reachable from an LOD row
            lod_scope(reference.owner);
            lod_scope(reference.target);
        }
    }

    #[test]
    fn test_find_dangling_reference() {
        let mut cloth = create_lods(2);
        add_sim_vertices_3d(&mut cloth, 0, 2);
        add_sim_vertices_3d(&mut cloth, 1, 3);
        assert!(find_dangling_reference(&cloth, 0).is_none());

        // Index 2 is a valid 3D vertex of LOD 1 but not of LOD 0
        let tethers = cloth.column_mut::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX);
        tethers[3] = vec![2];
        tethers[1] = vec![INDEX_NONE, 2];
        assert!(find_dangling_reference(&cloth, 1).is_none());
        let (reference, row, value) = find_dangling_reference(&cloth, 0).unwrap();
        assert_eq!(reference.attribute, attr::TETHER_KINEMATIC_INDEX);
        assert_eq!((row, value), (1, 2));
    }

    fn cloth_has(group: &str, name: &str) -> bool {
        ClothCollection::new().attributes().has_attribute(name, group)
    }

    #[test]
    fn test_lod_rows_follow_lod_ranges() {
        let mut cloth = create_lods(2);
        let columns = schema_ranges::LOD_SIM_VERTICES_3D;
        set_num_lod_elements(&mut cloth, 0, &columns, 0, 3);
        set_num_lod_elements(&mut cloth, 1, &columns, 1, 2);
        assert_eq!(lod_rows(&cloth, 0, groups::SIM_VERTICES_3D), Some((0, 2)));
        assert_eq!(lod_rows(&cloth, 1, groups::SIM_VERTICES_3D), Some((3, 4)));
        assert_eq!(lod_rows(&cloth, 1, groups::SIM_VERTICES_2D), None);
        assert_eq!(lod_num_elements(&cloth, 1, groups::SIM_VERTICES_3D), 2);
    }

    #[test]
    fn test_new_reference_rows_start_empty() {
        let mut cloth = create_lods(1);
        let columns = schema_ranges::LOD_SEAMS;
        set_num_lod_elements(&mut cloth, 0, &columns, 0, 2);
        let patterns = cloth.column::<IVec2>(groups::SEAMS, attr::SEAM_PATTERNS);
        assert_eq!(patterns, &[IVec2::splat(INDEX_NONE); 2]);
    }

    #[test]
    fn test_growth_shifts_lod_relative_references() {
        let mut cloth = create_lods(1);
        set_num_lod_elements(&mut cloth, 0, &schema_ranges::LOD_SIM_VERTICES_3D, 0, 3);
        cloth.column_mut::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)[0] = vec![1, 2];

        // Three vertices inserted at the end leave earlier references alone
        set_num_lod_elements(&mut cloth, 0, &schema_ranges::LOD_SIM_VERTICES_3D, 0, 6);
        let tethers = cloth.column::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX);
        assert_eq!(tethers[0], vec![1, 2]);
        assert!(tethers[3].is_empty());
    }

    #[test]
    fn test_remove_sim_vertices_3d_compacts_lists() {
        let mut cloth = create_lods(1);
        set_num_lod_elements(&mut cloth, 0, &schema_ranges::LOD_SIM_VERTICES_3D, 0, 4);
        cloth.column_mut::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)[0] = vec![1, 2, 3];
        cloth.column_mut::<Vec<f32>>(groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)[0] =
            vec![0.1, 0.2, 0.3];

        remove_sim_vertices_3d(&mut cloth, 0, &[2]);

        let indices = cloth.column::<Vec<i32>>(groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX);
        let lengths = cloth.column::<Vec<f32>>(groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH);
        assert_eq!(indices[0], vec![1, 2]);
        assert_eq!(lengths[0], vec![0.1, 0.3]);
        assert_eq!(lod_rows(&cloth, 0, groups::SIM_VERTICES_3D), Some((0, 2)));
    }

    #[test]
    fn test_remove_all_sim_vertices_3d_empties_range() {
        let mut cloth = create_lods(2);
        set_num_lod_elements(&mut cloth, 0, &schema_ranges::LOD_SIM_VERTICES_3D, 0, 2);
        set_num_lod_elements(&mut cloth, 1, &schema_ranges::LOD_SIM_VERTICES_3D, 1, 2);
        remove_sim_vertices_3d(&mut cloth, 0, &[0, 1]);
        assert_eq!(lod_rows(&cloth, 0, groups::SIM_VERTICES_3D), None);
        assert_eq!(lod_rows(&cloth, 1, groups::SIM_VERTICES_3D), Some((0, 1)));
    }
}
