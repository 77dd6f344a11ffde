//! Folding the attributes of welded 3D vertices into their representative.

use std::collections::BTreeMap;
use std::ops::{Add, Mul};

use cloth_config::INDEX_NONE;
use glam::Vec3;
use tracing::trace;

use crate::facade::{lod_slice, lod_slice_mut};
use crate::mesh::normalize_or_z;
use crate::schema::{attributes as attr, groups, ClothCollection};
use crate::store::AttributeType;

/// Welded groups keyed by representative, members with their weights
type Groups = BTreeMap<i32, Vec<(i32, f32)>>;

/// Sum duplicate bones, keep the `max` heaviest and normalize their weights.
///
/// Bones equal to `INDEX_NONE` and non-positive weights are dropped. Ties are
/// broken by bone index.
pub(crate) fn capped_bone_influences(
    influences: impl Iterator<Item = (i32, f32)>,
    max: usize,
) -> (Vec<i32>, Vec<f32>) {
    let mut accumulated: BTreeMap<i32, f32> = BTreeMap::new();
    for (bone, weight) in influences {
        if bone == INDEX_NONE || weight <= 0.0 {
            continue;
        }
        *accumulated.entry(bone).or_default() += weight;
    }
    let mut sorted: Vec<(i32, f32)> = accumulated.into_iter().collect();
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    sorted.truncate(max);

    let total: f32 = sorted.iter().map(|&(_, weight)| weight).sum();
    if total > 0.0 {
        sorted.iter_mut().for_each(|(_, weight)| *weight /= total);
    }
    sorted.into_iter().unzip()
}

/// Merge `(kinematic vertex, weight, reference length)` tethers.
///
/// Duplicates of one kinematic vertex are combined into a single tether whose
/// length is the weighted average. The `max` heaviest are kept (shorter wins a
/// tie) and returned sorted by length.
pub(crate) fn capped_tethers(
    tethers: impl Iterator<Item = (i32, f32, f32)>,
    max: usize,
) -> (Vec<i32>, Vec<f32>) {
    let mut accumulated: BTreeMap<i32, (f32, f32)> = BTreeMap::new();
    for (kinematic, weight, length) in tethers {
        if kinematic == INDEX_NONE {
            continue;
        }
        let entry = accumulated.entry(kinematic).or_default();
        entry.0 += weight;
        entry.1 += weight * length;
    }
    let mut sorted: Vec<(i32, f32, f32)> = accumulated
        .into_iter()
        .map(|(kinematic, (weight, weighted_length))| {
            let length = if weight > 0.0 { weighted_length / weight } else { 0.0 };
            (kinematic, weight, length)
        })
        .collect();
    sorted.sort_by(|a, b| {
        b.1.total_cmp(&a.1)
            .then(a.2.total_cmp(&b.2))
            .then(a.0.cmp(&b.0))
    });
    sorted.truncate(max);
    sorted.sort_by(|a, b| a.2.total_cmp(&b.2).then(a.0.cmp(&b.0)));
    sorted
        .into_iter()
        .map(|(kinematic, _, length)| (kinematic, length))
        .unzip()
}

fn weighted_average<T>(values: &mut [T], welded: &Groups)
where
    T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    for (&representative, members) in welded {
        let total: f32 = members.iter().map(|&(_, weight)| weight).sum();
        let mut members = members.iter();
        let Some(&(first, first_weight)) = members.next() else {
            continue;
        };
        let sum = members.fold(values[first as usize] * first_weight, |sum, &(vertex, weight)| {
            sum + values[vertex as usize] * weight
        });
        values[representative as usize] = sum * (1.0 / total);
    }
}

fn average_attribute<T>(cloth: &mut ClothCollection, lod: usize, name: &str, welded: &Groups)
where
    T: AttributeType + Copy + Add<Output = T> + Mul<f32, Output = T>,
{
    let values: &mut [T] = lod_slice_mut(cloth, lod, groups::SIM_VERTICES_3D, name);
    weighted_average(values, welded);
}

/// Fold every member's attributes into its representative.
///
/// Positions, float and vector user attributes are weighted averages,
/// normals the normalized weighted sum, skin weights the capped union, and
/// tethers are merged per kinematic vertex with targets already mapped
/// through `welding_map`. 2D and stitch lookups become the sorted union.
/// Boolean and integer user attributes keep the representative's value.
pub(crate) fn reconcile_groups(
    cloth: &mut ClothCollection,
    lod: usize,
    welded: &Groups,
    welding_map: &BTreeMap<i32, i32>,
) {
    average_attribute::<Vec3>(cloth, lod, attr::SIM_POSITION_3D, welded);
    for name in cloth.user_defined_attribute_names::<f32>(groups::SIM_VERTICES_3D) {
        average_attribute::<f32>(cloth, lod, &name, welded);
    }
    for name in cloth.user_defined_attribute_names::<Vec3>(groups::SIM_VERTICES_3D) {
        average_attribute::<Vec3>(cloth, lod, &name, welded);
    }

    {
        let normals: &mut [Vec3] = lod_slice_mut(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_NORMAL);
        for (&representative, members) in welded {
            let sum: Vec3 = members
                .iter()
                .map(|&(vertex, weight)| normals[vertex as usize] * weight)
                .sum();
            normals[representative as usize] = normalize_or_z(sum);
        }
    }

    let max_bones = cloth.config().max_bone_influences;
    let max_tethers = cloth.config().max_tether_attachments;
    for (&representative, members) in welded {
        let total: f32 = members.iter().map(|&(_, weight)| weight).sum();
        let row = representative as usize;

        let (bones, weights) = {
            let indices: &[Vec<i32>] =
                lod_slice(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_BONE_INDICES);
            let bone_weights: &[Vec<f32>] =
                lod_slice(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_BONE_WEIGHTS);
            capped_bone_influences(
                members.iter().flat_map(|&(vertex, weight)| {
                    let vertex = vertex as usize;
                    indices[vertex]
                        .iter()
                        .zip(&bone_weights[vertex])
                        .map(move |(&bone, &bone_weight)| (bone, bone_weight * weight / total))
                }),
                max_bones,
            )
        };
        lod_slice_mut::<Vec<i32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_BONE_INDICES)[row] =
            bones;
        lod_slice_mut::<Vec<f32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::SIM_BONE_WEIGHTS)[row] =
            weights;

        let (kinematic, lengths) = {
            let targets: &[Vec<i32>] =
                lod_slice(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX);
            let lengths: &[Vec<f32>] =
                lod_slice(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH);
            capped_tethers(
                members
                    .iter()
                    .flat_map(|&(vertex, weight)| {
                        let vertex = vertex as usize;
                        targets[vertex]
                            .iter()
                            .zip(&lengths[vertex])
                            .map(move |(&target, &length)| {
                                let target = welding_map.get(&target).copied().unwrap_or(target);
                                (target, weight, length)
                            })
                    })
                    .filter(|&(target, _, _)| target != representative),
                max_tethers,
            )
        };
        lod_slice_mut::<Vec<i32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)
            [row] = kinematic;
        lod_slice_mut::<Vec<f32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)
            [row] = lengths;

        for name in [attr::SIM_VERTEX_2D_LOOKUP, attr::SEAM_STITCH_LOOKUP] {
            let lists: &mut [Vec<i32>] = lod_slice_mut(cloth, lod, groups::SIM_VERTICES_3D, name);
            let mut union: Vec<i32> = members
                .iter()
                .flat_map(|&(vertex, _)| lists[vertex as usize].iter().copied())
                .collect();
            union.sort_unstable();
            union.dedup();
            lists[row] = union;
        }
    }
    trace!("reconcile_groups: lod {lod}, {} groups", welded.len());
}

/// Merge tethers that point twice at one kinematic vertex, or at their own
/// vertex, after references were redirected to representatives
pub(crate) fn merge_duplicate_tethers(cloth: &mut ClothCollection, lod: usize) {
    let max = cloth.config().max_tether_attachments;
    let targets =
        lod_slice::<Vec<i32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)
            .to_vec();
    let lengths =
        lod_slice::<Vec<f32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)
            .to_vec();

    for (vertex, (targets, lengths)) in targets.iter().zip(&lengths).enumerate() {
        let mut sorted = targets.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() == targets.len() && !targets.contains(&(vertex as i32)) {
            continue;
        }
        let (kinematic, merged_lengths) = capped_tethers(
            targets
                .iter()
                .zip(lengths)
                .filter(|&(&target, _)| target != vertex as i32)
                .map(|(&target, &length)| (target, 1.0, length)),
            max,
        );
        lod_slice_mut::<Vec<i32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_KINEMATIC_INDEX)
            [vertex] = kinematic;
        lod_slice_mut::<Vec<f32>>(cloth, lod, groups::SIM_VERTICES_3D, attr::TETHER_REFERENCE_LENGTH)
            [vertex] = merged_lengths;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capped_bone_influences_sums_and_normalizes() {
        let (bones, weights) =
            capped_bone_influences([(2, 0.2), (1, 0.5), (2, 0.3), (INDEX_NONE, 1.0)].into_iter(), 4);
        assert_eq!(bones, vec![1, 2]);
        assert_eq!(weights, vec![0.5, 0.5]);
    }

    #[test]
    fn test_capped_bone_influences_keeps_heaviest() {
        let (bones, weights) =
            capped_bone_influences([(0, 0.1), (1, 0.6), (2, 0.3)].into_iter(), 2);
        assert_eq!(bones, vec![1, 2]);
        assert!((weights[0] - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_capped_tethers_prefers_heavy_then_short() {
        let tethers = [(5, 1.0, 4.0), (3, 2.0, 6.0), (7, 1.0, 1.0), (5, 1.0, 2.0)];
        let (kinematic, lengths) = capped_tethers(tethers.into_iter(), 2);
        // 5 and 3 both weigh 2; 7 is shorter but lighter
        assert_eq!(kinematic, vec![5, 3]);
        assert_eq!(lengths, vec![3.0, 6.0]);
    }

    #[test]
    fn test_weighted_average() {
        let mut values = vec![0.0f32, 3.0, 6.0];
        let welded = Groups::from([(0, vec![(0, 1.0), (2, 2.0)])]);
        weighted_average(&mut values, &welded);
        assert_eq!(values, vec![4.0, 3.0, 6.0]);
    }
}
