//! Versioned persistence of a [`ClothCollection`].
//!
//! A collection is stored as `{ "version": N, "collection": { ... } }`. Older
//! archives are upgraded once on load, newer ones are rejected.

use std::io::{Read, Write};

use cloth_config::INDEX_NONE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClothError;
use crate::facade::{lod_slice, lod_slice_mut};
use crate::ranges::RangeColumns;
use crate::references;
use crate::schema::{attributes as attr, groups, ranges as schema_ranges, ClothCollection, SCHEMA};

/// Current archive version
pub const CLOTH_COLLECTION_VERSION: u32 = 3;

/// Tether batch ranges are guaranteed to start out empty
const VERSION_EMPTY_TETHER_RANGES: u32 = 2;
/// `SeamStitchLookup` exists on 3D vertices
const VERSION_SEAM_STITCH_LOOKUP: u32 = 3;

/// Serialized form of a cloth collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClothArchive {
    pub version: u32,
    pub collection: ClothCollection,
}

impl ClothArchive {
    /// Wrap a collection at the current version
    pub fn new(collection: ClothCollection) -> Self {
        Self {
            version: CLOTH_COLLECTION_VERSION,
            collection,
        }
    }

    /// Upgrade to the current version and check the schema
    pub fn into_collection(self) -> Result<ClothCollection, ClothError> {
        let Self {
            version,
            mut collection,
        } = self;
        if version == 0 || version > CLOTH_COLLECTION_VERSION {
            return Err(ClothError::UnsupportedVersion {
                found: version,
                supported: CLOTH_COLLECTION_VERSION,
            });
        }
        collection.config().validate()?;
        check_columns(&collection)?;

        if version < VERSION_EMPTY_TETHER_RANGES {
            reset_broken_ranges(&mut collection, &schema_ranges::LOD_TETHER_BATCHES);
            reset_broken_ranges(&mut collection, &schema_ranges::TETHER_BATCH_TETHERS);
            debug!("archive: upgraded v{version} tether ranges");
        }
        collection.define_schema();
        if !collection.is_valid() {
            return Err(ClothError::InvalidSchema(
                "fixed attribute missing or with a wrong dependency".to_string(),
            ));
        }
        check_ranges(&collection)?;
        check_references(&collection)?;

        if version < VERSION_SEAM_STITCH_LOOKUP {
            rebuild_seam_stitch_lookup(&mut collection);
            debug!("archive: rebuilt seam stitch lookup for v{version}");
        }
        Ok(collection)
    }
}

/// Every column has one value per row, and no fixed attribute has another
/// type than the schema declares
fn check_columns(cloth: &ClothCollection) -> Result<(), ClothError> {
    let store = cloth.attributes();
    for group in store.group_names() {
        let len = store.num_elements(group);
        for name in store.attribute_names(group) {
            let values = store
                .attribute(name, group)
                .map_or(len, |attribute| attribute.values.len());
            if values != len {
                return Err(ClothError::InvalidSchema(format!(
                    "{group}/{name} has {values} values for {len} rows"
                )));
            }
        }
    }
    for attribute in SCHEMA {
        if let Some(kind) = store.attribute_kind(attribute.name, attribute.group) {
            if kind != attribute.kind {
                return Err(ClothError::InvalidSchema(format!(
                    "{}/{} is {kind:?}, expected {:?}",
                    attribute.group, attribute.name, attribute.kind
                )));
            }
        }
    }
    Ok(())
}

fn is_broken_range(start: i32, end: i32, num_children: usize) -> bool {
    if start == INDEX_NONE || end == INDEX_NONE {
        return start != end;
    }
    start < 0 || start > end || end as usize >= num_children
}

/// Every range pair of the schema is empty on both ends or a valid span
fn check_ranges(cloth: &ClothCollection) -> Result<(), ClothError> {
    for columns in schema_ranges::ALL {
        let (start, end) = columns.columns(&cloth.collection);
        let num_children = cloth.num_elements(columns.child_group);
        if let Some(row) = (0..start.len()).find(|&row| is_broken_range(start[row], end[row], num_children)) {
            return Err(ClothError::InvalidSchema(format!(
                "{}/{}..{} row {row} is ({}, {}) with {num_children} children",
                columns.parent_group, columns.start, columns.end, start[row], end[row]
            )));
        }
    }
    Ok(())
}

/// Every LOD-relative index points at a row its LOD owns
fn check_references(cloth: &ClothCollection) -> Result<(), ClothError> {
    for lod in 0..cloth.num_elements(groups::LODS) {
        if let Some((reference, row, value)) = references::find_dangling_reference(cloth, lod) {
            return Err(ClothError::InvalidSchema(format!(
                "{}/{} row {row} of lod {lod} points at {} {value}, which the lod does not own",
                reference.owner, reference.attribute, reference.target
            )));
        }
    }
    Ok(())
}

/// Archives before tether ranges were initialized empty may hold garbage
/// pairs; those become empty ranges
fn reset_broken_ranges(cloth: &mut ClothCollection, columns: &RangeColumns) {
    if !cloth.collection.has_attribute(columns.start, columns.parent_group)
        || !cloth.collection.has_attribute(columns.end, columns.parent_group)
    {
        return;
    }
    let num_children = cloth.num_elements(columns.child_group);
    for row in 0..cloth.num_elements(columns.parent_group) {
        let (start, end) = columns.get(&cloth.collection, row);
        if is_broken_range(start, end, num_children) {
            warn!(
                "archive: resetting {}/{} row {row} range ({start}, {end})",
                columns.parent_group, columns.start
            );
            columns.set(&mut cloth.collection, row, INDEX_NONE, INDEX_NONE);
        }
    }
}

/// Derive every 3D vertex's stitch list from the stitches' welded vertices
fn rebuild_seam_stitch_lookup(cloth: &mut ClothCollection) {
    for lod in 0..cloth.num_elements(groups::LODS) {
        let stitch_vertices: Vec<i32> =
            lod_slice::<i32>(cloth, lod, groups::SEAM_STITCHES, attr::SEAM_STITCH_3D_INDEX).to_vec();
        let lookup: &mut [Vec<i32>] =
            lod_slice_mut(cloth, lod, groups::SIM_VERTICES_3D, attr::SEAM_STITCH_LOOKUP);
        lookup.iter_mut().for_each(Vec::clear);
        for (stitch, &vertex) in stitch_vertices.iter().enumerate() {
            if let Some(list) = usize::try_from(vertex).ok().and_then(|v| lookup.get_mut(v)) {
                list.push(stitch as i32);
            }
        }
    }
}

impl ClothCollection {
    /// Serialize to a pretty-printed JSON archive at the current version
    pub fn to_json(&self) -> Result<String, ClothError> {
        Ok(serde_json::to_string_pretty(&ArchiveRef::new(self))?)
    }

    /// Load a JSON archive, upgrading it if needed
    pub fn from_json(json: &str) -> Result<Self, ClothError> {
        let archive: ClothArchive = serde_json::from_str(json)?;
        archive.into_collection()
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<(), ClothError> {
        serde_json::to_writer(writer, &ArchiveRef::new(self))?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ClothError> {
        let archive: ClothArchive = serde_json::from_reader(reader)?;
        archive.into_collection()
    }
}

/// Borrowed twin of [`ClothArchive`] for saving without a clone
#[derive(Serialize)]
struct ArchiveRef<'a> {
    version: u32,
    collection: &'a ClothCollection,
}

impl<'a> ArchiveRef<'a> {
    fn new(collection: &'a ClothCollection) -> Self {
        Self {
            version: CLOTH_COLLECTION_VERSION,
            collection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{IVec2, IVec3, Vec2, Vec3};

    fn create_welded_cloth() -> ClothCollection {
        let mut cloth = ClothCollection::new();
        let mut facade = cloth.facade_mut();
        facade.add_weight_map("MaxDistance");
        facade.add_lod();
        let mut lod = facade.lod_mut(0);
        for origin in [Vec3::ZERO, Vec3::X] {
            let pattern = lod.add_pattern();
            lod.pattern_mut(pattern).initialize(
                &[Vec2::ZERO, Vec2::X, Vec2::Y],
                &[origin, origin + Vec3::X, origin + Vec3::Y],
                &[IVec3::new(0, 1, 2)],
            );
        }
        let seam = lod.add_seam();
        lod.seam_mut(seam).initialize(&[IVec2::new(1, 3)]);
        cloth
    }

    #[test]
    fn test_json_round_trip() {
        let cloth = create_welded_cloth();
        let json = cloth.to_json().unwrap();
        let loaded = ClothCollection::from_json(&json).unwrap();
        assert_eq!(loaded, cloth);
    }

    #[test]
    fn test_writer_round_trip() {
        let cloth = create_welded_cloth();
        let mut buffer = Vec::new();
        cloth.to_writer(&mut buffer).unwrap();
        let loaded = ClothCollection::from_reader(buffer.as_slice()).unwrap();
        assert_eq!(loaded.facade().lod(0).num_sim_vertices_3d(), 5);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let mut archive = ClothArchive::new(ClothCollection::new());
        archive.version = CLOTH_COLLECTION_VERSION + 1;
        assert!(matches!(
            archive.into_collection(),
            Err(ClothError::UnsupportedVersion { found: 4, supported: 3 })
        ));
    }

    #[test]
    fn test_v2_rebuilds_seam_stitch_lookup() {
        let cloth = create_welded_cloth();
        let mut stale = cloth.clone();
        stale
            .collection
            .remove_attribute(attr::SEAM_STITCH_LOOKUP, groups::SIM_VERTICES_3D);
        let archive = ClothArchive {
            version: 2,
            collection: stale,
        };
        let loaded = archive.into_collection().unwrap();
        assert_eq!(loaded, cloth);
    }

    #[test]
    fn test_v1_resets_broken_tether_ranges() {
        let mut cloth = create_welded_cloth();
        // Start without end: an empty range only half written
        cloth
            .collection
            .find_attribute_mut::<i32>(attr::TETHER_BATCH_START, groups::LODS)
            .unwrap()[0] = 0;
        let archive = ClothArchive {
            version: 1,
            collection: cloth.clone(),
        };
        let loaded = archive.into_collection().unwrap();
        assert_eq!(
            schema_ranges::LOD_TETHER_BATCHES.get(&loaded.collection, 0),
            (INDEX_NONE, INDEX_NONE)
        );

        // The same damage in a current archive is an error
        let archive = ClothArchive {
            version: CLOTH_COLLECTION_VERSION,
            collection: cloth,
        };
        assert!(matches!(archive.into_collection(), Err(ClothError::InvalidSchema(_))));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let json = ClothCollection::new().to_json().unwrap();
        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["collection"]
            .as_object_mut()
            .unwrap()
            .remove("config");
        let loaded = ClothCollection::from_json(&value.to_string()).unwrap();
        assert_eq!(loaded.config(), &cloth_config::ClothConfig::default());
    }

    #[test]
    fn test_dangling_lookup_is_rejected() {
        let cloth = create_welded_cloth();
        let mut value: serde_json::Value = serde_json::from_str(&cloth.to_json().unwrap()).unwrap();
        let lookup = value
            .pointer_mut("/collection/collection/groups/SimVertices2D/attributes/SimVertex3DLookup/values/Int/0")
            .unwrap();
        *lookup = serde_json::json!(99);
        assert!(matches!(
            ClothCollection::from_json(&value.to_string()),
            Err(ClothError::InvalidSchema(_))
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cloth = ClothCollection::new();
        cloth.set_config(cloth_config::ClothConfig {
            max_bone_influences: 0,
            ..Default::default()
        });
        let json = cloth.to_json().unwrap();
        assert!(matches!(ClothCollection::from_json(&json), Err(ClothError::Config(_))));
    }

    #[test]
    fn test_garbage_is_a_serialize_error() {
        assert!(matches!(
            ClothCollection::from_json("{ not json"),
            Err(ClothError::Serialize(_))
        ));
    }
}
