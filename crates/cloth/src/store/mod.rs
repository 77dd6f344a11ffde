//! Columnar attribute store.
//!
//! An [`AttributeCollection`] holds named groups (tables). Every attribute
//! (column) of a group has exactly as many rows as the group. An integer
//! attribute may declare a dependency on another group, meaning its values are
//! row indices into that group; inserting or removing rows in the dependency
//! group renumbers those values so they keep pointing at the same rows.
//!
//! Invalid positions, unknown groups and type mismatches are caller bugs and
//! panic.

mod values;

use std::collections::BTreeMap;

use cloth_config::INDEX_NONE;
use serde::{Deserialize, Serialize};
use tracing::trace;

pub use values::{AttributeKind, AttributeType, AttributeValues};

/// A single named column and the group its values index into, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub values: AttributeValues,
    pub dependency: Option<String>,
}

/// A named table of equal-length attributes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Group {
    len: usize,
    attributes: BTreeMap<String, Attribute>,
}

impl Group {
    /// Number of rows
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Generic group/attribute container with dependency tracking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributeCollection {
    groups: BTreeMap<String, Group>,
}

impl AttributeCollection {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Groups
    // ========================================================================

    /// Add an empty group. Does nothing if the group already exists.
    pub fn add_group(&mut self, group: &str) {
        self.groups.entry(group.to_string()).or_default();
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Names of all groups, in sorted order
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Number of rows in a group (0 if the group does not exist)
    pub fn num_elements(&self, group: &str) -> usize {
        self.groups.get(group).map_or(0, |g| g.len)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Add a typed attribute. See [`Self::add_attribute_of_kind`].
    pub fn add_attribute<T: AttributeType>(&mut self, name: &str, group: &str) {
        self.add_attribute_of_kind(T::KIND, name, group, None);
    }

    /// Add a typed attribute whose values are row indices into `dependency`
    pub fn add_attribute_with_dependency<T: AttributeType>(
        &mut self,
        name: &str,
        group: &str,
        dependency: &str,
    ) {
        self.add_attribute_of_kind(T::KIND, name, group, Some(dependency));
    }

    /// Add an attribute of the given kind to `group`, creating the group if
    /// needed.
    ///
    /// Adding an attribute that already exists with the same kind is a no-op
    /// apart from updating its dependency. Redefining it with another kind
    /// panics.
    pub fn add_attribute_of_kind(
        &mut self,
        kind: AttributeKind,
        name: &str,
        group: &str,
        dependency: Option<&str>,
    ) {
        assert!(
            dependency.is_none() || kind.supports_dependency(),
            "attribute {group}/{name} of kind {kind:?} cannot declare a dependency"
        );
        let group_entry = self.groups.entry(group.to_string()).or_default();
        let len = group_entry.len;
        match group_entry.attributes.get_mut(name) {
            Some(existing) => {
                assert_eq!(
                    existing.values.kind(),
                    kind,
                    "attribute {group}/{name} already exists with another type"
                );
                existing.dependency = dependency.map(str::to_string);
            }
            None => {
                group_entry.attributes.insert(
                    name.to_string(),
                    Attribute {
                        values: AttributeValues::new(kind, len),
                        dependency: dependency.map(str::to_string),
                    },
                );
            }
        }
    }

    /// Remove an attribute. Returns `false` if it did not exist.
    pub fn remove_attribute(&mut self, name: &str, group: &str) -> bool {
        self.groups
            .get_mut(group)
            .is_some_and(|g| g.attributes.remove(name).is_some())
    }

    pub fn has_attribute(&self, name: &str, group: &str) -> bool {
        self.attribute(name, group).is_some()
    }

    /// Element type of an attribute, if it exists
    pub fn attribute_kind(&self, name: &str, group: &str) -> Option<AttributeKind> {
        self.attribute(name, group).map(|a| a.values.kind())
    }

    /// Group that the attribute's values index into, if any
    pub fn dependency(&self, name: &str, group: &str) -> Option<&str> {
        self.attribute(name, group)?.dependency.as_deref()
    }

    /// Names of all attributes in a group, in sorted order
    pub fn attribute_names<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.groups
            .get(group)
            .into_iter()
            .flat_map(|g| g.attributes.keys().map(String::as_str))
    }

    /// Raw column access
    pub fn attribute(&self, name: &str, group: &str) -> Option<&Attribute> {
        self.groups.get(group)?.attributes.get(name)
    }

    /// Typed read access to a column
    pub fn find_attribute<T: AttributeType>(&self, name: &str, group: &str) -> Option<&[T]> {
        T::values(&self.attribute(name, group)?.values).map(Vec::as_slice)
    }

    /// Typed write access to a column
    pub fn find_attribute_mut<T: AttributeType>(
        &mut self,
        name: &str,
        group: &str,
    ) -> Option<&mut [T]> {
        let attribute = self.groups.get_mut(group)?.attributes.get_mut(name)?;
        T::values_mut(&mut attribute.values).map(Vec::as_mut_slice)
    }

    // ========================================================================
    // Rows
    // ========================================================================

    /// Append `count` rows to `group` and return the index of the first one
    pub fn add_elements(&mut self, count: usize, group: &str) -> usize {
        let position = self.num_elements(group);
        self.insert_elements(count, position, group);
        position
    }

    /// Insert `count` default rows at `position`.
    ///
    /// Every dependent index `>= position` (in any group) is shifted up by
    /// `count`. Dependent index columns of the inserted rows start as
    /// [`INDEX_NONE`].
    pub fn insert_elements(&mut self, count: usize, position: usize, group: &str) {
        self.add_group(group);
        if count == 0 {
            return;
        }
        let Some(target) = self.groups.get_mut(group) else {
            return;
        };
        assert!(
            position <= target.len,
            "insert position {position} out of range for group {group} ({} rows)",
            target.len
        );
        for attribute in target.attributes.values_mut() {
            let index_none = attribute.dependency.is_some();
            attribute.values.insert_default(position, count, index_none);
        }
        target.len += count;

        let position = position as i32;
        let count = count as i32;
        self.remap_dependents(group, |index| {
            if index >= position { index + count } else { index }
        });
        trace!("insert_elements: {count} rows at {position} in {group}");
    }

    /// Remove `count` rows starting at `position`.
    ///
    /// Dependent indices pointing into the removed run become [`INDEX_NONE`];
    /// later indices shift down by `count`.
    pub fn remove_elements(&mut self, group: &str, count: usize, position: usize) {
        if count == 0 {
            return;
        }
        let len = self.num_elements(group);
        assert!(
            position + count <= len,
            "remove range {position}..{} out of range for group {group} ({len} rows)",
            position + count
        );
        if let Some(target) = self.groups.get_mut(group) {
            for attribute in target.attributes.values_mut() {
                attribute.values.remove_range(position, count);
            }
            target.len -= count;
        }

        let start = position as i32;
        let end = (position + count) as i32;
        self.remap_dependents(group, |index| {
            if index < start {
                index
            } else if index < end {
                INDEX_NONE
            } else {
                index - (end - start)
            }
        });
        trace!("remove_elements: {count} rows at {position} in {group}");
    }

    /// Remove the listed rows in one pass.
    ///
    /// `sorted_rows` must be ascending; duplicates are ignored. Dependent
    /// indices are renumbered as in [`Self::remove_elements`].
    pub fn remove_sorted_elements(&mut self, group: &str, sorted_rows: &[usize]) {
        let mut rows = sorted_rows.to_vec();
        rows.dedup();
        if rows.is_empty() {
            return;
        }
        debug_assert!(rows.windows(2).all(|w| w[0] < w[1]), "rows must be sorted");
        let len = self.num_elements(group);
        assert!(
            rows.last().is_some_and(|&last| last < len),
            "remove rows out of range for group {group} ({len} rows)"
        );
        if let Some(target) = self.groups.get_mut(group) {
            for attribute in target.attributes.values_mut() {
                attribute.values.remove_sorted(&rows);
            }
            target.len -= rows.len();
        }

        self.remap_dependents(group, |index| {
            let below = rows.partition_point(|&row| (row as i32) < index);
            if rows.get(below).is_some_and(|&row| row as i32 == index) {
                INDEX_NONE
            } else {
                index - below as i32
            }
        });
        trace!("remove_sorted_elements: {} rows in {group}", rows.len());
    }

    /// Copy `count` rows of one attribute from `source` into this collection.
    ///
    /// The attribute must exist with the same kind in both collections.
    pub fn copy_rows_from(
        &mut self,
        source: &AttributeCollection,
        name: &str,
        group: &str,
        source_first: usize,
        first: usize,
        count: usize,
    ) {
        if count == 0 {
            return;
        }
        let Some(source_attribute) = source.attribute(name, group) else {
            panic!("source collection has no attribute {group}/{name}");
        };
        let Some(attribute) = self
            .groups
            .get_mut(group)
            .and_then(|g| g.attributes.get_mut(name))
        else {
            panic!("collection has no attribute {group}/{name}");
        };
        attribute
            .values
            .copy_rows_from(&source_attribute.values, source_first, first, count);
    }

    /// Apply `remap` to every attribute (in any group) that depends on `group`
    fn remap_dependents(&mut self, group: &str, remap: impl Fn(i32) -> i32) {
        for owner in self.groups.values_mut() {
            for attribute in owner.attributes.values_mut() {
                if attribute.dependency.as_deref() == Some(group) {
                    attribute.values.remap_indices(&remap);
                }
            }
        }
    }
}
