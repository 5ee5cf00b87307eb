// SPDX-License-Identifier: Apache-2.0
//! Consistency validation: references against a loaded metadata bundle.
//!
//! The validator itself never calls the store; the write service pre-loads
//! everything a batch can reference (stored objects plus the headers the
//! batch itself will produce) into a [`MetadataBundle`] before validation
//! runs. Reference cycles between objects in one batch are rejected here.

use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use trac_metadata::identifiers::{ObjectCriteria, TagSelector};
use trac_metadata::object::{ObjectDefinition, ObjectType};

use crate::context::ValidationContext;

// ---------------------------------------------------------------------------
// MetadataBundle
// ---------------------------------------------------------------------------

/// One resolvable entry in a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleEntry {
    /// Stored (or to-be-stored) object type.
    pub object_type: ObjectType,
    /// Highest object version the bundle knows about.
    pub object_version: u32,
}

/// An in-memory collection of object identities used to resolve references
/// without re-loading from the store.
#[derive(Debug, Default, Clone)]
pub struct MetadataBundle {
    items: HashMap<Uuid, BundleEntry>,
}

impl MetadataBundle {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn add(&mut self, object_id: Uuid, object_type: ObjectType, object_version: u32) {
        self.items.insert(
            object_id,
            BundleEntry {
                object_type,
                object_version,
            },
        );
    }

    /// Look up an object id.
    pub fn get(&self, object_id: &Uuid) -> Option<&BundleEntry> {
        self.items.get(object_id)
    }

    /// Resolve a selector to the version it would pin to, checking type and
    /// version bounds. `None` means the reference does not resolve.
    pub fn resolve(&self, selector: &TagSelector) -> Option<u32> {
        let entry = self.items.get(&selector.object_id)?;
        if entry.object_type != selector.object_type {
            return None;
        }
        match selector.object_criteria {
            ObjectCriteria::LatestObject => Some(entry.object_version),
            ObjectCriteria::ObjectVersion(v) if v >= 1 && v <= entry.object_version => Some(v),
            ObjectCriteria::ObjectVersion(_) => None,
            // As-of references cannot be normalised without timestamps; the
            // store resolves them. The bundle treats them as resolvable when
            // the id and type line up.
            ObjectCriteria::ObjectAsOf(_) => Some(entry.object_version),
        }
    }
}

// ---------------------------------------------------------------------------
// Reference checks
// ---------------------------------------------------------------------------

/// Every selector embedded in the definition must resolve inside the
/// bundle, with a matching object type.
pub fn definition_references(
    ctx: &mut ValidationContext,
    definition: &ObjectDefinition,
    bundle: &MetadataBundle,
) {
    for selector in definition.embedded_selectors() {
        ctx.push("definition");
        match bundle.get(&selector.object_id) {
            None => {
                ctx.error(format!(
                    "reference to {} {} does not resolve to any known object",
                    selector.object_type, selector.object_id
                ));
            }
            Some(entry) if entry.object_type != selector.object_type => {
                ctx.error(format!(
                    "reference to {} {} resolves to an object of type {}",
                    selector.object_type, selector.object_id, entry.object_type
                ));
            }
            Some(_) => {
                if bundle.resolve(selector).is_none() {
                    ctx.error(format!(
                        "reference to {} {} names a version that does not exist",
                        selector.object_type, selector.object_id
                    ));
                }
            }
        }
        ctx.pop();
    }
}

/// Reject reference cycles between objects created in one batch.
///
/// `batch_items` maps each new object id to the ids it references; edges to
/// objects outside the batch are ignored (they are already committed and
/// cannot cycle back).
pub fn batch_reference_cycles(
    ctx: &mut ValidationContext,
    batch_items: &HashMap<Uuid, Vec<Uuid>>,
) {
    let mut visiting = HashSet::new();
    let mut finished = HashSet::new();

    fn visit(
        node: Uuid,
        batch_items: &HashMap<Uuid, Vec<Uuid>>,
        visiting: &mut HashSet<Uuid>,
        finished: &mut HashSet<Uuid>,
    ) -> Option<Uuid> {
        if finished.contains(&node) {
            return None;
        }
        if !visiting.insert(node) {
            return Some(node);
        }
        if let Some(targets) = batch_items.get(&node) {
            for target in targets {
                if batch_items.contains_key(target) {
                    if let Some(cycle) = visit(*target, batch_items, visiting, finished) {
                        return Some(cycle);
                    }
                }
            }
        }
        visiting.remove(&node);
        finished.insert(node);
        None
    }

    let mut ids: Vec<Uuid> = batch_items.keys().copied().collect();
    ids.sort();
    for id in ids {
        if let Some(on_cycle) = visit(id, batch_items, &mut visiting, &mut finished) {
            ctx.error(format!(
                "batch contains a reference cycle involving object {on_cycle}"
            ));
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trac_metadata::object::{DataDefinition, SchemaSpec};

    fn data_def(schema_id: Uuid, storage_id: Uuid) -> ObjectDefinition {
        ObjectDefinition::Data(DataDefinition {
            schema: SchemaSpec::SchemaId(TagSelector::for_version(
                ObjectType::Schema,
                schema_id,
                1,
            )),
            storage_id: TagSelector::for_version(ObjectType::Storage, storage_id, 1),
        })
    }

    fn check(definition: &ObjectDefinition, bundle: &MetadataBundle) -> Vec<String> {
        let mut ctx = ValidationContext::for_consistency();
        definition_references(&mut ctx, definition, bundle);
        ctx.failures().iter().map(|f| f.message.clone()).collect()
    }

    #[test]
    fn resolvable_references_pass() {
        let schema_id = Uuid::new_v4();
        let storage_id = Uuid::new_v4();
        let mut bundle = MetadataBundle::new();
        bundle.add(schema_id, ObjectType::Schema, 1);
        bundle.add(storage_id, ObjectType::Storage, 2);
        assert!(check(&data_def(schema_id, storage_id), &bundle).is_empty());
    }

    #[test]
    fn unknown_reference_fails() {
        let schema_id = Uuid::new_v4();
        let storage_id = Uuid::new_v4();
        let mut bundle = MetadataBundle::new();
        bundle.add(schema_id, ObjectType::Schema, 1);
        let failures = check(&data_def(schema_id, storage_id), &bundle);
        assert!(failures[0].contains("does not resolve"));
    }

    #[test]
    fn wrong_type_reference_fails() {
        let schema_id = Uuid::new_v4();
        let storage_id = Uuid::new_v4();
        let mut bundle = MetadataBundle::new();
        bundle.add(schema_id, ObjectType::Data, 1);
        bundle.add(storage_id, ObjectType::Storage, 1);
        let failures = check(&data_def(schema_id, storage_id), &bundle);
        assert!(failures[0].contains("type DATA"));
    }

    #[test]
    fn version_out_of_range_fails() {
        let schema_id = Uuid::new_v4();
        let storage_id = Uuid::new_v4();
        let mut bundle = MetadataBundle::new();
        bundle.add(schema_id, ObjectType::Schema, 1);
        bundle.add(storage_id, ObjectType::Storage, 1);

        let mut def = data_def(schema_id, storage_id);
        if let ObjectDefinition::Data(data) = &mut def {
            data.storage_id = TagSelector::for_version(ObjectType::Storage, storage_id, 5);
        }
        let failures = check(&def, &bundle);
        assert!(failures[0].contains("version that does not exist"));
    }

    #[test]
    fn latest_selector_resolves_to_bundle_version() {
        let mut bundle = MetadataBundle::new();
        let id = Uuid::new_v4();
        bundle.add(id, ObjectType::Schema, 3);
        let selector = TagSelector::latest(ObjectType::Schema, id);
        assert_eq!(bundle.resolve(&selector), Some(3));
    }

    #[test]
    fn two_object_cycle_is_detected() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut items = HashMap::new();
        items.insert(a, vec![b]);
        items.insert(b, vec![a]);

        let mut ctx = ValidationContext::for_consistency();
        batch_reference_cycles(&mut ctx, &items);
        let err = ctx.finish().unwrap_err();
        assert_eq!(err.kind, trac_error::ErrorKind::ConsistencyValidation);
        assert!(err.details[0].message.contains("cycle"));
    }

    #[test]
    fn dag_references_pass() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let mut items = HashMap::new();
        items.insert(a, vec![b, c]);
        items.insert(b, vec![c]);
        items.insert(c, Vec::new());

        let mut ctx = ValidationContext::for_consistency();
        batch_reference_cycles(&mut ctx, &items);
        assert!(ctx.finish().is_ok());
    }

    #[test]
    fn references_outside_the_batch_are_ignored() {
        let a = Uuid::new_v4();
        let external = Uuid::new_v4();
        let mut items = HashMap::new();
        items.insert(a, vec![external]);

        let mut ctx = ValidationContext::for_consistency();
        batch_reference_cycles(&mut ctx, &items);
        assert!(ctx.finish().is_ok());
    }
}
