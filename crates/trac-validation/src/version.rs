// SPDX-License-Identifier: Apache-2.0
//! Version validation: a new object version against the prior version.
//!
//! Runs in the write service after the prior tag has been loaded and before
//! `saveNewVersion` commits. Rules are registered per object type; types
//! with no special rules still get the universal object-type check.

use std::collections::BTreeMap;

use trac_metadata::identifiers::TagSelector;
use trac_metadata::object::{
    CopyStatus, DataDefinition, FileDefinition, IncarnationStatus, ObjectDefinition, SchemaDefinition,
    SchemaSpec, StorageDefinition, TableSchema,
};

use crate::context::ValidationContext;

/// Validate a new definition against the prior version's definition.
///
/// The object-type check runs for every type; type-specific rules dispatch
/// on the (already verified) common type.
pub fn object_version(
    ctx: &mut ValidationContext,
    current: &ObjectDefinition,
    prior: &ObjectDefinition,
) {
    if current.object_type() != prior.object_type() {
        ctx.push("objectType");
        ctx.error(format!(
            "object type cannot change between versions ({} became {})",
            prior.object_type(),
            current.object_type()
        ));
        ctx.pop();
        return;
    }

    match (current, prior) {
        (ObjectDefinition::Data(current), ObjectDefinition::Data(prior)) => {
            data_version(ctx, current, prior);
        }
        (ObjectDefinition::File(current), ObjectDefinition::File(prior)) => {
            file_version(ctx, current, prior);
        }
        (ObjectDefinition::Schema(current), ObjectDefinition::Schema(prior)) => {
            schema_version(ctx, current, prior);
        }
        (ObjectDefinition::Storage(current), ObjectDefinition::Storage(prior)) => {
            storage_version(ctx, current, prior);
        }
        (ObjectDefinition::Custom(current), ObjectDefinition::Custom(prior)) => {
            ctx.push("customSchemaType");
            if current.custom_schema_type != prior.custom_schema_type {
                ctx.error("custom schema type cannot change between versions");
            }
            ctx.pop();
        }
        // Remaining types have no version rules beyond the type check.
        _ => {}
    }
}

fn same_object(a: &TagSelector, b: &TagSelector) -> bool {
    a.object_id == b.object_id && a.object_type == b.object_type
}

// ---------------------------------------------------------------------------
// DATA
// ---------------------------------------------------------------------------

fn data_version(ctx: &mut ValidationContext, current: &DataDefinition, prior: &DataDefinition) {
    ctx.push("storageId");
    if !same_object(&current.storage_id, &prior.storage_id) {
        ctx.error("storage id cannot change between versions of a data object");
    }
    ctx.pop();

    match (&current.schema, &prior.schema) {
        (SchemaSpec::SchemaId(current_id), SchemaSpec::SchemaId(prior_id)) => {
            ctx.push("schemaId");
            if !same_object(current_id, prior_id) {
                ctx.error("schema id cannot change between versions of a data object");
            }
            ctx.pop();
        }
        (SchemaSpec::Schema(current_schema), SchemaSpec::Schema(prior_schema)) => {
            ctx.push("schema");
            schema_version(ctx, current_schema, prior_schema);
            ctx.pop();
        }
        _ => {
            ctx.push("schema");
            ctx.error("a data object cannot switch between embedded and referenced schemas");
            ctx.pop();
        }
    }
}

// ---------------------------------------------------------------------------
// FILE
// ---------------------------------------------------------------------------

fn file_version(ctx: &mut ValidationContext, current: &FileDefinition, prior: &FileDefinition) {
    ctx.push("extension");
    if current.extension != prior.extension {
        ctx.error(format!(
            "file extension cannot change between versions ([{}] became [{}])",
            prior.extension, current.extension
        ));
    }
    ctx.pop();

    ctx.push("storageId");
    if !same_object(&current.storage_id, &prior.storage_id) {
        ctx.error("storage id cannot change between versions of a file object");
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// SCHEMA
// ---------------------------------------------------------------------------

/// Table schema compatibility.
///
/// Fields may be appended. Existing fields keep their position, name (case
/// included), type, categorical flag and business-key flag; removal is an
/// error, and appended fields cannot be business keys.
fn schema_version(ctx: &mut ValidationContext, current: &SchemaDefinition, prior: &SchemaDefinition) {
    ctx.push("schemaType");
    if current.schema_type != prior.schema_type {
        ctx.error("schema type cannot change between versions");
        ctx.pop();
        return;
    }
    ctx.pop();

    ctx.push("table");
    table_version(ctx, &current.table, &prior.table);
    ctx.pop();
}

fn table_version(ctx: &mut ValidationContext, current: &TableSchema, prior: &TableSchema) {
    ctx.push("fields");

    let current_names: std::collections::HashSet<&str> = current
        .fields
        .iter()
        .map(|f| f.field_name.as_str())
        .collect();
    for prior_field in &prior.fields {
        if !current_names.contains(prior_field.field_name.as_str()) {
            ctx.error(format!(
                "Field [{}] from the prior schema version has been removed",
                prior_field.field_name
            ));
        }
    }

    for (index, (current_field, prior_field)) in
        current.fields.iter().zip(&prior.fields).enumerate()
    {
        ctx.push_index(index);

        if current_field.field_name != prior_field.field_name {
            // Covers renames and reorders in one rule: position is identity.
            ctx.error(format!(
                "Field [{}] cannot change name or position ([{}] is at this position now)",
                prior_field.field_name, current_field.field_name
            ));
        } else {
            if current_field.field_type != prior_field.field_type {
                ctx.error(format!(
                    "Field [{}] cannot change type ({} became {})",
                    prior_field.field_name, prior_field.field_type, current_field.field_type
                ));
            }
            if current_field.categorical != prior_field.categorical {
                ctx.error(format!(
                    "Field [{}] cannot change the categorical flag",
                    prior_field.field_name
                ));
            }
            if current_field.business_key != prior_field.business_key {
                ctx.error(format!(
                    "Field [{}] cannot change the business key flag",
                    prior_field.field_name
                ));
            }
        }

        ctx.pop();
    }

    for (index, added) in current.fields.iter().enumerate().skip(prior.fields.len()) {
        ctx.push_index(index);
        if added.business_key {
            ctx.error(format!(
                "Field [{}] cannot be added as a business key",
                added.field_name
            ));
        }
        ctx.pop();
    }

    ctx.pop();
}

// ---------------------------------------------------------------------------
// STORAGE
// ---------------------------------------------------------------------------

/// Incarnation and copy statuses move monotonically; expunged data never
/// comes back.
fn storage_version(
    ctx: &mut ValidationContext,
    current: &StorageDefinition,
    prior: &StorageDefinition,
) {
    ctx.push("dataItems");

    for (item_name, prior_item) in &prior.data_items {
        ctx.push_map_key(item_name);
        match current.data_items.get(item_name) {
            None => {
                ctx.error(format!(
                    "data item [{item_name}] from the prior version has been removed"
                ));
            }
            Some(current_item) => {
                storage_item_version(ctx, item_name, current_item, prior_item);
            }
        }
        ctx.pop();
    }

    ctx.pop();
}

fn storage_item_version(
    ctx: &mut ValidationContext,
    item_name: &str,
    current: &trac_metadata::object::StorageItem,
    prior: &trac_metadata::object::StorageItem,
) {
    if current.incarnations.len() < prior.incarnations.len() {
        ctx.error(format!(
            "data item [{item_name}] has fewer incarnations than the prior version"
        ));
        return;
    }

    ctx.push("incarnations");
    for (index, (current_inc, prior_inc)) in current
        .incarnations
        .iter()
        .zip(&prior.incarnations)
        .enumerate()
    {
        ctx.push_index(index);

        if prior_inc.status == IncarnationStatus::IncarnationExpunged
            && current_inc.status == IncarnationStatus::IncarnationAvailable
        {
            ctx.error(format!(
                "incarnation {index} of [{item_name}] cannot move from expunged back to available"
            ));
        }

        let prior_copies: BTreeMap<(&str, &str), CopyStatus> = prior_inc
            .copies
            .iter()
            .map(|c| ((c.storage_key.as_str(), c.storage_path.as_str()), c.copy_status))
            .collect();
        for copy in &current_inc.copies {
            let key = (copy.storage_key.as_str(), copy.storage_path.as_str());
            if prior_copies.get(&key) == Some(&CopyStatus::CopyExpunged)
                && copy.copy_status == CopyStatus::CopyAvailable
            {
                ctx.error(format!(
                    "copy [{}] of [{item_name}] cannot move from expunged back to available",
                    copy.storage_path
                ));
            }
        }

        ctx.pop();
    }
    ctx.pop();
}
