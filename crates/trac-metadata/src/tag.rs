// SPDX-License-Identifier: Apache-2.0
//! Tags and tag updates.
//!
//! A [`Tag`] is the attribute set attached to one (objectId, objectVersion,
//! tagVersion), together with the object definition. [`TagUpdate`]s are the
//! only way attributes change; applying the same update list twice against
//! the same starting point yields the same final attribute map.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::attrs;
use crate::identifiers::TagHeader;
use crate::object::ObjectDefinition;
use crate::value::Value;

// ---------------------------------------------------------------------------
// Tag
// ---------------------------------------------------------------------------

/// One row of catalog history with its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Identity of the row.
    pub header: TagHeader,
    /// The object definition; omitted on search results when not requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<ObjectDefinition>,
    /// Attribute map.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl Tag {
    /// Look up a single attribute.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

// ---------------------------------------------------------------------------
// TagUpdate
// ---------------------------------------------------------------------------

/// Operations a tag update can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TagOperation {
    /// Insert or replace, regardless of prior state.
    CreateOrReplaceAttr,
    /// Insert, or append to the existing value (promoting to an array).
    CreateOrAppendAttr,
    /// Insert; fails if the attribute already exists.
    CreateAttr,
    /// Replace; fails if the attribute is missing or changes type.
    ReplaceAttr,
    /// Append; fails if the attribute is missing or changes type.
    AppendAttr,
    /// Remove; fails if the attribute is missing.
    DeleteAttr,
    /// Remove every non-controlled attribute. Carries no name or value.
    ClearAllAttr,
}

/// One attribute mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagUpdate {
    /// What to do.
    pub operation: TagOperation,
    /// Target attribute name; absent for `CLEAR_ALL_ATTR`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr_name: Option<String>,
    /// New value; absent for delete / clear operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl TagUpdate {
    /// Insert-or-replace shorthand.
    pub fn put(attr_name: impl Into<String>, value: Value) -> Self {
        Self {
            operation: TagOperation::CreateOrReplaceAttr,
            attr_name: Some(attr_name.into()),
            value: Some(value),
        }
    }
}

/// A failure applying one tag update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdateError {
    /// Position of the failing update in the request list.
    pub index: usize,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for TagUpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tagUpdates.{}: {}", self.index, self.message)
    }
}

impl std::error::Error for TagUpdateError {}

/// Apply a list of tag updates to an attribute map, in order.
///
/// The first failing update aborts the whole application; the map is left
/// untouched on failure. Controlled attributes survive `CLEAR_ALL_ATTR`
/// (validation prevents user updates from naming them directly).
pub fn apply_tag_updates(
    attrs: &BTreeMap<String, Value>,
    updates: &[TagUpdate],
) -> Result<BTreeMap<String, Value>, TagUpdateError> {
    let mut next = attrs.clone();

    for (index, update) in updates.iter().enumerate() {
        let fail = |message: String| TagUpdateError { index, message };

        if update.operation == TagOperation::ClearAllAttr {
            next.retain(|name, _| attrs::is_controlled_name(name));
            continue;
        }

        let name = update
            .attr_name
            .as_deref()
            .ok_or_else(|| fail("attribute name is missing".to_string()))?;

        match update.operation {
            TagOperation::CreateOrReplaceAttr => {
                let value = required_value(update, &fail)?;
                next.insert(name.to_string(), value);
            }
            TagOperation::CreateOrAppendAttr => {
                let value = required_value(update, &fail)?;
                match next.remove(name) {
                    Some(existing) => {
                        next.insert(name.to_string(), append_value(name, existing, value, &fail)?);
                    }
                    None => {
                        next.insert(name.to_string(), value);
                    }
                }
            }
            TagOperation::CreateAttr => {
                if next.contains_key(name) {
                    return Err(fail(format!("attribute [{name}] already exists")));
                }
                let value = required_value(update, &fail)?;
                next.insert(name.to_string(), value);
            }
            TagOperation::ReplaceAttr => {
                let value = required_value(update, &fail)?;
                let existing = next
                    .get(name)
                    .ok_or_else(|| fail(format!("attribute [{name}] does not exist")))?;
                if element_kind(existing) != element_kind(&value) {
                    return Err(fail(format!("attribute [{name}] cannot change type")));
                }
                next.insert(name.to_string(), value);
            }
            TagOperation::AppendAttr => {
                let value = required_value(update, &fail)?;
                let existing = next
                    .remove(name)
                    .ok_or_else(|| fail(format!("attribute [{name}] does not exist")))?;
                next.insert(name.to_string(), append_value(name, existing, value, &fail)?);
            }
            TagOperation::DeleteAttr => {
                if next.remove(name).is_none() {
                    return Err(fail(format!("attribute [{name}] does not exist")));
                }
            }
            TagOperation::ClearAllAttr => unreachable!("handled above"),
        }
    }

    Ok(next)
}

fn required_value(
    update: &TagUpdate,
    fail: &impl Fn(String) -> TagUpdateError,
) -> Result<Value, TagUpdateError> {
    update
        .value
        .clone()
        .ok_or_else(|| fail("attribute value is missing".to_string()))
}

/// The element kind of a value: its own kind for primitives, the element
/// kind for arrays. Used to keep appends and replacements homogeneous.
fn element_kind(value: &Value) -> Option<crate::typesystem::BasicType> {
    match value {
        Value::Array(_) => value.element_type(),
        primitive => Some(primitive.basic_type()),
    }
}

fn append_value(
    name: &str,
    existing: Value,
    addition: Value,
    fail: &impl Fn(String) -> TagUpdateError,
) -> Result<Value, TagUpdateError> {
    if element_kind(&existing) != element_kind(&addition) {
        return Err(fail(format!("attribute [{name}] cannot change type")));
    }

    let mut items = match existing {
        Value::Array(items) => items,
        single => vec![single],
    };
    match addition {
        Value::Array(more) => items.extend(more),
        single => items.push(single),
    }
    Ok(Value::Array(items))
}
