// SPDX-License-Identifier: Apache-2.0
//! Common leaf checks.
//!
//! Every check runs against the current location of a
//! [`ValidationContext`]: it records at most one failure and leaves
//! traversal to the caller. Checks are plain functions so they compose with
//! [`ValidationContext::apply`].

use bigdecimal::BigDecimal;
use bigdecimal::Zero;
use trac_metadata::codec;
use trac_metadata::typesystem::TypeDescriptor;
use trac_metadata::value::Value;

use crate::context::ValidationContext;

/// Longest accepted label for schema fields and similar display strings.
pub const LABEL_LENGTH_LIMIT: usize = 4096;

/// Non-empty string check, used wherever a required field is a string.
pub fn non_empty(ctx: &mut ValidationContext, value: &str) {
    if value.is_empty() {
        ctx.error("value must not be empty");
    }
}

/// ASCII identifier: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn identifier(ctx: &mut ValidationContext, value: &str) {
    let mut chars = value.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let tail_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !(head_ok && tail_ok) {
        ctx.error(format!("[{value}] is not a valid identifier"));
    }
}

/// Rejects names in the reserved namespace: the `trac_` prefix and leading
/// underscores. Used wherever user input supplies a name.
pub fn not_trac_reserved(ctx: &mut ValidationContext, value: &str) {
    if value.starts_with(trac_metadata::attrs::TRAC_PREFIX) || value.starts_with('_') {
        ctx.error(format!("[{value}] is a reserved name"));
    }
}

/// RFC 4122 UUID in string form.
pub fn valid_uuid(ctx: &mut ValidationContext, value: &str) {
    if value.parse::<uuid::Uuid>().is_err() {
        ctx.error(format!("[{value}] is not a valid object id"));
    }
}

/// ISO local date, no offset.
pub fn iso_date(ctx: &mut ValidationContext, value: &str) {
    if codec::parse_date(value).is_err() {
        ctx.error(format!("[{value}] is not a valid date"));
    }
}

/// ISO datetime, optional offset.
pub fn iso_datetime(ctx: &mut ValidationContext, value: &str) {
    if codec::parse_datetime(value).is_err() {
        ctx.error(format!("[{value}] is not a valid datetime"));
    }
}

/// Canonical decimal text.
pub fn decimal(ctx: &mut ValidationContext, value: &str) {
    if codec::parse_decimal(value).is_err() {
        ctx.error(format!("[{value}] is not a valid decimal"));
    }
}

/// Display label length cap.
pub fn label_length_limit(ctx: &mut ValidationContext, value: &str) {
    if value.chars().count() > LABEL_LENGTH_LIMIT {
        ctx.error(format!(
            "label exceeds the maximum length of {LABEL_LENGTH_LIMIT} characters"
        ));
    }
}

/// MIME type of the form `type/subtype` with token characters only.
pub fn mime_type(ctx: &mut ValidationContext, value: &str) {
    fn token(part: &str) -> bool {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || "!#$&-^_.+".contains(c))
    }
    let ok = matches!(value.split_once('/'), Some((main, sub)) if token(main) && token(sub));
    if !ok {
        ctx.error(format!("[{value}] is not a valid mime type"));
    }
}

/// A bare file name: no separators, no control characters, no reserved
/// names, no trailing dot or space.
pub fn file_name(ctx: &mut ValidationContext, value: &str) {
    let bad_char = value
        .chars()
        .any(|c| c.is_control() || "/\\:*?\"<>|".contains(c));
    let reserved = value.is_empty() || value == "." || value == "..";
    let bad_tail = value.ends_with('.') || value.ends_with(' ');
    if bad_char || reserved || bad_tail {
        ctx.error(format!("[{value}] is not a valid file name"));
    }
}

/// A relative path: `/`-separated, no absolute form, no `..` segments, no
/// control characters, no backslash separators.
pub fn relative_path(ctx: &mut ValidationContext, value: &str) {
    if value.is_empty() {
        ctx.error("path must not be empty");
        return;
    }
    if value.starts_with('/') || value.chars().nth(1) == Some(':') {
        ctx.error(format!("[{value}] is not a relative path"));
        return;
    }
    if value.contains('\\') {
        ctx.error(format!("[{value}] must use / as the path separator"));
        return;
    }
    if value.chars().any(|c| c.is_control()) {
        ctx.error("path must not contain control characters");
        return;
    }
    if value.split('/').any(|seg| seg.is_empty() || seg == "..") {
        ctx.error(format!("[{value}] must not contain empty or .. segments"));
    }
}

/// The descriptor names a primitive type.
pub fn primitive_type(ctx: &mut ValidationContext, descriptor: &TypeDescriptor) {
    if !descriptor.is_well_formed() {
        ctx.error(format!("type {descriptor} is not well formed"));
    } else if !descriptor.basic_type.is_primitive() {
        ctx.error(format!("type {descriptor} is not primitive"));
    }
}

/// The value is usable as a tag attribute: a primitive, or a non-empty
/// homogeneous one-level array of primitives. Non-finite floats are
/// rejected because they have no wire form.
pub fn primitive_value(ctx: &mut ValidationContext, value: &Value) {
    if !value.is_valid_attr_value() {
        ctx.error(format!(
            "a value of type {} cannot be used as a tag attribute",
            value.basic_type()
        ));
        return;
    }
    let non_finite = |v: &Value| matches!(v, Value::Float(f) if !f.is_finite());
    let bad = match value {
        Value::Array(items) => items.iter().any(non_finite),
        single => non_finite(single),
    };
    if bad {
        ctx.error("float values must be finite");
    }
}

/// Strictly positive numeric value (INTEGER, FLOAT or DECIMAL).
pub fn positive(ctx: &mut ValidationContext, value: &Value) {
    if !numeric_at_least(value, false) {
        ctx.error("value must be positive");
    }
}

/// Non-negative numeric value (INTEGER, FLOAT or DECIMAL).
pub fn not_negative(ctx: &mut ValidationContext, value: &Value) {
    if !numeric_at_least(value, true) {
        ctx.error("value must not be negative");
    }
}

fn numeric_at_least(value: &Value, allow_zero: bool) -> bool {
    match value {
        Value::Integer(i) => *i > 0 || (allow_zero && *i == 0),
        Value::Float(f) => *f > 0.0 || (allow_zero && *f == 0.0),
        Value::Decimal(d) => {
            let zero = BigDecimal::zero();
            *d > zero || (allow_zero && *d == zero)
        }
        _ => false,
    }
}

/// Rejects duplicate names under case folding. Runs against the current
/// location; the failure names every colliding value.
pub fn case_insensitive_duplicates<'a>(
    ctx: &mut ValidationContext,
    names: impl IntoIterator<Item = &'a str>,
) {
    let mut seen = std::collections::HashMap::new();
    for name in names {
        let folded = name.to_ascii_lowercase();
        if let Some(first) = seen.insert(folded, name) {
            ctx.error(format!(
                "[{name}] duplicates [{first}] (names are case-insensitive unique)"
            ));
            return;
        }
    }
}

/// Fails on an empty list.
pub fn list_not_empty<T>(ctx: &mut ValidationContext, items: &[T]) {
    if items.is_empty() {
        ctx.error("list must not be empty");
    }
}

/// Fails on an empty map.
pub fn map_not_empty<K, V>(ctx: &mut ValidationContext, map: &std::collections::BTreeMap<K, V>) {
    if map.is_empty() {
        ctx.error("map must not be empty");
    }
}
