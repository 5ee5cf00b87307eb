// SPDX-License-Identifier: Apache-2.0
//! The stable metadata contract for the TRAC platform.
//!
//! Everything the catalog stores or exchanges is defined here: the primitive
//! type system and its wire codec, the tagged object model, selectors,
//! search expressions, tag updates and the API request/response shapes.
//!
//! If you only take one dependency, take this one.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// API request and response shapes for the metadata services.
pub mod api;
/// Controlled (`trac_*`) attribute names and stamping.
pub mod attrs;
/// Wire codec: tagged JSON form ↔ native values.
pub mod codec;
/// Object identities: headers and selectors.
pub mod identifiers;
/// Object definitions: the tagged union over object kinds.
pub mod object;
/// Attribute search expressions.
pub mod search;
/// Tags and tag updates.
pub mod tag;
/// Primitive and composite type descriptors.
pub mod typesystem;
/// Canonical metadata values.
pub mod value;

pub use api::*;
pub use identifiers::{ObjectCriteria, TagCriteria, TagHeader, TagSelector};
pub use object::{ObjectDefinition, ObjectType};
pub use search::{
    LogicalExpression, LogicalOperator, SearchExpression, SearchOperator, SearchParameters,
    SearchTerm,
};
pub use tag::{Tag, TagOperation, TagUpdate};
pub use typesystem::{BasicType, TypeDescriptor};
pub use value::Value;

/// Current metadata API version string embedded in platform info.
///
/// # Examples
///
/// ```
/// assert_eq!(trac_metadata::API_VERSION, "trac-meta/v1");
/// ```
pub const API_VERSION: &str = "trac-meta/v1";

use chrono::{DateTime, Timelike, Utc};

/// Truncate a timestamp to whole microseconds.
///
/// The store persists timestamps at microsecond precision; stamping through
/// this helper keeps in-memory headers identical to their stored form.
pub fn truncate_to_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.nanosecond();
    ts.with_nanosecond(nanos - nanos % 1_000).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncation_drops_sub_microsecond_digits() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(123_456_789);
        let truncated = truncate_to_micros(ts);
        assert_eq!(truncated.timestamp_subsec_nanos() % 1_000, 0);
        assert_eq!(truncated.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn truncation_is_idempotent() {
        let ts = Utc::now();
        assert_eq!(truncate_to_micros(truncate_to_micros(ts)), truncate_to_micros(ts));
    }
}
