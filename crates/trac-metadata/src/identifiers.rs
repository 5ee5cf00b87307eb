// SPDX-License-Identifier: Apache-2.0
//! Object identities: tag headers and selectors.
//!
//! A [`TagHeader`] names one row of catalog history; a [`TagSelector`] is a
//! reference that resolves to a unique (object, tag) at read time. Selectors
//! embedded in stored objects are always in fixed form (explicit object
//! version); the store normalises `latestObject` references before commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::object::ObjectType;

// ---------------------------------------------------------------------------
// TagHeader
// ---------------------------------------------------------------------------

/// Identity of one row in catalog history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagHeader {
    /// Object kind; fixed for the life of an object id.
    pub object_type: ObjectType,
    /// UUIDv4 object identifier.
    pub object_id: Uuid,
    /// Object version, a gap-free run starting at 1.
    pub object_version: u32,
    /// UTC time the object version was committed.
    pub object_timestamp: DateTime<Utc>,
    /// Whether this is the highest object version for the id.
    pub is_latest_object: bool,
    /// Tag version within the object version, starting at 1.
    pub tag_version: u32,
    /// UTC time the tag version was committed.
    pub tag_timestamp: DateTime<Utc>,
    /// Whether this is the highest tag version within the object version.
    pub is_latest_tag: bool,
}

impl TagHeader {
    /// A fixed selector naming exactly this (object version, tag version).
    pub fn to_selector(&self) -> TagSelector {
        TagSelector {
            object_type: self.object_type,
            object_id: self.object_id,
            object_criteria: ObjectCriteria::ObjectVersion(self.object_version),
            tag_criteria: TagCriteria::TagVersion(self.tag_version),
        }
    }
}

impl fmt::Display for TagHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} v{} t{}",
            self.object_type, self.object_id, self.object_version, self.tag_version
        )
    }
}

// ---------------------------------------------------------------------------
// Selector criteria
// ---------------------------------------------------------------------------

/// How a selector picks the object version. Exactly one alternative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObjectCriteria {
    /// The highest committed object version.
    LatestObject,
    /// An explicit object version.
    ObjectVersion(u32),
    /// The greatest version whose object timestamp is ≤ the given time.
    ObjectAsOf(DateTime<Utc>),
}

/// How a selector picks the tag version within the chosen object version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TagCriteria {
    /// The highest committed tag version.
    LatestTag,
    /// An explicit tag version.
    TagVersion(u32),
    /// The greatest tag version whose tag timestamp is ≤ the given time.
    TagAsOf(DateTime<Utc>),
}

// ---------------------------------------------------------------------------
// TagSelector
// ---------------------------------------------------------------------------

/// A reference that resolves to a unique (object, tag) at read time.
///
/// Object and tag criteria are chosen independently; `objectVersion=3` with
/// `latestTag` is a valid combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSelector {
    /// Declared object kind; must match the stored type on resolution.
    pub object_type: ObjectType,
    /// The object id being referenced.
    pub object_id: Uuid,
    /// Object version criterion.
    #[serde(rename = "object")]
    pub object_criteria: ObjectCriteria,
    /// Tag version criterion.
    #[serde(rename = "tag")]
    pub tag_criteria: TagCriteria,
}

impl TagSelector {
    /// Selector for the latest object version and latest tag.
    pub fn latest(object_type: ObjectType, object_id: Uuid) -> Self {
        Self {
            object_type,
            object_id,
            object_criteria: ObjectCriteria::LatestObject,
            tag_criteria: TagCriteria::LatestTag,
        }
    }

    /// Selector for an explicit object version with its latest tag.
    pub fn for_version(object_type: ObjectType, object_id: Uuid, version: u32) -> Self {
        Self {
            object_type,
            object_id,
            object_criteria: ObjectCriteria::ObjectVersion(version),
            tag_criteria: TagCriteria::LatestTag,
        }
    }

    /// Selector naming an exact (object version, tag version) pair.
    pub fn fixed(object_type: ObjectType, object_id: Uuid, version: u32, tag: u32) -> Self {
        Self {
            object_type,
            object_id,
            object_criteria: ObjectCriteria::ObjectVersion(version),
            tag_criteria: TagCriteria::TagVersion(tag),
        }
    }

    /// Whether the object criterion is an explicit version.
    ///
    /// Stored objects may only embed selectors for which this holds.
    pub fn has_fixed_object_version(&self) -> bool {
        matches!(self.object_criteria, ObjectCriteria::ObjectVersion(_))
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.object_type, self.object_id)?;
        match &self.object_criteria {
            ObjectCriteria::LatestObject => write!(f, " v=latest")?,
            ObjectCriteria::ObjectVersion(v) => write!(f, " v{v}")?,
            ObjectCriteria::ObjectAsOf(ts) => write!(f, " v@{ts}")?,
        }
        match &self.tag_criteria {
            TagCriteria::LatestTag => write!(f, " t=latest"),
            TagCriteria::TagVersion(t) => write!(f, " t{t}"),
            TagCriteria::TagAsOf(ts) => write!(f, " t@{ts}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> TagHeader {
        TagHeader {
            object_type: ObjectType::Data,
            object_id: Uuid::new_v4(),
            object_version: 3,
            object_timestamp: Utc::now(),
            is_latest_object: true,
            tag_version: 2,
            tag_timestamp: Utc::now(),
            is_latest_tag: true,
        }
    }

    #[test]
    fn header_to_selector_is_fixed() {
        let h = header();
        let sel = h.to_selector();
        assert_eq!(sel.object_id, h.object_id);
        assert_eq!(sel.object_criteria, ObjectCriteria::ObjectVersion(3));
        assert_eq!(sel.tag_criteria, TagCriteria::TagVersion(2));
        assert!(sel.has_fixed_object_version());
    }

    #[test]
    fn latest_selector_is_not_fixed() {
        let sel = TagSelector::latest(ObjectType::Schema, Uuid::new_v4());
        assert!(!sel.has_fixed_object_version());
    }

    #[test]
    fn selector_serde_roundtrip() {
        let sel = TagSelector::for_version(ObjectType::Model, Uuid::new_v4(), 7);
        let json = serde_json::to_string(&sel).unwrap();
        assert!(json.contains(r#""objectVersion":7"#));
        assert!(json.contains(r#""latestTag""#));
        let back: TagSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sel);
    }

    #[test]
    fn as_of_criteria_roundtrip() {
        let sel = TagSelector {
            object_type: ObjectType::Flow,
            object_id: Uuid::new_v4(),
            object_criteria: ObjectCriteria::ObjectAsOf(Utc::now()),
            tag_criteria: TagCriteria::TagAsOf(Utc::now()),
        };
        let json = serde_json::to_string(&sel).unwrap();
        let back: TagSelector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sel);
    }

    #[test]
    fn header_display_names_versions() {
        let h = header();
        let s = h.to_string();
        assert!(s.contains("v3"));
        assert!(s.contains("t2"));
    }
}
