// SPDX-License-Identifier: Apache-2.0
//! Controlled (`trac_*`) attribute names and stamping.
//!
//! The `trac_` prefix is owned by the platform. This module is the single
//! source of truth for that rule: validation rejects user updates that touch
//! controlled names, and the write service stamps them here, after user
//! updates, so user code can never overwrite them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::codec::format_datetime;
use crate::value::Value;

/// Prefix reserved for platform-controlled attributes.
pub const TRAC_PREFIX: &str = "trac_";

/// Creation timestamp of the object (stamped once, at v1).
pub const ATTR_CREATE_TIME: &str = "trac_create_time";
/// User id of the creating principal.
pub const ATTR_CREATE_USER_ID: &str = "trac_create_user_id";
/// Display name of the creating principal.
pub const ATTR_CREATE_USER_NAME: &str = "trac_create_user_name";
/// Timestamp of the most recent object or tag update.
pub const ATTR_UPDATE_TIME: &str = "trac_update_time";
/// User id of the most recent updating principal.
pub const ATTR_UPDATE_USER_ID: &str = "trac_update_user_id";
/// Display name of the most recent updating principal.
pub const ATTR_UPDATE_USER_NAME: &str = "trac_update_user_name";

/// The principal a mutation is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
}

impl UserInfo {
    /// Principal used when no identity headers are supplied.
    pub fn anonymous() -> Self {
        Self {
            user_id: "anonymous".to_string(),
            user_name: "Anonymous".to_string(),
        }
    }
}

/// Whether an attribute name is in the controlled namespace.
pub fn is_controlled_name(name: &str) -> bool {
    name.starts_with(TRAC_PREFIX)
}

/// Stamp the full controlled set on a freshly created object.
///
/// Applied after user tag updates; overwrites anything a trusted caller may
/// have staged under these names.
pub fn stamp_create_attrs(
    attrs: &mut BTreeMap<String, Value>,
    user: &UserInfo,
    timestamp: DateTime<Utc>,
) {
    let time = Value::String(format_datetime(&timestamp));
    attrs.insert(ATTR_CREATE_TIME.to_string(), time.clone());
    attrs.insert(
        ATTR_CREATE_USER_ID.to_string(),
        Value::String(user.user_id.clone()),
    );
    attrs.insert(
        ATTR_CREATE_USER_NAME.to_string(),
        Value::String(user.user_name.clone()),
    );
    stamp_update_attrs(attrs, user, timestamp);
}

/// Refresh the `trac_update_*` trio on an object or tag update.
pub fn stamp_update_attrs(
    attrs: &mut BTreeMap<String, Value>,
    user: &UserInfo,
    timestamp: DateTime<Utc>,
) {
    attrs.insert(
        ATTR_UPDATE_TIME.to_string(),
        Value::String(format_datetime(&timestamp)),
    );
    attrs.insert(
        ATTR_UPDATE_USER_ID.to_string(),
        Value::String(user.user_id.clone()),
    );
    attrs.insert(
        ATTR_UPDATE_USER_NAME.to_string(),
        Value::String(user.user_name.clone()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jane() -> UserInfo {
        UserInfo {
            user_id: "jane.doe".to_string(),
            user_name: "Jane Doe".to_string(),
        }
    }

    #[test]
    fn controlled_names_are_detected() {
        assert!(is_controlled_name("trac_create_time"));
        assert!(is_controlled_name("trac_anything"));
        assert!(!is_controlled_name("region"));
        assert!(!is_controlled_name("tracker"));
    }

    #[test]
    fn create_stamps_all_six() {
        let mut attrs = BTreeMap::new();
        stamp_create_attrs(&mut attrs, &jane(), Utc::now());
        for name in [
            ATTR_CREATE_TIME,
            ATTR_CREATE_USER_ID,
            ATTR_CREATE_USER_NAME,
            ATTR_UPDATE_TIME,
            ATTR_UPDATE_USER_ID,
            ATTR_UPDATE_USER_NAME,
        ] {
            assert!(attrs.contains_key(name), "missing {name}");
        }
        assert_eq!(
            attrs[ATTR_CREATE_USER_ID],
            Value::String("jane.doe".to_string())
        );
    }

    #[test]
    fn update_refreshes_only_the_update_trio() {
        let mut attrs = BTreeMap::new();
        let t0 = Utc::now();
        stamp_create_attrs(&mut attrs, &jane(), t0);

        let other = UserInfo {
            user_id: "sam.smith".to_string(),
            user_name: "Sam Smith".to_string(),
        };
        let t1 = t0 + chrono::Duration::seconds(10);
        stamp_update_attrs(&mut attrs, &other, t1);

        assert_eq!(
            attrs[ATTR_CREATE_USER_ID],
            Value::String("jane.doe".to_string())
        );
        assert_eq!(
            attrs[ATTR_UPDATE_USER_ID],
            Value::String("sam.smith".to_string())
        );
        assert_eq!(
            attrs[ATTR_UPDATE_TIME],
            Value::String(format_datetime(&t1))
        );
    }

    #[test]
    fn stamping_overwrites_staged_values() {
        let mut attrs = BTreeMap::new();
        attrs.insert(
            ATTR_CREATE_USER_ID.to_string(),
            Value::String("mallory".to_string()),
        );
        stamp_create_attrs(&mut attrs, &jane(), Utc::now());
        assert_eq!(
            attrs[ATTR_CREATE_USER_ID],
            Value::String("jane.doe".to_string())
        );
    }
}
