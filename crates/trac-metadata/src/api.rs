// SPDX-License-Identifier: Apache-2.0
//! API request and response shapes for the metadata services.
//!
//! These are the wire messages of the public and trusted metadata APIs. The
//! request-validation interceptor resolves its registered validator from the
//! method these shapes travel with; the shapes themselves stay dumb.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::identifiers::{TagHeader, TagSelector};
use crate::object::{ObjectDefinition, ObjectType};
use crate::search::SearchParameters;
use crate::tag::{Tag, TagUpdate};

pub use crate::attrs::UserInfo;

// ---------------------------------------------------------------------------
// Method names
// ---------------------------------------------------------------------------

/// The public and trusted metadata API methods.
///
/// Static validators are registered per method; the interceptor resolves the
/// method from the route before the service ever sees the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetadataMethod {
    /// Create a new object (v1, t1).
    CreateObject,
    /// Batched `createObject`.
    CreateObjectBatch,
    /// Create a new version of an existing object.
    UpdateObject,
    /// Batched `updateObject`.
    UpdateObjectBatch,
    /// Create a new tag on an existing object version.
    UpdateTag,
    /// Batched `updateTag`.
    UpdateTagBatch,
    /// Read one object by selector.
    ReadObject,
    /// Read many objects by selector, positionally.
    ReadBatch,
    /// Search tag attributes.
    Search,
    /// Reserve object ids without committing a first version. Trusted only.
    PreallocateId,
    /// Batched `preallocateId`. Trusted only.
    PreallocateIdBatch,
    /// Commit the first version of a preallocated id. Trusted only.
    CreatePreallocatedObject,
    /// Batched `createPreallocatedObject`. Trusted only.
    CreatePreallocatedObjectBatch,
    /// The four-slot universal write batch.
    WriteBatch,
    /// Platform information.
    PlatformInfo,
    /// Tenant listing.
    ListTenants,
    /// Resource listing.
    ListResources,
    /// Public properties of one resource.
    ResourceInfo,
}

impl MetadataMethod {
    /// Whether the method is only reachable through the trusted API.
    pub fn is_trusted_only(&self) -> bool {
        matches!(
            self,
            Self::PreallocateId
                | Self::PreallocateIdBatch
                | Self::CreatePreallocatedObject
                | Self::CreatePreallocatedObjectBatch
        )
    }
}

impl fmt::Display for MetadataMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateObject => "createObject",
            Self::CreateObjectBatch => "createObjectBatch",
            Self::UpdateObject => "updateObject",
            Self::UpdateObjectBatch => "updateObjectBatch",
            Self::UpdateTag => "updateTag",
            Self::UpdateTagBatch => "updateTagBatch",
            Self::ReadObject => "readObject",
            Self::ReadBatch => "readBatch",
            Self::Search => "search",
            Self::PreallocateId => "preallocateId",
            Self::PreallocateIdBatch => "preallocateIdBatch",
            Self::CreatePreallocatedObject => "createPreallocatedObject",
            Self::CreatePreallocatedObjectBatch => "createPreallocatedObjectBatch",
            Self::WriteBatch => "writeBatch",
            Self::PlatformInfo => "platformInfo",
            Self::ListTenants => "listTenants",
            Self::ListResources => "listResources",
            Self::ResourceInfo => "resourceInfo",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Write requests
// ---------------------------------------------------------------------------

/// One metadata mutation.
///
/// The same shape serves all write methods; which fields must be present
/// depends on the method and is enforced by its registered validator:
///
/// * `createObject` — definition, no prior version.
/// * `updateObject` — definition and prior version.
/// * `updateTag` — prior version, no definition.
/// * `preallocateId` — object type only.
/// * `createPreallocatedObject` — definition and the preallocated prior
///   version selector (object version 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataWriteRequest {
    /// Tenant the mutation belongs to.
    pub tenant: String,
    /// Declared object type.
    pub object_type: ObjectType,
    /// The version being built on, where the method requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_version: Option<TagSelector>,
    /// The new definition, where the method requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<ObjectDefinition>,
    /// Attribute mutations, applied in order before controlled stamping.
    #[serde(default)]
    pub tag_updates: Vec<TagUpdate>,
}

/// A homogeneous batch: many requests for one write method, committed as
/// one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataWriteBatchRequest {
    /// Tenant the batch belongs to.
    pub tenant: String,
    /// The individual requests, answered positionally.
    #[serde(default)]
    pub requests: Vec<MetadataWriteRequest>,
}

/// Headers produced by a homogeneous batch, positionally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataWriteBatchResponse {
    /// One header per request, in request order.
    pub headers: Vec<TagHeader>,
}

/// The universal write batch: four slots executed as one transaction, in
/// the order preallocate, create, update-object, update-tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversalMetadataWriteBatchRequest {
    /// Tenant the batch belongs to.
    pub tenant: String,
    /// Ids to reserve.
    #[serde(default)]
    pub preallocate_ids: Vec<MetadataWriteRequest>,
    /// Objects to create (including preallocated creations, which carry a
    /// prior version selector naming the reserved id).
    #[serde(default)]
    pub create_objects: Vec<MetadataWriteRequest>,
    /// New versions of existing objects.
    #[serde(default)]
    pub update_objects: Vec<MetadataWriteRequest>,
    /// New tags on existing object versions.
    #[serde(default)]
    pub update_tags: Vec<MetadataWriteRequest>,
}

impl UniversalMetadataWriteBatchRequest {
    /// An empty batch for the given tenant.
    pub fn for_tenant(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            preallocate_ids: Vec::new(),
            create_objects: Vec::new(),
            update_objects: Vec::new(),
            update_tags: Vec::new(),
        }
    }

    /// Whether every slot is empty.
    pub fn is_empty(&self) -> bool {
        self.preallocate_ids.is_empty()
            && self.create_objects.is_empty()
            && self.update_objects.is_empty()
            && self.update_tags.is_empty()
    }
}

/// Headers produced by one batch, positionally per slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UniversalMetadataWriteBatchResponse {
    /// Reserved ids, as headers with object version 0.
    #[serde(default)]
    pub preallocate_ids: Vec<TagHeader>,
    /// Headers of created objects.
    #[serde(default)]
    pub create_objects: Vec<TagHeader>,
    /// Headers of new object versions.
    #[serde(default)]
    pub update_objects: Vec<TagHeader>,
    /// Headers of new tags.
    #[serde(default)]
    pub update_tags: Vec<TagHeader>,
}

// ---------------------------------------------------------------------------
// Read requests
// ---------------------------------------------------------------------------

/// Read one object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataReadRequest {
    /// Tenant to read from.
    pub tenant: String,
    /// What to read.
    pub selector: TagSelector,
}

/// Read many objects; the response preserves input order and the whole call
/// fails if any selector fails to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBatchRequest {
    /// Tenant to read from.
    pub tenant: String,
    /// Selectors, resolved positionally.
    pub selectors: Vec<TagSelector>,
}

/// Result of a batch read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataBatchResponse {
    /// Resolved tags in request order.
    pub tags: Vec<Tag>,
}

/// Search tag attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearchRequest {
    /// Tenant to search in.
    pub tenant: String,
    /// The search.
    pub search_params: SearchParameters,
}

/// Result of a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataSearchResponse {
    /// Matching tags ordered by (objectId, objectVersion, tagVersion);
    /// definitions are omitted.
    pub search_results: Vec<Tag>,
}

// ---------------------------------------------------------------------------
// Introspection responses
// ---------------------------------------------------------------------------

/// Platform identity and deployment information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformInfoResponse {
    /// Environment name, e.g. `"PRODUCTION"` or `"SANDBOX"`.
    pub environment: String,
    /// Whether this deployment is production.
    pub production: bool,
    /// Metadata API version string.
    pub api_version: String,
    /// Free-form deployment details.
    #[serde(default)]
    pub deployment_info: BTreeMap<String, String>,
}

/// One tenant visible to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantInfo {
    /// Tenant code.
    pub tenant_code: String,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
}

/// Result of `listTenants`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTenantsResponse {
    /// Known tenants.
    pub tenants: Vec<TenantInfo>,
}

/// Public view of one platform resource. Secrets and non-public properties
/// are never present in this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceInfoResponse {
    /// Resource key in the configuration.
    pub resource_name: String,
    /// Resource kind, e.g. `"MODEL_REPOSITORY"`.
    pub resource_type: String,
    /// Access protocol.
    pub protocol: String,
    /// Properties safe to expose to any client.
    #[serde(default)]
    pub public_properties: BTreeMap<String, String>,
}

/// Result of `listResources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResourcesResponse {
    /// Public views of the configured resources.
    pub resources: Vec<ResourceInfoResponse>,
}
