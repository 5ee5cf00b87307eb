// SPDX-License-Identifier: Apache-2.0
//! The metadata write service.
//!
//! Orchestrates mutations as four-slot batches: preallocate, create,
//! update-object, update-tag, committed in one store transaction. The
//! single-object methods are one-slot batches, so every write path shares
//! the same semantics: one batch timestamp for every row, controlled
//! attributes stamped after user updates, embedded selectors normalised to
//! fixed form, version validation against the loaded prior, and no retry
//! when a concurrent writer wins — the duplicate / superseded failure goes
//! straight back to the caller.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use trac_error::{ErrorKind, TracError};
use trac_metadata::api::{
    MetadataWriteBatchRequest, MetadataWriteRequest, UniversalMetadataWriteBatchRequest,
    UniversalMetadataWriteBatchResponse, UserInfo,
};
use trac_metadata::attrs::{stamp_create_attrs, stamp_update_attrs};
use trac_metadata::identifiers::{ObjectCriteria, TagHeader, TagSelector};
use trac_metadata::object::ObjectDefinition;
use trac_metadata::tag::{Tag, apply_tag_updates};
use trac_metadata::truncate_to_micros;
use trac_store::{MetadataStore, WriteBatch};
use trac_validation::consistency::batch_reference_cycles;
use trac_validation::{MetadataBundle, ValidationContext, validate_version};

/// The write service.
#[derive(Debug, Clone)]
pub struct MetadataWriteService {
    store: MetadataStore,
}

impl MetadataWriteService {
    /// Create a write service over a store.
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    /// Create a new object (v1, t1).
    pub async fn create_object(
        &self,
        user: &UserInfo,
        request: MetadataWriteRequest,
    ) -> Result<TagHeader, TracError> {
        let tenant = request.tenant.clone();
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(tenant);
        batch.create_objects.push(request);
        let response = self.write_batch(user, batch).await?;
        single(response.create_objects)
    }

    /// Create a new version of an existing object.
    pub async fn update_object(
        &self,
        user: &UserInfo,
        request: MetadataWriteRequest,
    ) -> Result<TagHeader, TracError> {
        let tenant = request.tenant.clone();
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(tenant);
        batch.update_objects.push(request);
        let response = self.write_batch(user, batch).await?;
        single(response.update_objects)
    }

    /// Create a new tag on an existing object version.
    pub async fn update_tag(
        &self,
        user: &UserInfo,
        request: MetadataWriteRequest,
    ) -> Result<TagHeader, TracError> {
        let tenant = request.tenant.clone();
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(tenant);
        batch.update_tags.push(request);
        let response = self.write_batch(user, batch).await?;
        single(response.update_tags)
    }

    /// Reserve one object id. Trusted API only.
    pub async fn preallocate_id(
        &self,
        user: &UserInfo,
        request: MetadataWriteRequest,
    ) -> Result<TagHeader, TracError> {
        let tenant = request.tenant.clone();
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(tenant);
        batch.preallocate_ids.push(request);
        let response = self.write_batch(user, batch).await?;
        single(response.preallocate_ids)
    }

    /// Commit the first version of a preallocated id. Trusted API only.
    pub async fn create_preallocated_object(
        &self,
        user: &UserInfo,
        request: MetadataWriteRequest,
    ) -> Result<TagHeader, TracError> {
        let tenant = request.tenant.clone();
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(tenant);
        batch.create_objects.push(request);
        let response = self.write_batch(user, batch).await?;
        single(response.create_objects)
    }

    /// Batched `createObject`: one transaction, headers in request order.
    pub async fn create_object_batch(
        &self,
        user: &UserInfo,
        request: MetadataWriteBatchRequest,
    ) -> Result<Vec<TagHeader>, TracError> {
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(request.tenant);
        batch.create_objects = request.requests;
        Ok(self.write_batch(user, batch).await?.create_objects)
    }

    /// Batched `updateObject`.
    pub async fn update_object_batch(
        &self,
        user: &UserInfo,
        request: MetadataWriteBatchRequest,
    ) -> Result<Vec<TagHeader>, TracError> {
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(request.tenant);
        batch.update_objects = request.requests;
        Ok(self.write_batch(user, batch).await?.update_objects)
    }

    /// Batched `updateTag`.
    pub async fn update_tag_batch(
        &self,
        user: &UserInfo,
        request: MetadataWriteBatchRequest,
    ) -> Result<Vec<TagHeader>, TracError> {
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(request.tenant);
        batch.update_tags = request.requests;
        Ok(self.write_batch(user, batch).await?.update_tags)
    }

    /// Batched `preallocateId`. Trusted API only.
    pub async fn preallocate_id_batch(
        &self,
        user: &UserInfo,
        request: MetadataWriteBatchRequest,
    ) -> Result<Vec<TagHeader>, TracError> {
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(request.tenant);
        batch.preallocate_ids = request.requests;
        Ok(self.write_batch(user, batch).await?.preallocate_ids)
    }

    /// Batched `createPreallocatedObject`. Trusted API only.
    pub async fn create_preallocated_object_batch(
        &self,
        user: &UserInfo,
        request: MetadataWriteBatchRequest,
    ) -> Result<Vec<TagHeader>, TracError> {
        let mut batch = UniversalMetadataWriteBatchRequest::for_tenant(request.tenant);
        batch.create_objects = request.requests;
        Ok(self.write_batch(user, batch).await?.create_objects)
    }

    /// Execute a universal write batch.
    ///
    /// Slots run in order — preallocate, create, update-object, update-tag
    /// — and commit in one transaction; any failure aborts the whole
    /// batch. The response carries headers positionally per slot.
    pub async fn write_batch(
        &self,
        user: &UserInfo,
        request: UniversalMetadataWriteBatchRequest,
    ) -> Result<UniversalMetadataWriteBatchResponse, TracError> {
        let tenant = request.tenant.clone();
        let batch_time = truncate_to_micros(Utc::now());

        let mut response = UniversalMetadataWriteBatchResponse::default();
        let mut store_batch = WriteBatch::default();

        // The bundle accumulates every header this batch will produce, so
        // later slots (and sibling entries) can reference earlier ones
        // without a store round-trip.
        let mut bundle = MetadataBundle::new();
        // New-object reference edges, for batch cycle detection.
        let mut batch_refs: HashMap<Uuid, Vec<Uuid>> = HashMap::new();

        // -- Slot 1: preallocate ----------------------------------------

        for entry in &request.preallocate_ids {
            let object_id = Uuid::new_v4();
            store_batch
                .preallocations
                .push((entry.object_type, object_id));
            response
                .preallocate_ids
                .push(reserved_header(entry, object_id, batch_time));
        }

        // -- Slot 2: create ---------------------------------------------

        struct PendingCreate {
            definition: ObjectDefinition,
            attributes: std::collections::BTreeMap<String, trac_metadata::Value>,
            header: TagHeader,
            preallocated: bool,
        }

        let mut creates = Vec::new();
        for entry in &request.create_objects {
            let definition = required_definition(entry)?;
            let (object_id, preallocated) = match &entry.prior_version {
                Some(prior) => (prior.object_id, true),
                None => (Uuid::new_v4(), false),
            };

            let attributes = apply_updates(&Default::default(), entry)?;
            let header = new_header(entry, object_id, 1, batch_time);

            bundle.add(object_id, entry.object_type, 1);
            batch_refs.insert(object_id, referenced_ids(&definition));
            creates.push(PendingCreate {
                definition: definition.clone(),
                attributes,
                header,
                preallocated,
            });
        }

        // -- Slot 3: update-object --------------------------------------

        struct PendingVersion {
            definition: ObjectDefinition,
            attributes: std::collections::BTreeMap<String, trac_metadata::Value>,
            header: TagHeader,
        }

        let mut versions = Vec::new();
        for entry in &request.update_objects {
            let definition = required_definition(entry)?;
            let prior_selector = required_prior(entry)?;
            let prior = self
                .store
                .load_object(request.tenant.as_str(), prior_selector.clone())
                .await?;

            let prior_definition = prior.definition.as_ref().ok_or_else(|| {
                TracError::new(ErrorKind::Internal, "prior version has no stored definition")
            })?;
            validate_version(entry.object_type, definition, prior_definition)?;

            let attributes = apply_updates(&prior.attributes, entry)?;
            let header = new_header(
                entry,
                prior.header.object_id,
                prior.header.object_version + 1,
                batch_time,
            );

            bundle.add(
                prior.header.object_id,
                entry.object_type,
                header.object_version,
            );
            batch_refs.insert(prior.header.object_id, referenced_ids(definition));
            versions.push(PendingVersion {
                definition: definition.clone(),
                attributes,
                header,
            });
        }

        // -- Slot 4: update-tag -----------------------------------------

        for entry in &request.update_tags {
            let prior_selector = required_prior(entry)?;
            let prior = self
                .store
                .load_object(request.tenant.as_str(), prior_selector.clone())
                .await?;

            let mut attributes = apply_updates(&prior.attributes, entry)?;
            stamp_update_attrs(&mut attributes, user, batch_time);

            let mut header = prior.header.clone();
            header.tag_version += 1;
            header.tag_timestamp = batch_time;
            header.is_latest_tag = true;

            response.update_tags.push(header.clone());
            store_batch.new_tags.push(Tag {
                header,
                definition: None,
                attributes,
            });
        }

        // -- Reference normalisation and consistency --------------------

        let mut cycle_ctx = ValidationContext::for_consistency();
        batch_reference_cycles(&mut cycle_ctx, &batch_refs);
        cycle_ctx.finish()?;

        for pending in &mut creates {
            self.normalise_references(&tenant, &mut pending.definition, &bundle)
                .await?;
        }
        for pending in &mut versions {
            self.normalise_references(&tenant, &mut pending.definition, &bundle)
                .await?;
        }

        // -- Controlled attributes and store rows -----------------------

        for pending in creates {
            let mut attributes = pending.attributes;
            stamp_create_attrs(&mut attributes, user, batch_time);
            response.create_objects.push(pending.header.clone());
            let tag = Tag {
                header: pending.header,
                definition: Some(pending.definition),
                attributes,
            };
            if pending.preallocated {
                store_batch.preallocated_objects.push(tag);
            } else {
                store_batch.new_objects.push(tag);
            }
        }

        for pending in versions {
            let mut attributes = pending.attributes;
            stamp_update_attrs(&mut attributes, user, batch_time);
            response.update_objects.push(pending.header.clone());
            store_batch.new_versions.push(Tag {
                header: pending.header,
                definition: Some(pending.definition),
                attributes,
            });
        }

        // -- Commit ------------------------------------------------------

        self.store.write_batch(request.tenant.as_str(), store_batch).await?;

        info!(
            tenant = %request.tenant,
            user = %user.user_id,
            preallocated = response.preallocate_ids.len(),
            created = response.create_objects.len(),
            updated = response.update_objects.len(),
            retagged = response.update_tags.len(),
            "write batch committed"
        );

        Ok(response)
    }

    /// Normalise every embedded selector to fixed form, resolving against
    /// the batch bundle first and the store for everything else.
    async fn normalise_references(
        &self,
        tenant: &str,
        definition: &mut ObjectDefinition,
        bundle: &MetadataBundle,
    ) -> Result<(), TracError> {
        for selector in definition.embedded_selectors_mut() {
            let fixed_version = match bundle.resolve(selector) {
                Some(version) => version,
                None if bundle.get(&selector.object_id).is_some() => {
                    return Err(reference_error(selector));
                }
                None => {
                    match self
                        .store
                        .resolve_object_version(tenant, selector.clone())
                        .await
                    {
                        Ok(version) => version,
                        Err(e)
                            if matches!(e.kind, ErrorKind::NotFound | ErrorKind::WrongType) =>
                        {
                            return Err(reference_error(selector));
                        }
                        Err(e) => return Err(e),
                    }
                }
            };
            selector.object_criteria = ObjectCriteria::ObjectVersion(fixed_version);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn single(mut headers: Vec<TagHeader>) -> Result<TagHeader, TracError> {
    headers.pop().ok_or_else(|| {
        TracError::new(ErrorKind::Internal, "write batch returned no header for its slot")
    })
}

fn required_definition(entry: &MetadataWriteRequest) -> Result<&ObjectDefinition, TracError> {
    entry.definition.as_ref().ok_or_else(|| {
        TracError::new(
            ErrorKind::Internal,
            "write entry without a definition survived validation",
        )
    })
}

fn required_prior(entry: &MetadataWriteRequest) -> Result<&TagSelector, TracError> {
    entry.prior_version.as_ref().ok_or_else(|| {
        TracError::new(
            ErrorKind::Internal,
            "write entry without a prior version survived validation",
        )
    })
}

fn apply_updates(
    prior: &std::collections::BTreeMap<String, trac_metadata::Value>,
    entry: &MetadataWriteRequest,
) -> Result<std::collections::BTreeMap<String, trac_metadata::Value>, TracError> {
    apply_tag_updates(prior, &entry.tag_updates).map_err(|e| {
        TracError::new(ErrorKind::ConsistencyValidation, "tag updates failed to apply")
            .with_detail(format!("tagUpdates.{}", e.index), e.message)
    })
}

fn new_header(
    entry: &MetadataWriteRequest,
    object_id: Uuid,
    object_version: u32,
    batch_time: DateTime<Utc>,
) -> TagHeader {
    TagHeader {
        object_type: entry.object_type,
        object_id,
        object_version,
        object_timestamp: batch_time,
        is_latest_object: true,
        tag_version: 1,
        tag_timestamp: batch_time,
        is_latest_tag: true,
    }
}

/// Header for a reserved id: version 0 marks "no v1 row yet".
fn reserved_header(
    entry: &MetadataWriteRequest,
    object_id: Uuid,
    batch_time: DateTime<Utc>,
) -> TagHeader {
    TagHeader {
        object_type: entry.object_type,
        object_id,
        object_version: 0,
        object_timestamp: batch_time,
        is_latest_object: false,
        tag_version: 0,
        tag_timestamp: batch_time,
        is_latest_tag: false,
    }
}

fn referenced_ids(definition: &ObjectDefinition) -> Vec<Uuid> {
    definition
        .embedded_selectors()
        .iter()
        .map(|s| s.object_id)
        .collect()
}

fn reference_error(selector: &TagSelector) -> TracError {
    TracError::new(
        ErrorKind::ConsistencyValidation,
        "object references do not resolve",
    )
    .with_detail(
        "definition",
        format!(
            "reference to {} {} does not resolve",
            selector.object_type, selector.object_id
        ),
    )
}
