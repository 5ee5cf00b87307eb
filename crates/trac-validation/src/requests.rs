// SPDX-License-Identifier: Apache-2.0
//! Static validation of API requests, one validator per method.
//!
//! These run in the request-validation interceptor before any service code.
//! The same write-request shape serves several methods; which fields must
//! be present (and which must be absent) is decided here, per method.

use trac_metadata::api::{
    MetadataBatchRequest, MetadataReadRequest, MetadataSearchRequest, MetadataWriteBatchRequest,
    MetadataWriteRequest, UniversalMetadataWriteBatchRequest,
};
use trac_metadata::identifiers::ObjectCriteria;
use trac_metadata::search::{LogicalOperator, SearchExpression, SearchTerm};
use trac_metadata::tag::{TagOperation, TagUpdate};
use trac_metadata::typesystem::BasicType;
use trac_metadata::value::Value;

use crate::checks;
use crate::context::ValidationContext;
use crate::definitions;

/// Which API surface a request arrived on. The trusted surface may stage
/// controlled attributes; the public surface may not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiSurface {
    /// The public metadata API.
    Public,
    /// The trusted metadata API, used by other platform services.
    Trusted,
}

fn tenant_code(ctx: &mut ValidationContext, tenant: &str) {
    ctx.push("tenant");
    ctx.apply(checks::non_empty, tenant);
    ctx.apply(checks::identifier, tenant);
    ctx.pop();
}

// ---------------------------------------------------------------------------
// Tag updates
// ---------------------------------------------------------------------------

/// One tag update: operation-aware presence rules, identifier checks and
/// the reserved-namespace rule for the public API.
pub fn tag_update(ctx: &mut ValidationContext, update: &TagUpdate, surface: ApiSurface) {
    if update.operation == TagOperation::ClearAllAttr {
        ctx.push("attrName");
        ctx.omitted(update.attr_name.as_ref(), "attribute name");
        ctx.pop();
        ctx.push("value");
        ctx.omitted(update.value.as_ref(), "attribute value");
        ctx.pop();
        return;
    }

    ctx.push("attrName");
    if let Some(name) = ctx.required(update.attr_name.as_deref(), "attribute name") {
        ctx.apply(checks::non_empty, name);
        ctx.apply(checks::identifier, name);
        if surface == ApiSurface::Public {
            ctx.apply(checks::not_trac_reserved, name);
        }
    }
    ctx.pop();

    ctx.push("value");
    match update.operation {
        TagOperation::DeleteAttr => {
            ctx.omitted(update.value.as_ref(), "attribute value");
        }
        _ => {
            if let Some(value) = ctx.required(update.value.as_ref(), "attribute value") {
                ctx.apply(checks::primitive_value, value);
            }
        }
    }
    ctx.pop();
}

fn tag_updates(ctx: &mut ValidationContext, updates: &[TagUpdate], surface: ApiSurface) {
    ctx.push("tagUpdates");
    for (index, update) in updates.iter().enumerate() {
        ctx.push_index(index);
        tag_update(ctx, update, surface);
        ctx.pop();
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// Write methods
// ---------------------------------------------------------------------------

/// `createObject`: definition required, no prior version.
pub fn create_object(
    ctx: &mut ValidationContext,
    request: &MetadataWriteRequest,
    surface: ApiSurface,
) {
    tenant_code(ctx, &request.tenant);

    ctx.push("priorVersion");
    ctx.omitted(request.prior_version.as_ref(), "prior version");
    ctx.pop();

    ctx.push("definition");
    if let Some(definition) = ctx.required(request.definition.as_ref(), "definition") {
        ctx.apply(
            |ctx, def| definitions::object_definition(ctx, request.object_type, def),
            definition,
        );
    }
    ctx.pop();

    tag_updates(ctx, &request.tag_updates, surface);
}

/// `updateObject`: definition and prior version both required.
pub fn update_object(
    ctx: &mut ValidationContext,
    request: &MetadataWriteRequest,
    surface: ApiSurface,
) {
    tenant_code(ctx, &request.tenant);

    ctx.push("priorVersion");
    if let Some(prior) = ctx.required(request.prior_version.as_ref(), "prior version") {
        ctx.apply(definitions::tag_selector, prior);
        if ctx.is_active() && prior.object_type != request.object_type {
            ctx.error(format!(
                "prior version is a {} selector but the request declares {}",
                prior.object_type, request.object_type
            ));
        }
    }
    ctx.pop();

    ctx.push("definition");
    if let Some(definition) = ctx.required(request.definition.as_ref(), "definition") {
        ctx.apply(
            |ctx, def| definitions::object_definition(ctx, request.object_type, def),
            definition,
        );
    }
    ctx.pop();

    tag_updates(ctx, &request.tag_updates, surface);
}

/// `updateTag`: prior version required, definition must be absent.
pub fn update_tag(
    ctx: &mut ValidationContext,
    request: &MetadataWriteRequest,
    surface: ApiSurface,
) {
    tenant_code(ctx, &request.tenant);

    ctx.push("priorVersion");
    if let Some(prior) = ctx.required(request.prior_version.as_ref(), "prior version") {
        ctx.apply(definitions::tag_selector, prior);
        if ctx.is_active() && prior.object_type != request.object_type {
            ctx.error(format!(
                "prior version is a {} selector but the request declares {}",
                prior.object_type, request.object_type
            ));
        }
    }
    ctx.pop();

    ctx.push("definition");
    ctx.omitted(request.definition.as_ref(), "definition");
    ctx.pop();

    tag_updates(ctx, &request.tag_updates, surface);
}

/// `preallocateId`: an object type and nothing else.
pub fn preallocate_id(ctx: &mut ValidationContext, request: &MetadataWriteRequest) {
    tenant_code(ctx, &request.tenant);

    ctx.push("priorVersion");
    ctx.omitted(request.prior_version.as_ref(), "prior version");
    ctx.pop();

    ctx.push("definition");
    ctx.omitted(request.definition.as_ref(), "definition");
    ctx.pop();

    ctx.push("tagUpdates");
    if ctx.is_active() && !request.tag_updates.is_empty() {
        ctx.error("tag updates must not be specified");
    }
    ctx.pop();
}

/// `createPreallocatedObject`: like create, but the prior version selector
/// names the reserved id with object version 0.
pub fn create_preallocated_object(
    ctx: &mut ValidationContext,
    request: &MetadataWriteRequest,
    surface: ApiSurface,
) {
    tenant_code(ctx, &request.tenant);

    ctx.push("priorVersion");
    if let Some(prior) = ctx.required(request.prior_version.as_ref(), "prior version") {
        if prior.object_type != request.object_type {
            ctx.error(format!(
                "prior version is a {} selector but the request declares {}",
                prior.object_type, request.object_type
            ));
        } else if prior.object_criteria != ObjectCriteria::ObjectVersion(0) {
            ctx.error("prior version of a preallocated object must be object version 0");
        }
    }
    ctx.pop();

    ctx.push("definition");
    if let Some(definition) = ctx.required(request.definition.as_ref(), "definition") {
        ctx.apply(
            |ctx, def| definitions::object_definition(ctx, request.object_type, def),
            definition,
        );
    }
    ctx.pop();

    tag_updates(ctx, &request.tag_updates, surface);
}

fn homogeneous_batch(
    ctx: &mut ValidationContext,
    request: &MetadataWriteBatchRequest,
    mut validate_entry: impl FnMut(&mut ValidationContext, &MetadataWriteRequest),
) {
    tenant_code(ctx, &request.tenant);
    ctx.push("requests");
    ctx.apply(checks::list_not_empty, request.requests.as_slice());
    for (index, entry) in request.requests.iter().enumerate() {
        ctx.push_index(index);
        if entry.tenant != request.tenant {
            ctx.push("tenant");
            ctx.error(format!(
                "entry tenant [{}] does not match the batch tenant [{}]",
                entry.tenant, request.tenant
            ));
            ctx.pop();
        }
        validate_entry(ctx, entry);
        ctx.pop();
    }
    ctx.pop();
}

/// Batched `createObject`.
pub fn create_object_batch(
    ctx: &mut ValidationContext,
    request: &MetadataWriteBatchRequest,
    surface: ApiSurface,
) {
    homogeneous_batch(ctx, request, |ctx, entry| create_object(ctx, entry, surface));
}

/// Batched `updateObject`.
pub fn update_object_batch(
    ctx: &mut ValidationContext,
    request: &MetadataWriteBatchRequest,
    surface: ApiSurface,
) {
    homogeneous_batch(ctx, request, |ctx, entry| update_object(ctx, entry, surface));
}

/// Batched `updateTag`.
pub fn update_tag_batch(
    ctx: &mut ValidationContext,
    request: &MetadataWriteBatchRequest,
    surface: ApiSurface,
) {
    homogeneous_batch(ctx, request, |ctx, entry| update_tag(ctx, entry, surface));
}

/// Batched `preallocateId`.
pub fn preallocate_id_batch(ctx: &mut ValidationContext, request: &MetadataWriteBatchRequest) {
    homogeneous_batch(ctx, request, preallocate_id);
}

/// Batched `createPreallocatedObject`.
pub fn create_preallocated_object_batch(
    ctx: &mut ValidationContext,
    request: &MetadataWriteBatchRequest,
    surface: ApiSurface,
) {
    homogeneous_batch(ctx, request, |ctx, entry| {
        create_preallocated_object(ctx, entry, surface);
    });
}

/// The four-slot universal batch. Each entry is validated with the rules of
/// the method its slot stands for; entry tenants must match the batch.
pub fn write_batch(
    ctx: &mut ValidationContext,
    request: &UniversalMetadataWriteBatchRequest,
    surface: ApiSurface,
) {
    tenant_code(ctx, &request.tenant);

    if request.is_empty() {
        ctx.error("write batch must contain at least one request");
        return;
    }

    let entry_tenant = |ctx: &mut ValidationContext, entry: &MetadataWriteRequest| {
        if entry.tenant != request.tenant {
            ctx.push("tenant");
            ctx.error(format!(
                "entry tenant [{}] does not match the batch tenant [{}]",
                entry.tenant, request.tenant
            ));
            ctx.pop();
        }
    };

    ctx.push("preallocateIds");
    for (index, entry) in request.preallocate_ids.iter().enumerate() {
        ctx.push_index(index);
        entry_tenant(ctx, entry);
        preallocate_id(ctx, entry);
        ctx.pop();
    }
    ctx.pop();

    ctx.push("createObjects");
    for (index, entry) in request.create_objects.iter().enumerate() {
        ctx.push_index(index);
        entry_tenant(ctx, entry);
        if entry.prior_version.is_some() {
            create_preallocated_object(ctx, entry, surface);
        } else {
            create_object(ctx, entry, surface);
        }
        ctx.pop();
    }
    ctx.pop();

    ctx.push("updateObjects");
    for (index, entry) in request.update_objects.iter().enumerate() {
        ctx.push_index(index);
        entry_tenant(ctx, entry);
        update_object(ctx, entry, surface);
        ctx.pop();
    }
    ctx.pop();

    ctx.push("updateTags");
    for (index, entry) in request.update_tags.iter().enumerate() {
        ctx.push_index(index);
        entry_tenant(ctx, entry);
        update_tag(ctx, entry, surface);
        ctx.pop();
    }
    ctx.pop();
}

// ---------------------------------------------------------------------------
// Read methods
// ---------------------------------------------------------------------------

/// `readObject`.
pub fn read_object(ctx: &mut ValidationContext, request: &MetadataReadRequest) {
    tenant_code(ctx, &request.tenant);
    ctx.push("selector");
    ctx.apply(definitions::tag_selector, &request.selector);
    ctx.pop();
}

/// `readBatch`: at least one selector, each well-formed.
pub fn read_batch(ctx: &mut ValidationContext, request: &MetadataBatchRequest) {
    tenant_code(ctx, &request.tenant);
    ctx.push("selectors");
    ctx.apply(checks::list_not_empty, request.selectors.as_slice());
    for (index, selector) in request.selectors.iter().enumerate() {
        ctx.push_index(index);
        ctx.apply(definitions::tag_selector, selector);
        ctx.pop();
    }
    ctx.pop();
}

/// `search`.
pub fn search(ctx: &mut ValidationContext, request: &MetadataSearchRequest) {
    tenant_code(ctx, &request.tenant);
    ctx.push("searchParams");
    ctx.push("search");
    search_expression(ctx, &request.search_params.search);
    ctx.pop();
    ctx.pop();
}

fn search_expression(ctx: &mut ValidationContext, expression: &SearchExpression) {
    match expression {
        SearchExpression::Term(term) => search_term(ctx, term),
        SearchExpression::Logical(logical) => {
            ctx.push("expr");
            match logical.operator {
                LogicalOperator::Not => {
                    if logical.expr.len() != 1 {
                        ctx.error("NOT takes exactly one sub-expression");
                    }
                }
                LogicalOperator::And | LogicalOperator::Or => {
                    ctx.apply(checks::list_not_empty, logical.expr.as_slice());
                }
            }
            for (index, sub) in logical.expr.iter().enumerate() {
                ctx.push_index(index);
                search_expression(ctx, sub);
                ctx.pop();
            }
            ctx.pop();
        }
    }
}

fn search_term(ctx: &mut ValidationContext, term: &SearchTerm) {
    ctx.push("attrName");
    ctx.apply(checks::non_empty, term.attr_name.as_str());
    ctx.apply(checks::identifier, term.attr_name.as_str());
    ctx.pop();

    ctx.push("attrType");
    if ctx.is_active() && !term.attr_type.is_primitive() {
        ctx.error(format!("search type {} is not primitive", term.attr_type));
    }
    if ctx.is_active() && term.operator.is_ordered() && !term.attr_type.is_ordered() {
        ctx.error(format!(
            "operator {} requires an ordered type, {} is not ordered",
            term.operator, term.attr_type
        ));
    }
    ctx.pop();

    ctx.push("searchValue");
    if ctx.is_active() {
        match term.operator {
            trac_metadata::search::SearchOperator::In => match &term.search_value {
                Value::Array(items) if !items.is_empty() => {
                    if term.search_value.element_type() != Some(term.attr_type) {
                        ctx.error(format!(
                            "IN list must contain only {} values",
                            term.attr_type
                        ));
                    }
                }
                _ => {
                    ctx.error("IN requires a non-empty list of literals");
                }
            },
            _ => {
                if term.search_value.basic_type() != term.attr_type {
                    ctx.error(format!(
                        "search value is {} but the term declares {}",
                        term.search_value.basic_type(),
                        term.attr_type
                    ));
                }
            }
        }
    }
    ctx.pop();
}

/// Terms comparing FLOAT for equality are legal but unreliable; surface a
/// log warning so operators can spot them, without failing the request.
pub fn warn_float_equality(term: &SearchTerm) {
    use trac_metadata::search::SearchOperator;
    if term.attr_type == BasicType::Float
        && matches!(term.operator, SearchOperator::Eq | SearchOperator::Ne | SearchOperator::In)
    {
        tracing::warn!(
            attr = %term.attr_name,
            operator = %term.operator,
            "equality comparison on FLOAT attributes is unreliable"
        );
    }
}
