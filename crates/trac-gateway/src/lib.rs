// SPDX-License-Identifier: Apache-2.0
//! HTTP gateway for the TRAC metadata catalog services.
//!
//! The wire API is an HTTP/JSON rendering of the metadata RPC surface,
//! with the public service under `/trac-meta/api/v1` and the trusted
//! service under `/trac-meta/trusted/v1`. Every handler runs the
//! request-validation interceptor — method resolution, body
//! deserialisation, registered static validation — before any service code
//! executes; a failing request is closed with the mapped error and never
//! reaches the services.
#![deny(unsafe_code)]

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path as AxPath, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use trac_error::{ErrorKind, TracError, TracErrorDto};
use trac_metadata::api::{
    ListResourcesResponse, ListTenantsResponse, MetadataBatchRequest, MetadataBatchResponse,
    MetadataMethod, MetadataReadRequest, MetadataSearchRequest, MetadataSearchResponse,
    MetadataWriteBatchRequest, MetadataWriteBatchResponse, MetadataWriteRequest,
    PlatformInfoResponse, UniversalMetadataWriteBatchRequest,
    UniversalMetadataWriteBatchResponse, UserInfo,
};
use trac_metadata::identifiers::TagHeader;
use trac_metadata::tag::Tag;
use trac_services::{MetadataReadService, MetadataWriteService};
use trac_validation::{ApiSurface, RequestPayload, validate_request};

pub mod middleware;

/// Shared state behind every handler.
pub struct AppState {
    /// The write service.
    pub write: MetadataWriteService,
    /// The read service.
    pub read: MetadataReadService,
}

/// Wire configuration → store → services → shared state, registering
/// configured tenants that are not yet in the store.
pub async fn build_state(config: &trac_config::PlatformConfig) -> Result<Arc<AppState>, TracError> {
    let store =
        trac_store::MetadataStore::open(&config.metadata.database, config.metadata.pool_size)?;

    for (code, tenant) in &config.tenants {
        match store.create_tenant(code.as_str(), tenant.description.as_str()).await {
            Ok(()) => tracing::info!(tenant = %code, "tenant registered"),
            Err(e) if e.kind == ErrorKind::Duplicate => {}
            Err(e) => return Err(e),
        }
    }

    Ok(Arc::new(AppState {
        write: MetadataWriteService::new(store.clone()),
        read: MetadataReadService::new(store, config),
    }))
}

// ---------------------------------------------------------------------------
// Error rendering
// ---------------------------------------------------------------------------

/// A catalog error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TracError);

impl From<TracError> for ApiError {
    fn from(error: TracError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = axum::http::StatusCode::from_u16(self.0.status().http_code())
            .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(TracErrorDto::from(&self.0));
        (status, body).into_response()
    }
}

// ---------------------------------------------------------------------------
// Interceptor
// ---------------------------------------------------------------------------

/// The request-validation interceptor.
///
/// Axum has already resolved the method from the route and deserialised
/// the first (only) message; this runs the registered static validator and
/// closes the call before any service code on failure.
fn intercept(
    method: MetadataMethod,
    payload: &RequestPayload<'_>,
    surface: ApiSurface,
) -> Result<(), ApiError> {
    validate_request(method, payload, surface)?;
    Ok(())
}

/// Path and body must agree on the tenant.
fn check_tenant(path_tenant: &str, body_tenant: &str) -> Result<(), ApiError> {
    if path_tenant != body_tenant {
        return Err(ApiError(
            TracError::new(ErrorKind::InputValidation, "validation failed").with_detail(
                "tenant",
                format!("request tenant [{body_tenant}] does not match the URL [{path_tenant}]"),
            ),
        ));
    }
    Ok(())
}

/// Caller identity from the `x-trac-user-id` / `x-trac-user-name` headers.
/// Session issuance lives outside the catalog; absent headers yield the
/// anonymous principal.
fn principal(headers: &HeaderMap) -> UserInfo {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    match (header("x-trac-user-id"), header("x-trac-user-name")) {
        (Some(user_id), user_name) => UserInfo {
            user_name: user_name.unwrap_or_else(|| user_id.clone()),
            user_id,
        },
        _ => UserInfo::anonymous(),
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the gateway router with the public and trusted API surfaces.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        // Public metadata API.
        .route("/trac-meta/api/v1/platform-info", get(platform_info))
        .route("/trac-meta/api/v1/list-tenants", get(list_tenants))
        .route("/trac-meta/api/v1/{tenant}/list-resources", get(list_resources))
        .route(
            "/trac-meta/api/v1/{tenant}/resource-info/{resource}",
            get(resource_info),
        )
        .route("/trac-meta/api/v1/{tenant}/create-object", post(create_object))
        .route(
            "/trac-meta/api/v1/{tenant}/create-object-batch",
            post(create_object_batch),
        )
        .route("/trac-meta/api/v1/{tenant}/update-object", post(update_object))
        .route(
            "/trac-meta/api/v1/{tenant}/update-object-batch",
            post(update_object_batch),
        )
        .route("/trac-meta/api/v1/{tenant}/update-tag", post(update_tag))
        .route(
            "/trac-meta/api/v1/{tenant}/update-tag-batch",
            post(update_tag_batch),
        )
        .route("/trac-meta/api/v1/{tenant}/read-object", post(read_object))
        .route("/trac-meta/api/v1/{tenant}/read-batch", post(read_batch))
        .route("/trac-meta/api/v1/{tenant}/search", post(search))
        .route("/trac-meta/api/v1/{tenant}/write-batch", post(write_batch))
        // Trusted metadata API.
        .route(
            "/trac-meta/trusted/v1/{tenant}/preallocate-id",
            post(preallocate_id),
        )
        .route(
            "/trac-meta/trusted/v1/{tenant}/preallocate-id-batch",
            post(preallocate_id_batch),
        )
        .route(
            "/trac-meta/trusted/v1/{tenant}/create-preallocated",
            post(create_preallocated),
        )
        .route(
            "/trac-meta/trusted/v1/{tenant}/create-preallocated-batch",
            post(create_preallocated_batch),
        )
        .route(
            "/trac-meta/trusted/v1/{tenant}/write-batch",
            post(trusted_write_batch),
        )
        .layer(axum::middleware::from_fn(middleware::request_logger))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Write handlers
// ---------------------------------------------------------------------------

async fn create_object(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteRequest>,
) -> Result<Json<TagHeader>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::CreateObject,
        &RequestPayload::Write(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let header = state.write.create_object(&user, request).await?;
    Ok(Json(header))
}

async fn update_object(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteRequest>,
) -> Result<Json<TagHeader>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::UpdateObject,
        &RequestPayload::Write(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let header = state.write.update_object(&user, request).await?;
    Ok(Json(header))
}

async fn update_tag(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteRequest>,
) -> Result<Json<TagHeader>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::UpdateTag,
        &RequestPayload::Write(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let header = state.write.update_tag(&user, request).await?;
    Ok(Json(header))
}

async fn write_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<UniversalMetadataWriteBatchRequest>,
) -> Result<Json<UniversalMetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::WriteBatch,
        &RequestPayload::WriteBatch(&request),
        ApiSurface::Public,
    )?;
    // The public surface cannot reserve ids inside a batch.
    if !request.preallocate_ids.is_empty()
        || request.create_objects.iter().any(|e| e.prior_version.is_some())
    {
        return Err(ApiError(
            TracError::new(ErrorKind::InputValidation, "validation failed").with_detail(
                "preallocateIds",
                "preallocation is only available on the trusted API",
            ),
        ));
    }
    let user = principal(&headers);
    let response = state.write.write_batch(&user, request).await?;
    Ok(Json(response))
}

async fn create_object_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteBatchRequest>,
) -> Result<Json<MetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::CreateObjectBatch,
        &RequestPayload::WriteList(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let headers = state.write.create_object_batch(&user, request).await?;
    Ok(Json(MetadataWriteBatchResponse { headers }))
}

async fn update_object_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteBatchRequest>,
) -> Result<Json<MetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::UpdateObjectBatch,
        &RequestPayload::WriteList(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let headers = state.write.update_object_batch(&user, request).await?;
    Ok(Json(MetadataWriteBatchResponse { headers }))
}

async fn update_tag_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteBatchRequest>,
) -> Result<Json<MetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::UpdateTagBatch,
        &RequestPayload::WriteList(&request),
        ApiSurface::Public,
    )?;
    let user = principal(&headers);
    let headers = state.write.update_tag_batch(&user, request).await?;
    Ok(Json(MetadataWriteBatchResponse { headers }))
}

async fn preallocate_id_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteBatchRequest>,
) -> Result<Json<MetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::PreallocateIdBatch,
        &RequestPayload::WriteList(&request),
        ApiSurface::Trusted,
    )?;
    let user = principal(&headers);
    let headers = state.write.preallocate_id_batch(&user, request).await?;
    Ok(Json(MetadataWriteBatchResponse { headers }))
}

async fn create_preallocated_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteBatchRequest>,
) -> Result<Json<MetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::CreatePreallocatedObjectBatch,
        &RequestPayload::WriteList(&request),
        ApiSurface::Trusted,
    )?;
    let user = principal(&headers);
    let headers = state
        .write
        .create_preallocated_object_batch(&user, request)
        .await?;
    Ok(Json(MetadataWriteBatchResponse { headers }))
}

async fn preallocate_id(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteRequest>,
) -> Result<Json<TagHeader>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::PreallocateId,
        &RequestPayload::Write(&request),
        ApiSurface::Trusted,
    )?;
    let user = principal(&headers);
    let header = state.write.preallocate_id(&user, request).await?;
    Ok(Json(header))
}

async fn create_preallocated(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<MetadataWriteRequest>,
) -> Result<Json<TagHeader>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::CreatePreallocatedObject,
        &RequestPayload::Write(&request),
        ApiSurface::Trusted,
    )?;
    let user = principal(&headers);
    let header = state.write.create_preallocated_object(&user, request).await?;
    Ok(Json(header))
}

async fn trusted_write_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    headers: HeaderMap,
    Json(request): Json<UniversalMetadataWriteBatchRequest>,
) -> Result<Json<UniversalMetadataWriteBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::WriteBatch,
        &RequestPayload::WriteBatch(&request),
        ApiSurface::Trusted,
    )?;
    let user = principal(&headers);
    let response = state.write.write_batch(&user, request).await?;
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// Read handlers
// ---------------------------------------------------------------------------

async fn read_object(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    Json(request): Json<MetadataReadRequest>,
) -> Result<Json<Tag>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::ReadObject,
        &RequestPayload::Read(&request),
        ApiSurface::Public,
    )?;
    let tag = state.read.read_object(request).await?;
    Ok(Json(tag))
}

async fn read_batch(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    Json(request): Json<MetadataBatchRequest>,
) -> Result<Json<MetadataBatchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::ReadBatch,
        &RequestPayload::ReadBatch(&request),
        ApiSurface::Public,
    )?;
    let response = state.read.read_batch(request).await?;
    Ok(Json(response))
}

async fn search(
    State(state): State<Arc<AppState>>,
    AxPath(tenant): AxPath<String>,
    Json(request): Json<MetadataSearchRequest>,
) -> Result<Json<MetadataSearchResponse>, ApiError> {
    check_tenant(&tenant, &request.tenant)?;
    intercept(
        MetadataMethod::Search,
        &RequestPayload::Search(&request),
        ApiSurface::Public,
    )?;
    let response = state.read.search(request).await?;
    Ok(Json(response))
}

async fn platform_info(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PlatformInfoResponse>, ApiError> {
    intercept(
        MetadataMethod::PlatformInfo,
        &RequestPayload::Empty,
        ApiSurface::Public,
    )?;
    Ok(Json(state.read.platform_info()))
}

async fn list_tenants(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ListTenantsResponse>, ApiError> {
    intercept(
        MetadataMethod::ListTenants,
        &RequestPayload::Empty,
        ApiSurface::Public,
    )?;
    let response = state.read.list_tenants().await?;
    Ok(Json(response))
}

async fn list_resources(
    State(state): State<Arc<AppState>>,
    AxPath(_tenant): AxPath<String>,
) -> Result<Json<ListResourcesResponse>, ApiError> {
    intercept(
        MetadataMethod::ListResources,
        &RequestPayload::Empty,
        ApiSurface::Public,
    )?;
    Ok(Json(state.read.list_resources()))
}

async fn resource_info(
    State(state): State<Arc<AppState>>,
    AxPath((_tenant, resource)): AxPath<(String, String)>,
) -> Result<Json<trac_metadata::api::ResourceInfoResponse>, ApiError> {
    intercept(
        MetadataMethod::ResourceInfo,
        &RequestPayload::Empty,
        ApiSurface::Public,
    )?;
    let response = state.read.resource_info(&resource)?;
    Ok(Json(response))
}
