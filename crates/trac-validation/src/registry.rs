// SPDX-License-Identifier: Apache-2.0
//! Registered validator lookup.
//!
//! Each concrete validator is registered under a [`ValidationKey`]: the
//! class of check plus the API method (static validators) or the object
//! type (version validators). The registry is built once from explicit
//! registrations and is read-only thereafter; request-time dispatch is a
//! table lookup, never reflection.
//!
//! Dispatching a validator against the wrong payload shape is a programmer
//! error: it aborts validation with an internal error and is never reported
//! as a client-visible validation failure.

use std::collections::HashMap;
use std::sync::OnceLock;

use trac_error::{ErrorKind, TracError};
use trac_metadata::api::{
    MetadataBatchRequest, MetadataMethod, MetadataReadRequest, MetadataSearchRequest,
    MetadataWriteBatchRequest, MetadataWriteRequest, UniversalMetadataWriteBatchRequest,
};
use trac_metadata::object::{ObjectDefinition, ObjectType};

use crate::context::{ValidationContext, ValidationType};
use crate::requests::{self, ApiSurface};
use crate::version;

// ---------------------------------------------------------------------------
// Payload and validator shapes
// ---------------------------------------------------------------------------

/// A borrowed view of any API request, for uniform dispatch.
#[derive(Debug, Clone, Copy)]
pub enum RequestPayload<'a> {
    /// A single-object write request.
    Write(&'a MetadataWriteRequest),
    /// A homogeneous write batch.
    WriteList(&'a MetadataWriteBatchRequest),
    /// The universal write batch.
    WriteBatch(&'a UniversalMetadataWriteBatchRequest),
    /// A single read.
    Read(&'a MetadataReadRequest),
    /// A batch read.
    ReadBatch(&'a MetadataBatchRequest),
    /// A search.
    Search(&'a MetadataSearchRequest),
    /// Methods that take no request body.
    Empty,
}

type StaticValidatorFn = fn(&mut ValidationContext, &RequestPayload<'_>, ApiSurface);
type VersionValidatorFn = fn(&mut ValidationContext, &ObjectDefinition, &ObjectDefinition);

/// A registered validator.
#[derive(Clone, Copy)]
enum RegisteredValidator {
    Static(StaticValidatorFn),
    Version(VersionValidatorFn),
}

/// Lookup key for registered validators.
///
/// Static validators carry a method; version validators carry an object
/// type. A method-level miss falls back to the object-level registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValidationKey {
    /// The class of check.
    pub validation_type: ValidationType,
    /// API method, for request-time validators.
    pub method: Option<MetadataMethod>,
    /// Object type, for object-level validators.
    pub object_type: Option<ObjectType>,
}

impl ValidationKey {
    /// Key for a request-time validator.
    pub fn for_method(method: MetadataMethod) -> Self {
        Self {
            validation_type: ValidationType::Static,
            method: Some(method),
            object_type: None,
        }
    }

    /// Key for an object-level version validator.
    pub fn for_version(object_type: ObjectType) -> Self {
        Self {
            validation_type: ValidationType::Version,
            method: None,
            object_type: Some(object_type),
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

struct ValidatorRegistry {
    entries: HashMap<ValidationKey, RegisteredValidator>,
}

impl ValidatorRegistry {
    fn register(&mut self, key: ValidationKey, validator: RegisteredValidator) {
        self.entries.insert(key, validator);
    }

    /// Lookup with method → object-level fallback.
    fn lookup(&self, key: &ValidationKey) -> Option<&RegisteredValidator> {
        if let Some(found) = self.entries.get(key) {
            return Some(found);
        }
        if key.method.is_some() {
            let fallback = ValidationKey {
                validation_type: key.validation_type,
                method: None,
                object_type: key.object_type,
            };
            return self.entries.get(&fallback);
        }
        None
    }
}

fn registry() -> &'static ValidatorRegistry {
    static REGISTRY: OnceLock<ValidatorRegistry> = OnceLock::new();
    REGISTRY.get_or_init(build_registry)
}

fn build_registry() -> ValidatorRegistry {
    let mut registry = ValidatorRegistry {
        entries: HashMap::new(),
    };

    // -- Static validators, one per API method ---------------------------

    registry.register(
        ValidationKey::for_method(MetadataMethod::CreateObject),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::Write(request) => requests::create_object(ctx, request, surface),
            _ => wrong_payload(ctx, MetadataMethod::CreateObject),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::UpdateObject),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::Write(request) => requests::update_object(ctx, request, surface),
            _ => wrong_payload(ctx, MetadataMethod::UpdateObject),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::UpdateTag),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::Write(request) => requests::update_tag(ctx, request, surface),
            _ => wrong_payload(ctx, MetadataMethod::UpdateTag),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::PreallocateId),
        RegisteredValidator::Static(|ctx, payload, _| match payload {
            RequestPayload::Write(request) => requests::preallocate_id(ctx, request),
            _ => wrong_payload(ctx, MetadataMethod::PreallocateId),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::CreatePreallocatedObject),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::Write(request) => {
                requests::create_preallocated_object(ctx, request, surface);
            }
            _ => wrong_payload(ctx, MetadataMethod::CreatePreallocatedObject),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::WriteBatch),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::WriteBatch(request) => requests::write_batch(ctx, request, surface),
            _ => wrong_payload(ctx, MetadataMethod::WriteBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::CreateObjectBatch),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::WriteList(request) => {
                requests::create_object_batch(ctx, request, surface);
            }
            _ => wrong_payload(ctx, MetadataMethod::CreateObjectBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::UpdateObjectBatch),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::WriteList(request) => {
                requests::update_object_batch(ctx, request, surface);
            }
            _ => wrong_payload(ctx, MetadataMethod::UpdateObjectBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::UpdateTagBatch),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::WriteList(request) => {
                requests::update_tag_batch(ctx, request, surface);
            }
            _ => wrong_payload(ctx, MetadataMethod::UpdateTagBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::PreallocateIdBatch),
        RegisteredValidator::Static(|ctx, payload, _| match payload {
            RequestPayload::WriteList(request) => {
                requests::preallocate_id_batch(ctx, request);
            }
            _ => wrong_payload(ctx, MetadataMethod::PreallocateIdBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::CreatePreallocatedObjectBatch),
        RegisteredValidator::Static(|ctx, payload, surface| match payload {
            RequestPayload::WriteList(request) => {
                requests::create_preallocated_object_batch(ctx, request, surface);
            }
            _ => wrong_payload(ctx, MetadataMethod::CreatePreallocatedObjectBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::ReadObject),
        RegisteredValidator::Static(|ctx, payload, _| match payload {
            RequestPayload::Read(request) => requests::read_object(ctx, request),
            _ => wrong_payload(ctx, MetadataMethod::ReadObject),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::ReadBatch),
        RegisteredValidator::Static(|ctx, payload, _| match payload {
            RequestPayload::ReadBatch(request) => requests::read_batch(ctx, request),
            _ => wrong_payload(ctx, MetadataMethod::ReadBatch),
        }),
    );
    registry.register(
        ValidationKey::for_method(MetadataMethod::Search),
        RegisteredValidator::Static(|ctx, payload, _| match payload {
            RequestPayload::Search(request) => requests::search(ctx, request),
            _ => wrong_payload(ctx, MetadataMethod::Search),
        }),
    );

    // Introspection methods take no body; an empty payload is the only
    // valid shape.
    for method in [
        MetadataMethod::PlatformInfo,
        MetadataMethod::ListTenants,
        MetadataMethod::ListResources,
        MetadataMethod::ResourceInfo,
    ] {
        registry.register(
            ValidationKey::for_method(method),
            RegisteredValidator::Static(empty_payload_validator),
        );
    }

    // -- Version validators, object-level --------------------------------

    for object_type in ObjectType::ALL {
        registry.register(
            ValidationKey::for_version(*object_type),
            RegisteredValidator::Version(version::object_version),
        );
    }

    registry
}

fn wrong_payload(ctx: &mut ValidationContext, method: MetadataMethod) {
    ctx.abort(format!(
        "validator for {method} applied to the wrong message type"
    ));
}

fn empty_payload_validator(
    ctx: &mut ValidationContext,
    payload: &RequestPayload<'_>,
    _surface: ApiSurface,
) {
    if !matches!(payload, RequestPayload::Empty) {
        ctx.abort("empty-payload validator applied to a message-bearing request");
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Run the registered static validator for a method against a request.
///
/// # Errors
///
/// `InputValidation` with per-failure details when the request is
/// malformed; `Internal` when no validator is registered or the payload
/// shape does not match the method.
pub fn validate_request(
    method: MetadataMethod,
    payload: &RequestPayload<'_>,
    surface: ApiSurface,
) -> Result<(), TracError> {
    let key = ValidationKey::for_method(method);
    let Some(RegisteredValidator::Static(validator)) = registry().lookup(&key) else {
        return Err(TracError::new(
            ErrorKind::Internal,
            format!("no static validator registered for {method}"),
        ));
    };

    let mut ctx = ValidationContext::for_method(method);
    validator(&mut ctx, payload, surface);
    ctx.finish()
}

/// Run the registered version validator for an object type.
///
/// # Errors
///
/// `VersionValidation` with per-failure details when the new version is
/// incompatible; `Internal` when no validator is registered.
pub fn validate_version(
    object_type: ObjectType,
    current: &ObjectDefinition,
    prior: &ObjectDefinition,
) -> Result<(), TracError> {
    let key = ValidationKey::for_version(object_type);
    let Some(RegisteredValidator::Version(validator)) = registry().lookup(&key) else {
        return Err(TracError::new(
            ErrorKind::Internal,
            format!("no version validator registered for {object_type}"),
        ));
    };

    let mut ctx = ValidationContext::for_version();
    validator(&mut ctx, current, prior);
    ctx.finish()
}
