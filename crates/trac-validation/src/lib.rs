// SPDX-License-Identifier: Apache-2.0
//! Static, version and consistency validation for the TRAC metadata
//! catalog.
//!
//! One traversal model serves three classes of check: **static** (the shape
//! of a single message), **version** (a new object version against its
//! prior) and **consistency** (references against a loaded metadata
//! bundle). Failures accumulate with their full path from the request root;
//! the first failure at a location short-circuits further checks at that
//! location without silencing its siblings.
//!
//! Validators are registered once under a [`registry::ValidationKey`] and
//! dispatched by table lookup; see [`registry::validate_request`] and
//! [`registry::validate_version`].
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Common leaf checks.
pub mod checks;
/// Consistency validation against a metadata bundle.
pub mod consistency;
/// The location-arena validation context.
pub mod context;
/// Static validation of object definitions.
pub mod definitions;
/// Registered validator lookup and dispatch.
pub mod registry;
/// Static validation of API requests.
pub mod requests;
/// Version validation of new object versions.
pub mod version;

pub use consistency::MetadataBundle;
pub use context::{ValidationContext, ValidationType};
pub use registry::{RequestPayload, ValidationKey, validate_request, validate_version};
pub use requests::ApiSurface;
