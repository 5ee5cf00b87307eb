// SPDX-License-Identifier: Apache-2.0
//! Write orchestration and read/search services for the TRAC metadata
//! catalog.
//!
//! [`MetadataWriteService`] turns validated write requests into four-slot
//! store batches with controlled-attribute stamping, selector
//! normalisation and version validation. [`MetadataReadService`] forwards
//! selector reads and searches to the store and serves platform, tenant
//! and resource introspection.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// The read and search service.
pub mod read;
/// The write service.
pub mod write;

pub use read::MetadataReadService;
pub use write::MetadataWriteService;
