// SPDX-License-Identifier: Apache-2.0
//! Transactional SQL metadata store for the TRAC metadata catalog.
//!
//! The store persists tenants, objects, tags, attributes and
//! preallocations. Every public write is one atomic unit; concurrent
//! writers targeting the same object id are ordered by unique constraints,
//! with the loser receiving the duplicate / superseded failure through the
//! dialect's error mapping. Engine differences live behind
//! [`dialect::SqlDialect`]; SQLite is the shipped implementation.
#![deny(unsafe_code)]
#![warn(missing_docs)]

/// SQL dialect abstraction.
pub mod dialect;
/// Persisted layout and DDL.
pub mod schema;
/// Search translation.
mod search;
/// The store itself.
mod store;
/// Value ↔ column mapping.
mod values;

pub use dialect::{SqlDialect, SqliteDialect, StoreErrorCode};
pub use store::{MetadataStore, WriteBatch};
