// SPDX-License-Identifier: Apache-2.0
//! SQL dialect abstraction.
//!
//! Engine differences are isolated here: error-code mapping, boolean
//! storage and the expression used for ordered decimal comparison. The rest
//! of the store is written once against this trait, so another SQL engine
//! only needs a new dialect (and its DDL) to back the catalog.

use std::fmt;

/// Engine-agnostic classification of a SQL error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// A uniqueness constraint was violated; at the application level this
    /// is a duplicate insert or a superseded concurrent write.
    DuplicateKey,
    /// A referenced row does not exist.
    MissingForeignKey,
    /// A query expected a row and found none.
    NoData,
    /// Anything the dialect cannot classify.
    Other,
}

/// One SQL engine's behavior.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    /// Dialect name, as used in configuration.
    fn name(&self) -> &'static str;

    /// Classify an engine error.
    fn map_error(&self, error: &rusqlite::Error) -> StoreErrorCode;

    /// Literal for a boolean column value.
    fn boolean_literal(&self, value: bool) -> &'static str;

    /// Expression for comparing a decimal column (or parameter) in an
    /// ordered search term. SQLite has no decimal affinity, so comparisons
    /// go through a numeric cast; precision on ordered decimal search is
    /// engine-limited, while the stored canonical text round-trips exactly.
    fn decimal_compare_expr(&self, operand: &str) -> String;
}

/// The shipped SQLite dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn map_error(&self, error: &rusqlite::Error) -> StoreErrorCode {
        match error {
            rusqlite::Error::QueryReturnedNoRows => StoreErrorCode::NoData,
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                rusqlite::ErrorCode::ConstraintViolation => {
                    // Foreign-key failures share the constraint code; the
                    // extended code tells them apart.
                    if failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY {
                        StoreErrorCode::MissingForeignKey
                    } else {
                        StoreErrorCode::DuplicateKey
                    }
                }
                _ => StoreErrorCode::Other,
            },
            _ => StoreErrorCode::Other,
        }
    }

    fn boolean_literal(&self, value: bool) -> &'static str {
        if value { "1" } else { "0" }
    }

    fn decimal_compare_expr(&self, operand: &str) -> String {
        format!("CAST({operand} AS REAL)")
    }
}
