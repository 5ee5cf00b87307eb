// SPDX-License-Identifier: Apache-2.0
//! Persisted layout of the catalog.
//!
//! Object payloads are stored as opaque JSON blobs; everything the store
//! needs to resolve selectors and answer searches lives in indexed columns.
//! Timestamps are integer microseconds since the epoch. Attribute values go
//! into per-type columns with `attr_index = -1` for single values and the
//! element index for arrays.

use rusqlite::Connection;
use trac_error::{ErrorKind, TracError};

/// DDL for the SQLite rendering of the catalog layout.
pub const CATALOG_DDL: &str = "
CREATE TABLE IF NOT EXISTS tenant (
    tenant_code     TEXT PRIMARY KEY,
    description     TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS object (
    object_pk       INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_code     TEXT NOT NULL REFERENCES tenant (tenant_code),
    object_id       TEXT NOT NULL,
    object_type     TEXT NOT NULL,
    UNIQUE (tenant_code, object_id)
);

CREATE TABLE IF NOT EXISTS object_definition (
    definition_pk   INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_code     TEXT NOT NULL,
    object_fk       INTEGER NOT NULL REFERENCES object (object_pk),
    object_version  INTEGER NOT NULL,
    object_timestamp INTEGER NOT NULL,
    is_latest       INTEGER NOT NULL,
    definition_blob TEXT NOT NULL,
    UNIQUE (object_fk, object_version)
);

CREATE TABLE IF NOT EXISTS tag (
    tag_pk          INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_code     TEXT NOT NULL,
    definition_fk   INTEGER NOT NULL REFERENCES object_definition (definition_pk),
    tag_version     INTEGER NOT NULL,
    tag_timestamp   INTEGER NOT NULL,
    is_latest       INTEGER NOT NULL,
    UNIQUE (definition_fk, tag_version)
);

CREATE TABLE IF NOT EXISTS tag_attr (
    attr_pk         INTEGER PRIMARY KEY AUTOINCREMENT,
    tenant_code     TEXT NOT NULL,
    tag_fk          INTEGER NOT NULL REFERENCES tag (tag_pk),
    attr_name       TEXT NOT NULL,
    attr_index      INTEGER NOT NULL,
    attr_type       TEXT NOT NULL,
    value_boolean   INTEGER,
    value_integer   INTEGER,
    value_float     REAL,
    value_decimal   TEXT,
    value_string    TEXT,
    value_date      TEXT,
    value_datetime  INTEGER,
    UNIQUE (tag_fk, attr_name, attr_index)
);

CREATE INDEX IF NOT EXISTS idx_tag_attr_lookup
    ON tag_attr (tenant_code, attr_name, attr_type);

CREATE TABLE IF NOT EXISTS preallocation (
    tenant_code     TEXT NOT NULL REFERENCES tenant (tenant_code),
    object_id       TEXT NOT NULL,
    object_type     TEXT NOT NULL,
    PRIMARY KEY (tenant_code, object_id)
);
";

/// Create the catalog tables if they do not exist.
///
/// # Errors
///
/// Returns an internal error if the DDL fails to execute.
pub fn deploy_schema(conn: &Connection) -> Result<(), TracError> {
    conn.execute_batch(CATALOG_DDL).map_err(|e| {
        TracError::new(ErrorKind::Internal, "failed to deploy the catalog schema").with_source(e)
    })
}
