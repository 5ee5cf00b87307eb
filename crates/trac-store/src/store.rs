// SPDX-License-Identifier: Apache-2.0
//! The transactional metadata store.
//!
//! Every public write is one atomic unit: the four-slot [`WriteBatch`] runs
//! inside a single transaction, and the single-slot operations are thin
//! wrappers over it. Concurrency control is optimistic: unique constraints
//! on (tenant, objectId), (objectFk, objectVersion) and (definitionFk,
//! tagVersion) order concurrent writers, and the dialect maps the loser's
//! constraint violation to the application-level duplicate / superseded
//! failure. Nothing here retries.
//!
//! Statements run on blocking threads; a semaphore-guarded pool bounds the
//! number of connections so each in-flight request holds at most one.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Transaction, params};
use tokio::sync::Semaphore;
use tracing::debug;
use uuid::Uuid;

use trac_error::{ErrorKind, TracError};
use trac_metadata::api::TenantInfo;
use trac_metadata::identifiers::{ObjectCriteria, TagCriteria, TagHeader, TagSelector};
use trac_metadata::object::{ObjectDefinition, ObjectType};
use trac_metadata::tag::Tag;
use trac_metadata::value::Value;

use crate::dialect::{SqlDialect, SqliteDialect, StoreErrorCode};
use crate::schema;
use crate::search;
use crate::values;

// ---------------------------------------------------------------------------
// WriteBatch
// ---------------------------------------------------------------------------

/// One transactional unit of writes, executed in slot order.
#[derive(Debug, Default)]
pub struct WriteBatch {
    /// Ids to reserve, with their declared types.
    pub preallocations: Vec<(ObjectType, Uuid)>,
    /// Fully-formed first versions (v1, t1).
    pub new_objects: Vec<Tag>,
    /// First versions consuming a reservation.
    pub preallocated_objects: Vec<Tag>,
    /// New versions of existing objects (v = prior + 1, t1).
    pub new_versions: Vec<Tag>,
    /// New tags on existing versions (t = prior + 1).
    pub new_tags: Vec<Tag>,
}

impl WriteBatch {
    /// Whether the batch carries no work.
    pub fn is_empty(&self) -> bool {
        self.preallocations.is_empty()
            && self.new_objects.is_empty()
            && self.preallocated_objects.is_empty()
            && self.new_versions.is_empty()
            && self.new_tags.is_empty()
    }
}

// ---------------------------------------------------------------------------
// MetadataStore
// ---------------------------------------------------------------------------

struct StoreInner {
    pool: Mutex<Vec<Connection>>,
    semaphore: Arc<Semaphore>,
    dialect: Arc<dyn SqlDialect>,
}

/// The SQL-backed metadata store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct MetadataStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("dialect", &self.inner.dialect.name())
            .finish()
    }
}

fn internal(message: &str) -> impl Fn(rusqlite::Error) -> TracError + '_ {
    move |e| TracError::new(ErrorKind::Internal, message).with_source(e)
}

impl MetadataStore {
    /// Open (or create) a store at the given database path.
    ///
    /// `":memory:"` opens an in-memory database; the pool then holds a
    /// single connection, since each in-memory connection would otherwise
    /// see its own private database.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the database cannot be opened or the
    /// schema cannot be deployed.
    pub fn open(database: &str, pool_size: usize) -> Result<Self, TracError> {
        let in_memory = database == ":memory:";
        let pool_size = if in_memory { 1 } else { pool_size.max(1) };

        let mut pool = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = if in_memory {
                Connection::open_in_memory()
            } else {
                Connection::open(database)
            }
            .map_err(internal("failed to open the metadata database"))?;

            conn.pragma_update(None, "foreign_keys", true)
                .map_err(internal("failed to enable foreign keys"))?;
            if !in_memory {
                // WAL lets readers overlap the single writer.
                let _: String = conn
                    .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                    .map_err(internal("failed to enable WAL"))?;
            }
            pool.push(conn);
        }

        schema::deploy_schema(&pool[0])?;
        debug!(database, pool_size, "metadata store open");

        Ok(Self {
            inner: Arc::new(StoreInner {
                pool: Mutex::new(pool),
                semaphore: Arc::new(Semaphore::new(pool_size)),
                dialect: Arc::new(SqliteDialect),
            }),
        })
    }

    /// The dialect backing this store.
    pub fn dialect_name(&self) -> &'static str {
        self.inner.dialect.name()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, TracError>
    where
        F: FnOnce(&mut Connection, &dyn SqlDialect) -> Result<T, TracError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .inner
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TracError::new(ErrorKind::Internal, "connection pool is closed"))?;

        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .pool
                .lock()
                .expect("pool lock poisoned")
                .pop()
                .expect("semaphore permit guarantees a pooled connection");
            let out = f(&mut conn, inner.dialect.as_ref());
            inner.pool.lock().expect("pool lock poisoned").push(conn);
            out
        })
        .await
        .map_err(|e| TracError::new(ErrorKind::Internal, "store task failed").with_source(e))?;

        drop(permit);
        result
    }

    async fn in_transaction<T, F>(&self, f: F) -> Result<T, TracError>
    where
        F: FnOnce(&Transaction<'_>, &dyn SqlDialect) -> Result<T, TracError> + Send + 'static,
        T: Send + 'static,
    {
        self.with_conn(move |conn, dialect| {
            let tx = conn
                .transaction()
                .map_err(internal("failed to begin a transaction"))?;
            let out = f(&tx, dialect)?;
            tx.commit()
                .map_err(internal("failed to commit the transaction"))?;
            Ok(out)
        })
        .await
    }

    // -- Tenants --------------------------------------------------------

    /// Register a tenant.
    ///
    /// # Errors
    ///
    /// `Duplicate` when the tenant code is already registered.
    pub async fn create_tenant(
        &self,
        tenant: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), TracError> {
        let tenant = tenant.into();
        let description = description.into();
        self.in_transaction(move |tx, dialect| {
            tx.execute(
                "INSERT INTO tenant (tenant_code, description) VALUES (?1, ?2)",
                params![tenant, description],
            )
            .map_err(|e| {
                map_sql_error(
                    dialect,
                    e,
                    &format!("tenant [{tenant}] is already registered"),
                    "tenant could not be created",
                )
            })?;
            Ok(())
        })
        .await
    }

    /// All registered tenants, in code order.
    pub async fn list_tenants(&self) -> Result<Vec<TenantInfo>, TracError> {
        self.with_conn(|conn, _| {
            let mut stmt = conn
                .prepare(
                    "SELECT tenant_code, description FROM tenant ORDER BY tenant_code",
                )
                .map_err(internal("failed to prepare the tenant query"))?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(TenantInfo {
                        tenant_code: row.get(0)?,
                        description: row.get(1)?,
                    })
                })
                .map_err(internal("failed to query tenants"))?;
            rows.collect::<Result<Vec<_>, _>>()
                .map_err(internal("failed to read tenant rows"))
        })
        .await
    }

    // -- Writes ---------------------------------------------------------

    /// Reserve fresh object ids for the given types, without v1 rows.
    pub async fn preallocate_object_ids(
        &self,
        tenant: impl Into<String>,
        object_types: Vec<ObjectType>,
    ) -> Result<Vec<Uuid>, TracError> {
        let ids: Vec<Uuid> = object_types.iter().map(|_| Uuid::new_v4()).collect();
        let batch = WriteBatch {
            preallocations: object_types.into_iter().zip(ids.clone()).collect(),
            ..WriteBatch::default()
        };
        self.write_batch(tenant, batch).await?;
        Ok(ids)
    }

    /// Commit fully-formed first versions.
    pub async fn save_new_objects(
        &self,
        tenant: impl Into<String>,
        tags: Vec<Tag>,
    ) -> Result<(), TracError> {
        let batch = WriteBatch {
            new_objects: tags,
            ..WriteBatch::default()
        };
        self.write_batch(tenant, batch).await
    }

    /// Commit first versions for previously reserved ids.
    pub async fn save_preallocated_objects(
        &self,
        tenant: impl Into<String>,
        tags: Vec<Tag>,
    ) -> Result<(), TracError> {
        let batch = WriteBatch {
            preallocated_objects: tags,
            ..WriteBatch::default()
        };
        self.write_batch(tenant, batch).await
    }

    /// Commit new versions of existing objects.
    pub async fn save_new_versions(
        &self,
        tenant: impl Into<String>,
        tags: Vec<Tag>,
    ) -> Result<(), TracError> {
        let batch = WriteBatch {
            new_versions: tags,
            ..WriteBatch::default()
        };
        self.write_batch(tenant, batch).await
    }

    /// Commit new tags on existing object versions.
    pub async fn save_new_tags(
        &self,
        tenant: impl Into<String>,
        tags: Vec<Tag>,
    ) -> Result<(), TracError> {
        let batch = WriteBatch {
            new_tags: tags,
            ..WriteBatch::default()
        };
        self.write_batch(tenant, batch).await
    }

    /// Execute a whole batch in one transaction, slots in order.
    ///
    /// Observers outside the transaction see either none or all of its
    /// rows; any failure aborts the whole batch.
    pub async fn write_batch(
        &self,
        tenant: impl Into<String>,
        batch: WriteBatch,
    ) -> Result<(), TracError> {
        let tenant = tenant.into();
        self.in_transaction(move |tx, dialect| {
            require_tenant(tx, &tenant)?;

            for (object_type, object_id) in &batch.preallocations {
                preallocate_tx(tx, dialect, &tenant, *object_type, *object_id)?;
            }
            for tag in &batch.new_objects {
                save_new_object_tx(tx, dialect, &tenant, tag)?;
            }
            for tag in &batch.preallocated_objects {
                save_preallocated_tx(tx, dialect, &tenant, tag)?;
            }
            for tag in &batch.new_versions {
                save_new_version_tx(tx, dialect, &tenant, tag)?;
            }
            for tag in &batch.new_tags {
                save_new_tag_tx(tx, dialect, &tenant, tag)?;
            }
            Ok(())
        })
        .await
    }

    // -- Reads ----------------------------------------------------------

    /// Resolve one selector to its tag, with definition and attributes.
    pub async fn load_object(
        &self,
        tenant: impl Into<String>,
        selector: TagSelector,
    ) -> Result<Tag, TracError> {
        let tenant = tenant.into();
        self.with_conn(move |conn, _| load_object_conn(conn, &tenant, &selector)).await
    }

    /// Resolve a list of selectors, positionally. The whole call fails if
    /// any selector fails.
    pub async fn load_objects(
        &self,
        tenant: impl Into<String>,
        selectors: Vec<TagSelector>,
    ) -> Result<Vec<Tag>, TracError> {
        let tenant = tenant.into();
        self.with_conn(move |conn, _| {
            selectors
                .iter()
                .map(|selector| load_object_conn(conn, &tenant, selector))
                .collect()
        })
        .await
    }

    /// Resolve the object version a selector pins to, without loading the
    /// payload. Used to normalise embedded selectors before commit.
    pub async fn resolve_object_version(
        &self,
        tenant: impl Into<String>,
        selector: TagSelector,
    ) -> Result<u32, TracError> {
        let tenant = tenant.into();
        self.with_conn(move |conn, _| {
            let object = object_row(conn, &tenant, &selector)?;
            let definition = definition_row(conn, object.object_pk, &selector)?;
            Ok(definition.object_version)
        })
        .await
    }

    /// Search tag attributes. Results carry headers and attributes but no
    /// definitions, ordered by (objectId, objectVersion, tagVersion).
    pub async fn search(
        &self,
        tenant: impl Into<String>,
        parameters: trac_metadata::search::SearchParameters,
    ) -> Result<Vec<Tag>, TracError> {
        let tenant = tenant.into();
        self.with_conn(move |conn, dialect| search::search_conn(conn, dialect, &tenant, &parameters))
            .await
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn map_sql_error(
    dialect: &dyn SqlDialect,
    error: rusqlite::Error,
    duplicate_message: &str,
    context: &str,
) -> TracError {
    match dialect.map_error(&error) {
        StoreErrorCode::DuplicateKey => TracError::new(ErrorKind::Duplicate, duplicate_message),
        StoreErrorCode::NoData => TracError::new(ErrorKind::NotFound, context),
        StoreErrorCode::MissingForeignKey => {
            TracError::new(ErrorKind::NotFound, format!("{context}: referenced row is missing"))
        }
        StoreErrorCode::Other => TracError::new(ErrorKind::Internal, context).with_source(error),
    }
}

// ---------------------------------------------------------------------------
// Row shapes
// ---------------------------------------------------------------------------

struct ObjectRow {
    object_pk: i64,
    object_type: ObjectType,
}

struct DefinitionRow {
    definition_pk: i64,
    object_version: u32,
    object_timestamp: i64,
    is_latest: bool,
    definition_blob: String,
}

struct TagRow {
    tag_pk: i64,
    tag_version: u32,
    tag_timestamp: i64,
    is_latest: bool,
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, TracError> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        TracError::new(ErrorKind::Internal, "stored timestamp is out of range")
    })
}

// ---------------------------------------------------------------------------
// Write helpers (inside one transaction)
// ---------------------------------------------------------------------------

fn require_tenant(tx: &Transaction<'_>, tenant: &str) -> Result<(), TracError> {
    let found: Result<i64, _> = tx.query_row(
        "SELECT 1 FROM tenant WHERE tenant_code = ?1",
        params![tenant],
        |row| row.get(0),
    );
    match found {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(TracError::new(
            ErrorKind::NotFound,
            format!("tenant [{tenant}] is not registered"),
        )),
        Err(e) => Err(internal("failed to check the tenant")(e)),
    }
}

fn preallocate_tx(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    object_type: ObjectType,
    object_id: Uuid,
) -> Result<(), TracError> {
    tx.execute(
        "INSERT INTO preallocation (tenant_code, object_id, object_type) VALUES (?1, ?2, ?3)",
        params![tenant, object_id.to_string(), object_type.as_str()],
    )
    .map_err(|e| {
        map_sql_error(
            dialect,
            e,
            &format!("object id {object_id} is already reserved"),
            "preallocation failed",
        )
    })?;
    Ok(())
}

fn definition_blob(tag: &Tag) -> Result<String, TracError> {
    let definition = tag.definition.as_ref().ok_or_else(|| {
        TracError::new(ErrorKind::Internal, "write request carries no definition")
    })?;
    serde_json::to_string(definition)
        .map_err(|e| TracError::new(ErrorKind::Internal, "definition failed to serialise").with_source(e))
}

fn insert_object(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    header: &TagHeader,
) -> Result<i64, TracError> {
    tx.execute(
        "INSERT INTO object (tenant_code, object_id, object_type) VALUES (?1, ?2, ?3)",
        params![
            tenant,
            header.object_id.to_string(),
            header.object_type.as_str()
        ],
    )
    .map_err(|e| {
        map_sql_error(
            dialect,
            e,
            &format!("object id {} is already in use", header.object_id),
            "object insert failed",
        )
    })?;
    Ok(tx.last_insert_rowid())
}

fn insert_definition(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    object_fk: i64,
    header: &TagHeader,
    blob: &str,
) -> Result<i64, TracError> {
    tx.execute(
        "INSERT INTO object_definition
            (tenant_code, object_fk, object_version, object_timestamp, is_latest, definition_blob)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            tenant,
            object_fk,
            header.object_version,
            header.object_timestamp.timestamp_micros(),
            header.is_latest_object,
            blob
        ],
    )
    .map_err(|e| {
        map_sql_error(
            dialect,
            e,
            &format!(
                "version {} of object {} already exists (superseded)",
                header.object_version, header.object_id
            ),
            "definition insert failed",
        )
    })?;
    Ok(tx.last_insert_rowid())
}

fn insert_tag_row(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    definition_fk: i64,
    header: &TagHeader,
) -> Result<i64, TracError> {
    tx.execute(
        "INSERT INTO tag (tenant_code, definition_fk, tag_version, tag_timestamp, is_latest)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            tenant,
            definition_fk,
            header.tag_version,
            header.tag_timestamp.timestamp_micros(),
            header.is_latest_tag
        ],
    )
    .map_err(|e| {
        map_sql_error(
            dialect,
            e,
            &format!(
                "tag {} on version {} of object {} already exists (superseded)",
                header.tag_version, header.object_version, header.object_id
            ),
            "tag insert failed",
        )
    })?;
    Ok(tx.last_insert_rowid())
}

fn insert_attrs(
    tx: &Transaction<'_>,
    tenant: &str,
    tag_fk: i64,
    attrs: &BTreeMap<String, Value>,
) -> Result<(), TracError> {
    let mut stmt = tx
        .prepare_cached(
            "INSERT INTO tag_attr
                (tenant_code, tag_fk, attr_name, attr_index, attr_type,
                 value_boolean, value_integer, value_float, value_decimal,
                 value_string, value_date, value_datetime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        )
        .map_err(internal("failed to prepare the attribute insert"))?;

    let mut insert_one =
        |name: &str, index: i64, value: &Value| -> Result<(), TracError> {
            let column = values::value_column(value.basic_type());
            let param = values::value_param(value)?;
            let type_name = value.basic_type().as_str();

            let columns = [
                "value_boolean",
                "value_integer",
                "value_float",
                "value_decimal",
                "value_string",
                "value_date",
                "value_datetime",
            ];
            let slots: Vec<Option<&values::SqlValue>> = columns
                .iter()
                .map(|c| if *c == column { Some(&param) } else { None })
                .collect();

            stmt.execute(params![
                tenant, tag_fk, name, index, type_name, slots[0], slots[1], slots[2], slots[3],
                slots[4], slots[5], slots[6]
            ])
            .map_err(internal("failed to insert an attribute row"))?;
            Ok(())
        };

    for (name, value) in attrs {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    insert_one(name, index as i64, item)?;
                }
            }
            single => insert_one(name, -1, single)?,
        }
    }
    Ok(())
}

fn save_new_object_tx(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    tag: &Tag,
) -> Result<(), TracError> {
    let blob = definition_blob(tag)?;
    let object_fk = insert_object(tx, dialect, tenant, &tag.header)?;
    let definition_fk = insert_definition(tx, dialect, tenant, object_fk, &tag.header, &blob)?;
    let tag_fk = insert_tag_row(tx, dialect, tenant, definition_fk, &tag.header)?;
    insert_attrs(tx, tenant, tag_fk, &tag.attributes)
}

fn save_preallocated_tx(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    tag: &Tag,
) -> Result<(), TracError> {
    let object_id = tag.header.object_id.to_string();

    let reserved_type: Result<String, _> = tx.query_row(
        "SELECT object_type FROM preallocation WHERE tenant_code = ?1 AND object_id = ?2",
        params![tenant, object_id],
        |row| row.get(0),
    );
    match reserved_type {
        Ok(reserved) if reserved == tag.header.object_type.as_str() => {}
        Ok(reserved) => {
            return Err(TracError::new(
                ErrorKind::WrongType,
                format!(
                    "object id {} was reserved as {reserved}, not {}",
                    tag.header.object_id, tag.header.object_type
                ),
            ));
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(TracError::new(
                ErrorKind::NotFound,
                format!("object id {} has not been preallocated", tag.header.object_id),
            ));
        }
        Err(e) => return Err(internal("failed to check the preallocation")(e)),
    }

    tx.execute(
        "DELETE FROM preallocation WHERE tenant_code = ?1 AND object_id = ?2",
        params![tenant, object_id],
    )
    .map_err(internal("failed to clear the preallocation"))?;

    // The unique object row turns a double promotion into Duplicate.
    save_new_object_tx(tx, dialect, tenant, tag)
}

fn save_new_version_tx(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    tag: &Tag,
) -> Result<(), TracError> {
    let blob = definition_blob(tag)?;
    let object = object_row(tx, tenant, &tag.header.to_selector())?;

    let prior_version = tag.header.object_version - 1;
    let flipped = tx
        .execute(
            "UPDATE object_definition SET is_latest = 0
             WHERE object_fk = ?1 AND object_version = ?2",
            params![object.object_pk, prior_version],
        )
        .map_err(internal("failed to supersede the prior version"))?;
    if flipped == 0 {
        return Err(TracError::new(
            ErrorKind::NotFound,
            format!(
                "version {prior_version} of object {} does not exist",
                tag.header.object_id
            ),
        ));
    }

    let definition_fk = insert_definition(tx, dialect, tenant, object.object_pk, &tag.header, &blob)?;
    let tag_fk = insert_tag_row(tx, dialect, tenant, definition_fk, &tag.header)?;
    insert_attrs(tx, tenant, tag_fk, &tag.attributes)
}

fn save_new_tag_tx(
    tx: &Transaction<'_>,
    dialect: &dyn SqlDialect,
    tenant: &str,
    tag: &Tag,
) -> Result<(), TracError> {
    let object = object_row(tx, tenant, &tag.header.to_selector())?;
    let definition = definition_row(tx, object.object_pk, &tag.header.to_selector())?;

    let prior_tag = tag.header.tag_version - 1;
    let flipped = tx
        .execute(
            "UPDATE tag SET is_latest = 0
             WHERE definition_fk = ?1 AND tag_version = ?2",
            params![definition.definition_pk, prior_tag],
        )
        .map_err(internal("failed to supersede the prior tag"))?;
    if flipped == 0 {
        return Err(TracError::new(
            ErrorKind::NotFound,
            format!(
                "tag {prior_tag} on version {} of object {} does not exist",
                tag.header.object_version, tag.header.object_id
            ),
        ));
    }

    let tag_fk = insert_tag_row(tx, dialect, tenant, definition.definition_pk, &tag.header)?;
    insert_attrs(tx, tenant, tag_fk, &tag.attributes)
}

// ---------------------------------------------------------------------------
// Read helpers
// ---------------------------------------------------------------------------

fn object_row(
    conn: &Connection,
    tenant: &str,
    selector: &TagSelector,
) -> Result<ObjectRow, TracError> {
    let row: Result<(i64, String), _> = conn.query_row(
        "SELECT object_pk, object_type FROM object WHERE tenant_code = ?1 AND object_id = ?2",
        params![tenant, selector.object_id.to_string()],
        |row| Ok((row.get(0)?, row.get(1)?)),
    );
    let (object_pk, type_name) = match row {
        Ok(found) => found,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(TracError::new(
                ErrorKind::NotFound,
                format!("object {} not found", selector.object_id),
            ));
        }
        Err(e) => return Err(internal("failed to look up the object")(e)),
    };

    let object_type: ObjectType = type_name.parse().map_err(|_| {
        TracError::new(ErrorKind::Internal, "stored object type is not recognised")
    })?;
    if object_type != selector.object_type {
        return Err(TracError::new(
            ErrorKind::WrongType,
            format!(
                "object {} is of type {object_type}, the selector declares {}",
                selector.object_id, selector.object_type
            ),
        ));
    }

    Ok(ObjectRow {
        object_pk,
        object_type,
    })
}

fn definition_row(
    conn: &Connection,
    object_pk: i64,
    selector: &TagSelector,
) -> Result<DefinitionRow, TracError> {
    const COLUMNS: &str =
        "definition_pk, object_version, object_timestamp, is_latest, definition_blob";
    let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<DefinitionRow> {
        Ok(DefinitionRow {
            definition_pk: row.get(0)?,
            object_version: row.get(1)?,
            object_timestamp: row.get(2)?,
            is_latest: row.get(3)?,
            definition_blob: row.get(4)?,
        })
    };

    let result = match &selector.object_criteria {
        ObjectCriteria::LatestObject => conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM object_definition WHERE object_fk = ?1 AND is_latest = 1"
            ),
            params![object_pk],
            map,
        ),
        ObjectCriteria::ObjectVersion(version) => conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM object_definition
                 WHERE object_fk = ?1 AND object_version = ?2"
            ),
            params![object_pk, version],
            map,
        ),
        ObjectCriteria::ObjectAsOf(as_of) => conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM object_definition
                 WHERE object_fk = ?1 AND object_timestamp <= ?2
                 ORDER BY object_version DESC LIMIT 1"
            ),
            params![object_pk, as_of.timestamp_micros()],
            map,
        ),
    };

    match result {
        Ok(row) => Ok(row),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(TracError::new(
            ErrorKind::NotFound,
            format!("object {} has no version matching the selector", selector.object_id),
        )),
        Err(e) => Err(internal("failed to resolve the object version")(e)),
    }
}

fn tag_row(
    conn: &Connection,
    definition_pk: i64,
    selector: &TagSelector,
) -> Result<TagRow, TracError> {
    const COLUMNS: &str = "tag_pk, tag_version, tag_timestamp, is_latest";
    let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<TagRow> {
        Ok(TagRow {
            tag_pk: row.get(0)?,
            tag_version: row.get(1)?,
            tag_timestamp: row.get(2)?,
            is_latest: row.get(3)?,
        })
    };

    let result = match &selector.tag_criteria {
        TagCriteria::LatestTag => conn.query_row(
            &format!("SELECT {COLUMNS} FROM tag WHERE definition_fk = ?1 AND is_latest = 1"),
            params![definition_pk],
            map,
        ),
        TagCriteria::TagVersion(version) => conn.query_row(
            &format!("SELECT {COLUMNS} FROM tag WHERE definition_fk = ?1 AND tag_version = ?2"),
            params![definition_pk, version],
            map,
        ),
        TagCriteria::TagAsOf(as_of) => conn.query_row(
            &format!(
                "SELECT {COLUMNS} FROM tag
                 WHERE definition_fk = ?1 AND tag_timestamp <= ?2
                 ORDER BY tag_version DESC LIMIT 1"
            ),
            params![definition_pk, as_of.timestamp_micros()],
            map,
        ),
    };

    match result {
        Ok(row) => Ok(row),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(TracError::new(
            ErrorKind::NotFound,
            format!("object {} has no tag matching the selector", selector.object_id),
        )),
        Err(e) => Err(internal("failed to resolve the tag version")(e)),
    }
}

pub(crate) fn load_attrs(
    conn: &Connection,
    tag_pk: i64,
) -> Result<BTreeMap<String, Value>, TracError> {
    let mut stmt = conn
        .prepare_cached(
            "SELECT attr_name, attr_index, attr_type,
                    value_boolean, value_integer, value_float, value_decimal,
                    value_string, value_date, value_datetime
             FROM tag_attr WHERE tag_fk = ?1
             ORDER BY attr_name, attr_index",
        )
        .map_err(internal("failed to prepare the attribute query"))?;

    let mut attrs: BTreeMap<String, Value> = BTreeMap::new();
    let mut rows = stmt
        .query(params![tag_pk])
        .map_err(internal("failed to query attributes"))?;

    while let Some(row) = rows.next().map_err(internal("failed to read attribute rows"))? {
        let name: String = row.get(0).map_err(internal("attribute name"))?;
        let index: i64 = row.get(1).map_err(internal("attribute index"))?;
        let attr_type: String = row.get(2).map_err(internal("attribute type"))?;
        let value = values::decode_attr_row(&attr_type, row, 3)?;

        if index < 0 {
            attrs.insert(name, value);
        } else {
            match attrs.entry(name).or_insert_with(|| Value::Array(Vec::new())) {
                Value::Array(items) => items.push(value),
                _ => {
                    return Err(TracError::new(
                        ErrorKind::Internal,
                        "attribute mixes single and array rows",
                    ));
                }
            }
        }
    }
    Ok(attrs)
}

fn load_object_conn(
    conn: &Connection,
    tenant: &str,
    selector: &TagSelector,
) -> Result<Tag, TracError> {
    let object = object_row(conn, tenant, selector)?;
    let definition = definition_row(conn, object.object_pk, selector)?;
    let tag = tag_row(conn, definition.definition_pk, selector)?;
    let attributes = load_attrs(conn, tag.tag_pk)?;

    let parsed: ObjectDefinition = serde_json::from_str(&definition.definition_blob)
        .map_err(|e| {
            TracError::new(ErrorKind::Internal, "stored definition failed to parse").with_source(e)
        })?;

    Ok(Tag {
        header: TagHeader {
            object_type: object.object_type,
            object_id: selector.object_id,
            object_version: definition.object_version,
            object_timestamp: from_micros(definition.object_timestamp)?,
            is_latest_object: definition.is_latest,
            tag_version: tag.tag_version,
            tag_timestamp: from_micros(tag.tag_timestamp)?,
            is_latest_tag: tag.is_latest,
        },
        definition: Some(parsed),
        attributes,
    })
}
