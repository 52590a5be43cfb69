//! Documents: versioned, schema-less JSON objects
//!
//! `updated_at` is part of a document's identity, so every write lands on a
//! new clustering row and the partition `(database, table, id)` holds the
//! full version history, newest first. The repository's delete removes the
//! whole partition.
//!
//! Each row also carries `superseded_by`, the `updated_at` of the version
//! that replaced it. Setting it is the compare-and-set that lets exactly one
//! writer extend the history from a given version.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use docstore_core::{identifier, Identifier, Value};
use docstore_storage::{Row, Session, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::{now_millis, TableReference};
use crate::error::{Error, Result};
use crate::repository::{EntityBinding, StatementTemplates};
use crate::schema::{execute_ddl, Schemaable};

/// Column family name
pub const DOCUMENTS_TABLE: &str = "documents";

/// Named query: newest version of one document
pub const LATEST_QUERY: &str = "latest";

/// Named query: every version of one document, newest first
pub const VERSIONS_QUERY: &str = "versions";

const VERSION_ROW: &str = "db_name = ? AND tbl_name = ? AND id = ? AND updated_at = ?";

/// Mark a version as superseded, if no other writer did so first
///
/// Binds `(superseded_by, database, table, id, updated_at)`.
pub(crate) fn claim_version_cql(keyspace: &str) -> String {
    format!(
        "UPDATE {}.{} SET superseded_by = ? WHERE {} IF superseded_by = null",
        keyspace, DOCUMENTS_TABLE, VERSION_ROW
    )
}

/// Undo a claim whose successor was never written
///
/// Binds `(database, table, id, updated_at, superseded_by)`.
pub(crate) fn release_version_cql(keyspace: &str) -> String {
    format!(
        "UPDATE {}.{} SET superseded_by = null WHERE {} IF superseded_by = ?",
        keyspace, DOCUMENTS_TABLE, VERSION_ROW
    )
}

/// A JSON document stored in a table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, stable across versions
    pub id: Uuid,
    /// Owning table
    pub table: TableReference,
    /// Body
    pub object: Map<String, JsonValue>,
    /// Time of the first version
    pub created_at: DateTime<Utc>,
    /// Time of this version
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// New document with a random id
    pub fn new(table: TableReference, object: Map<String, JsonValue>) -> Self {
        Self::with_id(Uuid::new_v4(), table, object)
    }

    /// New document with a caller-chosen id
    pub fn with_id(id: Uuid, table: TableReference, object: Map<String, JsonValue>) -> Self {
        let now = now_millis();
        Self {
            id,
            table,
            object,
            created_at: now,
            updated_at: now,
        }
    }

    /// New document from a JSON value, which must be an object
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for any other JSON value.
    pub fn from_json(table: TableReference, value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Object(object) => Ok(Self::new(table, object)),
            other => Err(Error::invalid_input(format!(
                "document body must be a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Store identifier `(database, table, id, updated_at)`
    pub fn identifier(&self) -> Identifier {
        identifier![
            self.table.database.as_str(),
            self.table.name.as_str(),
            self.id,
            self.updated_at
        ]
    }

    /// Move `updated_at` forward to now, and at least 1 ms past its
    /// previous value
    pub fn touch(&mut self) {
        let next = self.updated_at + Duration::milliseconds(1);
        self.updated_at = now_millis().max(next);
    }

    /// Body value at a dotted path
    pub fn field(&self, path: &str) -> Option<&JsonValue> {
        let mut segments = path.split('.');
        let mut current = self.object.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Binding of [`Document`] onto the `documents` column family
///
/// Both creates and updates insert `IF NOT EXISTS` at the new `updated_at`,
/// so neither overwrites a stored version. The store facade claims the
/// previous version before an update. Named queries
/// [`LATEST_QUERY`] and [`VERSIONS_QUERY`] take `(database, table, id)`;
/// `read_all` takes `(database, table)` and returns every version.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentBinding;

impl EntityBinding for DocumentBinding {
    type Entity = Document;

    fn kind(&self) -> &'static str {
        "document"
    }

    fn templates(&self, keyspace: &str) -> StatementTemplates {
        let t = format!("{}.{}", keyspace, DOCUMENTS_TABLE);
        let columns = "db_name, tbl_name, id, updated_at, created_at, object";
        let partition = "db_name = ? AND tbl_name = ? AND id = ?";
        StatementTemplates {
            create: Some(format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                t, columns
            )),
            update: Some(format!(
                "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?) IF NOT EXISTS",
                t, columns
            )),
            delete: Some(format!("DELETE FROM {} WHERE {} IF EXISTS", t, partition)),
            read: Some(format!(
                "SELECT * FROM {} WHERE {} AND updated_at = ?",
                t, partition
            )),
            read_all: Some(format!(
                "SELECT * FROM {} WHERE db_name = ? AND tbl_name = ? ALLOW FILTERING",
                t
            )),
            queries: Vec::new(),
        }
        .with_query(
            LATEST_QUERY,
            format!("SELECT * FROM {} WHERE {} LIMIT 1", t, partition),
        )
        .with_query(VERSIONS_QUERY, format!("SELECT * FROM {} WHERE {}", t, partition))
    }

    fn bind_create(&self, doc: &Document) -> Vec<Value> {
        vec![
            doc.table.database.as_str().into(),
            doc.table.name.as_str().into(),
            doc.id.into(),
            doc.updated_at.into(),
            doc.created_at.into(),
            JsonValue::Object(doc.object.clone()).to_string().into(),
        ]
    }

    fn bind_update(&self, doc: &Document) -> Vec<Value> {
        self.bind_create(doc)
    }

    /// Deletes address the partition, so `updated_at` is dropped
    fn bind_delete(&self, id: &Identifier) -> Vec<Value> {
        id.components().iter().take(3).cloned().collect()
    }

    fn marshal_row(&self, row: &Row) -> StoreResult<Document> {
        let id = row.require_uuid("id")?;
        let object = match serde_json::from_str(row.require_text("object")?) {
            Ok(JsonValue::Object(object)) => object,
            Ok(_) => {
                return Err(StoreError::decode(format!(
                    "document {} body is not a JSON object",
                    id
                )))
            }
            Err(e) => {
                return Err(StoreError::decode(format!("document {} body: {}", id, e)))
            }
        };
        Ok(Document {
            id,
            table: TableReference {
                database: row.require_text("db_name")?.to_string(),
                name: row.require_text("tbl_name")?.to_string(),
            },
            object,
            created_at: row.require_timestamp("created_at")?,
            updated_at: row.require_timestamp("updated_at")?,
        })
    }

    fn identifier(&self, doc: &Document) -> Identifier {
        doc.identifier()
    }
}

/// Schema of the `documents` column family
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentsSchema;

#[async_trait]
impl Schemaable for DocumentsSchema {
    fn name(&self) -> String {
        DOCUMENTS_TABLE.to_string()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.{} (\
                 db_name text, tbl_name text, id uuid, updated_at timestamp, \
                 created_at timestamp, object text, superseded_by timestamp, \
                 PRIMARY KEY ((db_name, tbl_name, id), updated_at)) \
                 WITH CLUSTERING ORDER BY (updated_at DESC)",
                keyspace, DOCUMENTS_TABLE
            ),
        )
        .await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!("DROP TABLE IF EXISTS {}.{}", keyspace, DOCUMENTS_TABLE),
        )
        .await
    }
}
