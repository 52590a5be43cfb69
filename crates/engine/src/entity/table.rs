//! Tables: database-scoped containers of documents

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docstore_core::{identifier, Identifier, Value};
use docstore_storage::{Row, Session, StoreResult};
use serde::{Deserialize, Serialize};

use super::{now_millis, TableReference};
use crate::error::Result;
use crate::repository::{EntityBinding, StatementTemplates};
use crate::schema::{execute_ddl, Schemaable};

/// Column family name
pub const TABLES_TABLE: &str = "tables";

/// A named container of documents inside a database
///
/// Indexes declared on a table are stored separately, see
/// [`Index`](super::Index).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Owning database
    pub database: String,
    /// Table name, unique within the database
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Table {
    /// New table stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if either name breaks the naming rules.
    pub fn new(database: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let reference = TableReference::new(database, name)?;
        let now = now_millis();
        Ok(Self {
            database: reference.database,
            name: reference.name,
            description: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Reference used by documents and indexes
    pub fn reference(&self) -> TableReference {
        TableReference {
            database: self.database.clone(),
            name: self.name.clone(),
        }
    }

    /// Store identifier `(database, name)`
    pub fn identifier(&self) -> Identifier {
        identifier![self.database.as_str(), self.name.as_str()]
    }
}

/// Binding of [`Table`] onto the `tables` column family
///
/// Tables are partitioned by database, so `read_all` takes the database name
/// and reads a single partition.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableBinding;

impl EntityBinding for TableBinding {
    type Entity = Table;

    fn kind(&self) -> &'static str {
        "table"
    }

    fn templates(&self, keyspace: &str) -> StatementTemplates {
        let t = format!("{}.{}", keyspace, TABLES_TABLE);
        StatementTemplates {
            create: Some(format!(
                "INSERT INTO {} (db_name, name, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?) IF NOT EXISTS",
                t
            )),
            update: Some(format!(
                "UPDATE {} SET description = ?, updated_at = ? \
                 WHERE db_name = ? AND name = ? IF EXISTS",
                t
            )),
            delete: Some(format!(
                "DELETE FROM {} WHERE db_name = ? AND name = ? IF EXISTS",
                t
            )),
            read: Some(format!("SELECT * FROM {} WHERE db_name = ? AND name = ?", t)),
            read_all: Some(format!("SELECT * FROM {} WHERE db_name = ?", t)),
            queries: Vec::new(),
        }
    }

    fn bind_create(&self, table: &Table) -> Vec<Value> {
        vec![
            table.database.as_str().into(),
            table.name.as_str().into(),
            table.description.clone().into(),
            table.created_at.into(),
            table.updated_at.into(),
        ]
    }

    fn bind_update(&self, table: &Table) -> Vec<Value> {
        vec![
            table.description.clone().into(),
            table.updated_at.into(),
            table.database.as_str().into(),
            table.name.as_str().into(),
        ]
    }

    fn marshal_row(&self, row: &Row) -> StoreResult<Table> {
        Ok(Table {
            database: row.require_text("db_name")?.to_string(),
            name: row.require_text("name")?.to_string(),
            description: row.get_text("description")?.map(str::to_string),
            created_at: row.require_timestamp("created_at")?,
            updated_at: row.require_timestamp("updated_at")?,
        })
    }

    fn identifier(&self, table: &Table) -> Identifier {
        table.identifier()
    }
}

/// Schema of the `tables` column family
#[derive(Debug, Clone, Copy, Default)]
pub struct TablesSchema;

#[async_trait]
impl Schemaable for TablesSchema {
    fn name(&self) -> String {
        TABLES_TABLE.to_string()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.{} (\
                 db_name text, name text, description text, \
                 created_at timestamp, updated_at timestamp, \
                 PRIMARY KEY ((db_name), name))",
                keyspace, TABLES_TABLE
            ),
        )
        .await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!("DROP TABLE IF EXISTS {}.{}", keyspace, TABLES_TABLE),
        )
        .await
    }
}
