//! Databases: named catalogs of tables

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docstore_core::{identifier, validate_name, Identifier, Value};
use docstore_storage::{Row, Session, StoreResult};
use serde::{Deserialize, Serialize};

use super::now_millis;
use crate::error::Result;
use crate::repository::{EntityBinding, StatementTemplates};
use crate::schema::{execute_ddl, Schemaable};

/// Column family name
pub const DATABASES_TABLE: &str = "databases";

/// A named catalog of tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    /// Unique name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Database {
    /// New database stamped with the current time
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the name breaks the naming rules.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name("database", &name)?;
        let now = now_millis();
        Ok(Self {
            name,
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

    /// Store identifier `(name)`
    pub fn identifier(&self) -> Identifier {
        identifier![self.name.as_str()]
    }
}

/// Binding of [`Database`] onto the `databases` column family
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabaseBinding;

impl EntityBinding for DatabaseBinding {
    type Entity = Database;

    fn kind(&self) -> &'static str {
        "database"
    }

    fn templates(&self, keyspace: &str) -> StatementTemplates {
        let t = format!("{}.{}", keyspace, DATABASES_TABLE);
        StatementTemplates {
            create: Some(format!(
                "INSERT INTO {} (name, description, created_at, updated_at) \
                 VALUES (?, ?, ?, ?) IF NOT EXISTS",
                t
            )),
            update: Some(format!(
                "UPDATE {} SET description = ?, updated_at = ? WHERE name = ? IF EXISTS",
                t
            )),
            delete: Some(format!("DELETE FROM {} WHERE name = ? IF EXISTS", t)),
            read: Some(format!("SELECT * FROM {} WHERE name = ?", t)),
            read_all: Some(format!("SELECT * FROM {}", t)),
            queries: Vec::new(),
        }
    }

    fn bind_create(&self, db: &Database) -> Vec<Value> {
        vec![
            db.name.as_str().into(),
            db.description.clone().into(),
            db.created_at.into(),
            db.updated_at.into(),
        ]
    }

    fn bind_update(&self, db: &Database) -> Vec<Value> {
        vec![
            db.description.clone().into(),
            db.updated_at.into(),
            db.name.as_str().into(),
        ]
    }

    fn marshal_row(&self, row: &Row) -> StoreResult<Database> {
        Ok(Database {
            name: row.require_text("name")?.to_string(),
            description: row.get_text("description")?.map(str::to_string),
            created_at: row.require_timestamp("created_at")?,
            updated_at: row.require_timestamp("updated_at")?,
        })
    }

    fn identifier(&self, db: &Database) -> Identifier {
        db.identifier()
    }
}

/// Schema of the `databases` column family
#[derive(Debug, Clone, Copy, Default)]
pub struct DatabasesSchema;

#[async_trait]
impl Schemaable for DatabasesSchema {
    fn name(&self) -> String {
        DATABASES_TABLE.to_string()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!(
                "CREATE TABLE IF NOT EXISTS {}.{} (\
                 name text, description text, created_at timestamp, updated_at timestamp, \
                 PRIMARY KEY ((name)))",
                keyspace, DATABASES_TABLE
            ),
        )
        .await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!("DROP TABLE IF EXISTS {}.{}", keyspace, DATABASES_TABLE),
        )
        .await
    }
}
