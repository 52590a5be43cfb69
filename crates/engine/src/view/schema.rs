use async_trait::async_trait;
use docstore_storage::Session;

use super::PARTITION_COLUMNS;
use crate::entity::Index;
use crate::error::Result;
use crate::schema::{execute_ddl, Schemaable};

/// Creates and drops the view table of one index
#[derive(Debug, Clone)]
pub struct BucketedViewSchema {
    index: Index,
}

impl BucketedViewSchema {
    /// Schema for `index`
    pub fn new(index: Index) -> Self {
        Self { index }
    }

    /// `CREATE TABLE` text for the view in `keyspace`
    pub fn create_cql(&self, keyspace: &str) -> String {
        let mut columns: Vec<String> = PARTITION_COLUMNS
            .iter()
            .map(|c| format!("{} text", c))
            .collect();
        let mut clustering = Vec::with_capacity(self.index.fields.len() + 1);
        for field in &self.index.fields {
            let column = field.column();
            columns.push(format!("{} {}", column, field.field_type.cql_name()));
            clustering.push(column);
        }
        columns.push("id uuid".to_string());
        columns.push("updated_at timestamp".to_string());
        clustering.push("id".to_string());

        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} ({}, PRIMARY KEY (({}), {}))",
            keyspace,
            self.index.view_table(),
            columns.join(", "),
            PARTITION_COLUMNS.join(", "),
            clustering.join(", ")
        )
    }
}

#[async_trait]
impl Schemaable for BucketedViewSchema {
    fn name(&self) -> String {
        self.index.view_table()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(session, &self.create_cql(keyspace)).await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!("DROP TABLE IF EXISTS {}.{}", keyspace, self.index.view_table()),
        )
        .await
    }
}
