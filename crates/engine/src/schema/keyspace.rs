use async_trait::async_trait;
use docstore_storage::Session;

use super::{execute_ddl, Schemaable};
use crate::error::Result;

/// The keyspace itself
#[derive(Debug, Clone, Copy)]
pub struct KeyspaceSchema {
    replication_factor: u32,
}

impl KeyspaceSchema {
    /// Keyspace created with `SimpleStrategy` and the given factor
    pub fn new(replication_factor: u32) -> Self {
        Self { replication_factor }
    }
}

impl Default for KeyspaceSchema {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Schemaable for KeyspaceSchema {
    fn name(&self) -> String {
        "keyspace".to_string()
    }

    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(
            session,
            &format!(
                "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = \
                 {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
                keyspace, self.replication_factor
            ),
        )
        .await
    }

    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()> {
        execute_ddl(session, &format!("DROP KEYSPACE IF EXISTS {}", keyspace)).await
    }
}
