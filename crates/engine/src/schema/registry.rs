//! Ordered schema registry
//!
//! Built once through [`SchemaRegistryBuilder`], then only read. The
//! registration order is the order every lifecycle operation walks:
//!
//! | Operation | Walk |
//! |-----------|------|
//! | `create_all` | create, registration order |
//! | `drop_all` | drop, registration order |
//! | `initialize_all` | every drop, then every create |
//!
//! There is no global instance; callers pass the registry by reference.

use std::sync::Arc;

use docstore_storage::Session;
use futures::executor::block_on;
use tracing::info;

use super::{KeyspaceSchema, Schemaable};
use crate::config::DocstoreConfig;
use crate::entity::{DatabasesSchema, DocumentsSchema, IndexesSchema, TablesSchema};
use crate::error::Result;

// ============================================================================
// Builder
// ============================================================================

/// Collects schema objects in the order they will be applied
#[derive(Default)]
pub struct SchemaRegistryBuilder {
    schemas: Vec<Arc<dyn Schemaable>>,
}

impl SchemaRegistryBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a schema object
    pub fn register(self, schema: impl Schemaable + 'static) -> Self {
        self.register_arc(Arc::new(schema))
    }

    /// Append a shared schema object
    pub fn register_arc(mut self, schema: Arc<dyn Schemaable>) -> Self {
        self.schemas.push(schema);
        self
    }

    /// Freeze the list for `keyspace`
    pub fn build(self, keyspace: impl Into<String>) -> SchemaRegistry {
        SchemaRegistry {
            keyspace: keyspace.into(),
            schemas: self.schemas,
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Fixed, ordered list of schema objects for one keyspace
pub struct SchemaRegistry {
    keyspace: String,
    schemas: Vec<Arc<dyn Schemaable>>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("keyspace", &self.keyspace)
            .field("schemas", &self.names())
            .finish()
    }
}

impl SchemaRegistry {
    /// Start a builder
    pub fn builder() -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new()
    }

    /// Keyspace, databases, tables, indexes, documents
    pub fn standard(config: &DocstoreConfig) -> Self {
        Self::builder()
            .register(KeyspaceSchema::new(config.replication_factor))
            .register(DatabasesSchema)
            .register(TablesSchema)
            .register(IndexesSchema)
            .register(DocumentsSchema)
            .build(config.keyspace.clone())
    }

    /// Target keyspace
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Schema names in registration order
    pub fn names(&self) -> Vec<String> {
        self.schemas.iter().map(|s| s.name()).collect()
    }

    /// Number of registered schema objects
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Create every schema object in registration order
    ///
    /// Stops at the first failure.
    pub async fn create_all(&self, session: &dyn Session) -> Result<()> {
        for schema in &self.schemas {
            info!(keyspace = %self.keyspace, schema = %schema.name(), "Creating schema");
            schema.create(session, &self.keyspace).await?;
        }
        Ok(())
    }

    /// Drop every schema object in registration order
    ///
    /// Stops at the first failure.
    pub async fn drop_all(&self, session: &dyn Session) -> Result<()> {
        for schema in &self.schemas {
            info!(keyspace = %self.keyspace, schema = %schema.name(), "Dropping schema");
            Schemaable::drop(schema.as_ref(), session, &self.keyspace).await?;
        }
        Ok(())
    }

    /// Drop everything, then create everything
    pub async fn initialize_all(&self, session: &dyn Session) -> Result<()> {
        self.drop_all(session).await?;
        self.create_all(session).await
    }

    /// Blocking [`create_all`](Self::create_all)
    pub fn create_all_blocking(&self, session: &dyn Session) -> Result<()> {
        block_on(self.create_all(session))
    }

    /// Blocking [`drop_all`](Self::drop_all)
    pub fn drop_all_blocking(&self, session: &dyn Session) -> Result<()> {
        block_on(self.drop_all(session))
    }

    /// Blocking [`initialize_all`](Self::initialize_all)
    pub fn initialize_all_blocking(&self, session: &dyn Session) -> Result<()> {
        block_on(self.initialize_all(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use async_trait::async_trait;
    use docstore_storage::MemoryCluster;
    use parking_lot::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Recording {
        name: &'static str,
        log: Log,
        fail_create: bool,
    }

    #[async_trait]
    impl Schemaable for Recording {
        fn name(&self) -> String {
            self.name.to_string()
        }

        async fn create(&self, _session: &dyn Session, _keyspace: &str) -> Result<()> {
            self.log.lock().push(format!("create {}", self.name));
            if self.fail_create {
                return Err(Error::invalid_input("boom"));
            }
            Ok(())
        }

        async fn drop(&self, _session: &dyn Session, _keyspace: &str) -> Result<()> {
            self.log.lock().push(format!("drop {}", self.name));
            Ok(())
        }
    }

    fn registry(log: &Log, failing: Option<&'static str>) -> SchemaRegistry {
        ["a", "b", "c"]
            .into_iter()
            .fold(SchemaRegistry::builder(), |builder, name| {
                builder.register(Recording {
                    name,
                    log: Arc::clone(log),
                    fail_create: failing == Some(name),
                })
            })
            .build("ks")
    }

    #[test]
    fn test_create_all_in_registration_order() {
        let log = Log::default();
        let session = MemoryCluster::single_node();
        registry(&log, None).create_all_blocking(&session).unwrap();
        assert_eq!(*log.lock(), vec!["create a", "create b", "create c"]);
    }

    #[test]
    fn test_initialize_drops_all_then_creates_all() {
        let log = Log::default();
        let session = MemoryCluster::single_node();
        registry(&log, None).initialize_all_blocking(&session).unwrap();
        assert_eq!(
            *log.lock(),
            vec!["drop a", "drop b", "drop c", "create a", "create b", "create c"]
        );
    }

    #[test]
    fn test_create_all_stops_at_first_failure() {
        let log = Log::default();
        let session = MemoryCluster::single_node();
        let err = registry(&log, Some("b"))
            .create_all_blocking(&session)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(*log.lock(), vec!["create a", "create b"]);
    }

    #[test]
    fn test_standard_order() {
        let registry = SchemaRegistry::standard(&DocstoreConfig::default());
        assert_eq!(
            registry.names(),
            vec!["keyspace", "databases", "tables", "indexes", "documents"]
        );
        assert_eq!(registry.keyspace(), "docstore");
    }

    #[tokio::test]
    async fn test_standard_creates_column_families() {
        let session = MemoryCluster::single_node();
        let registry = SchemaRegistry::standard(&DocstoreConfig::with_keyspace("app"));
        registry.create_all(&session).await.unwrap();
        for table in ["databases", "tables", "indexes", "documents"] {
            assert!(session.has_table("app", table), "missing {}", table);
        }

        // Creating again is a no-op; initialize rebuilds from scratch
        registry.create_all(&session).await.unwrap();
        registry.initialize_all(&session).await.unwrap();
        assert!(session.has_table("app", "documents"));

        registry.drop_all(&session).await.unwrap();
        assert!(session.keyspaces().is_empty());
    }
}
