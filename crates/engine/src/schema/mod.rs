//! Column-family schema lifecycle
//!
//! Every column family the store needs is described by a [`Schemaable`]
//! object that can create and drop itself. The [`SchemaRegistry`] applies a
//! fixed, ordered list of them.

mod keyspace;
mod registry;

pub use keyspace::KeyspaceSchema;
pub use registry::{SchemaRegistry, SchemaRegistryBuilder};

use async_trait::async_trait;
use docstore_storage::Session;
use tracing::trace;

use crate::error::Result;

/// Something that can create and drop its own schema in a keyspace
///
/// Idempotency is up to each implementation. The built-in schema objects
/// get it from `IF [NOT] EXISTS` in their DDL; the trait does not enforce it.
#[async_trait]
pub trait Schemaable: Send + Sync {
    /// Name used in logs
    fn name(&self) -> String;

    /// Create the schema object
    async fn create(&self, session: &dyn Session, keyspace: &str) -> Result<()>;

    /// Drop the schema object
    async fn drop(&self, session: &dyn Session, keyspace: &str) -> Result<()>;
}

/// Run one schema statement
pub async fn execute_ddl(session: &dyn Session, cql: &str) -> Result<()> {
    trace!(cql, "DDL");
    session.execute_unprepared(cql).await?;
    Ok(())
}
