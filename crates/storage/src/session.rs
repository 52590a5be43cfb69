//! Backing-store client contract
//!
//! This trait is the only thing the repository layer knows about the store.
//! An implementation may be a network driver or the in-process
//! [`MemoryCluster`](crate::memory::MemoryCluster).
//!
//! Thread safety: all methods may be called concurrently from many tasks
//! (requires Send + Sync). Implementations multiplex in-flight requests
//! themselves; callers never serialise access.

use std::fmt;

use async_trait::async_trait;
use docstore_core::Value;

use crate::error::StoreResult;
use crate::result::ResultSet;
use crate::statement::{BoundStatement, PreparedStatement};

/// A storage node in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Client session against a partitioned column-family store
#[async_trait]
pub trait Session: Send + Sync {
    /// Parse and validate a statement once
    ///
    /// # Errors
    ///
    /// Returns a syntax error for unparseable text and an invalid-request
    /// error when the statement references unknown keyspaces, tables or
    /// columns.
    fn prepare(&self, query: &str) -> StoreResult<PreparedStatement>;

    /// Execute a bound statement
    ///
    /// Statements carrying a routing key are sent straight to the node that
    /// owns the partition.
    async fn execute(&self, statement: BoundStatement) -> StoreResult<ResultSet>;

    /// Execute statement text directly (schema changes)
    async fn execute_unprepared(&self, query: &str) -> StoreResult<ResultSet>;

    /// Node owning the partition with this key, if the topology is known
    fn owner_of(&self, routing_key: &[&Value]) -> Option<NodeId>;
}
