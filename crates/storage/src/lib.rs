//! Backing-store client layer for docstore
//!
//! This crate defines what the repository layer needs from a partitioned
//! column-family store, and ships an in-process implementation of it:
//! - `Session`: prepare, execute and route statements
//! - `PreparedStatement` / `BoundStatement`: typed bind markers and routing keys
//! - `ResultSet` / `Row`: query results and conditional-write outcomes
//! - `cql`: parser for the CQL subset the repositories emit
//! - `MemoryCluster`: token-ring cluster of simulated nodes with fault injection

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cql;
pub mod error;
pub mod memory;
pub mod result;
pub mod session;
pub mod statement;

pub use error::{BindError, StoreError, StoreResult};
pub use memory::{ClusterConfig, MemoryCluster, NodeStats};
pub use result::{ResultSet, Row};
pub use session::{NodeId, Session};
pub use statement::{BoundStatement, ColumnSpec, PreparedStatement};
