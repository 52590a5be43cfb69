//! Document store engine
//!
//! This crate maps tables of schema-less JSON documents onto a partitioned
//! column-family store:
//! - Repository: generic CRUD engine over typed entity bindings
//! - Entities: databases, tables, indexes and versioned documents
//! - Views: bucketed secondary-index tables derived from document writes
//! - DocumentStore: per-table facade over documents and their views
//! - SchemaRegistry: ordered create/drop of every column family
//! - Events: created/updated/deleted notifications from repository hooks
//!
//! The engine only talks to storage through `docstore_storage::Session`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod documents;
pub mod entity;
pub mod error;
pub mod events;
pub mod repository;
pub mod schema;
pub mod view;

pub use catalog::IndexCatalog;
pub use config::{DocstoreConfig, CONFIG_FILE_NAME};
pub use documents::DocumentStore;
pub use entity::{
    Database, DatabaseBinding, Document, DocumentBinding, Index, IndexBinding, IndexField, Table,
    TableBinding, TableReference,
};
pub use error::{Error, Result};
pub use events::{ChannelSink, Event, EventFactory, EventKind, EventObserver, EventSink};
pub use repository::{EntityBinding, Observer, Repository, StatementTemplates};
pub use schema::{KeyspaceSchema, SchemaRegistry, SchemaRegistryBuilder, Schemaable};
pub use view::{BucketedViewSchema, BucketedViewStatementFactory, ReconcileReport, ViewEntry};

pub use docstore_core::{identifier, DataType, Identifier, Value};
pub use docstore_storage::{ClusterConfig, MemoryCluster, NodeId, Session, StoreError};
