//! Docstore - versioned JSON documents over a partitioned column-family store
//!
//! Documents live in tables grouped into databases. Every write creates a
//! new version, and each declared index keeps a bucketed view table with
//! the document's projected fields as clustering columns.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use docstore::{DocstoreConfig, Document, Index, IndexCatalog, SchemaRegistry, TableReference};
//!
//! let config = DocstoreConfig::default();
//! let cluster = Arc::new(config.memory_cluster());
//! SchemaRegistry::standard(&config).create_all(cluster.as_ref()).await?;
//!
//! let orders = TableReference::new("shop", "orders")?;
//! let catalog = IndexCatalog::new(cluster.clone(), &config.keyspace)?;
//! catalog.create(Index::new(orders.clone(), "by_status", ["status"])?).await?;
//!
//! let store = catalog.open_store(orders.clone()).await?;
//! store.create(Document::from_json(orders, json!({"status": "open"}))?).await?;
//! let open = store.find("by_status", &["open".into()]).await?;
//! ```
//!
//! # Architecture
//!
//! - `docstore-core`: identifiers, values and name rules
//! - `docstore-storage`: the session contract and the in-process cluster
//! - `docstore-engine`: repositories, entities, views and schema lifecycle
//!
//! Only the engine API is re-exported here.

pub use docstore_engine::*;
