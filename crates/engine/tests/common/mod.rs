//! Shared setup for engine integration tests.
//!
//! Import via `mod common;` from any test file.

#![allow(dead_code)]

use std::sync::Arc;

use docstore_engine::{
    ClusterConfig, DocstoreConfig, Index, IndexCatalog, MemoryCluster, SchemaRegistry, Session,
    TableReference,
};
use serde_json::{Map, Value as JsonValue};

pub const KEYSPACE: &str = "docstore_test";

/// Route engine logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A three-node cluster with the standard schema created
pub async fn cluster() -> Arc<MemoryCluster> {
    init_tracing();
    let config = DocstoreConfig {
        cluster: ClusterConfig {
            nodes: 3,
            vnodes: 8,
        },
        ..DocstoreConfig::with_keyspace(KEYSPACE)
    };
    let cluster = Arc::new(config.memory_cluster());
    SchemaRegistry::standard(&config)
        .initialize_all(cluster.as_ref())
        .await
        .unwrap();
    cluster
}

/// Same cluster, as the session trait object repositories take
pub fn session(cluster: &Arc<MemoryCluster>) -> Arc<dyn Session> {
    Arc::clone(cluster) as Arc<dyn Session>
}

pub fn orders() -> TableReference {
    TableReference::new("shop", "orders").unwrap()
}

/// Body from a `json!` object literal
pub fn body(value: JsonValue) -> Map<String, JsonValue> {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

/// Create the `by_ab` index `(a:text, b:int)` on `shop.orders`
pub async fn create_ab_index(cluster: &Arc<MemoryCluster>) -> Index {
    let catalog = IndexCatalog::new(session(cluster), KEYSPACE).unwrap();
    let index = Index::new(orders(), "by_ab", ["a:text", "b:int"]).unwrap();
    catalog.create(index).await.unwrap()
}

/// Total direct requests across the cluster
pub fn direct_requests(cluster: &MemoryCluster) -> u64 {
    cluster.stats().iter().map(|s| s.direct_requests).sum()
}
