//! Integration tests for schema lifecycle and configuration
//!
//! Verifies that a config file drives the cluster topology and keyspace,
//! and that the standard schema registry creates, drops and reinitializes
//! every column family.

use std::sync::Arc;

use docstore_engine::entity::database::DATABASES_TABLE;
use docstore_engine::entity::document::DOCUMENTS_TABLE;
use docstore_engine::entity::index::INDEXES_TABLE;
use docstore_engine::entity::table::TABLES_TABLE;
use docstore_engine::{
    Database, DatabaseBinding, DocstoreConfig, Repository, SchemaRegistry, Session,
    CONFIG_FILE_NAME,
};
use tempfile::TempDir;

const TABLES: [&str; 4] = [DATABASES_TABLE, TABLES_TABLE, INDEXES_TABLE, DOCUMENTS_TABLE];

#[test]
fn test_config_file_drives_cluster() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        "keyspace = \"orders\"\n\n[cluster]\nnodes = 5\nvnodes = 4\n",
    )
    .unwrap();

    let config = DocstoreConfig::from_file(&path).unwrap();
    assert_eq!(config.keyspace, "orders");
    assert_eq!(config.replication_factor, 1);

    let cluster = config.memory_cluster();
    assert_eq!(cluster.node_ids().len(), 5);

    SchemaRegistry::standard(&config)
        .create_all_blocking(&cluster)
        .unwrap();
    assert_eq!(cluster.keyspaces(), vec!["orders".to_string()]);
    for table in TABLES {
        assert!(cluster.has_table("orders", table), "missing {}", table);
    }
}

#[test]
fn test_default_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    DocstoreConfig::write_default_if_missing(&path).unwrap();
    assert_eq!(
        DocstoreConfig::from_file(&path).unwrap(),
        DocstoreConfig::default()
    );
}

#[tokio::test]
async fn test_standard_registry_lifecycle() {
    let config = DocstoreConfig::with_keyspace("lifecycle");
    let cluster = Arc::new(config.memory_cluster());
    let registry = SchemaRegistry::standard(&config);
    assert_eq!(registry.len(), 5);

    registry.create_all(cluster.as_ref()).await.unwrap();
    // Creating again is a no-op
    registry.create_all(cluster.as_ref()).await.unwrap();

    let session: Arc<dyn Session> = cluster.clone();
    let repo = Repository::new(session, "lifecycle", DatabaseBinding).unwrap();
    repo.create(Database::new("shop").unwrap()).await.unwrap();
    assert_eq!(cluster.row_count("lifecycle", DATABASES_TABLE), 1);

    // Reinitializing wipes data but keeps every table
    registry.initialize_all(cluster.as_ref()).await.unwrap();
    assert_eq!(cluster.row_count("lifecycle", DATABASES_TABLE), 0);
    for table in TABLES {
        assert!(cluster.has_table("lifecycle", table));
    }

    registry.drop_all(cluster.as_ref()).await.unwrap();
    assert!(cluster.keyspaces().is_empty());
    // Dropping what is already gone succeeds
    registry.drop_all(cluster.as_ref()).await.unwrap();
}
