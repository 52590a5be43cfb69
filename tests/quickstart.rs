//! End-to-end walk through the public facade
//!
//! Creates the schema, registers a database, a table and an index, then
//! writes, finds, updates and deletes a document.

use std::sync::Arc;

use docstore::{
    Database, DatabaseBinding, DocstoreConfig, Document, Index, IndexCatalog, Repository,
    SchemaRegistry, Session, Table, TableBinding,
};
use serde_json::json;

#[tokio::test]
async fn test_quickstart_flow() {
    let config = DocstoreConfig::with_keyspace("quickstart");
    let cluster = Arc::new(config.memory_cluster());
    SchemaRegistry::standard(&config)
        .create_all(cluster.as_ref())
        .await
        .unwrap();
    let session: Arc<dyn Session> = cluster.clone();

    let databases = Repository::new(session.clone(), &config.keyspace, DatabaseBinding).unwrap();
    let tables = Repository::new(session.clone(), &config.keyspace, TableBinding).unwrap();
    databases
        .create(Database::new("shop").unwrap())
        .await
        .unwrap();
    let orders = tables
        .create(Table::new("shop", "orders").unwrap())
        .await
        .unwrap()
        .reference();

    let catalog = IndexCatalog::new(session, &config.keyspace).unwrap();
    catalog
        .create(Index::new(orders.clone(), "by_status", ["status", "total:double"]).unwrap())
        .await
        .unwrap();
    let store = catalog.open_store(orders.clone()).await.unwrap();

    let order = store
        .create(
            Document::from_json(orders.clone(), json!({"status": "open", "total": 12.5}))
                .unwrap(),
        )
        .await
        .unwrap();
    let open = store.find("by_status", &["open".into()]).await.unwrap();
    assert_eq!(open, vec![order.clone()]);

    let mut shipped = order.clone();
    shipped.object.insert("status".to_string(), json!("shipped"));
    let shipped = store.update(shipped).await.unwrap();
    assert!(store.find("by_status", &["open".into()]).await.unwrap().is_empty());
    assert_eq!(
        store.find("by_status", &["shipped".into(), 12.5.into()]).await.unwrap(),
        vec![shipped]
    );
    assert_eq!(store.versions(order.id).await.unwrap().len(), 2);

    assert!(store.delete(order.id).await.unwrap());
    assert!(store.read_all().await.unwrap().is_empty());
}
