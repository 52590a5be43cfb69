//! Integration tests for the generic repository
//!
//! Exercises the repository against a three-node memory cluster through the
//! database and table bindings:
//! - Conditional create/update/delete and their error mapping
//! - Batched and streamed reads routed by partition key
//! - Observers and change events
//! - Identifier bind failures and omitted templates

mod common;

use std::sync::Arc;

use common::{cluster, direct_requests, session, KEYSPACE};
use docstore_engine::{
    identifier, ChannelSink, Database, DatabaseBinding, EntityBinding, Error, EventKind,
    EventObserver, Identifier, MemoryCluster, Observer, Repository, Session, StatementTemplates,
    Table, TableBinding, Value,
};
use docstore_storage::{Row, StoreResult};
use futures::StreamExt;
use parking_lot::Mutex;

async fn databases() -> (Arc<MemoryCluster>, Repository<DatabaseBinding>) {
    let cluster = cluster().await;
    let repo = Repository::new(session(&cluster), KEYSPACE, DatabaseBinding).unwrap();
    (cluster, repo)
}

// ============================================================================
// Create / update / delete
// ============================================================================

#[tokio::test]
async fn test_create_twice_is_duplicate() {
    let (_cluster, repo) = databases().await;
    let db = Database::new("shop").unwrap();

    let created = repo.create(db.clone()).await.unwrap();
    assert_eq!(created, db);

    let err = repo.create(db).await.unwrap_err();
    assert!(err.is_duplicate(), "expected DuplicateItem, got {:?}", err);
}

#[tokio::test]
async fn test_update_missing_is_not_found() {
    let (_cluster, repo) = databases().await;
    let err = repo
        .update(Database::new("ghost").unwrap())
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "expected ItemNotFound, got {:?}", err);
}

#[tokio::test]
async fn test_update_changes_stored_row() {
    let (_cluster, repo) = databases().await;
    let db = repo.create(Database::new("shop").unwrap()).await.unwrap();

    let updated = repo
        .update(db.clone().with_description("retail"))
        .await
        .unwrap();
    let read = repo.read(&db.identifier()).await.unwrap();
    assert_eq!(read, updated);
    assert_eq!(read.description.as_deref(), Some("retail"));
}

#[tokio::test]
async fn test_delete_then_read_is_not_found() {
    let (_cluster, repo) = databases().await;
    let db = repo.create(Database::new("shop").unwrap()).await.unwrap();
    let id = db.identifier();

    assert!(repo.delete(&id).await.unwrap());
    assert!(repo.read(&id).await.unwrap_err().is_not_found());
    assert!(repo.read_optional(&id).await.unwrap().is_none());

    // Second delete finds nothing to remove
    assert!(repo.delete(&id).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_read_all_with_parameters() {
    let cluster = cluster().await;
    let tables = Repository::new(session(&cluster), KEYSPACE, TableBinding).unwrap();
    for name in ["orders", "customers"] {
        tables.create(Table::new("shop", name).unwrap()).await.unwrap();
    }
    tables.create(Table::new("crm", "leads").unwrap()).await.unwrap();

    let shop = tables.read_all(vec!["shop".into()]).await.unwrap();
    let mut names: Vec<_> = shop.iter().map(|t| t.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, ["customers", "orders"]);
    assert!(tables.read_all(vec!["none".into()]).await.unwrap().is_empty());
}

// ============================================================================
// Batched reads
// ============================================================================

#[tokio::test]
async fn test_read_many_omits_missing_keys() {
    let (cluster, repo) = databases().await;
    repo.create(Database::new("k1").unwrap()).await.unwrap();
    repo.create(Database::new("k3").unwrap()).await.unwrap();

    cluster.reset_stats();
    let ids = [identifier!["k1"], identifier!["k2"], identifier!["k3"]];
    let mut found: Vec<_> = repo
        .read_many(&ids)
        .await
        .unwrap()
        .into_iter()
        .map(|db| db.name)
        .collect();
    found.sort_unstable();
    assert_eq!(found, ["k1", "k3"]);

    // Every key read went straight to its owner
    assert_eq!(direct_requests(&cluster), 3);
    for key in ["k1", "k2", "k3"] {
        let owner = cluster.owner_of(&[&Value::from(key)]).unwrap();
        let stats = &cluster.stats()[owner.0];
        assert!(stats.direct_requests >= 1, "{} not routed to {}", key, owner);
    }
}

#[tokio::test]
async fn test_read_many_stream_reports_each_key() {
    let (_cluster, repo) = databases().await;
    repo.create(Database::new("a").unwrap()).await.unwrap();

    let ids = vec![identifier!["a"], identifier!["b"]];
    let mut results: Vec<(Identifier, bool)> = repo
        .read_many_stream(ids)
        .map(|(id, result)| (id, result.unwrap().is_some()))
        .collect()
        .await;
    results.sort_by_key(|(id, _)| id.to_string());
    assert_eq!(
        results,
        vec![(identifier!["a"], true), (identifier!["b"], false)]
    );
}

#[tokio::test]
async fn test_read_many_each_invokes_callback() {
    let (_cluster, repo) = databases().await;
    for name in ["a", "b", "c"] {
        repo.create(Database::new(name).unwrap()).await.unwrap();
    }

    let mut seen = Vec::new();
    repo.read_many_each(
        vec![identifier!["a"], identifier!["c"], identifier!["z"]],
        |_, result| {
            if let Ok(Some(db)) = result {
                seen.push(db.name);
            }
        },
    )
    .await;
    seen.sort_unstable();
    assert_eq!(seen, ["a", "c"]);
}

#[test]
fn test_blocking_forms() {
    let cluster = futures::executor::block_on(cluster());
    let repo = Repository::new(session(&cluster), KEYSPACE, DatabaseBinding).unwrap();

    let db = repo.create_blocking(Database::new("shop").unwrap()).unwrap();
    assert_eq!(repo.read_blocking(&db.identifier()).unwrap(), db);
    assert_eq!(repo.read_many_blocking(&[db.identifier()]).unwrap().len(), 1);
    assert!(repo.delete_blocking(&db.identifier()).unwrap());
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_wrong_identifier_type_is_invalid_identifier() {
    let (_cluster, repo) = databases().await;
    let err = repo.read(&identifier![42i64]).await.unwrap_err();
    assert!(
        matches!(err, Error::InvalidIdentifier { .. }),
        "expected InvalidIdentifier, got {:?}",
        err
    );

    let err = repo.read(&identifier!["a", "b"]).await.unwrap_err();
    assert!(matches!(err, Error::InvalidIdentifier { .. }));
}

#[tokio::test]
async fn test_down_cluster_is_storage_failure() {
    let (cluster, repo) = databases().await;
    for node in cluster.node_ids() {
        cluster.set_node_up(node, false);
    }

    let err = repo.read(&identifier!["shop"]).await.unwrap_err();
    assert!(err.is_storage_failure(), "got {:?}", err);
    let err = repo.create(Database::new("shop").unwrap()).await.unwrap_err();
    assert!(err.is_storage_failure(), "got {:?}", err);
}

/// Database binding with only create and read statements
struct ReadOnlyDatabases;

impl EntityBinding for ReadOnlyDatabases {
    type Entity = Database;

    fn kind(&self) -> &'static str {
        "database"
    }

    fn templates(&self, keyspace: &str) -> StatementTemplates {
        let full = DatabaseBinding.templates(keyspace);
        StatementTemplates {
            create: full.create,
            read: full.read,
            ..StatementTemplates::default()
        }
    }

    fn bind_create(&self, db: &Database) -> Vec<Value> {
        DatabaseBinding.bind_create(db)
    }

    fn bind_update(&self, db: &Database) -> Vec<Value> {
        DatabaseBinding.bind_update(db)
    }

    fn marshal_row(&self, row: &Row) -> StoreResult<Database> {
        DatabaseBinding.marshal_row(row)
    }

    fn identifier(&self, db: &Database) -> Identifier {
        db.identifier()
    }
}

#[tokio::test]
async fn test_omitted_template_is_unsupported() {
    let cluster = cluster().await;
    let repo = Repository::new(session(&cluster), KEYSPACE, ReadOnlyDatabases).unwrap();
    let db = repo.create(Database::new("shop").unwrap()).await.unwrap();

    assert!(matches!(
        repo.update(db.clone()).await,
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        repo.delete(&db.identifier()).await,
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        repo.read_all(Vec::new()).await,
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        repo.query("by_owner", Vec::new()).await,
        Err(Error::Unsupported(_))
    ));
    assert_eq!(repo.read(&db.identifier()).await.unwrap(), db);
}

// ============================================================================
// Observers and events
// ============================================================================

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<String>>,
}

impl Observer<Database> for Recording {
    fn before_create(&self, db: &Database) {
        self.calls.lock().push(format!("before_create {}", db.name));
    }

    fn after_create(&self, db: &Database) {
        self.calls.lock().push(format!("after_create {}", db.name));
    }

    fn after_delete(&self, id: &Identifier) {
        self.calls.lock().push(format!("after_delete {}", id));
    }

    fn after_read(&self, db: &Database) {
        self.calls.lock().push(format!("after_read {}", db.name));
    }
}

#[tokio::test]
async fn test_observer_hook_order() {
    let cluster = cluster().await;
    let recording = Arc::new(Recording::default());
    let repo = Repository::new(session(&cluster), KEYSPACE, DatabaseBinding)
        .unwrap()
        .with_observer(recording.clone());

    let db = repo.create(Database::new("shop").unwrap()).await.unwrap();
    // A rejected create runs the before hook only
    let _ = repo.create(db.clone()).await;
    repo.read(&db.identifier()).await.unwrap();
    repo.delete(&db.identifier()).await.unwrap();

    let calls = recording.calls.lock().clone();
    assert_eq!(
        calls,
        vec![
            "before_create shop".to_string(),
            "after_create shop".to_string(),
            "before_create shop".to_string(),
            "after_read shop".to_string(),
            format!("after_delete {}", db.identifier()),
        ]
    );
}

#[tokio::test]
async fn test_event_observer_publishes_changes() {
    let cluster = cluster().await;
    let (sink, mut events) = ChannelSink::new();
    let observer: EventObserver<Database> =
        EventObserver::new(Arc::new(DatabaseBinding), Arc::new(sink));
    let repo = Repository::new(session(&cluster), KEYSPACE, DatabaseBinding)
        .unwrap()
        .with_observer(Arc::new(observer));

    let db = repo.create(Database::new("shop").unwrap()).await.unwrap();
    let db = repo.update(db.with_description("retail")).await.unwrap();
    repo.delete(&db.identifier()).await.unwrap();

    let kinds: Vec<_> = [
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
        events.recv().await.unwrap(),
    ]
    .into_iter()
    .map(|e| (e.kind, e.identifier, e.entity.is_some()))
    .collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Created, identifier!["shop"], true),
            (EventKind::Updated, identifier!["shop"], true),
            (EventKind::Deleted, identifier!["shop"], false),
        ]
    );
}
