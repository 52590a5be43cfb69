//! Index definitions together with their view tables
//!
//! Creating an index stores its definition and creates its view table;
//! dropping it removes both. [`IndexCatalog::open_store`] loads a table's
//! indexes and opens a [`DocumentStore`] over them.

use std::sync::Arc;

use docstore_storage::Session;
use futures::executor::block_on;
use tracing::info;

use crate::documents::DocumentStore;
use crate::entity::{Index, IndexBinding, TableReference};
use crate::error::Result;
use crate::repository::Repository;
use crate::schema::Schemaable;
use crate::view::BucketedViewSchema;

/// Index definitions of a keyspace
#[derive(Debug)]
pub struct IndexCatalog {
    keyspace: String,
    indexes: Repository<IndexBinding>,
}

impl IndexCatalog {
    /// Prepare the index repository
    pub fn new(session: Arc<dyn Session>, keyspace: &str) -> Result<Self> {
        Ok(Self {
            keyspace: keyspace.to_string(),
            indexes: Repository::new(session, keyspace, IndexBinding)?,
        })
    }

    fn session(&self) -> &dyn Session {
        self.indexes.session().as_ref()
    }

    /// Store a new index definition and create its view table
    ///
    /// Documents written before the index existed are not projected; run
    /// [`DocumentStore::reconcile`] to backfill.
    pub async fn create(&self, index: Index) -> Result<Index> {
        let index = self.indexes.create(index).await?;
        BucketedViewSchema::new(index.clone())
            .create(self.session(), &self.keyspace)
            .await?;
        info!(index = %index.identifier(), view = %index.view_table(), "Created index");
        Ok(index)
    }

    /// Drop an index definition and its view table
    pub async fn drop(&self, table: &TableReference, name: &str) -> Result<bool> {
        let index = self.get(table, name).await?;
        Schemaable::drop(
            &BucketedViewSchema::new(index.clone()),
            self.session(),
            &self.keyspace,
        )
        .await?;
        let dropped = self.indexes.delete(&index.identifier()).await?;
        info!(index = %index.identifier(), "Dropped index");
        Ok(dropped)
    }

    /// One index definition
    pub async fn get(&self, table: &TableReference, name: &str) -> Result<Index> {
        let id = docstore_core::identifier![table.database.as_str(), table.name.as_str(), name];
        self.indexes.read(&id).await
    }

    /// Every index of a table, in name order
    pub async fn list(&self, table: &TableReference) -> Result<Vec<Index>> {
        self.indexes
            .read_all(vec![
                table.database.as_str().into(),
                table.name.as_str().into(),
            ])
            .await
    }

    /// Open a document store over every index of `table`
    pub async fn open_store(&self, table: TableReference) -> Result<DocumentStore> {
        let indexes = self.list(&table).await?;
        DocumentStore::open(
            Arc::clone(self.indexes.session()),
            &self.keyspace,
            table,
            indexes,
        )
    }

    /// Blocking [`create`](Self::create)
    pub fn create_blocking(&self, index: Index) -> Result<Index> {
        block_on(self.create(index))
    }

    /// Blocking [`drop`](Self::drop)
    pub fn drop_blocking(&self, table: &TableReference, name: &str) -> Result<bool> {
        block_on(self.drop(table, name))
    }

    /// Blocking [`open_store`](Self::open_store)
    pub fn open_store_blocking(&self, table: TableReference) -> Result<DocumentStore> {
        block_on(self.open_store(table))
    }
}
