//! Document store for one table
//!
//! [`DocumentStore`] combines the document repository with the table's
//! bucketed views. Each write goes to the base column family first, then to
//! every view. Reads resolve the latest version of a document here, not in
//! the repository engine.
//!
//! # Write Path
//!
//! ```text
//! create:  read latest (must be absent)  ->  base INSERT IF NOT EXISTS  ->  view inserts
//! update:  read latest  ->  claim latest  ->  base INSERT IF NOT EXISTS  ->  view delete/insert
//! delete:  read latest  ->  base partition DELETE IF EXISTS  ->  view deletes
//! ```
//!
//! An update must start from the latest version. The claim sets
//! `superseded_by` on that version only if it is still unset, so of two
//! writers starting from the same version exactly one proceeds and the other
//! gets [`Error::VersionConflict`].
//!
//! View writes are not atomic with the base write. A failed view write is
//! logged and returned to the caller; [`DocumentStore::reconcile`] repairs
//! the view afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use docstore_core::{Identifier, Value};
use docstore_storage::{BoundStatement, PreparedStatement, Session};
use futures::executor::block_on;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entity::document::{
    claim_version_cql, release_version_cql, LATEST_QUERY, VERSIONS_QUERY,
};
use crate::entity::{Document, DocumentBinding, Index, TableReference};
use crate::error::{Error, Result};
use crate::repository::{Observer, Repository};
use crate::view::{reconcile, BucketedViewStatementFactory, ReconcileReport, ViewEntry};

/// Versioned documents of one table and their views
#[derive(Debug)]
pub struct DocumentStore {
    table: TableReference,
    documents: Repository<DocumentBinding>,
    views: BucketedViewStatementFactory,
    claim: PreparedStatement,
    release: PreparedStatement,
}

impl DocumentStore {
    /// Prepare the document repository and the views of `indexes`
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if the documents column family or a view
    /// table is missing, and `InvalidInput` if an index belongs to another
    /// table.
    pub fn open(
        session: Arc<dyn Session>,
        keyspace: &str,
        table: TableReference,
        indexes: Vec<Index>,
    ) -> Result<Self> {
        let views =
            BucketedViewStatementFactory::new(session.as_ref(), keyspace, table.clone(), indexes)?;
        let claim = session.prepare(&claim_version_cql(keyspace))?;
        let release = session.prepare(&release_version_cql(keyspace))?;
        let documents = Repository::new(session, keyspace, DocumentBinding)?;
        Ok(Self {
            table,
            documents,
            views,
            claim,
            release,
        })
    }

    /// Register an observer on the document repository
    pub fn with_observer(mut self, observer: Arc<dyn Observer<Document>>) -> Self {
        self.documents = self.documents.with_observer(observer);
        self
    }

    /// The table this store serves
    pub fn table(&self) -> &TableReference {
        &self.table
    }

    /// View statement factory
    pub fn views(&self) -> &BucketedViewStatementFactory {
        &self.views
    }

    /// Underlying document repository
    pub fn repository(&self) -> &Repository<DocumentBinding> {
        &self.documents
    }

    fn session(&self) -> &dyn Session {
        self.documents.session().as_ref()
    }

    fn partition(&self, id: Uuid) -> Vec<Value> {
        vec![
            self.table.database.as_str().into(),
            self.table.name.as_str().into(),
            id.into(),
        ]
    }

    fn not_found(&self, id: Uuid) -> Error {
        Error::ItemNotFound(format!("({}, {}, {})", self.table.database, self.table.name, id))
    }

    fn conflict(&self, doc: &Document) -> Error {
        Error::VersionConflict(format!(
            "({}, {}, {}) is no longer at {}",
            self.table.database, self.table.name, doc.id, doc.updated_at
        ))
    }

    fn check_table(&self, doc: &Document) -> Result<()> {
        if doc.table != self.table {
            return Err(Error::invalid_input(format!(
                "document {} belongs to {}, not {}",
                doc.id, doc.table, self.table
            )));
        }
        Ok(())
    }

    async fn write_views(&self, id: Uuid, statements: Vec<BoundStatement>) -> Result<()> {
        for statement in statements {
            if let Err(e) = self.session().execute(statement).await {
                warn!(table = %self.table, %id, error = %e, "View write failed");
                return Err(e.into());
            }
        }
        Ok(())
    }

    async fn latest(&self, id: Uuid) -> Result<Option<Document>> {
        let mut found = self.documents.query(LATEST_QUERY, self.partition(id)).await?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.swap_remove(0))
        })
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Store a new document
    ///
    /// Fails with `DuplicateItem` if any version of this id already exists.
    pub async fn create(&self, doc: Document) -> Result<Document> {
        self.check_table(&doc)?;
        if self.latest(doc.id).await?.is_some() {
            return Err(Error::DuplicateItem(format!(
                "({}, {}, {})",
                self.table.database, self.table.name, doc.id
            )));
        }
        let view_writes = self.views.create_statements(&doc)?;
        let doc = self.documents.create(doc).await?;
        self.write_views(doc.id, view_writes).await?;
        Ok(doc)
    }

    /// Write a new version of an existing document
    ///
    /// `doc.updated_at` must name the latest stored version; otherwise, or
    /// if a concurrent update claims that version first, the call fails with
    /// `VersionConflict` and nothing is written. `created_at` is carried
    /// over and `updated_at` is moved past the previous version.
    pub async fn update(&self, mut doc: Document) -> Result<Document> {
        self.check_table(&doc)?;
        let previous = self
            .latest(doc.id)
            .await?
            .ok_or_else(|| self.not_found(doc.id))?;
        if doc.updated_at != previous.updated_at {
            return Err(self.conflict(&doc));
        }

        doc.created_at = previous.created_at;
        doc.touch();
        let view_writes = self.views.update_statements(&previous, &doc)?;

        let mut version_row = self.partition(doc.id);
        version_row.push(previous.updated_at.into());
        let next: Value = doc.updated_at.into();

        let mut claim = vec![next.clone()];
        claim.extend(version_row.iter().cloned());
        if !self.session().execute(self.claim.bind(claim)?).await?.was_applied() {
            debug!(table = %self.table, id = %doc.id, "Lost update race");
            return Err(self.conflict(&previous));
        }

        let doc = match self.documents.update(doc).await {
            Ok(doc) => doc,
            Err(e) => {
                // Free the previous version so the caller can retry
                let mut release = version_row;
                release.push(next);
                if let Err(undo) = self.session().execute(self.release.bind(release)?).await {
                    warn!(table = %self.table, error = %undo, "Version release failed");
                }
                return Err(if e.is_not_found() {
                    self.conflict(&previous)
                } else {
                    e
                });
            }
        };
        self.write_views(doc.id, view_writes).await?;
        debug!(table = %self.table, id = %doc.id, version = %doc.updated_at, "New document version");
        Ok(doc)
    }

    /// Delete a document with every version
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let previous = self.latest(id).await?.ok_or_else(|| self.not_found(id))?;
        let view_writes = self.views.delete_statements(&previous)?;
        let deleted = self.documents.delete(&previous.identifier()).await?;
        self.write_views(id, view_writes).await?;
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Latest version of a document
    pub async fn read(&self, id: Uuid) -> Result<Document> {
        self.latest(id).await?.ok_or_else(|| self.not_found(id))
    }

    /// One specific version, addressed by `(database, table, id, updated_at)`
    pub async fn read_version(&self, identifier: &Identifier) -> Result<Document> {
        self.documents.read(identifier).await
    }

    /// Every version of a document, newest first
    pub async fn versions(&self, id: Uuid) -> Result<Vec<Document>> {
        self.documents.query(VERSIONS_QUERY, self.partition(id)).await
    }

    /// Latest version of every document in the table
    pub async fn read_all(&self) -> Result<Vec<Document>> {
        let all = self
            .documents
            .read_all(vec![
                self.table.database.as_str().into(),
                self.table.name.as_str().into(),
            ])
            .await?;
        // Versions of one document share a partition, newest first
        let mut seen = HashSet::new();
        Ok(all.into_iter().filter(|d| seen.insert(d.id)).collect())
    }

    /// Documents whose projection under `index` starts with `prefix`
    ///
    /// Results follow the view's clustering order.
    pub async fn find(&self, index: &str, prefix: &[Value]) -> Result<Vec<Document>> {
        let definition = self.views.index(index)?;
        let result = self
            .session()
            .execute(self.views.lookup_statement(index, prefix)?)
            .await?;
        let entries = result
            .rows()
            .iter()
            .map(|row| ViewEntry::from_row(definition, row))
            .collect::<docstore_storage::StoreResult<Vec<_>>>()?;

        let ids: Vec<Identifier> = entries
            .iter()
            .map(|e| e.document_identifier(&self.table))
            .collect();
        let position: HashMap<Uuid, usize> =
            entries.iter().enumerate().map(|(i, e)| (e.id, i)).collect();

        let mut found = self.documents.read_many(&ids).await?;
        found.sort_by_key(|d| position.get(&d.id).copied().unwrap_or(usize::MAX));
        debug!(table = %self.table, index, entries = entries.len(), found = found.len(), "Find");
        Ok(found)
    }

    /// Repair the view of `index` from the current documents
    pub async fn reconcile(&self, index: &str) -> Result<ReconcileReport> {
        let documents = self.read_all().await?;
        reconcile::reconcile(self.session(), &self.views, index, &documents).await
    }

    // ------------------------------------------------------------------------
    // Blocking forms
    // ------------------------------------------------------------------------

    /// Blocking [`create`](Self::create)
    pub fn create_blocking(&self, doc: Document) -> Result<Document> {
        block_on(self.create(doc))
    }

    /// Blocking [`update`](Self::update)
    pub fn update_blocking(&self, doc: Document) -> Result<Document> {
        block_on(self.update(doc))
    }

    /// Blocking [`delete`](Self::delete)
    pub fn delete_blocking(&self, id: Uuid) -> Result<bool> {
        block_on(self.delete(id))
    }

    /// Blocking [`read`](Self::read)
    pub fn read_blocking(&self, id: Uuid) -> Result<Document> {
        block_on(self.read(id))
    }

    /// Blocking [`find`](Self::find)
    pub fn find_blocking(&self, index: &str, prefix: &[Value]) -> Result<Vec<Document>> {
        block_on(self.find(index, prefix))
    }
}
