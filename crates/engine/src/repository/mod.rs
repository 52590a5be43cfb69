//! Generic repository engine
//!
//! A [`Repository`] turns typed entities into bound statements, executes them
//! against a [`Session`] and classifies the outcome. Everything specific to
//! an entity kind lives in its [`EntityBinding`]: the statement templates,
//! how an entity is bound, and how a row is turned back into an entity.
//!
//! # Outcomes
//!
//! | Operation | Not applied / empty | Store error |
//! |-----------|---------------------|-------------|
//! | create    | `DuplicateItem`     | `StorageFailure` |
//! | update    | `ItemNotFound`      | `StorageFailure` |
//! | delete    | `ItemNotFound`      | `StorageFailure` |
//! | read      | `ItemNotFound`      | `StorageFailure` |
//!
//! Key binds that fail on arity or type are `InvalidIdentifier`; an
//! operation whose template the binding left out is `Unsupported`.
//!
//! # Preparation
//!
//! All templates are prepared once in [`Repository::new`]. Prepared
//! statements are immutable and shared by every call.

mod observer;

pub use observer::Observer;

use std::collections::HashMap;
use std::sync::Arc;

use docstore_core::{Identifier, Value};
use docstore_storage::{BoundStatement, PreparedStatement, ResultSet, Row, Session, StoreResult};
use futures::executor::block_on;
use futures::stream::{BoxStream, FuturesUnordered, StreamExt};
use tracing::{debug, trace};

use crate::error::{Error, Result};

// ============================================================================
// Binding contract
// ============================================================================

/// Statement text for each repository operation
///
/// A `None` or blank template leaves the operation unsupported.
#[derive(Debug, Clone, Default)]
pub struct StatementTemplates {
    /// Conditional insert
    pub create: Option<String>,
    /// Conditional update, or versioned insert
    pub update: Option<String>,
    /// Delete by key
    pub delete: Option<String>,
    /// Select one row by key
    pub read: Option<String>,
    /// Parameterised multi-row select
    pub read_all: Option<String>,
    /// Extra named selects
    pub queries: Vec<(String, String)>,
}

impl StatementTemplates {
    /// Add a named query
    pub fn with_query(mut self, name: impl Into<String>, cql: impl Into<String>) -> Self {
        self.queries.push((name.into(), cql.into()));
        self
    }
}

/// How one entity kind maps onto its column family
pub trait EntityBinding: Send + Sync + 'static {
    /// The stored entity
    type Entity: Clone + Send + Sync + 'static;

    /// Short name used in logs and error messages
    fn kind(&self) -> &'static str;

    /// Statement text, qualified with `keyspace`
    fn templates(&self, keyspace: &str) -> StatementTemplates;

    /// Values for the create statement
    fn bind_create(&self, entity: &Self::Entity) -> Vec<Value>;

    /// Values for the update statement
    fn bind_update(&self, entity: &Self::Entity) -> Vec<Value>;

    /// Values for the read statement
    fn bind_key(&self, id: &Identifier) -> Vec<Value> {
        id.components().to_vec()
    }

    /// Values for the delete statement
    fn bind_delete(&self, id: &Identifier) -> Vec<Value> {
        self.bind_key(id)
    }

    /// Build an entity from a result row
    fn marshal_row(&self, row: &Row) -> StoreResult<Self::Entity>;

    /// Store identifier of an entity
    fn identifier(&self, entity: &Self::Entity) -> Identifier;
}

// ============================================================================
// Repository
// ============================================================================

/// CRUD access to one entity kind
pub struct Repository<B: EntityBinding> {
    session: Arc<dyn Session>,
    binding: B,
    create: Option<PreparedStatement>,
    update: Option<PreparedStatement>,
    delete: Option<PreparedStatement>,
    read: Option<PreparedStatement>,
    read_all: Option<PreparedStatement>,
    queries: HashMap<String, PreparedStatement>,
    observers: Vec<Arc<dyn Observer<B::Entity>>>,
}

impl<B: EntityBinding> std::fmt::Debug for Repository<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("kind", &self.binding.kind())
            .field("queries", &self.queries.keys().collect::<Vec<_>>())
            .field("observers", &self.observers.len())
            .finish()
    }
}

fn prepare(session: &dyn Session, template: Option<String>) -> Result<Option<PreparedStatement>> {
    match template {
        Some(cql) if !cql.trim().is_empty() => Ok(Some(session.prepare(&cql)?)),
        _ => Ok(None),
    }
}

impl<B: EntityBinding> Repository<B> {
    /// Prepare every template of `binding` against `session`
    ///
    /// # Errors
    ///
    /// Returns `StorageFailure` if any template fails to prepare, typically
    /// because its column family does not exist yet.
    pub fn new(session: Arc<dyn Session>, keyspace: &str, binding: B) -> Result<Self> {
        let templates = binding.templates(keyspace);
        let s = session.as_ref();
        let mut queries = HashMap::with_capacity(templates.queries.len());
        for (name, cql) in templates.queries {
            if let Some(prepared) = prepare(s, Some(cql))? {
                queries.insert(name, prepared);
            }
        }
        let repository = Self {
            create: prepare(s, templates.create)?,
            update: prepare(s, templates.update)?,
            delete: prepare(s, templates.delete)?,
            read: prepare(s, templates.read)?,
            read_all: prepare(s, templates.read_all)?,
            queries,
            observers: Vec::new(),
            binding,
            session,
        };
        debug!(kind = repository.binding.kind(), keyspace, "Prepared repository");
        Ok(repository)
    }

    /// Register an observer
    pub fn with_observer(mut self, observer: Arc<dyn Observer<B::Entity>>) -> Self {
        self.observers.push(observer);
        self
    }

    /// The entity binding
    pub fn binding(&self) -> &B {
        &self.binding
    }

    /// The session statements run on
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    fn statement<'a>(
        &self,
        slot: &'a Option<PreparedStatement>,
        operation: &str,
    ) -> Result<&'a PreparedStatement> {
        slot.as_ref().ok_or_else(|| {
            Error::Unsupported(format!("{} has no {} statement", self.binding.kind(), operation))
        })
    }

    fn bind_identifier(
        &self,
        statement: &PreparedStatement,
        id: &Identifier,
        values: Vec<Value>,
    ) -> Result<BoundStatement> {
        statement
            .bind(values)
            .map_err(|source| Error::InvalidIdentifier {
                identifier: id.to_string(),
                source,
            })
    }

    fn notify(&self, hook: impl Fn(&dyn Observer<B::Entity>)) {
        for observer in &self.observers {
            hook(observer.as_ref());
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Insert an entity that must not exist yet
    pub async fn create(&self, entity: B::Entity) -> Result<B::Entity> {
        let statement = self.statement(&self.create, "create")?;
        let id = self.binding.identifier(&entity);
        self.notify(|o| o.before_create(&entity));

        let bound = statement.bind(self.binding.bind_create(&entity))?;
        let result = self.session.execute(bound).await?;
        if !result.was_applied() {
            debug!(kind = self.binding.kind(), %id, "Create not applied");
            return Err(Error::DuplicateItem(id.to_string()));
        }

        debug!(kind = self.binding.kind(), %id, "Created");
        self.notify(|o| o.after_create(&entity));
        Ok(entity)
    }

    /// Write a new state for an existing entity
    pub async fn update(&self, entity: B::Entity) -> Result<B::Entity> {
        let statement = self.statement(&self.update, "update")?;
        let id = self.binding.identifier(&entity);
        self.notify(|o| o.before_update(&entity));

        let bound = statement.bind(self.binding.bind_update(&entity))?;
        let result = self.session.execute(bound).await?;
        if !result.was_applied() {
            debug!(kind = self.binding.kind(), %id, "Update not applied");
            return Err(Error::ItemNotFound(id.to_string()));
        }

        debug!(kind = self.binding.kind(), %id, "Updated");
        self.notify(|o| o.after_update(&entity));
        Ok(entity)
    }

    /// Delete by key
    pub async fn delete(&self, id: &Identifier) -> Result<bool> {
        let statement = self.statement(&self.delete, "delete")?;
        let bound = self.bind_identifier(statement, id, self.binding.bind_delete(id))?;
        self.notify(|o| o.before_delete(id));

        let result = self.session.execute(bound).await?;
        if !result.was_applied() {
            return Err(Error::ItemNotFound(id.to_string()));
        }

        debug!(kind = self.binding.kind(), %id, "Deleted");
        self.notify(|o| o.after_delete(id));
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Read one entity by key
    pub async fn read(&self, id: &Identifier) -> Result<B::Entity> {
        self.read_optional(id)
            .await?
            .ok_or_else(|| Error::ItemNotFound(id.to_string()))
    }

    /// Read one entity by key, `None` if absent
    pub async fn read_optional(&self, id: &Identifier) -> Result<Option<B::Entity>> {
        let statement = self.statement(&self.read, "read")?;
        let bound = self.bind_identifier(statement, id, self.binding.bind_key(id))?;
        let result = self.session.execute(bound).await?;
        trace!(kind = self.binding.kind(), %id, rows = result.len(), "Read");
        self.first(&result)
    }

    /// Run the read-all statement with `params`
    pub async fn read_all(&self, params: Vec<Value>) -> Result<Vec<B::Entity>> {
        let statement = self.statement(&self.read_all, "read_all")?;
        let result = self.session.execute(statement.bind(params)?).await?;
        self.marshal_all(&result)
    }

    /// Run a named query declared by the binding
    pub async fn query(&self, name: &str, params: Vec<Value>) -> Result<Vec<B::Entity>> {
        let statement = self.queries.get(name).ok_or_else(|| {
            Error::Unsupported(format!("{} has no query named '{}'", self.binding.kind(), name))
        })?;
        let result = self.session.execute(statement.bind(params)?).await?;
        self.marshal_all(&result)
    }

    /// Read several entities by key
    ///
    /// Every request is issued before any is awaited, and each carries its
    /// routing key. Results arrive in completion order; ids without a row
    /// are omitted.
    pub async fn read_many(&self, ids: &[Identifier]) -> Result<Vec<B::Entity>> {
        let statement = self.statement(&self.read, "read")?;
        let mut pending = FuturesUnordered::new();
        for id in ids {
            let bound = self.bind_identifier(statement, id, self.binding.bind_key(id))?;
            pending.push(self.session.execute(bound));
        }

        let mut entities = Vec::with_capacity(ids.len());
        while let Some(result) = pending.next().await {
            if let Some(entity) = self.first(&result?)? {
                entities.push(entity);
            }
        }
        debug!(
            kind = self.binding.kind(),
            requested = ids.len(),
            found = entities.len(),
            "Read many"
        );
        Ok(entities)
    }

    /// Per-id results of a multi-key read, each yielded as soon as it resolves
    pub fn read_many_stream<'a, I>(
        &'a self,
        ids: I,
    ) -> BoxStream<'a, (Identifier, Result<Option<B::Entity>>)>
    where
        I: IntoIterator<Item = Identifier>,
    {
        ids.into_iter()
            .map(|id| async move {
                let result = self.read_optional(&id).await;
                (id, result)
            })
            .collect::<FuturesUnordered<_>>()
            .boxed()
    }

    /// Deliver each per-id result of a multi-key read to `callback`
    pub async fn read_many_each<I, F>(&self, ids: I, mut callback: F)
    where
        I: IntoIterator<Item = Identifier>,
        F: FnMut(Identifier, Result<Option<B::Entity>>),
    {
        let mut results = self.read_many_stream(ids);
        while let Some((id, result)) = results.next().await {
            callback(id, result);
        }
    }

    fn first(&self, result: &ResultSet) -> Result<Option<B::Entity>> {
        match result.one() {
            Some(row) => {
                let entity = self.binding.marshal_row(row)?;
                self.notify(|o| o.after_read(&entity));
                Ok(Some(entity))
            }
            None => Ok(None),
        }
    }

    fn marshal_all(&self, result: &ResultSet) -> Result<Vec<B::Entity>> {
        result
            .rows()
            .iter()
            .map(|row| self.binding.marshal_row(row).map_err(Error::from))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Blocking forms
    // ------------------------------------------------------------------------

    /// Blocking [`create`](Self::create)
    pub fn create_blocking(&self, entity: B::Entity) -> Result<B::Entity> {
        block_on(self.create(entity))
    }

    /// Blocking [`update`](Self::update)
    pub fn update_blocking(&self, entity: B::Entity) -> Result<B::Entity> {
        block_on(self.update(entity))
    }

    /// Blocking [`delete`](Self::delete)
    pub fn delete_blocking(&self, id: &Identifier) -> Result<bool> {
        block_on(self.delete(id))
    }

    /// Blocking [`read`](Self::read)
    pub fn read_blocking(&self, id: &Identifier) -> Result<B::Entity> {
        block_on(self.read(id))
    }

    /// Blocking [`read_all`](Self::read_all)
    pub fn read_all_blocking(&self, params: Vec<Value>) -> Result<Vec<B::Entity>> {
        block_on(self.read_all(params))
    }

    /// Blocking [`read_many`](Self::read_many)
    pub fn read_many_blocking(&self, ids: &[Identifier]) -> Result<Vec<B::Entity>> {
        block_on(self.read_many(ids))
    }

    /// Blocking [`query`](Self::query)
    pub fn query_blocking(&self, name: &str, params: Vec<Value>) -> Result<Vec<B::Entity>> {
        block_on(self.query(name, params))
    }
}
