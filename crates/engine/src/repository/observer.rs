//! Lifecycle hooks for repository operations

use docstore_core::Identifier;

/// Callbacks invoked around repository operations
///
/// Hooks see the entity or identifier but cannot change or fail the
/// operation. `after_*` hooks only run when the operation succeeded.
pub trait Observer<E>: Send + Sync {
    /// Before a create is sent
    fn before_create(&self, _entity: &E) {}
    /// After a create was applied
    fn after_create(&self, _entity: &E) {}
    /// Before an update is sent
    fn before_update(&self, _entity: &E) {}
    /// After an update was applied
    fn after_update(&self, _entity: &E) {}
    /// Before a delete is sent
    fn before_delete(&self, _id: &Identifier) {}
    /// After a delete was applied
    fn after_delete(&self, _id: &Identifier) {}
    /// After an entity was read by key
    fn after_read(&self, _entity: &E) {}
}
