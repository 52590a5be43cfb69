//! Change events
//!
//! An [`EventObserver`] turns repository hooks into [`Event`]s using an
//! [`EventFactory`] and hands them to an [`EventSink`]. The bus behind the
//! sink is not part of this crate; [`ChannelSink`] forwards into a tokio
//! channel for whoever consumes it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use docstore_core::Identifier;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::entity::now_millis;
use crate::repository::{EntityBinding, Observer};

/// What happened to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Entity was created
    Created,
    /// Entity was updated
    Updated,
    /// Entity was deleted
    Deleted,
}

/// A change to one stored entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<E> {
    /// Kind of change
    pub kind: EventKind,
    /// Identifier of the changed entity
    pub identifier: Identifier,
    /// New state; `None` for deletes
    pub entity: Option<E>,
    /// When the event was built
    pub occurred_at: DateTime<Utc>,
}

impl<E> Event<E> {
    /// Event stamped with the current time
    pub fn new(kind: EventKind, identifier: Identifier, entity: Option<E>) -> Self {
        Self {
            kind,
            identifier,
            entity,
            occurred_at: now_millis(),
        }
    }
}

/// Builds events for one entity kind
pub trait EventFactory<E>: Send + Sync {
    /// Identifier of an entity
    fn identify(&self, entity: &E) -> Identifier;

    /// Event for a created entity
    fn new_created_event(&self, entity: &E) -> Event<E>
    where
        E: Clone,
    {
        Event::new(EventKind::Created, self.identify(entity), Some(entity.clone()))
    }

    /// Event for an updated entity
    fn new_updated_event(&self, entity: &E) -> Event<E>
    where
        E: Clone,
    {
        Event::new(EventKind::Updated, self.identify(entity), Some(entity.clone()))
    }

    /// Event for a deleted entity
    fn new_deleted_event(&self, identifier: &Identifier) -> Event<E> {
        Event::new(EventKind::Deleted, identifier.clone(), None)
    }
}

/// Every entity binding knows how to identify its entities
impl<B: EntityBinding> EventFactory<B::Entity> for B {
    fn identify(&self, entity: &B::Entity) -> Identifier {
        self.identifier(entity)
    }
}

/// Destination for events
pub trait EventSink<E>: Send + Sync {
    /// Deliver one event; must not block
    fn publish(&self, event: Event<E>);
}

/// Sink feeding an unbounded tokio channel
#[derive(Debug)]
pub struct ChannelSink<E> {
    sender: mpsc::UnboundedSender<Event<E>>,
}

impl<E> ChannelSink<E> {
    /// Sink and the receiver it feeds
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event<E>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl<E: Send> EventSink<E> for ChannelSink<E> {
    fn publish(&self, event: Event<E>) {
        if let Err(e) = self.sender.send(event) {
            let event = e.0;
            warn!(kind = ?event.kind, identifier = %event.identifier, "Event receiver closed, dropping event");
        }
    }
}

/// Observer that publishes created, updated and deleted events
pub struct EventObserver<E> {
    factory: Arc<dyn EventFactory<E>>,
    sink: Arc<dyn EventSink<E>>,
}

impl<E> EventObserver<E> {
    /// Observer publishing to `sink`
    pub fn new(factory: Arc<dyn EventFactory<E>>, sink: Arc<dyn EventSink<E>>) -> Self {
        Self { factory, sink }
    }
}

impl<E: Clone + Send + Sync> Observer<E> for EventObserver<E> {
    fn after_create(&self, entity: &E) {
        self.sink.publish(self.factory.new_created_event(entity));
    }

    fn after_update(&self, entity: &E) {
        self.sink.publish(self.factory.new_updated_event(entity));
    }

    fn after_delete(&self, id: &Identifier) {
        self.sink.publish(self.factory.new_deleted_event(id));
    }
}
