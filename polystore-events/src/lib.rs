//! polystore events — the per-entity-type event bus.
//!
//! One multicast channel exists per *base* entity type, created lazily the
//! first time any listener or publisher asks for that type, and shared by
//! every subscriber from then on. Datastore lifecycle events travel on a
//! separate, datastore-scoped channel.
//!
//! Channels are bounded. A subscriber that never drains lags behind and
//! loses the oldest events rather than blocking publishers; that is the
//! chosen overflow policy for the bounded buffer.

use polystore_core::{
    Datastore, DatastoreEvent, EntitiesEvent, Entity, EntityMeta, PropertyUpdate, Value,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Bounded capacity of each per-type entity channel.
pub const ENTITY_CHANNEL_CAPACITY: usize = 100;

/// Bounded capacity of the datastore lifecycle channel.
pub const DATASTORE_CHANNEL_CAPACITY: usize = 10;

/// The event bus shared by the datastores of one process.
///
/// Creation of a type's channel is double-checked: a lock-free-ish read
/// fast path, then (on miss) the write lock, a re-check, and only then the
/// insert — at most one channel per base type even under concurrent first
/// access, and readers of existing channels are never blocked by creation.
pub struct EventBus {
    datastore: broadcast::Sender<DatastoreEvent>,
    entity_channels: RwLock<HashMap<&'static str, broadcast::Sender<EntitiesEvent>>>,
    capacity: usize,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(ENTITY_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (datastore, _) = broadcast::channel(DATASTORE_CHANNEL_CAPACITY);
        EventBus {
            datastore,
            entity_channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    fn channel(&self, meta: &'static EntityMeta) -> broadcast::Sender<EntitiesEvent> {
        let base = meta.base().name;
        if let Some(sender) = self.entity_channels.read().unwrap().get(base) {
            return sender.clone();
        }
        let mut channels = self.entity_channels.write().unwrap();
        channels
            .entry(base)
            .or_insert_with(|| {
                tracing::debug!(base_type = base, "created entity event channel");
                broadcast::channel(self.capacity).0
            })
            .clone()
    }

    /// Subscribe to the channel of `meta`'s base type. Every subscriber
    /// receives every subsequently published event independently.
    pub fn listener(&self, meta: &'static EntityMeta) -> broadcast::Receiver<EntitiesEvent> {
        self.channel(meta).subscribe()
    }

    /// Subscribe to datastore lifecycle events.
    pub fn listen_datastore_events(&self) -> broadcast::Receiver<DatastoreEvent> {
        self.datastore.subscribe()
    }

    // ========================================================================
    // PUBLISH OPERATIONS
    // ========================================================================

    /// Announce a datastore as started. Called exactly once per instance,
    /// by the adapter, after its backend handshake.
    pub fn datastore_started(&self, datastore: Arc<dyn Datastore>) {
        tracing::debug!(store = datastore.name(), "datastore started");
        // Send only fails when nobody subscribed, which is fine.
        let _ = self.datastore.send(DatastoreEvent::Started { datastore });
    }

    /// Publish a creation event. No-op on empty input; the channel is
    /// derived from the first entity's base type. Callers publish after
    /// the backend write has committed.
    pub fn entities_created(&self, entities: Vec<Entity>) {
        let Some(first) = entities.first() else {
            return;
        };
        let meta = first.meta();
        tracing::trace!(entity_type = meta.name, count = entities.len(), "entities created");
        let _ = self.channel(meta).send(EntitiesEvent::Created { meta, entities });
    }

    /// Publish a deletion event carrying exactly the removed id set.
    pub fn entities_deleted(&self, meta: &'static EntityMeta, ids: HashSet<Value>) {
        tracing::trace!(entity_type = meta.name, count = ids.len(), "entities deleted");
        let _ = self.channel(meta).send(EntitiesEvent::Deleted { meta, ids });
    }

    /// Publish an update event. No-op when `updates` is empty — an update
    /// that changed nothing is not an event.
    pub fn entity_updated(&self, entity: Entity, updates: Vec<PropertyUpdate>) {
        if updates.is_empty() {
            return;
        }
        let meta = entity.meta();
        tracing::trace!(entity_type = meta.name, %entity, "entity updated");
        let _ = self
            .channel(meta)
            .send(EntitiesEvent::Updated { meta, entity, updates });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
