//! Lifecycle event payloads.
//!
//! Entity events travel on per-base-type multicast channels; datastore
//! events on a separate, datastore-scoped channel. Payloads are cheap to
//! clone because every subscriber receives its own copy.

use crate::datastore::Datastore;
use crate::entity::Entity;
use crate::meta::{EntityMeta, PropertyMeta};
use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// One observed property change.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyUpdate {
    pub property: PropertyMeta,
    pub old: Value,
    pub new: Value,
}

impl fmt::Display for PropertyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: old = {} new = {}",
            self.property.name(),
            self.old,
            self.new
        )
    }
}

/// Events published on a base type's channel.
#[derive(Debug, Clone)]
pub enum EntitiesEvent {
    /// Entities were created. Published after the backend write committed.
    Created {
        meta: &'static EntityMeta,
        entities: Vec<Entity>,
    },
    /// Entities were deleted; carries exactly the removed id set.
    Deleted {
        meta: &'static EntityMeta,
        ids: HashSet<Value>,
    },
    /// One entity changed; `updates` holds only the pairs that actually
    /// changed and is never empty.
    Updated {
        meta: &'static EntityMeta,
        entity: Entity,
        updates: Vec<PropertyUpdate>,
    },
}

impl EntitiesEvent {
    pub fn meta(&self) -> &'static EntityMeta {
        match self {
            EntitiesEvent::Created { meta, .. }
            | EntitiesEvent::Deleted { meta, .. }
            | EntitiesEvent::Updated { meta, .. } => meta,
        }
    }
}

/// Events published on the datastore-scoped channel.
#[derive(Clone)]
pub enum DatastoreEvent {
    /// The datastore finished its backend handshake and is ready for
    /// `register` calls. Signalled exactly once per instance.
    Started { datastore: Arc<dyn Datastore> },
}

impl fmt::Debug for DatastoreEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatastoreEvent::Started { datastore } => f
                .debug_struct("Started")
                .field("datastore", &datastore.name())
                .finish(),
        }
    }
}
