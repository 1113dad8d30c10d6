//! Entity handles and transient drafts.

use crate::datastore::Datastore;
use crate::error::DatastoreResult;
use crate::meta::EntityMeta;
use crate::value::Value;
use futures_util::TryStreamExt;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A lazy handle onto one persisted entity instance.
///
/// The handle is just `(store, meta, id)`; no values are cached here.
/// Reads and writes delegate to the owning datastore, so two handles with
/// the same meta and id are the same entity no matter when they were
/// constructed.
#[derive(Clone)]
pub struct Entity {
    store: Arc<dyn Datastore>,
    meta: &'static EntityMeta,
    id: Value,
}

impl Entity {
    pub fn new(store: Arc<dyn Datastore>, meta: &'static EntityMeta, id: Value) -> Self {
        Entity { store, meta, id }
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    /// Read one property value from the store. A missing value comes back
    /// as [`Value::Null`].
    pub async fn value(&self, property: &str) -> DatastoreResult<Value> {
        let prop = *self.meta.require_property(property);
        let mut values = self
            .store
            .get_values(self.meta, self.id.clone(), vec![prop])
            .await?;
        Ok(values
            .pop()
            .map(|(_, value)| value)
            .unwrap_or(Value::Null))
    }

    /// Write one property value through the store.
    pub async fn set_value(&self, property: &str, value: impl Into<Value>) -> DatastoreResult<()> {
        let prop = *self.meta.require_property(property);
        self.store
            .set_values(self.meta, self.id.clone(), vec![(prop, value.into())])
            .await
    }

    /// Resolve the entities a relation property points at.
    pub async fn relations(&self, property: &str) -> DatastoreResult<Vec<Entity>> {
        let prop = *self.meta.require_property(property);
        let stream = self
            .store
            .get_relations(self.meta, self.id.clone(), prop)
            .await?;
        stream.try_collect().await
    }

    /// Snapshot the persisted state back into an unpersisted draft.
    pub async fn as_transient(&self) -> DatastoreResult<TransientEntity> {
        let props: Vec<_> = self
            .meta
            .all_properties()
            .into_iter()
            .filter(|p| !p.is_relation())
            .copied()
            .collect();
        let values = self
            .store
            .get_values(self.meta, self.id.clone(), props)
            .await?;
        let mut transient = TransientEntity::new(self.meta);
        transient.set_id(self.id.clone());
        for (prop, value) in values {
            if !value.is_null() {
                transient.set(prop.name(), value);
            }
        }
        Ok(transient)
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Entity) -> bool {
        self.meta == other.meta && self.id == other.id
    }
}

impl Eq for Entity {}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.meta.name, self.id)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.meta.name, self.id)
    }
}

/// An unpersisted draft of an entity: a mutable property bag plus an
/// optional identifier. It becomes a persisted [`Entity`] only through a
/// successful `create`.
#[derive(Debug, Clone)]
pub struct TransientEntity {
    meta: &'static EntityMeta,
    id: Option<Value>,
    properties: HashMap<String, Value>,
    relations: HashMap<String, Vec<Entity>>,
}

impl TransientEntity {
    pub fn new(meta: &'static EntityMeta) -> Self {
        TransientEntity {
            meta,
            id: None,
            properties: HashMap::new(),
            relations: HashMap::new(),
        }
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn id(&self) -> Option<&Value> {
        self.id.as_ref()
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn set_id(&mut self, id: Value) {
        self.id = Some(id);
    }

    /// Set a scalar or reference property. Unknown names are programming
    /// errors and panic.
    pub fn set(&mut self, property: &str, value: impl Into<Value>) -> &mut Self {
        let prop = self.meta.require_property(property);
        debug_assert!(!prop.is_relation(), "use relate() for relation properties");
        self.properties.insert(prop.name().to_string(), value.into());
        self
    }

    /// Point a relation property at already-persisted targets.
    pub fn relate(&mut self, property: &str, targets: Vec<Entity>) -> &mut Self {
        let prop = self.meta.require_property(property);
        prop.expect_relation();
        self.relations.insert(prop.name().to_string(), targets);
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    pub fn relation_targets(&self) -> &HashMap<String, Vec<Entity>> {
        &self.relations
    }
}
