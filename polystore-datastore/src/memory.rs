//! The in-process reference adapter.
//!
//! `MemoryDatastore` implements the complete contract against plain maps:
//! one collection per base type, records in the shared backend-agnostic
//! shape. It is the adapter the test suites run against and the template
//! for what a real backend adapter must honor.

use crate::base::{DatastoreBase, SequenceGenerator, UuidGenerator};
use crate::config::DatastoreConfig;
use async_trait::async_trait;
use polystore_core::{
    Datastore, DatastoreError, DatastoreResult, Entity, EntityMeta, EntityStream, Filter,
    FilterCompiler, IdGenerator, IncomingEdge, PropertyMeta, PropertyUpdate, Record, RecordLookup,
    RelationTo, ScalarKind, TransientEntity, Value,
};
use polystore_events::EventBus;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, Weak};
use uuid::Uuid;

/// Compiles filters into [`MemoryPredicate`]s, the adapter's "native"
/// query representation.
pub struct MemoryFilterCompiler;

/// A compiled filter: the type-tag constraint plus the filter itself,
/// evaluated record by record.
pub struct MemoryPredicate {
    type_name: &'static str,
    filter: Filter,
}

impl FilterCompiler for MemoryFilterCompiler {
    type Native = MemoryPredicate;

    fn compile(&self, filter: &Filter) -> MemoryPredicate {
        MemoryPredicate {
            type_name: filter.meta().name,
            filter: filter.clone(),
        }
    }
}

impl MemoryPredicate {
    /// All subtypes share the base collection, so the compiled query
    /// narrows on the stored type tag before evaluating the filter.
    pub fn eval(&self, record: &Record, lookup: &dyn RecordLookup) -> bool {
        record.is_instance_of(self.type_name) && self.filter.matches_with(record, lookup)
    }
}

#[derive(Default)]
struct MemoryState {
    /// base type name -> id -> record.
    collections: HashMap<&'static str, HashMap<Value, Record>>,
    /// concrete type name -> descriptor, filled by `register`.
    metas: HashMap<String, &'static EntityMeta>,
}

impl RecordLookup for MemoryState {
    fn record(&self, type_name: &str, id: &Value) -> Option<Record> {
        let meta = self.metas.get(type_name)?;
        self.collections.get(meta.base().name)?.get(id).cloned()
    }
}

/// An in-memory datastore. All mutable state sits behind one mutex per
/// instance, held only while maps are touched and never across an await.
pub struct MemoryDatastore {
    base: DatastoreBase,
    state: Mutex<MemoryState>,
    this: Weak<MemoryDatastore>,
}

impl MemoryDatastore {
    pub const KIND: &'static str = "memory";

    /// Construct and announce the instance. There is no real backend to
    /// shake hands with, so readiness is signalled immediately — but still
    /// exactly once, and before the first `register` call can observe the
    /// store.
    pub fn connect(config: &DatastoreConfig, events: Arc<EventBus>) -> Arc<Self> {
        let store = Arc::new_cyclic(|this| MemoryDatastore {
            base: DatastoreBase::new(config.name.as_str(), events),
            state: Mutex::new(MemoryState::default()),
            this: this.clone(),
        });
        store.base.ready(store.clone());
        store
    }

    fn handle(&self) -> Arc<dyn Datastore> {
        self.this.upgrade().expect("datastore instance alive")
    }

    fn entity(&self, meta: &'static EntityMeta, id: Value) -> Entity {
        meta.instance(self.handle(), id)
    }

    /// Resolve a record to an entity of its stored concrete type.
    fn materialize(
        &self,
        state: &MemoryState,
        record: &Record,
        id: Value,
    ) -> DatastoreResult<Entity> {
        let meta = state
            .metas
            .get(&record.meta.type_name)
            .copied()
            .ok_or_else(|| {
                DatastoreError::backend(
                    self.name(),
                    format!("unknown stored type {}", record.meta.type_name),
                )
            })?;
        Ok(self.entity(meta, id))
    }

    /// Test and diagnostic access to the raw record of one entity.
    pub fn record(&self, meta: &'static EntityMeta, id: &Value) -> Option<Record> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .get(meta.base().name)
            .and_then(|collection| collection.get(id))
            .cloned()
    }

    /// Mirror one outgoing mutation into the incoming index of every
    /// target, through the target's own datastore. Best effort: failures
    /// are counted and warned about, never rolled back.
    async fn mirror_incoming(
        &self,
        meta: &'static EntityMeta,
        id: &Value,
        prop: PropertyMeta,
        targets: &[Entity],
        mode: MirrorMode,
    ) {
        let mut applied = 0usize;
        for target in targets {
            let edge = IncomingEdge::new(prop, meta, id.clone(), self.name());
            let result = match mode {
                MirrorMode::Add => {
                    target
                        .store()
                        .add_incoming_relations(target.id().clone(), vec![edge])
                        .await
                }
                MirrorMode::Remove => {
                    target
                        .store()
                        .remove_incoming_relations(target.id().clone(), vec![edge])
                        .await
                }
            };
            match result {
                Ok(()) => applied += 1,
                Err(err) => {
                    tracing::warn!(store = self.name(), error = %err, target = %target, "incoming index update failed")
                }
            }
        }
        if applied != targets.len() {
            tracing::warn!(
                store = self.name(),
                applied,
                expected = targets.len(),
                "inconsistent count of incoming index updates"
            );
        }
    }

    fn empty_stream() -> EntityStream {
        Box::pin(tokio_stream::empty::<DatastoreResult<Entity>>())
    }

    fn stream_of(entities: Vec<Entity>) -> EntityStream {
        let items: Vec<DatastoreResult<Entity>> = entities.into_iter().map(Ok).collect();
        Box::pin(tokio_stream::iter(items))
    }
}

#[derive(Clone, Copy)]
enum MirrorMode {
    Add,
    Remove,
}

#[async_trait]
impl Datastore for MemoryDatastore {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn instance_id(&self) -> Uuid {
        self.base.instance_id()
    }

    async fn register(&self, meta: &'static EntityMeta) -> DatastoreResult<()> {
        {
            let mut state = self.state.lock().unwrap();
            state.metas.insert(meta.name.to_string(), meta);
            state.collections.entry(meta.base().name).or_default();
        }
        if meta.id_generated {
            let base_meta = meta.base();
            match base_meta.id_type.kind() {
                Some(ScalarKind::Int | ScalarKind::Long) => {
                    self.base
                        .ensure_generator(base_meta, || Arc::new(SequenceGenerator::new()));
                }
                Some(ScalarKind::Uuid) => {
                    self.base.ensure_generator(base_meta, || Arc::new(UuidGenerator));
                }
                _ => {
                    return Err(DatastoreError::backend(
                        self.name(),
                        format!(
                            "cannot autogenerate identifiers shaped {:?} for {}",
                            base_meta.id_type, meta.name
                        ),
                    ));
                }
            }
        }
        tracing::debug!(store = self.name(), entity_type = meta.name, "registered");
        Ok(())
    }

    // ========================================================================
    // ENTITY COLLECTION OPERATIONS
    // ========================================================================

    async fn retrieve(
        &self,
        meta: &'static EntityMeta,
        ids: Vec<Value>,
    ) -> DatastoreResult<EntityStream> {
        let found = {
            let state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let mut found = Vec::new();
            for id in ids {
                if let Some(record) = collection.get(&id) {
                    found.push(self.materialize(&state, record, id)?);
                }
            }
            found
        };
        Ok(Self::stream_of(found))
    }

    async fn create(&self, entities: Vec<TransientEntity>) -> DatastoreResult<EntityStream> {
        if entities.is_empty() {
            return Ok(Self::empty_stream());
        }
        let mut mirrors: Vec<(&'static EntityMeta, Value, PropertyMeta, Vec<Entity>)> = Vec::new();
        let created = {
            let mut state = self.state.lock().unwrap();
            let mut created = Vec::with_capacity(entities.len());
            for transient in &entities {
                let meta = transient.meta();
                if !state.collections.contains_key(meta.base().name) {
                    return Err(DatastoreError::unknown_type(self.name(), meta.name));
                }
                let id = if meta.id_generated {
                    self.id_generator(meta)?.next()
                } else {
                    transient.id().cloned().ok_or_else(|| {
                        DatastoreError::backend(
                            self.name(),
                            format!("transient {} carries no identifier", meta.name),
                        )
                    })?
                };

                let mut record = Record::new(meta);
                for (name, value) in transient.properties() {
                    record.set_value(name.clone(), value.clone());
                }
                for (name, targets) in transient.relation_targets() {
                    let prop = *meta.require_property(name);
                    let edges: Vec<RelationTo> =
                        targets.iter().map(|t| RelationTo::new(&prop, t)).collect();
                    record.add_outgoing(name, edges);
                    mirrors.push((meta, id.clone(), prop, targets.clone()));
                }

                let collection = state
                    .collections
                    .get_mut(meta.base().name)
                    .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
                collection.insert(id.clone(), record);
                created.push(self.entity(meta, id));
            }
            created
        };

        // Seed the incoming index at the targets of relations the drafts
        // carried; the outgoing write above has already committed.
        for (meta, id, prop, targets) in mirrors {
            self.mirror_incoming(meta, &id, prop, &targets, MirrorMode::Add)
                .await;
        }

        self.base.events().entities_created(created.clone());
        Ok(Self::stream_of(created))
    }

    async fn delete(&self, entities: Vec<Entity>) -> DatastoreResult<HashSet<Value>> {
        let Some(first) = entities.first() else {
            return Ok(HashSet::new());
        };
        let meta = first.meta();
        let removed = {
            let mut state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get_mut(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let mut removed = HashSet::new();
            for entity in &entities {
                if collection.remove(entity.id()).is_some() {
                    removed.insert(entity.id().clone());
                }
            }
            removed
        };
        self.base.events().entities_deleted(meta, removed.clone());
        Ok(removed)
    }

    // ========================================================================
    // VALUE OPERATIONS
    // ========================================================================

    async fn get_values(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        props: Vec<PropertyMeta>,
    ) -> DatastoreResult<Vec<(PropertyMeta, Value)>> {
        let state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get(meta.base().name)
            .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
        let record = collection
            .get(&id)
            .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
        Ok(props
            .into_iter()
            .map(|prop| {
                let value = record.value(prop.name()).cloned().unwrap_or(Value::Null);
                (prop, value)
            })
            .collect())
    }

    async fn set_values(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        values: Vec<(PropertyMeta, Value)>,
    ) -> DatastoreResult<()> {
        let updates = {
            let mut state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get_mut(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let record = collection
                .get_mut(&id)
                .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
            let mut updates = Vec::new();
            for (prop, new) in values {
                let old = record.value(prop.name()).cloned().unwrap_or(Value::Null);
                if old == new {
                    continue;
                }
                record.set_value(prop.name(), new.clone());
                updates.push(PropertyUpdate {
                    property: prop,
                    old,
                    new,
                });
            }
            updates
        };
        if !updates.is_empty() {
            self.base
                .events()
                .entity_updated(self.entity(meta, id), updates);
        }
        Ok(())
    }

    // ========================================================================
    // RELATION OPERATIONS
    // ========================================================================

    async fn add_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        prop.expect_relation();
        {
            let mut state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get_mut(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let record = collection
                .get_mut(&id)
                .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
            let edges: Vec<RelationTo> =
                targets.iter().map(|t| RelationTo::new(&prop, t)).collect();
            record.add_outgoing(prop.name(), edges);
        }
        self.mirror_incoming(meta, &id, prop, &targets, MirrorMode::Add)
            .await;
        Ok(())
    }

    async fn set_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        prop.expect_relation();
        let new_edges: Vec<RelationTo> =
            targets.iter().map(|t| RelationTo::new(&prop, t)).collect();
        let stale = {
            let mut state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get_mut(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let record = collection
                .get_mut(&id)
                .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
            let stale: Vec<RelationTo> = record
                .outgoing(prop.name())
                .iter()
                .filter(|edge| !new_edges.contains(edge))
                .cloned()
                .collect();
            record.set_outgoing(prop.name(), new_edges);
            stale
        };

        // The replaced edges lose their mirror entries; the new ones gain
        // theirs. Stale edges into other datastores would need a registry
        // to resolve, so only same-store ones are cleaned here.
        let contained = prop.expect_relation();
        let stale_targets: Vec<Entity> = stale
            .iter()
            .filter(|edge| edge.to_datastore == self.name())
            .filter_map(|edge| {
                contained
                    .id_type
                    .decode_id(&edge.to_id)
                    .map(|decoded| self.entity(contained, decoded))
            })
            .collect();
        self.mirror_incoming(meta, &id, prop, &stale_targets, MirrorMode::Remove)
            .await;
        self.mirror_incoming(meta, &id, prop, &targets, MirrorMode::Add)
            .await;
        Ok(())
    }

    async fn remove_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        prop.expect_relation();
        {
            let mut state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get_mut(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let record = collection
                .get_mut(&id)
                .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
            let edges: Vec<RelationTo> =
                targets.iter().map(|t| RelationTo::new(&prop, t)).collect();
            record.remove_outgoing(prop.name(), &edges);
        }
        self.mirror_incoming(meta, &id, prop, &targets, MirrorMode::Remove)
            .await;
        Ok(())
    }

    async fn get_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
    ) -> DatastoreResult<EntityStream> {
        let contained = prop.expect_relation();
        let ids = {
            let state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get(meta.base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), meta.name))?;
            let record = collection
                .get(&id)
                .ok_or_else(|| DatastoreError::key_not_found(self.name(), meta.name, id.clone()))?;
            let mut ids = Vec::new();
            for edge in record.outgoing(prop.name()) {
                let decoded = contained.id_type.decode_id(&edge.to_id).ok_or_else(|| {
                    DatastoreError::backend(
                        self.name(),
                        format!(
                            "stored id {} does not decode as a {} identifier",
                            edge.to_id, contained.name
                        ),
                    )
                })?;
                ids.push(decoded);
            }
            ids
        };
        self.retrieve(contained, ids).await
    }

    // ========================================================================
    // INCOMING-INDEX OPERATIONS
    // ========================================================================

    async fn add_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        let Some(first) = edges.first() else {
            return Ok(());
        };
        let target_meta = first.target_meta();
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(target_meta.base().name)
            .ok_or_else(|| DatastoreError::unknown_type(self.name(), target_meta.name))?;
        let record = collection.get_mut(&id).ok_or_else(|| {
            DatastoreError::key_not_found(self.name(), target_meta.name, id.clone())
        })?;
        for edge in edges {
            record.add_incoming(edge.to_stored());
        }
        Ok(())
    }

    async fn set_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        let Some(first) = edges.first() else {
            return Ok(());
        };
        let target_meta = first.target_meta();
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(target_meta.base().name)
            .ok_or_else(|| DatastoreError::unknown_type(self.name(), target_meta.name))?;
        let record = collection.get_mut(&id).ok_or_else(|| {
            DatastoreError::key_not_found(self.name(), target_meta.name, id.clone())
        })?;
        let mut grouped: HashMap<(String, String), Vec<IncomingEdge>> = HashMap::new();
        for edge in edges {
            grouped
                .entry((
                    edge.from_type.name.to_string(),
                    edge.property.name().to_string(),
                ))
                .or_default()
                .push(edge);
        }
        for ((from_type, relation), group) in grouped {
            record.set_incoming(
                &from_type,
                &relation,
                group.iter().map(IncomingEdge::to_stored).collect(),
            );
        }
        Ok(())
    }

    async fn remove_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        let Some(first) = edges.first() else {
            return Ok(());
        };
        let target_meta = first.target_meta();
        let mut state = self.state.lock().unwrap();
        let collection = state
            .collections
            .get_mut(target_meta.base().name)
            .ok_or_else(|| DatastoreError::unknown_type(self.name(), target_meta.name))?;
        let record = collection.get_mut(&id).ok_or_else(|| {
            DatastoreError::key_not_found(self.name(), target_meta.name, id.clone())
        })?;
        for edge in edges {
            record.remove_incoming(&edge.to_stored());
        }
        Ok(())
    }

    // ========================================================================
    // QUERY
    // ========================================================================

    async fn query(&self, filter: Filter) -> DatastoreResult<EntityStream> {
        let predicate = MemoryFilterCompiler.compile(&filter);
        let hits = {
            let state = self.state.lock().unwrap();
            let collection = state
                .collections
                .get(filter.meta().base().name)
                .ok_or_else(|| DatastoreError::unknown_type(self.name(), filter.meta().name))?;
            let mut hits = Vec::new();
            for (id, record) in collection {
                if predicate.eval(record, &*state) {
                    hits.push(self.materialize(&state, record, id.clone())?);
                }
            }
            hits
        };
        tracing::debug!(
            store = self.name(),
            entity_type = filter.meta().name,
            count = hits.len(),
            "query evaluated"
        );
        Ok(Self::stream_of(hits))
    }

    // ========================================================================
    // IDENTIFIERS
    // ========================================================================

    fn id_generator(&self, meta: &'static EntityMeta) -> DatastoreResult<Arc<dyn IdGenerator>> {
        self.base.generator(meta.base()).ok_or_else(|| {
            DatastoreError::backend(
                self.name(),
                format!("no identifier generator registered for {}", meta.base().name),
            )
        })
    }
}
