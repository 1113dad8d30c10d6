//! The datastore contract.
//!
//! Every backend adapter implements [`Datastore`]. All operations that
//! touch the backend are async and return [`DatastoreResult`]; entity
//! sequences come back as lazy streams whose consumption can simply stop
//! (queries are read-only, so dropping a stream has no side effects to
//! undo). Mutations, once dispatched, run to completion or failure.

use crate::entity::{Entity, TransientEntity};
use crate::error::DatastoreResult;
use crate::filter::Filter;
use crate::meta::{EntityMeta, PropertyMeta};
use crate::relation::IncomingEdge;
use crate::value::Value;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// A lazy, cancellable sequence of entities.
pub type EntityStream = BoxStream<'static, DatastoreResult<Entity>>;

/// A per-base-type identifier mint.
///
/// One generator exists per base type and datastore, shared by every
/// subtype; `next()` must be safe under concurrent callers and never issue
/// a duplicate.
pub trait IdGenerator: Send + Sync {
    fn next(&self) -> Value;
}

/// The contract every backend adapter implements.
///
/// Adapters perform their backend handshake and collection provisioning on
/// construction, then signal readiness exactly once on the event bus;
/// `register` may be called any number of times afterwards, once per
/// entity type.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Configured name of this datastore; relation edges record it.
    fn name(&self) -> &str;

    /// Process-unique identity of this instance.
    fn instance_id(&self) -> Uuid;

    /// Make an entity type known to this datastore. Idempotent. Allocates
    /// the base type's identifier generator on first need; an identifier
    /// kind this adapter cannot mint is a configuration error reported
    /// immediately.
    async fn register(&self, meta: &'static EntityMeta) -> DatastoreResult<()>;

    // ========================================================================
    // ENTITY COLLECTION OPERATIONS
    // ========================================================================

    /// Fetch entities by id. Unknown ids are skipped, not errors — the
    /// stream simply yields fewer entities.
    async fn retrieve(
        &self,
        meta: &'static EntityMeta,
        ids: Vec<Value>,
    ) -> DatastoreResult<EntityStream>;

    /// Persist transient drafts, minting identifiers where the type asks
    /// for it. An empty input yields an empty stream without touching the
    /// backend and publishes nothing.
    async fn create(&self, entities: Vec<TransientEntity>) -> DatastoreResult<EntityStream>;

    /// Delete entities; returns the set of ids actually removed.
    async fn delete(&self, entities: Vec<Entity>) -> DatastoreResult<HashSet<Value>>;

    // ========================================================================
    // VALUE OPERATIONS
    // ========================================================================

    /// Partial read: the requested properties of one entity. Unset
    /// properties come back as `Value::Null`; an unknown id is
    /// `KeyNotFound`.
    async fn get_values(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        props: Vec<PropertyMeta>,
    ) -> DatastoreResult<Vec<(PropertyMeta, Value)>>;

    /// Partial write. Values equal to the stored ones are skipped; if
    /// nothing remains the call is a no-op and publishes nothing,
    /// otherwise exactly one update event carries the changed pairs.
    async fn set_values(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        values: Vec<(PropertyMeta, Value)>,
    ) -> DatastoreResult<()>;

    // ========================================================================
    // RELATION OPERATIONS
    // ========================================================================

    /// Add edges from `(meta, id)` to `targets` under the relation
    /// property, mirroring each edge into the target's incoming index.
    async fn add_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()>;

    /// Replace the edge list under the relation property. An empty target
    /// list clears it — that is how a single-valued relation is unset.
    async fn set_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()>;

    /// Remove the edges pointing at `targets`.
    async fn remove_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
        targets: Vec<Entity>,
    ) -> DatastoreResult<()>;

    /// Resolve the entities the relation property points at. Only edge
    /// triples are stored, so this decodes the target ids and defers to
    /// [`retrieve`](Self::retrieve).
    async fn get_relations(
        &self,
        meta: &'static EntityMeta,
        id: Value,
        prop: PropertyMeta,
    ) -> DatastoreResult<EntityStream>;

    // ========================================================================
    // INCOMING-INDEX OPERATIONS
    // ========================================================================

    /// Index mirrored edges at the target record `id`.
    async fn add_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()>;

    /// Replace the mirrored edges at the target record `id`.
    async fn set_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()>;

    /// Drop mirrored edges from the target record `id`.
    async fn remove_incoming_relations(
        &self,
        id: Value,
        edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()>;

    // ========================================================================
    // QUERY
    // ========================================================================

    /// Run a filter against the backend. Results are exactly the entities
    /// the filter's local evaluator would accept, restricted to the
    /// filter type's base collection and stored type tag. The stream pages
    /// lazily; dropping it stops further fetching.
    async fn query(&self, filter: Filter) -> DatastoreResult<EntityStream>;

    // ========================================================================
    // IDENTIFIERS
    // ========================================================================

    /// The identifier generator serving `meta`'s base type.
    fn id_generator(&self, meta: &'static EntityMeta) -> DatastoreResult<Arc<dyn IdGenerator>>;
}

/// A placeholder datastore for handles that are never dereferenced
/// (filter evaluation fixtures, event payload assembly in tests). Every
/// operation panics.
pub struct NoDatastore;

impl NoDatastore {
    pub fn handle() -> Arc<dyn Datastore> {
        Arc::new(NoDatastore)
    }
}

#[async_trait]
impl Datastore for NoDatastore {
    fn name(&self) -> &str {
        "nostore"
    }

    fn instance_id(&self) -> Uuid {
        Uuid::nil()
    }

    async fn register(&self, _meta: &'static EntityMeta) -> DatastoreResult<()> {
        Ok(())
    }

    async fn retrieve(
        &self,
        _meta: &'static EntityMeta,
        _ids: Vec<Value>,
    ) -> DatastoreResult<EntityStream> {
        panic!("NoDatastore holds no entities")
    }

    async fn create(&self, _entities: Vec<TransientEntity>) -> DatastoreResult<EntityStream> {
        panic!("NoDatastore holds no entities")
    }

    async fn delete(&self, _entities: Vec<Entity>) -> DatastoreResult<HashSet<Value>> {
        panic!("NoDatastore holds no entities")
    }

    async fn get_values(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _props: Vec<PropertyMeta>,
    ) -> DatastoreResult<Vec<(PropertyMeta, Value)>> {
        panic!("NoDatastore holds no entities")
    }

    async fn set_values(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _values: Vec<(PropertyMeta, Value)>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no entities")
    }

    async fn add_relations(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _prop: PropertyMeta,
        _targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn set_relations(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _prop: PropertyMeta,
        _targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn remove_relations(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _prop: PropertyMeta,
        _targets: Vec<Entity>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn get_relations(
        &self,
        _meta: &'static EntityMeta,
        _id: Value,
        _prop: PropertyMeta,
    ) -> DatastoreResult<EntityStream> {
        panic!("NoDatastore holds no relations")
    }

    async fn add_incoming_relations(
        &self,
        _id: Value,
        _edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn set_incoming_relations(
        &self,
        _id: Value,
        _edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn remove_incoming_relations(
        &self,
        _id: Value,
        _edges: Vec<IncomingEdge>,
    ) -> DatastoreResult<()> {
        panic!("NoDatastore holds no relations")
    }

    async fn query(&self, _filter: Filter) -> DatastoreResult<EntityStream> {
        panic!("NoDatastore holds no entities")
    }

    fn id_generator(&self, _meta: &'static EntityMeta) -> DatastoreResult<Arc<dyn IdGenerator>> {
        panic!("NoDatastore mints no identifiers")
    }
}
