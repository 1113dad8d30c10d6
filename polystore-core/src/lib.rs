//! polystore core — the portable entity, filter and contract model.
//!
//! A typed entity/relation model layered over interchangeable storage
//! backends: consumers work against entity metadata and a small boolean
//! filter algebra, and the layer compiles those filters into each
//! backend's native query representation while keeping a directed
//! relation graph independent of how a backend physically encodes it.
//!
//! This crate holds everything backend-neutral:
//! - [`meta`]: static entity type descriptors and the supertype hierarchy
//! - [`value`]: the dynamic property value type
//! - [`entity`]: lazy entity handles and transient drafts
//! - [`filter`]: the filter algebra, local evaluator and compiler contract
//! - [`relation`]: relation edge values
//! - [`record`]: the persisted record shape every adapter round-trips
//! - [`events`]: lifecycle event payloads
//! - [`error`]: the three-kind error taxonomy
//! - [`datastore`]: the async contract adapters implement
//!
//! Channels, adapters and runtime wiring live in the sibling crates.

pub mod datastore;
pub mod entity;
pub mod error;
pub mod events;
pub mod filter;
pub mod meta;
pub mod record;
pub mod relation;
pub mod value;

pub use datastore::{Datastore, EntityStream, IdGenerator, NoDatastore};
pub use entity::{Entity, TransientEntity};
pub use error::{DatastoreError, DatastoreResult};
pub use events::{DatastoreEvent, EntitiesEvent, PropertyUpdate};
pub use filter::{Filter, FilterCompiler, FilterNode, NoLookup, Op, RecordLookup};
pub use meta::{EntityMeta, MetaRef, PropertyMeta, RelationOrder, ScalarKind};
pub use record::{MetaBlock, Record, RelationBlock, META_KEY};
pub use relation::{IncomingEdge, RelationFrom, RelationTo};
pub use value::Value;
