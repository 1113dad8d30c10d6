//! Relation edges.
//!
//! An edge is a value, not a pointer: the relation name, the target's type
//! and identifier, and the name of the datastore the target lives in. The
//! same fact is indexed twice — outgoing at the source record, incoming at
//! the target record — so reverse lookups need no scan.

use crate::datastore::Datastore;
use crate::entity::Entity;
use crate::meta::{EntityMeta, PropertyMeta};
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// An outgoing edge, stored at the source record under its relation name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationTo {
    pub relation: String,
    pub to_type: String,
    pub to_id: Value,
    pub to_datastore: String,
}

impl RelationTo {
    /// The edge for pointing `relation` at an already-persisted target.
    pub fn new(relation: &PropertyMeta, target: &Entity) -> Self {
        RelationTo {
            relation: relation.name().to_string(),
            to_type: target.meta().name.to_string(),
            to_id: target.id().clone(),
            to_datastore: target.store().name().to_string(),
        }
    }
}

/// An incoming edge, the mirrored fact indexed at the target record and
/// grouped by `(from_type, relation)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationFrom {
    pub relation: String,
    pub from_type: String,
    pub from_id: Value,
    pub from_datastore: String,
}

/// The API-side incoming edge handed to the incoming-index operations.
///
/// It carries the relation property descriptor (so the receiving adapter
/// knows which collection the target record lives in); only the relation
/// name is persisted, as [`RelationFrom`].
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingEdge {
    pub property: PropertyMeta,
    pub from_type: &'static EntityMeta,
    pub from_id: Value,
    pub from_datastore: String,
}

impl IncomingEdge {
    pub fn new(
        property: PropertyMeta,
        from_type: &'static EntityMeta,
        from_id: Value,
        from_datastore: impl Into<String>,
    ) -> Self {
        IncomingEdge {
            property,
            from_type,
            from_id,
            from_datastore: from_datastore.into(),
        }
    }

    /// The collection the indexed (target) record lives in.
    pub fn target_meta(&self) -> &'static EntityMeta {
        self.property.expect_relation()
    }

    /// The persisted form of this edge.
    pub fn to_stored(&self) -> RelationFrom {
        RelationFrom {
            relation: self.property.name().to_string(),
            from_type: self.from_type.name.to_string(),
            from_id: self.from_id.clone(),
            from_datastore: self.from_datastore.clone(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
