//! The backend-agnostic persisted record shape.
//!
//! A record is a flat property map plus a reserved `_meta` block carrying
//! the concrete type tag, the full hierarchy names, and both relation
//! indices. Every adapter must round-trip this shape; how it is physically
//! encoded (a document, a serialized map entry) is the adapter's business.

use crate::meta::EntityMeta;
use crate::relation::{RelationFrom, RelationTo};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved key the metadata block is stored under.
pub const META_KEY: &str = "_meta";

/// One persisted entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Scalar and reference property values, flattened into the record.
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
    /// The reserved metadata block.
    #[serde(rename = "_meta")]
    pub meta: MetaBlock,
}

/// The reserved metadata block of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaBlock {
    /// Concrete type name.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Hierarchy names, base type first. Queries constrain on this list.
    pub types: Vec<String>,
    /// Outgoing and incoming relation indices.
    #[serde(default)]
    pub relations: RelationBlock,
}

/// Both relation indices of a record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RelationBlock {
    /// relation name -> edges owned by this record.
    #[serde(default)]
    pub outgoing: BTreeMap<String, Vec<RelationTo>>,
    /// source type name -> relation name -> mirrored edges.
    #[serde(default)]
    pub incoming: BTreeMap<String, BTreeMap<String, Vec<RelationFrom>>>,
}

impl Record {
    /// A fresh record for an instance of `meta`, with empty relation
    /// indices.
    pub fn new(meta: &'static EntityMeta) -> Self {
        Record {
            properties: BTreeMap::new(),
            meta: MetaBlock {
                type_name: meta.name.to_string(),
                types: meta.hierarchy().iter().map(|m| m.name.to_string()).collect(),
                relations: RelationBlock::default(),
            },
        }
    }

    /// Whether this record is (a subtype of) `type_name`.
    pub fn is_instance_of(&self, type_name: &str) -> bool {
        self.meta.types.iter().any(|t| t == type_name)
    }

    pub fn value(&self, property: &str) -> Option<&Value> {
        self.properties.get(property)
    }

    pub fn set_value(&mut self, property: impl Into<String>, value: Value) {
        self.properties.insert(property.into(), value);
    }

    // === Outgoing index ===

    /// Edges stored under `relation`; empty when none.
    pub fn outgoing(&self, relation: &str) -> &[RelationTo] {
        self.meta
            .relations
            .outgoing
            .get(relation)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append edges, skipping ones already present (set semantics).
    pub fn add_outgoing(&mut self, relation: &str, edges: impl IntoIterator<Item = RelationTo>) {
        let list = self
            .meta
            .relations
            .outgoing
            .entry(relation.to_string())
            .or_default();
        for edge in edges {
            if !list.contains(&edge) {
                list.push(edge);
            }
        }
    }

    /// Replace the edge list under `relation`; an empty list removes it.
    pub fn set_outgoing(&mut self, relation: &str, edges: Vec<RelationTo>) {
        if edges.is_empty() {
            self.meta.relations.outgoing.remove(relation);
        } else {
            self.meta.relations.outgoing.insert(relation.to_string(), edges);
        }
    }

    /// Remove exactly the given edges.
    pub fn remove_outgoing(&mut self, relation: &str, edges: &[RelationTo]) {
        if let Some(list) = self.meta.relations.outgoing.get_mut(relation) {
            list.retain(|edge| !edges.contains(edge));
            if list.is_empty() {
                self.meta.relations.outgoing.remove(relation);
            }
        }
    }

    // === Incoming index ===

    /// Mirrored edges from `from_type` via `relation`; empty when none.
    pub fn incoming_from(&self, from_type: &str, relation: &str) -> &[RelationFrom] {
        self.meta
            .relations
            .incoming
            .get(from_type)
            .and_then(|per_relation| per_relation.get(relation))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Index a mirrored edge, skipping duplicates (set semantics).
    pub fn add_incoming(&mut self, edge: RelationFrom) {
        let list = self
            .meta
            .relations
            .incoming
            .entry(edge.from_type.clone())
            .or_default()
            .entry(edge.relation.clone())
            .or_default();
        if !list.contains(&edge) {
            list.push(edge);
        }
    }

    /// Replace the mirrored edges under `(from_type, relation)`.
    pub fn set_incoming(&mut self, from_type: &str, relation: &str, edges: Vec<RelationFrom>) {
        let per_relation = self
            .meta
            .relations
            .incoming
            .entry(from_type.to_string())
            .or_default();
        if edges.is_empty() {
            per_relation.remove(relation);
        } else {
            per_relation.insert(relation.to_string(), edges);
        }
        if self.meta.relations.incoming[from_type].is_empty() {
            self.meta.relations.incoming.remove(from_type);
        }
    }

    /// Remove one mirrored edge.
    pub fn remove_incoming(&mut self, edge: &RelationFrom) {
        if let Some(per_relation) = self.meta.relations.incoming.get_mut(&edge.from_type) {
            if let Some(list) = per_relation.get_mut(&edge.relation) {
                list.retain(|e| e != edge);
                if list.is_empty() {
                    per_relation.remove(&edge.relation);
                }
            }
            if per_relation.is_empty() {
                self.meta.relations.incoming.remove(&edge.from_type);
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let mut record = Record {
            properties: BTreeMap::new(),
            meta: MetaBlock {
                type_name: "Employee".into(),
                types: vec!["Person".into(), "Employee".into()],
                relations: RelationBlock::default(),
            },
        };
        record.set_value("name", Value::Text("djuric".into()));
        record.set_value("age", Value::Int(3));
        record.add_outgoing(
            "spouse",
            [RelationTo {
                relation: "spouse".into(),
                to_type: "Person".into(),
                to_id: Value::Int(9),
                to_datastore: "main".into(),
            }],
        );
        record
    }

    #[test]
    fn test_record_shape_round_trip() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        // Properties are flattened; the metadata block sits under the
        // reserved key.
        assert_eq!(json["name"], serde_json::json!("djuric"));
        assert_eq!(json["age"], serde_json::json!(3));
        assert_eq!(json[META_KEY]["type"], serde_json::json!("Employee"));
        assert_eq!(
            json[META_KEY]["types"],
            serde_json::json!(["Person", "Employee"])
        );
        assert_eq!(
            json[META_KEY]["relations"]["outgoing"]["spouse"][0]["toId"],
            serde_json::json!(9)
        );

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_add_outgoing_is_a_set() {
        let mut record = sample_record();
        let edge = record.outgoing("spouse")[0].clone();
        record.add_outgoing("spouse", [edge]);
        assert_eq!(record.outgoing("spouse").len(), 1);
    }

    #[test]
    fn test_set_outgoing_empty_removes_relation() {
        let mut record = sample_record();
        record.set_outgoing("spouse", Vec::new());
        assert!(record.outgoing("spouse").is_empty());
        assert!(!record.meta.relations.outgoing.contains_key("spouse"));
    }

    #[test]
    fn test_incoming_index_round_trip() {
        let mut record = sample_record();
        let edge = RelationFrom {
            relation: "spouse".into(),
            from_type: "Person".into(),
            from_id: Value::Int(4),
            from_datastore: "main".into(),
        };
        record.add_incoming(edge.clone());
        record.add_incoming(edge.clone());
        assert_eq!(record.incoming_from("Person", "spouse"), &[edge.clone()]);

        record.remove_incoming(&edge);
        assert!(record.incoming_from("Person", "spouse").is_empty());
        assert!(record.meta.relations.incoming.is_empty());
    }

    #[test]
    fn test_is_instance_of_covers_hierarchy() {
        let record = sample_record();
        assert!(record.is_instance_of("Person"));
        assert!(record.is_instance_of("Employee"));
        assert!(!record.is_instance_of("Manager"));
    }
}
