//! Entity metadata descriptors.
//!
//! One immutable [`EntityMeta`] exists per entity type, declared as a
//! static (by hand or by a code generator) and shared read-only from then
//! on.
//! Physical storage is always keyed by the *base* type — the root of the
//! supertype chain — with the concrete subtype layered on top through the
//! record's type tag.

use crate::datastore::Datastore;
use crate::entity::Entity;
use crate::value::Value;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// A thunk yielding a static metadata descriptor.
///
/// Relation properties and parent links go through a function pointer
/// instead of a direct reference so mutually recursive descriptors (a
/// `Person` whose `spouse` is a `Person`) can be declared as statics
/// without initialization cycles.
pub type MetaRef = fn() -> &'static EntityMeta;

/// Scalar kinds a property can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Text,
    Int,
    Long,
    Double,
    Float,
    Uuid,
}

/// Whether a collection relation preserves insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationOrder {
    Set,
    List,
}

/// Static descriptor of one property of an entity type.
#[derive(Clone, Copy)]
pub enum PropertyMeta {
    /// A plain scalar column.
    Scalar {
        name: &'static str,
        kind: ScalarKind,
        nullable: bool,
        read_only: bool,
    },
    /// An opaque foreign value; stored and returned verbatim, never
    /// traversed.
    Reference {
        name: &'static str,
        target_type: &'static str,
        nullable: bool,
        read_only: bool,
    },
    /// A to-one relation.
    SingleRelation {
        name: &'static str,
        target: MetaRef,
        nullable: bool,
        read_only: bool,
    },
    /// A to-many relation.
    CollectionRelation {
        name: &'static str,
        target: MetaRef,
        ordered: RelationOrder,
        mutable: bool,
        nullable: bool,
        read_only: bool,
    },
}

impl PropertyMeta {
    pub const fn scalar(name: &'static str, kind: ScalarKind, nullable: bool) -> Self {
        PropertyMeta::Scalar {
            name,
            kind,
            nullable,
            read_only: false,
        }
    }

    /// An identifier-shaped property.
    pub const fn id(kind: ScalarKind) -> Self {
        PropertyMeta::Scalar {
            name: "id",
            kind,
            nullable: false,
            read_only: true,
        }
    }

    pub const fn single_relation(name: &'static str, target: MetaRef, nullable: bool) -> Self {
        PropertyMeta::SingleRelation {
            name,
            target,
            nullable,
            read_only: false,
        }
    }

    pub const fn collection_relation(name: &'static str, target: MetaRef, ordered: RelationOrder) -> Self {
        PropertyMeta::CollectionRelation {
            name,
            target,
            ordered,
            mutable: true,
            nullable: false,
            read_only: false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PropertyMeta::Scalar { name, .. }
            | PropertyMeta::Reference { name, .. }
            | PropertyMeta::SingleRelation { name, .. }
            | PropertyMeta::CollectionRelation { name, .. } => name,
        }
    }

    pub fn nullable(&self) -> bool {
        match self {
            PropertyMeta::Scalar { nullable, .. }
            | PropertyMeta::Reference { nullable, .. }
            | PropertyMeta::SingleRelation { nullable, .. }
            | PropertyMeta::CollectionRelation { nullable, .. } => *nullable,
        }
    }

    pub fn read_only(&self) -> bool {
        match self {
            PropertyMeta::Scalar { read_only, .. }
            | PropertyMeta::Reference { read_only, .. }
            | PropertyMeta::SingleRelation { read_only, .. }
            | PropertyMeta::CollectionRelation { read_only, .. } => *read_only,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(
            self,
            PropertyMeta::SingleRelation { .. } | PropertyMeta::CollectionRelation { .. }
        )
    }

    /// The scalar kind, for scalar properties.
    pub fn kind(&self) -> Option<ScalarKind> {
        match self {
            PropertyMeta::Scalar { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The related type's descriptor, for relation properties.
    pub fn target_meta(&self) -> Option<&'static EntityMeta> {
        match self {
            PropertyMeta::SingleRelation { target, .. }
            | PropertyMeta::CollectionRelation { target, .. } => Some(target()),
            _ => None,
        }
    }

    /// The related type's descriptor; panics on a non-relation property.
    ///
    /// Passing a non-relation property to a relation operation is a
    /// programming error, raised synchronously.
    pub fn expect_relation(&self) -> &'static EntityMeta {
        match self.target_meta() {
            Some(meta) => meta,
            None => panic!("property {} is not a relation", self.name()),
        }
    }

    /// Decode a stored identifier back into the value shape this property
    /// declares. Used when resolving relation edges, whose target ids are
    /// persisted in backend-neutral form.
    pub fn decode_id(&self, raw: &Value) -> Option<Value> {
        match (self.kind()?, raw) {
            (ScalarKind::Int | ScalarKind::Long, Value::Int(_)) => Some(raw.clone()),
            (ScalarKind::Double | ScalarKind::Float, Value::Float(_) | Value::Int(_)) => {
                Some(raw.clone())
            }
            (ScalarKind::Text, Value::Text(_)) => Some(raw.clone()),
            (ScalarKind::Uuid, Value::Text(s)) => {
                Uuid::parse_str(s).ok().map(|u| Value::Text(u.to_string()))
            }
            _ => None,
        }
    }
}

// Equality is by name and property shape; the declaring type is implicit in
// where the descriptor lives.
impl PartialEq for PropertyMeta {
    fn eq(&self, other: &PropertyMeta) -> bool {
        self.name() == other.name()
            && std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.kind() == other.kind()
    }
}

impl Eq for PropertyMeta {}

impl Hash for PropertyMeta {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
        std::mem::discriminant(self).hash(state);
    }
}

impl fmt::Debug for PropertyMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyMeta::Scalar {
                name,
                kind,
                nullable,
                read_only,
            } => write!(
                f,
                "Scalar({name}, {kind:?}, nullable={nullable}, read_only={read_only})"
            ),
            PropertyMeta::Reference {
                name, target_type, ..
            } => write!(f, "Reference({name} -> {target_type})"),
            PropertyMeta::SingleRelation { name, target, .. } => {
                write!(f, "SingleRelation({name} -> {})", target().name)
            }
            PropertyMeta::CollectionRelation {
                name,
                target,
                ordered,
                ..
            } => write!(
                f,
                "CollectionRelation({name} -> {}, {ordered:?})",
                target().name
            ),
        }
    }
}

/// Immutable descriptor of an entity type.
pub struct EntityMeta {
    /// Unique type name.
    pub name: &'static str,
    /// Direct supertype, if any.
    pub parent: Option<MetaRef>,
    /// Shape of the identifier.
    pub id_type: PropertyMeta,
    /// Whether the datastore mints identifiers for this type.
    pub id_generated: bool,
    /// Properties declared directly on this type (inherited ones live on
    /// the ancestors).
    pub properties: &'static [PropertyMeta],
}

impl EntityMeta {
    /// The supertype chain from the base type down to (and including)
    /// this type. Always non-empty; `hierarchy()[0] == base()`.
    pub fn hierarchy(&'static self) -> Vec<&'static EntityMeta> {
        let mut chain = match self.parent {
            Some(parent) => parent().hierarchy(),
            None => Vec::new(),
        };
        chain.push(self);
        chain
    }

    /// The root ancestor. Physical storage is keyed by this type.
    pub fn base(&'static self) -> &'static EntityMeta {
        let mut current = self;
        while let Some(parent) = current.parent {
            current = parent();
        }
        current
    }

    /// Look up a property by name, searching this type first and then the
    /// supertype chain.
    pub fn property(&'static self, name: &str) -> Option<&'static PropertyMeta> {
        if let Some(found) = self.properties.iter().find(|p| p.name() == name) {
            return Some(found);
        }
        self.parent.and_then(|parent| parent().property(name))
    }

    /// Like [`property`](Self::property) but panics on an unknown name —
    /// referencing a property the type does not have is a programming
    /// error, raised synchronously.
    pub fn require_property(&'static self, name: &str) -> &'static PropertyMeta {
        match self.property(name) {
            Some(found) => found,
            None => panic!("entity type {} has no property {name}", self.name),
        }
    }

    /// All properties visible on this type, inherited ones first.
    pub fn all_properties(&'static self) -> Vec<&'static PropertyMeta> {
        self.hierarchy()
            .into_iter()
            .flat_map(|meta| meta.properties.iter())
            .collect()
    }

    /// Construct a lazy entity handle bound to `(store, id)`. No I/O
    /// happens here; an unknown id only surfaces when the handle is
    /// dereferenced at the store.
    pub fn instance(&'static self, store: Arc<dyn Datastore>, id: Value) -> Entity {
        Entity::new(store, self, id)
    }
}

impl PartialEq for EntityMeta {
    fn eq(&self, other: &EntityMeta) -> bool {
        self.name == other.name
    }
}

impl Eq for EntityMeta {}

impl Hash for EntityMeta {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Meta({})", self.name)
    }
}

impl fmt::Display for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    static PERSON: EntityMeta = EntityMeta {
        name: "Person",
        parent: None,
        id_type: PropertyMeta::id(ScalarKind::Long),
        id_generated: true,
        properties: &[
            PropertyMeta::scalar("name", ScalarKind::Text, false),
            PropertyMeta::scalar("age", ScalarKind::Int, true),
        ],
    };

    static EMPLOYEE: EntityMeta = EntityMeta {
        name: "Employee",
        parent: Some(person),
        id_type: PropertyMeta::id(ScalarKind::Long),
        id_generated: true,
        properties: &[PropertyMeta::scalar("salary", ScalarKind::Int, false)],
    };

    static MANAGER: EntityMeta = EntityMeta {
        name: "Manager",
        parent: Some(employee),
        id_type: PropertyMeta::id(ScalarKind::Long),
        id_generated: true,
        properties: &[PropertyMeta::scalar("department", ScalarKind::Text, true)],
    };

    fn person() -> &'static EntityMeta {
        &PERSON
    }

    fn employee() -> &'static EntityMeta {
        &EMPLOYEE
    }

    #[test]
    fn test_hierarchy_is_parent_hierarchy_plus_self() {
        assert_eq!(PERSON.hierarchy(), vec![&PERSON]);
        assert_eq!(EMPLOYEE.hierarchy(), vec![&PERSON, &EMPLOYEE]);
        assert_eq!(MANAGER.hierarchy(), vec![&PERSON, &EMPLOYEE, &MANAGER]);
    }

    #[test]
    fn test_hierarchy_starts_at_base_and_ends_at_self() {
        for meta in [&PERSON, &EMPLOYEE, &MANAGER] {
            let chain = meta.hierarchy();
            assert_eq!(chain[0], meta.base());
            assert_eq!(*chain.last().unwrap(), meta);
        }
        assert_eq!(MANAGER.base(), &PERSON);
    }

    #[test]
    fn test_property_lookup_walks_supertypes() {
        assert_eq!(MANAGER.property("age"), Some(&PERSON.properties[1]));
        assert_eq!(MANAGER.property("salary").map(|p| p.name()), Some("salary"));
        assert!(PERSON.property("salary").is_none());
    }

    #[test]
    #[should_panic(expected = "has no property")]
    fn test_require_property_panics_on_unknown() {
        PERSON.require_property("salary");
    }

    #[test]
    fn test_all_properties_inherited_first() {
        let names: Vec<_> = MANAGER.all_properties().iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["name", "age", "salary", "department"]);
    }

    #[test]
    fn test_decode_id_per_kind() {
        let long_id = PropertyMeta::id(ScalarKind::Long);
        assert_eq!(long_id.decode_id(&Value::Int(7)), Some(Value::Int(7)));
        assert_eq!(long_id.decode_id(&Value::Text("7".into())), None);

        let uuid_id = PropertyMeta::id(ScalarKind::Uuid);
        let uuid = Uuid::now_v7();
        assert_eq!(
            uuid_id.decode_id(&Value::Text(uuid.to_string())),
            Some(Value::Text(uuid.to_string()))
        );
        assert_eq!(uuid_id.decode_id(&Value::Text("not-a-uuid".into())), None);
    }
}
