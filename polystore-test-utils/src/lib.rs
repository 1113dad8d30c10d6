//! Shared test fixtures for the polystore workspace:
//! - the `Person` / `Employee` / `Manager` metadata chain
//! - `Contact`, a self-related type with a single (`spouse`) and a
//!   collection (`friends`) relation
//! - transient builders and a wired-up in-memory store

use polystore_core::{EntityMeta, PropertyMeta, RelationOrder, ScalarKind, TransientEntity};
use polystore_datastore::{DatastoreConfig, MemoryDatastore};
use polystore_events::EventBus;
use std::sync::Arc;

// ============================================================================
// FIXTURE METADATA
// ============================================================================

static PERSON: EntityMeta = EntityMeta {
    name: "Person",
    parent: None,
    id_type: PropertyMeta::id(ScalarKind::Long),
    id_generated: true,
    properties: &[
        PropertyMeta::scalar("name", ScalarKind::Text, false),
        PropertyMeta::scalar("first", ScalarKind::Text, true),
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

static CONTACT: EntityMeta = EntityMeta {
    name: "Contact",
    parent: None,
    id_type: PropertyMeta::id(ScalarKind::Long),
    id_generated: true,
    properties: &[
        PropertyMeta::scalar("name", ScalarKind::Text, false),
        PropertyMeta::scalar("age", ScalarKind::Int, true),
        PropertyMeta::single_relation("spouse", contact, true),
        PropertyMeta::collection_relation("friends", contact, RelationOrder::Set),
    ],
};

pub fn person() -> &'static EntityMeta {
    &PERSON
}

pub fn employee() -> &'static EntityMeta {
    &EMPLOYEE
}

pub fn manager() -> &'static EntityMeta {
    &MANAGER
}

pub fn contact() -> &'static EntityMeta {
    &CONTACT
}

// ============================================================================
// BUILDERS
// ============================================================================

pub fn person_transient(name: &str, first: &str, age: i64) -> TransientEntity {
    let mut transient = TransientEntity::new(person());
    transient.set("name", name).set("first", first).set("age", age);
    transient
}

pub fn employee_transient(name: &str, first: &str, age: i64, salary: i64) -> TransientEntity {
    let mut transient = TransientEntity::new(employee());
    transient
        .set("name", name)
        .set("first", first)
        .set("age", age)
        .set("salary", salary);
    transient
}

pub fn manager_transient(
    name: &str,
    first: &str,
    age: i64,
    salary: i64,
    department: Option<&str>,
) -> TransientEntity {
    let mut transient = TransientEntity::new(manager());
    transient
        .set("name", name)
        .set("first", first)
        .set("age", age)
        .set("salary", salary);
    if let Some(department) = department {
        transient.set("department", department);
    }
    transient
}

pub fn contact_transient(name: &str, age: i64) -> TransientEntity {
    let mut transient = TransientEntity::new(contact());
    transient.set("name", name).set("age", age);
    transient
}

// ============================================================================
// WIRING
// ============================================================================

/// An event bus plus a connected in-memory datastore named `name`.
pub fn memory_store(name: &str) -> (Arc<EventBus>, Arc<MemoryDatastore>) {
    let events = Arc::new(EventBus::new());
    let store = MemoryDatastore::connect(&DatastoreConfig::memory(name), events.clone());
    (events, store)
}
