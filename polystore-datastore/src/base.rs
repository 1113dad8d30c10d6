//! Shared adapter infrastructure.
//!
//! Every concrete adapter embeds a [`DatastoreBase`]: the configured name,
//! a process-unique instance id, the event bus handle, and the
//! identifier-generator bookkeeping. The generator map is guarded by one
//! lock held only for the lookup-or-insert critical section, never across
//! backend I/O.

use polystore_core::{Datastore, EntityMeta, IdGenerator, Value};
use polystore_events::EventBus;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// The state every datastore instance shares, regardless of backend.
pub struct DatastoreBase {
    name: String,
    instance_id: Uuid,
    events: Arc<EventBus>,
    generators: Mutex<HashMap<&'static str, Arc<dyn IdGenerator>>>,
}

impl DatastoreBase {
    pub fn new(name: impl Into<String>, events: Arc<EventBus>) -> Self {
        DatastoreBase {
            name: name.into(),
            instance_id: Uuid::now_v7(),
            events,
            generators: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Signal that the backend handshake finished and the datastore is
    /// usable. Adapters call this exactly once, from their constructor
    /// path.
    pub fn ready(&self, datastore: Arc<dyn Datastore>) {
        tracing::debug!(store = self.name.as_str(), instance = %self.instance_id, "datastore ready");
        self.events.datastore_started(datastore);
    }

    /// The generator registered for a base type, if any.
    pub fn generator(&self, base_meta: &'static EntityMeta) -> Option<Arc<dyn IdGenerator>> {
        self.generators
            .lock()
            .unwrap()
            .get(base_meta.name)
            .cloned()
    }

    /// Insert-if-absent under the lock: at most one generator per base
    /// type, shared by all its subtypes.
    pub fn ensure_generator(
        &self,
        base_meta: &'static EntityMeta,
        make: impl FnOnce() -> Arc<dyn IdGenerator>,
    ) -> Arc<dyn IdGenerator> {
        let mut generators = self.generators.lock().unwrap();
        generators
            .entry(base_meta.name)
            .or_insert_with(make)
            .clone()
    }
}

/// A monotonically progressing integer sequence. `next()` is lock-free
/// and never issues a duplicate under concurrent callers.
pub struct SequenceGenerator {
    counter: AtomicI64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        SequenceGenerator {
            counter: AtomicI64::new(0),
        }
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for SequenceGenerator {
    fn next(&self) -> Value {
        Value::Int(self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

/// Mints time-ordered UUIDs, carried as text values.
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next(&self) -> Value {
        Value::from(Uuid::now_v7())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use polystore_core::{PropertyMeta, ScalarKind};
    use std::collections::HashSet;
    use std::thread;

    static THING: EntityMeta = EntityMeta {
        name: "Thing",
        parent: None,
        id_type: PropertyMeta::id(ScalarKind::Long),
        id_generated: true,
        properties: &[],
    };

    #[test]
    fn test_sequence_generator_no_duplicates_under_threads() {
        let generator = Arc::new(SequenceGenerator::new());
        let mut handles = Vec::new();
        for _ in 0..4 {
            let generator = generator.clone();
            handles.push(thread::spawn(move || {
                (0..250).map(|_| generator.next()).collect::<Vec<_>>()
            }));
        }
        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value), "duplicate identifier issued");
            }
        }
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn test_ensure_generator_shares_one_instance() {
        let base = DatastoreBase::new("test", Arc::new(EventBus::new()));
        let first = base.ensure_generator(&THING, || Arc::new(SequenceGenerator::new()));
        let second = base.ensure_generator(&THING, || Arc::new(SequenceGenerator::new()));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.next(), Value::Int(0));
        assert_eq!(second.next(), Value::Int(1));
    }

    #[test]
    fn test_instance_ids_are_process_unique() {
        let events = Arc::new(EventBus::new());
        let a = DatastoreBase::new("a", events.clone());
        let b = DatastoreBase::new("b", events);
        assert_ne!(a.instance_id(), b.instance_id());
    }

    #[test]
    fn test_uuid_generator_mints_text_values() {
        match UuidGenerator.next() {
            Value::Text(s) => assert!(uuid::Uuid::parse_str(&s).is_ok()),
            other => panic!("expected Text, got {other:?}"),
        }
    }
}
