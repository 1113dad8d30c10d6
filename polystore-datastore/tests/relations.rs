//! Relation mutation and traversal against the in-memory adapter.

use futures_util::TryStreamExt;
use polystore_core::{Datastore, Entity, Filter, Value};
use polystore_test_utils::{contact, contact_transient, memory_store};

async fn two_contacts(store: &polystore_datastore::MemoryDatastore) -> (Entity, Entity) {
    let created: Vec<Entity> = store
        .create(vec![
            contact_transient("holla", 44),
            contact_transient("rolla", 47),
        ])
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    (created[0].clone(), created[1].clone())
}

#[tokio::test]
async fn test_add_relations_and_read_back() {
    let (_events, store) = memory_store("rel1");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    let spouse = *contact().require_property("spouse");
    store
        .add_relations(contact(), holla.id().clone(), spouse, vec![rolla.clone()])
        .await
        .unwrap();

    let spouses = holla.relations("spouse").await.unwrap();
    assert_eq!(spouses, vec![rolla.clone()]);

    // The symmetric incoming entry sits at the target's record, grouped by
    // (source type, relation).
    let record = store.record(contact(), rolla.id()).unwrap();
    let incoming = record.incoming_from("Contact", "spouse");
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].from_id, *holla.id());
    assert_eq!(incoming[0].from_datastore, "rel1");
}

#[tokio::test]
async fn test_set_relations_to_empty_clears_single_relation() {
    let (_events, store) = memory_store("rel2");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    let spouse = *contact().require_property("spouse");
    store
        .set_relations(contact(), holla.id().clone(), spouse, vec![rolla.clone()])
        .await
        .unwrap();
    assert_eq!(holla.relations("spouse").await.unwrap().len(), 1);

    store
        .set_relations(contact(), holla.id().clone(), spouse, Vec::new())
        .await
        .unwrap();
    assert!(holla.relations("spouse").await.unwrap().is_empty());

    // The stale mirror entry went away with the outgoing edge.
    let record = store.record(contact(), rolla.id()).unwrap();
    assert!(record.incoming_from("Contact", "spouse").is_empty());
}

#[tokio::test]
async fn test_remove_relations_removes_both_directions() {
    let (_events, store) = memory_store("rel3");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    let friends = *contact().require_property("friends");
    let third: Vec<Entity> = store
        .create(vec![contact_transient("molla", 30)])
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let molla = third[0].clone();

    store
        .add_relations(
            contact(),
            holla.id().clone(),
            friends,
            vec![rolla.clone(), molla.clone()],
        )
        .await
        .unwrap();
    assert_eq!(holla.relations("friends").await.unwrap().len(), 2);

    store
        .remove_relations(contact(), holla.id().clone(), friends, vec![rolla.clone()])
        .await
        .unwrap();
    let remaining = holla.relations("friends").await.unwrap();
    assert_eq!(remaining, vec![molla.clone()]);

    let rolla_record = store.record(contact(), rolla.id()).unwrap();
    assert!(rolla_record.incoming_from("Contact", "friends").is_empty());
    let molla_record = store.record(contact(), molla.id()).unwrap();
    assert_eq!(molla_record.incoming_from("Contact", "friends").len(), 1);
}

#[tokio::test]
async fn test_adding_twice_keeps_one_edge() {
    let (_events, store) = memory_store("rel4");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    let friends = *contact().require_property("friends");
    for _ in 0..2 {
        store
            .add_relations(contact(), holla.id().clone(), friends, vec![rolla.clone()])
            .await
            .unwrap();
    }
    assert_eq!(holla.relations("friends").await.unwrap().len(), 1);
    let record = store.record(contact(), rolla.id()).unwrap();
    assert_eq!(record.incoming_from("Contact", "friends").len(), 1);
}

#[tokio::test]
async fn test_create_with_relations_seeds_both_indices() {
    let (_events, store) = memory_store("rel5");
    store.register(contact()).await.unwrap();
    let (_, rolla) = two_contacts(&store).await;

    let mut transient = contact_transient("newly", 20);
    transient.relate("spouse", vec![rolla.clone()]);
    let created: Vec<Entity> = store
        .create(vec![transient])
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();

    let spouses = created[0].relations("spouse").await.unwrap();
    assert_eq!(spouses, vec![rolla.clone()]);
    let record = store.record(contact(), rolla.id()).unwrap();
    assert_eq!(record.incoming_from("Contact", "spouse").len(), 1);
}

#[tokio::test]
async fn test_has_relation_query() {
    let (_events, store) = memory_store("rel6");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    let spouse = *contact().require_property("spouse");
    store
        .add_relations(contact(), holla.id().clone(), spouse, vec![rolla.clone()])
        .await
        .unwrap();

    // Who has a spouse aged >= 45?
    let married_to_older = Filter::has_relation(
        contact(),
        "spouse",
        Filter::gt(contact(), "age", 45),
    );
    let hits: Vec<Entity> = store
        .query(married_to_older.clone())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(hits, vec![holla.clone()]);

    // And who has none? The inverse flips the relation predicate.
    let hits: Vec<Entity> = store
        .query(married_to_older.inverse())
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(hits, vec![rolla.clone()]);
}

#[tokio::test]
async fn test_query_combined_with_relation_state() {
    let (_events, store) = memory_store("rel7");
    store.register(contact()).await.unwrap();
    let (holla, rolla) = two_contacts(&store).await;

    store
        .add_relations(
            contact(),
            holla.id().clone(),
            *contact().require_property("spouse"),
            vec![rolla.clone()],
        )
        .await
        .unwrap();

    // age <= 45 narrows to holla; the spouse handle resolves through the
    // relation read path.
    let hits: Vec<Entity> = store
        .query(Filter::lt(contact(), "age", 45))
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(hits, vec![holla.clone()]);
    let spouse = hits[0].relations("spouse").await.unwrap();
    assert_eq!(spouse[0].value("name").await.unwrap(), Value::from("rolla"));
}
