//! Entity manager tests.
//!
//! Drives the facade end to end over a `MemoryRecordStore`: entity
//! round trips, self-loops, transactional property views, tracker
//! ordering, reference nodes, and rollback isolation.

use std::sync::Arc;

use parking_lot::Mutex;

use graphmem::{
    CacheKind, CacheSettings, Direction, EntityKey, EntityManager, Error, MemoryRecordStore,
    NodeId, PropertyTracker, PropertyValue, Result,
};

fn fixtures() -> (Arc<MemoryRecordStore>, Arc<EntityManager>) {
    fixtures_with_settings(CacheSettings::new().with_cache_kind(CacheKind::Clock))
}

fn fixtures_with_settings(
    settings: CacheSettings,
) -> (Arc<MemoryRecordStore>, Arc<EntityManager>) {
    let store = Arc::new(MemoryRecordStore::new());
    let manager = EntityManager::new(settings, store.clone(), store.clone()).unwrap();
    (store, manager)
}

// ============================================================================
// Round trips
// ============================================================================

/// createNode then getNodeById yields an equal proxy, within the same
/// transaction and across transactions after commit.
#[test]
fn test_create_node_round_trip() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let created = manager.create_node(&tx).unwrap();
    assert_eq!(manager.node_by_id(&tx, created.id()).unwrap(), created);
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    assert_eq!(manager.node_by_id(&tx, created.id()).unwrap(), created);
}

#[test]
fn test_relationship_round_trip() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let a = manager.create_node(&tx).unwrap();
    let b = manager.create_node(&tx).unwrap();
    let rel = a.create_relationship_to(&tx, &b, "KNOWS").unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    let found = manager.relationship_by_id(&tx, rel.id()).unwrap();
    assert_eq!(found, rel);
    assert_eq!(found.start_node().unwrap(), a);
    assert_eq!(found.end_node().unwrap(), b);
    assert_eq!(found.type_name().unwrap(), "KNOWS");
    assert_eq!(
        found.direction_from(a.id()).unwrap(),
        Direction::Outgoing
    );
}

/// Evicting a node from the cache and reading it again is equivalent to
/// reading it, at the cost of exactly one extra loader call.
#[test]
fn test_evict_then_read_is_idempotent() {
    let (store, manager) = fixtures();

    let tx = manager.begin_tx();
    let node = manager.create_node(&tx).unwrap();
    node.set_property(&tx, "name", PropertyValue::from("n")).unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    let before = manager.node_by_id(&tx, node.id()).unwrap();
    let before_props = before.properties(&tx).unwrap();
    let baseline = store.node_load_count(node.id());

    manager.evict_node_from_cache(node.id());

    let after = manager.node_by_id(&tx, node.id()).unwrap();
    assert_eq!(before, after);
    assert_eq!(after.properties(&tx).unwrap(), before_props);
    assert_eq!(
        store.node_load_count(node.id()),
        baseline + 1,
        "eviction costs exactly one extra load"
    );
}

// ============================================================================
// Relationships and self-loops
// ============================================================================

/// A self-loop is reported exactly once, tagged both.
#[test]
fn test_self_loop_counted_once() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let n = manager.create_node(&tx).unwrap();
    let rel = n.create_relationship_to(&tx, &n, "LOOPS").unwrap();

    // Visible once within the creating transaction.
    let rels = n.relationships(&tx).unwrap();
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0], rel);
    assert_eq!(rels[0].direction_from(n.id()).unwrap(), Direction::Both);
    tx.commit().unwrap();

    // And once for a later transaction reading committed state.
    let tx = manager.begin_tx();
    let rels = n.relationships(&tx).unwrap();
    assert_eq!(rels.len(), 1);
    assert!(rels[0].is_loop().unwrap());
}

/// Both endpoints observe a committed relationship with the right
/// directions.
#[test]
fn test_endpoints_see_committed_relationship() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let s = manager.create_node(&tx).unwrap();
    let e = manager.create_node(&tx).unwrap();
    let rel = s.create_relationship_to(&tx, &e, "KNOWS").unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    let from_start = s.relationships(&tx).unwrap();
    let from_end = e.relationships(&tx).unwrap();

    assert_eq!(from_start, vec![rel.clone()]);
    assert_eq!(from_end, vec![rel.clone()]);
    assert_eq!(
        rel.direction_from(s.id()).unwrap(),
        Direction::Outgoing
    );
    assert_eq!(rel.direction_from(e.id()).unwrap(), Direction::Incoming);
}

/// Relationship chains longer than one store page are merged completely
/// and survive cache eviction of the hub node.
#[test]
fn test_long_chain_pages_in() {
    let store = Arc::new(MemoryRecordStore::with_batch_size(3));
    let manager = EntityManager::new(
        CacheSettings::new().with_cache_kind(CacheKind::Clock),
        store.clone(),
        store.clone(),
    )
    .unwrap();

    let tx = manager.begin_tx();
    let hub = manager.create_node(&tx).unwrap();
    let mut created = Vec::new();
    for _ in 0..10 {
        let other = manager.create_node(&tx).unwrap();
        created.push(hub.create_relationship_to(&tx, &other, "KNOWS").unwrap());
    }
    tx.commit().unwrap();

    // Force a fresh light load so the chain must page in.
    manager.clear_cache();

    let tx = manager.begin_tx();
    let rels = hub.relationships(&tx).unwrap();
    assert_eq!(rels.len(), 10);
    for rel in created {
        assert!(rels.contains(&rel));
    }
}

#[test]
fn test_deleted_relationship_disappears() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let a = manager.create_node(&tx).unwrap();
    let b = manager.create_node(&tx).unwrap();
    let rel = a.create_relationship_to(&tx, &b, "KNOWS").unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    rel.delete(&tx).unwrap();

    // Gone for the deleting transaction immediately.
    assert!(matches!(
        manager.relationship_by_id(&tx, rel.id()),
        Err(Error::NotFound { .. })
    ));
    assert!(a.relationships(&tx).unwrap().is_empty());
    tx.commit().unwrap();

    // And for everyone after commit.
    let tx = manager.begin_tx();
    assert!(a.relationships(&tx).unwrap().is_empty());
    assert!(b.relationships(&tx).unwrap().is_empty());
}

// ============================================================================
// Property views
// ============================================================================

/// Within a transaction, reads observe the transaction's own writes;
/// other transactions keep seeing committed state.
#[test]
fn test_uncommitted_properties_are_transaction_local() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let node = manager.create_node(&setup).unwrap();
    node.set_property(&setup, "color", PropertyValue::from("red"))
        .unwrap();
    setup.commit().unwrap();

    let writer = manager.begin_tx();
    node.set_property(&writer, "color", PropertyValue::from("blue"))
        .unwrap();
    assert_eq!(
        node.property(&writer, "color").unwrap(),
        Some(PropertyValue::from("blue"))
    );

    let reader = manager.begin_tx();
    assert_eq!(
        node.property(&reader, "color").unwrap(),
        Some(PropertyValue::from("red")),
        "uncommitted write leaked to another transaction"
    );
    drop(reader);

    writer.commit().unwrap();

    let reader = manager.begin_tx();
    assert_eq!(
        node.property(&reader, "color").unwrap(),
        Some(PropertyValue::from("blue"))
    );
}

#[test]
fn test_property_remove_within_transaction() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let node = manager.create_node(&tx).unwrap();
    node.set_property(&tx, "x", PropertyValue::Long(1)).unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    let removed = node.remove_property(&tx, "x").unwrap();
    assert_eq!(removed, Some(PropertyValue::Long(1)));
    assert_eq!(node.property(&tx, "x").unwrap(), None);
    // Removing again is a no-op.
    assert_eq!(node.remove_property(&tx, "x").unwrap(), None);
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    assert_eq!(node.property(&tx, "x").unwrap(), None);
}

#[test]
fn test_properties_merge_pending_over_base() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let node = manager.create_node(&setup).unwrap();
    node.set_property(&setup, "keep", PropertyValue::Long(1)).unwrap();
    node.set_property(&setup, "drop", PropertyValue::Long(2)).unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    node.set_property(&tx, "add", PropertyValue::Long(3)).unwrap();
    node.remove_property(&tx, "drop").unwrap();

    let view = node.properties(&tx).unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(node.property(&tx, "keep").unwrap(), Some(PropertyValue::Long(1)));
    assert_eq!(node.property(&tx, "add").unwrap(), Some(PropertyValue::Long(3)));
    assert_eq!(node.property(&tx, "drop").unwrap(), None);
}

// ============================================================================
// Property trackers (S5)
// ============================================================================

#[derive(Default)]
struct RecordingTracker {
    events: Mutex<Vec<String>>,
}

impl PropertyTracker for RecordingTracker {
    fn property_added(&self, _entity: EntityKey, key: &str, value: &PropertyValue) -> Result<()> {
        self.events.lock().push(format!("add({key},{value})"));
        Ok(())
    }

    fn property_changed(
        &self,
        _entity: EntityKey,
        key: &str,
        old: &PropertyValue,
        new: &PropertyValue,
    ) -> Result<()> {
        self.events
            .lock()
            .push(format!("change({key},{old}->{new})"));
        Ok(())
    }

    fn property_removed(&self, _entity: EntityKey, key: &str, old: &PropertyValue) -> Result<()> {
        self.events.lock().push(format!("remove({key},{old})"));
        Ok(())
    }
}

/// Setting x = 1 then x = 2 is observed as add(x,1), change(x,1->2), in
/// order, before any reader can observe x = 2.
#[test]
fn test_tracker_observes_add_then_change_in_order() {
    let (_store, manager) = fixtures();
    let tracker = Arc::new(RecordingTracker::default());
    manager.add_node_property_tracker(tracker.clone());

    let tx = manager.begin_tx();
    let node = manager.create_node(&tx).unwrap();

    node.set_property(&tx, "x", PropertyValue::Long(1)).unwrap();
    node.set_property(&tx, "x", PropertyValue::Long(2)).unwrap();

    assert_eq!(
        *tracker.events.lock(),
        vec!["add(x,1)".to_owned(), "change(x,1->2)".to_owned()]
    );
}

struct VetoingTracker;

impl PropertyTracker for VetoingTracker {
    fn property_added(&self, _entity: EntityKey, _key: &str, _value: &PropertyValue) -> Result<()> {
        Err(Error::InvalidArgument("vetoed".into()))
    }

    fn property_changed(
        &self,
        _entity: EntityKey,
        _key: &str,
        _old: &PropertyValue,
        _new: &PropertyValue,
    ) -> Result<()> {
        Ok(())
    }

    fn property_removed(&self, _entity: EntityKey, _key: &str, _old: &PropertyValue) -> Result<()> {
        Ok(())
    }
}

/// A tracker error aborts the mutation and marks the transaction
/// rollback-only.
#[test]
fn test_tracker_error_aborts_mutation() {
    let (_store, manager) = fixtures();
    manager.add_node_property_tracker(Arc::new(VetoingTracker));

    let tx = manager.begin_tx();
    let node = manager.create_node(&tx).unwrap();

    assert!(node.set_property(&tx, "x", PropertyValue::Long(1)).is_err());
    assert!(tx.is_rollback_only());
    assert_eq!(node.property(&tx, "x").unwrap(), None);
}

// ============================================================================
// Reference nodes (S6)
// ============================================================================

#[test]
fn test_reference_node_idempotent() {
    let (store, manager) = fixtures();

    let first = manager.reference_node("root").unwrap();
    let second = manager.reference_node("root").unwrap();

    assert_eq!(first.id(), second.id());
    assert_eq!(store.node_count(), 1, "exactly one creation in the store");
}

// ============================================================================
// Rollback isolation
// ============================================================================

/// A transaction that creates a relationship and is marked rollback-only
/// leaves no persistent record and no cache residue visible to other
/// transactions.
#[test]
fn test_rollback_leaves_no_residue() {
    let (store, manager) = fixtures();

    let setup = manager.begin_tx();
    let a = manager.create_node(&setup).unwrap();
    let b = manager.create_node(&setup).unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    let rel = a.create_relationship_to(&tx, &b, "KNOWS").unwrap();
    tx.set_rollback_only();
    assert!(tx.commit().is_err());

    assert_eq!(store.relationship_count(), 0, "persistent record leaked");

    let tx = manager.begin_tx();
    assert!(matches!(
        manager.relationship_by_id(&tx, rel.id()),
        Err(Error::NotFound { .. })
    ));
    assert!(a.relationships(&tx).unwrap().is_empty());
    assert!(b.relationships(&tx).unwrap().is_empty());
}

#[test]
fn test_rollback_restores_deleted_node() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let node = manager.create_node(&setup).unwrap();
    node.set_property(&setup, "name", PropertyValue::from("keep"))
        .unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    node.delete(&tx).unwrap();
    assert!(manager.node_or_none(&tx, node.id()).unwrap().is_none());
    tx.rollback().unwrap();

    let tx = manager.begin_tx();
    let restored = manager.node_by_id(&tx, node.id()).unwrap();
    assert_eq!(
        restored.property(&tx, "name").unwrap(),
        Some(PropertyValue::from("keep"))
    );
}

#[test]
fn test_rollback_reverts_property_mutations() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let node = manager.create_node(&setup).unwrap();
    node.set_property(&setup, "x", PropertyValue::Long(1)).unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    node.set_property(&tx, "x", PropertyValue::Long(2)).unwrap();
    node.set_property(&tx, "y", PropertyValue::Long(3)).unwrap();
    tx.rollback().unwrap();

    let tx = manager.begin_tx();
    assert_eq!(node.property(&tx, "x").unwrap(), Some(PropertyValue::Long(1)));
    assert_eq!(node.property(&tx, "y").unwrap(), None);
}

// ============================================================================
// Deletes and tombstones
// ============================================================================

#[test]
fn test_deleted_node_is_gone_after_commit() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let node = manager.create_node(&setup).unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    node.delete(&tx).unwrap();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    assert!(matches!(
        manager.node_by_id(&tx, node.id()),
        Err(Error::NotFound { .. })
    ));
}

#[test]
fn test_delete_node_with_relationships_rejected() {
    let (_store, manager) = fixtures();

    let setup = manager.begin_tx();
    let a = manager.create_node(&setup).unwrap();
    let b = manager.create_node(&setup).unwrap();
    a.create_relationship_to(&setup, &b, "KNOWS").unwrap();
    setup.commit().unwrap();

    let tx = manager.begin_tx();
    assert!(a.delete(&tx).is_err());
    assert!(tx.is_rollback_only());
}

// ============================================================================
// Scans
// ============================================================================

#[test]
fn test_all_nodes_scan() {
    let (_store, manager) = fixtures();

    let tx = manager.begin_tx();
    let mut created: Vec<NodeId> = (0..5)
        .map(|_| manager.create_node(&tx).unwrap().id())
        .collect();
    tx.commit().unwrap();

    let tx = manager.begin_tx();
    let mut seen: Vec<NodeId> = manager.all_nodes(&tx).unwrap().map(|n| n.id()).collect();
    created.sort();
    seen.sort();
    assert_eq!(seen, created);
}

// ============================================================================
// Cache administration
// ============================================================================

#[test]
fn test_cache_kind_and_clear() {
    let (_store, manager) =
        fixtures_with_settings(CacheSettings::new().with_cache_kind(CacheKind::Lru));
    assert_eq!(manager.cache_kind(), CacheKind::Lru);

    let tx = manager.begin_tx();
    let node = manager.create_node(&tx).unwrap();
    tx.commit().unwrap();

    manager.clear_cache();

    // Still loadable from the store after a cache clear.
    let tx = manager.begin_tx();
    manager.node_by_id(&tx, node.id()).unwrap();
}
