//! Entity manager - the public facade of the object layer.
//!
//! The [`EntityManager`] creates and deletes nodes and relationships,
//! mutates properties, reads neighborhoods, and hands out proxies. It
//! mediates between the [`EntityCache`], the per-transaction change set,
//! the lock manager, and the record loader.
//!
//! Write operations are short critical sections: locks are acquired in a
//! fixed order, the loader is called inside the guarded region, and the
//! locks stay recorded on the transaction for release at completion. Any
//! guarded failure marks the transaction rollback-only.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, warn};
use parking_lot::RwLock;

use crate::cache::{
    AdaptiveCacheManager, MemoryMonitor, ResizableCache, StatsSnapshot, SystemMemoryMonitor,
};
use crate::common::{
    CacheKind, CacheSettings, EntityKind, Error, KeyId, NodeId, RelationshipId, Result,
};
use crate::entity::cache::EntityCache;
use crate::entity::names::{PropertyKeyHolder, ReferenceNodeHolder, RelationshipTypeHolder};
use crate::entity::node::InternalNode;
use crate::entity::proxy::{NodeProxy, RelationshipProxy};
use crate::entity::relationship::InternalRelationship;
use crate::store::{Direction, IdGenerator, PropertySet, PropertyValue, RecordLoader};
use crate::txn::{
    EntityKey, LockManager, LockMode, PropertyChange, Resource, RestoreData, Transaction,
    TransactionChangeSet, TxOutcome,
};

/// Sampling cadence of the adaptive cache worker.
const ADAPTIVE_SAMPLE_INTERVAL: Duration = Duration::from_secs(10);

/// Observer of property mutations.
///
/// Trackers run before the mutation is recorded anywhere; a tracker
/// error aborts the mutation and marks the transaction rollback-only.
pub trait PropertyTracker: Send + Sync {
    fn property_added(&self, entity: EntityKey, key: &str, value: &PropertyValue) -> Result<()>;

    fn property_changed(
        &self,
        entity: EntityKey,
        key: &str,
        old: &PropertyValue,
        new: &PropertyValue,
    ) -> Result<()>;

    fn property_removed(&self, entity: EntityKey, key: &str, old: &PropertyValue) -> Result<()>;
}

/// The public facade over the in-memory object layer.
pub struct EntityManager {
    me: Weak<EntityManager>,
    settings: CacheSettings,
    cache: EntityCache,
    loader: Arc<dyn RecordLoader>,
    id_generator: Arc<dyn IdGenerator>,
    lock_manager: Arc<LockManager>,
    types: RelationshipTypeHolder,
    keys: Arc<PropertyKeyHolder>,
    reference_nodes: ReferenceNodeHolder,
    node_trackers: RwLock<Vec<Arc<dyn PropertyTracker>>>,
    relationship_trackers: RwLock<Vec<Arc<dyn PropertyTracker>>>,
    adaptive: Option<AdaptiveCacheManager>,
    next_tx_id: AtomicU64,
}

impl EntityManager {
    /// Build a manager over the given store, sampling real memory when
    /// adaptive caching is enabled.
    pub fn new(
        settings: CacheSettings,
        loader: Arc<dyn RecordLoader>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> Result<Arc<Self>> {
        Self::with_memory_monitor(settings, loader, id_generator, Box::new(SystemMemoryMonitor))
    }

    /// Build a manager with a caller-supplied memory monitor (tests
    /// inject synthetic pressure this way).
    pub fn with_memory_monitor(
        settings: CacheSettings,
        loader: Arc<dyn RecordLoader>,
        id_generator: Arc<dyn IdGenerator>,
        monitor: Box<dyn MemoryMonitor>,
    ) -> Result<Arc<Self>> {
        let cache = EntityCache::new(&settings, Arc::clone(&loader))?;
        let types =
            RelationshipTypeHolder::new(Arc::clone(&loader), Arc::clone(&id_generator))?;
        let keys = Arc::new(PropertyKeyHolder::new(
            Arc::clone(&loader),
            Arc::clone(&id_generator),
        )?);
        let reference_nodes = ReferenceNodeHolder::new(
            Arc::clone(&loader),
            Arc::clone(&id_generator),
            Arc::clone(&keys),
        );

        // Only the LRU-backed policies can follow heap pressure.
        let adaptive = if settings.use_adaptive_cache
            && matches!(settings.cache_kind, CacheKind::Soft | CacheKind::Lru)
        {
            let manager =
                AdaptiveCacheManager::new(settings.adaptive_cache_heap_ratio, monitor);
            manager.register(
                Arc::clone(cache.node_cache()) as Arc<dyn ResizableCache>,
                settings.min_node_cache_size,
                settings.max_node_cache_size,
            );
            manager.register(
                Arc::clone(cache.relationship_cache()) as Arc<dyn ResizableCache>,
                settings.min_relationship_cache_size,
                settings.max_relationship_cache_size,
            );
            manager.start(ADAPTIVE_SAMPLE_INTERVAL)?;
            Some(manager)
        } else {
            None
        };

        Ok(Arc::new_cyclic(|me| Self {
            me: me.clone(),
            settings,
            cache,
            loader,
            id_generator,
            lock_manager: Arc::new(LockManager::new()),
            types,
            keys,
            reference_nodes,
            node_trackers: RwLock::new(Vec::new()),
            relationship_trackers: RwLock::new(Vec::new()),
            adaptive,
            next_tx_id: AtomicU64::new(0),
        }))
    }

    fn me(&self) -> Arc<EntityManager> {
        self.me.upgrade().expect("manager outlives its proxies")
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Start a transaction.
    ///
    /// The completion synchronization that applies the change set to the
    /// cache (commit) or replays inverse effects (rollback) is registered
    /// here.
    pub fn begin_tx(&self) -> Transaction {
        let id = self.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1;
        let tx = Transaction::new(id, Arc::clone(&self.lock_manager));

        let me = self.me();
        tx.register_synchronization(Box::new(move |outcome, changes| match outcome {
            TxOutcome::Commit => me.apply_committed(changes),
            TxOutcome::Rollback => me.apply_rolled_back(changes),
        }));
        tx
    }

    // ========================================================================
    // Node operations
    // ========================================================================

    /// Create a node.
    pub fn create_node(&self, tx: &Transaction) -> Result<NodeProxy> {
        let id = NodeId::new(self.id_generator.next_id(EntityKind::Node));
        self.lock_exclusive(tx, Resource::Node(id))?;

        if let Err(err) = self.loader.create_node(id) {
            tx.set_rollback_only();
            return Err(err);
        }

        self.cache
            .insert_node(Arc::new(InternalNode::new_created(id)));
        tx.with_changes(|changes| changes.mark_created(EntityKey::Node(id)));

        Ok(NodeProxy::new(id, self.me()))
    }

    /// Fetch a node, or `NotFound` when the id has never existed, is
    /// tombstoned, or was deleted by this transaction.
    pub fn node_by_id(&self, tx: &Transaction, id: NodeId) -> Result<NodeProxy> {
        self.node_or_none(tx, id)?
            .ok_or_else(|| Error::node_not_found(id))
    }

    /// As [`node_by_id`](Self::node_by_id) but absent ids are `None`.
    pub fn node_or_none(&self, tx: &Transaction, id: NodeId) -> Result<Option<NodeProxy>> {
        if tx.read_changes(|changes| changes.is_deleted(EntityKey::Node(id))) {
            return Ok(None);
        }
        Ok(self
            .cache
            .node(id)?
            .map(|_| NodeProxy::new(id, self.me())))
    }

    /// Lazy scan over every existing node id, skipping holes.
    ///
    /// Restartable: each call starts a fresh scan from id zero.
    pub fn all_nodes(&self, tx: &Transaction) -> Result<NodeScan> {
        let highest = self.loader.highest_id_in_use(EntityKind::Node)?;
        let deleted_in_tx = tx.read_changes(|changes| {
            changes
                .iter()
                .filter_map(|(key, delta)| match key {
                    EntityKey::Node(id) if delta.is_deleted() => Some(id),
                    _ => None,
                })
                .collect()
        });

        Ok(NodeScan {
            manager: self.me(),
            next: 0,
            highest,
            deleted_in_tx,
        })
    }

    /// Lazy scan over every existing relationship id, skipping holes.
    pub fn all_relationships(&self, tx: &Transaction) -> Result<RelationshipScan> {
        let highest = self.loader.highest_id_in_use(EntityKind::Relationship)?;
        let deleted_in_tx = tx.read_changes(|changes| {
            changes
                .iter()
                .filter_map(|(key, delta)| match key {
                    EntityKey::Relationship(id) if delta.is_deleted() => Some(id),
                    _ => None,
                })
                .collect()
        });

        Ok(RelationshipScan {
            manager: self.me(),
            next: 0,
            highest,
            deleted_in_tx,
        })
    }

    /// Delete a node. The record goes through the loader now; the cache
    /// entry is removed when the transaction commits.
    pub fn delete_node(&self, tx: &Transaction, id: NodeId) -> Result<()> {
        self.visible_node(tx, id)?;
        self.lock_exclusive(tx, Resource::Node(id))?;

        let properties = match self.loader.delete_node(id) {
            Ok(properties) => properties,
            Err(err) => {
                tx.set_rollback_only();
                return Err(err);
            }
        };

        tx.with_changes(|changes| {
            changes.mark_deleted(EntityKey::Node(id), RestoreData::Node { properties })
        });
        Ok(())
    }

    // ========================================================================
    // Relationship operations
    // ========================================================================

    /// Create a relationship between two nodes, registering the type on
    /// first use.
    ///
    /// Locks are taken in the fixed order (relationship, smaller node
    /// id, larger node id) and held until the transaction completes.
    pub fn create_relationship(
        &self,
        tx: &Transaction,
        start: &NodeProxy,
        end: &NodeProxy,
        type_name: &str,
    ) -> Result<RelationshipProxy> {
        if type_name.is_empty() {
            return Err(Error::InvalidArgument(
                "relationship type name must not be empty".into(),
            ));
        }

        let (start, end) = (start.id(), end.id());
        // Fault both endpoints in as light nodes before locking.
        self.visible_node(tx, start)?;
        self.visible_node(tx, end)?;

        let type_id = self.types.get_or_create(type_name)?;
        let id = RelationshipId::new(self.id_generator.next_id(EntityKind::Relationship));

        self.lock_exclusive(tx, Resource::Relationship(id))?;
        for node in ordered_endpoints(start, end) {
            self.lock_exclusive(tx, Resource::Node(node))?;
        }

        // Re-check under the locks: an endpoint may have been deleted
        // while we waited.
        for node in [start, end] {
            if !self.loader.is_created(EntityKind::Node, node.0)? {
                tx.set_rollback_only();
                return Err(Error::node_not_found(node));
            }
        }

        if let Err(err) = self.loader.create_relationship(id, type_id, start, end) {
            tx.set_rollback_only();
            return Err(err);
        }

        self.cache
            .insert_relationship(Arc::new(InternalRelationship::new(id, type_id, start, end)));

        tx.with_changes(|changes| {
            changes.mark_created(EntityKey::Relationship(id));
            if start == end {
                changes.record_relationship_add(start, type_name, id, Direction::Both);
            } else {
                changes.record_relationship_add(start, type_name, id, Direction::Outgoing);
                changes.record_relationship_add(end, type_name, id, Direction::Incoming);
            }
        });

        Ok(RelationshipProxy::new(id, self.me()))
    }

    /// Fetch a relationship, or `NotFound`.
    pub fn relationship_by_id(
        &self,
        tx: &Transaction,
        id: RelationshipId,
    ) -> Result<RelationshipProxy> {
        self.relationship_or_none(tx, id)?
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    /// As [`relationship_by_id`](Self::relationship_by_id) but absent
    /// ids are `None`.
    pub fn relationship_or_none(
        &self,
        tx: &Transaction,
        id: RelationshipId,
    ) -> Result<Option<RelationshipProxy>> {
        if tx.read_changes(|changes| changes.is_deleted(EntityKey::Relationship(id))) {
            return Ok(None);
        }
        Ok(self
            .cache
            .relationship(id)?
            .map(|_| RelationshipProxy::new(id, self.me())))
    }

    /// All relationships of a node visible to the transaction, paging
    /// the chain in as needed.
    pub fn relationships_of(
        &self,
        tx: &Transaction,
        node: NodeId,
    ) -> Result<Vec<RelationshipProxy>> {
        let internal = self.visible_node(tx, node)?;
        self.cache.load_full_chain(&internal, &self.types)?;

        let mut seen: HashSet<RelationshipId> = HashSet::new();
        let mut out = Vec::new();

        tx.read_changes(|changes| {
            let delta = changes.delta(EntityKey::Node(node));

            for (_, id, _) in internal.relationship_ids() {
                if delta.is_some_and(|d| d.removes_relationship(id)) {
                    continue;
                }
                if changes.is_deleted(EntityKey::Relationship(id)) {
                    continue;
                }
                if seen.insert(id) {
                    out.push(id);
                }
            }

            if let Some(delta) = delta {
                for (_, id, _) in delta.relationship_adds() {
                    if seen.insert(id) {
                        out.push(id);
                    }
                }
            }
        });

        Ok(out
            .into_iter()
            .map(|id| RelationshipProxy::new(id, self.me()))
            .collect())
    }

    /// Delete a relationship, locking in the fixed multi-entity order.
    pub fn delete_relationship(&self, tx: &Transaction, id: RelationshipId) -> Result<()> {
        let internal = self.visible_relationship(tx, id)?;

        self.lock_exclusive(tx, Resource::Relationship(id))?;
        for node in ordered_endpoints(internal.start(), internal.end()) {
            self.lock_exclusive(tx, Resource::Node(node))?;
        }

        let properties = match self.loader.delete_relationship(id) {
            Ok(properties) => properties,
            Err(err) => {
                tx.set_rollback_only();
                return Err(err);
            }
        };

        tx.with_changes(|changes| {
            changes.mark_deleted(
                EntityKey::Relationship(id),
                RestoreData::Relationship {
                    record: internal.to_record(),
                    properties,
                },
            );
            changes.record_relationship_remove(internal.start(), id);
            if !internal.is_loop() {
                changes.record_relationship_remove(internal.end(), id);
            }
        });
        Ok(())
    }

    // ========================================================================
    // Node properties
    // ========================================================================

    pub fn node_property(
        &self,
        tx: &Transaction,
        id: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.visible_node(tx, id)?;
        let Some(key) = self.keys.id_of(key) else {
            return Ok(None);
        };
        self.visible_property(tx, EntityKey::Node(id), key)
    }

    pub fn node_properties(&self, tx: &Transaction, id: NodeId) -> Result<PropertySet> {
        self.visible_node(tx, id)?;
        let mut base = self.loader.node_properties(id)?;
        tx.read_changes(|changes| {
            if let Some(delta) = changes.delta(EntityKey::Node(id)) {
                delta.merge_properties(&mut base);
            }
        });
        Ok(base)
    }

    pub fn set_node_property(
        &self,
        tx: &Transaction,
        id: NodeId,
        key: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.visible_node(tx, id)?;
        self.lock_exclusive(tx, Resource::Node(id))?;
        self.set_property(tx, EntityKey::Node(id), key, value)
    }

    pub fn remove_node_property(
        &self,
        tx: &Transaction,
        id: NodeId,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.visible_node(tx, id)?;
        self.lock_exclusive(tx, Resource::Node(id))?;
        self.remove_property(tx, EntityKey::Node(id), key)
    }

    // ========================================================================
    // Relationship properties
    // ========================================================================

    pub fn relationship_property(
        &self,
        tx: &Transaction,
        id: RelationshipId,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.visible_relationship(tx, id)?;
        let Some(key) = self.keys.id_of(key) else {
            return Ok(None);
        };
        self.visible_property(tx, EntityKey::Relationship(id), key)
    }

    pub fn relationship_properties(
        &self,
        tx: &Transaction,
        id: RelationshipId,
    ) -> Result<PropertySet> {
        self.visible_relationship(tx, id)?;
        let mut base = self.loader.relationship_properties(id)?;
        tx.read_changes(|changes| {
            if let Some(delta) = changes.delta(EntityKey::Relationship(id)) {
                delta.merge_properties(&mut base);
            }
        });
        Ok(base)
    }

    pub fn set_relationship_property(
        &self,
        tx: &Transaction,
        id: RelationshipId,
        key: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.visible_relationship(tx, id)?;
        self.lock_exclusive(tx, Resource::Relationship(id))?;
        self.set_property(tx, EntityKey::Relationship(id), key, value)
    }

    pub fn remove_relationship_property(
        &self,
        tx: &Transaction,
        id: RelationshipId,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.visible_relationship(tx, id)?;
        self.lock_exclusive(tx, Resource::Relationship(id))?;
        self.remove_property(tx, EntityKey::Relationship(id), key)
    }

    // ========================================================================
    // Graph properties
    // ========================================================================

    pub fn graph_property(&self, tx: &Transaction, key: &str) -> Result<Option<PropertyValue>> {
        let Some(key) = self.keys.id_of(key) else {
            return Ok(None);
        };
        self.visible_property(tx, EntityKey::Graph, key)
    }

    pub fn set_graph_property(
        &self,
        tx: &Transaction,
        key: &str,
        value: PropertyValue,
    ) -> Result<()> {
        self.lock_exclusive(tx, Resource::Graph)?;
        self.set_property(tx, EntityKey::Graph, key, value)
    }

    pub fn remove_graph_property(
        &self,
        tx: &Transaction,
        key: &str,
    ) -> Result<Option<PropertyValue>> {
        self.lock_exclusive(tx, Resource::Graph)?;
        self.remove_property(tx, EntityKey::Graph, key)
    }

    // ========================================================================
    // Trackers, reference nodes, cache administration
    // ========================================================================

    /// Register an observer of node property mutations.
    pub fn add_node_property_tracker(&self, tracker: Arc<dyn PropertyTracker>) {
        self.node_trackers.write().push(tracker);
    }

    /// Register an observer of relationship property mutations.
    pub fn add_relationship_property_tracker(&self, tracker: Arc<dyn PropertyTracker>) {
        self.relationship_trackers.write().push(tracker);
    }

    /// Resolve a named reference node, creating it on first use.
    pub fn reference_node(&self, name: &str) -> Result<NodeProxy> {
        let id = self.reference_nodes.reference_node(name)?;
        Ok(NodeProxy::new(id, self.me()))
    }

    /// The configured eviction policy.
    pub fn cache_kind(&self) -> CacheKind {
        self.settings.cache_kind
    }

    /// Empty both entity caches. Does not touch the store.
    pub fn clear_cache(&self) {
        let (nodes, relationships) = self.cache.stats();
        debug!("clearing entity caches; nodes: {nodes}; relationships: {relationships}");
        self.cache.clear();
    }

    /// Evict one node from the cache. Does not touch the store.
    pub fn evict_node_from_cache(&self, id: NodeId) {
        self.cache.evict_node(id);
    }

    /// Evict one relationship from the cache. Does not touch the store.
    pub fn evict_relationship_from_cache(&self, id: RelationshipId) {
        self.cache.evict_relationship(id);
    }

    /// Counters for the node and relationship caches.
    pub fn cache_stats(&self) -> (StatsSnapshot, StatsSnapshot) {
        self.cache.stats()
    }

    /// The adaptive manager, when adaptive caching is enabled.
    pub fn adaptive_cache_manager(&self) -> Option<&AdaptiveCacheManager> {
        self.adaptive.as_ref()
    }

    // ========================================================================
    // Internal: shared read/write plumbing
    // ========================================================================

    pub(crate) fn relationship_internal(
        &self,
        id: RelationshipId,
    ) -> Result<Arc<InternalRelationship>> {
        self.cache
            .relationship(id)?
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    pub(crate) fn relationship_type_name(&self, id: RelationshipId) -> Result<String> {
        let rel = self.relationship_internal(id)?;
        self.types.name_of(rel.type_id()).ok_or(Error::NotFound {
            kind: EntityKind::RelationshipType,
            id: rel.type_id().0 as u64,
        })
    }

    /// Node as visible to the transaction: tombstoned or absent reads as
    /// `NotFound`.
    fn visible_node(&self, tx: &Transaction, id: NodeId) -> Result<Arc<InternalNode>> {
        if tx.read_changes(|changes| changes.is_deleted(EntityKey::Node(id))) {
            return Err(Error::node_not_found(id));
        }
        self.cache
            .node(id)?
            .ok_or_else(|| Error::node_not_found(id))
    }

    fn visible_relationship(
        &self,
        tx: &Transaction,
        id: RelationshipId,
    ) -> Result<Arc<InternalRelationship>> {
        if tx.read_changes(|changes| changes.is_deleted(EntityKey::Relationship(id))) {
            return Err(Error::relationship_not_found(id));
        }
        self.cache
            .relationship(id)?
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    /// The value of a property as this transaction sees it.
    fn visible_property(
        &self,
        tx: &Transaction,
        entity: EntityKey,
        key: KeyId,
    ) -> Result<Option<PropertyValue>> {
        let pending = tx.read_changes(|changes| {
            changes
                .delta(entity)
                .and_then(|delta| delta.property_change(key).cloned())
        });
        if let Some(change) = pending {
            return Ok(change.visible_value().cloned());
        }
        self.base_property(entity, key)
    }

    fn base_property(&self, entity: EntityKey, key: KeyId) -> Result<Option<PropertyValue>> {
        match entity {
            EntityKey::Node(id) => Ok(self.loader.node_properties(id)?.remove(&key)),
            EntityKey::Relationship(id) => {
                Ok(self.loader.relationship_properties(id)?.remove(&key))
            }
            EntityKey::Graph => self.loader.graph_property(key),
        }
    }

    /// Shared set-property path: tracker notification, change-set
    /// record, loader call, in that order.
    fn set_property(
        &self,
        tx: &Transaction,
        entity: EntityKey,
        key_name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        if key_name.is_empty() {
            return Err(Error::InvalidArgument(
                "property key must not be empty".into(),
            ));
        }

        let key = self.keys.get_or_create(key_name)?;
        let old = self.visible_property(tx, entity, key)?;

        // Trackers observe the mutation before it is recorded anywhere;
        // a tracker error aborts it.
        if let Err(err) = self.notify_trackers(entity, key_name, old.as_ref(), Some(&value)) {
            tx.set_rollback_only();
            return Err(err);
        }

        // The change set is the authoritative view until commit; the
        // loader sees the mutation when the transaction materializes.
        tx.with_changes(|changes| match old {
            None => changes.record_property_add(entity, key, value),
            Some(old) => changes.record_property_change(entity, key, old, value),
        });
        Ok(())
    }

    fn remove_property(
        &self,
        tx: &Transaction,
        entity: EntityKey,
        key_name: &str,
    ) -> Result<Option<PropertyValue>> {
        let Some(key) = self.keys.id_of(key_name) else {
            return Ok(None);
        };
        let Some(old) = self.visible_property(tx, entity, key)? else {
            return Ok(None);
        };

        if let Err(err) = self.notify_trackers(entity, key_name, Some(&old), None) {
            tx.set_rollback_only();
            return Err(err);
        }

        tx.with_changes(|changes| changes.record_property_remove(entity, key, old.clone()));
        Ok(Some(old))
    }

    fn notify_trackers(
        &self,
        entity: EntityKey,
        key: &str,
        old: Option<&PropertyValue>,
        new: Option<&PropertyValue>,
    ) -> Result<()> {
        let trackers = match entity {
            EntityKey::Node(_) => self.node_trackers.read(),
            EntityKey::Relationship(_) => self.relationship_trackers.read(),
            // Graph properties have no tracker scope.
            EntityKey::Graph => return Ok(()),
        };

        for tracker in trackers.iter() {
            match (old, new) {
                (None, Some(new)) => tracker.property_added(entity, key, new)?,
                (Some(old), Some(new)) => tracker.property_changed(entity, key, old, new)?,
                (Some(old), None) => tracker.property_removed(entity, key, old)?,
                (None, None) => {}
            }
        }
        Ok(())
    }

    fn lock_exclusive(&self, tx: &Transaction, resource: Resource) -> Result<()> {
        match self
            .lock_manager
            .acquire(tx.id(), resource, LockMode::Exclusive)
        {
            Ok(()) => {
                tx.record_lock(resource, LockMode::Exclusive);
                Ok(())
            }
            Err(err) => {
                tx.set_rollback_only();
                Err(err)
            }
        }
    }

    // ========================================================================
    // Internal: transaction completion
    // ========================================================================

    /// Materialize a committed change set: property deltas go through
    /// the loader, then the cache is updated or invalidated.
    fn apply_committed(&self, changes: &TransactionChangeSet) {
        for (key, delta) in changes.iter() {
            if !delta.is_deleted() && delta.has_property_changes() {
                self.commit_properties(key, delta.property_changes());
            }

            match key {
                EntityKey::Node(id) => {
                    if delta.is_deleted() {
                        self.cache.evict_node(id);
                    } else if delta.has_property_changes() {
                        // Property pointers in the cached record are now
                        // stale; invalidate and let the next read reload.
                        self.cache.evict_node(id);
                    } else if let Some(node) = self.cache.node_cache().get(&id) {
                        for (type_name, rel, direction) in delta.relationship_adds() {
                            node.add_relationship(type_name, rel, direction);
                        }
                        for rel in delta.relationship_removes() {
                            node.remove_relationship(rel);
                        }
                    }
                }
                EntityKey::Relationship(id) => {
                    if delta.is_deleted() || delta.has_property_changes() {
                        self.cache.evict_relationship(id);
                    }
                }
                EntityKey::Graph => {}
            }
        }
    }

    /// Push one entity's committed property deltas through the loader.
    ///
    /// Runs inside the completion hook, so a loader failure cannot
    /// propagate; it is logged and the remaining deltas still apply.
    fn commit_properties<'a>(
        &self,
        entity: EntityKey,
        changes: impl Iterator<Item = (KeyId, &'a PropertyChange)>,
    ) {
        for (key, change) in changes {
            let stored = match change {
                PropertyChange::Added(value) => match entity {
                    EntityKey::Node(id) => {
                        self.loader.node_add_property(id, key, value.clone())
                    }
                    EntityKey::Relationship(id) => {
                        self.loader.relationship_add_property(id, key, value.clone())
                    }
                    EntityKey::Graph => self.loader.graph_add_property(key, value.clone()),
                },
                PropertyChange::Changed { new, .. } => match entity {
                    EntityKey::Node(id) => {
                        self.loader.node_change_property(id, key, new.clone())
                    }
                    EntityKey::Relationship(id) => self
                        .loader
                        .relationship_change_property(id, key, new.clone()),
                    EntityKey::Graph => self.loader.graph_change_property(key, new.clone()),
                },
                PropertyChange::Removed(_) => match entity {
                    EntityKey::Node(id) => self.loader.node_remove_property(id, key),
                    EntityKey::Relationship(id) => {
                        self.loader.relationship_remove_property(id, key)
                    }
                    EntityKey::Graph => self.loader.graph_remove_property(key),
                },
            };
            if let Err(err) = stored {
                warn!("commit: storing property {key} on {entity:?} failed: {err}");
            }
        }
    }

    /// Replay inverse effects of a rolled-back change set.
    ///
    /// Property deltas need no inverse: they never reached the loader.
    /// Creates are undone and deletes reinstated through the loader's
    /// rollback interface, relationships first so their undo detaches
    /// them from endpoint chains before any node undo discards the node
    /// itself. Runs inside the completion hook, so failures cannot
    /// propagate; they are logged.
    fn apply_rolled_back(&self, changes: &TransactionChangeSet) {
        for (key, delta) in changes.iter() {
            let EntityKey::Relationship(id) = key else {
                continue;
            };
            if delta.is_created() {
                self.cache.evict_relationship(id);
                if let Err(err) = self.loader.undo_create_relationship(id) {
                    warn!("rollback: undo create {id} failed: {err}");
                }
            } else if let Some(RestoreData::Relationship { record, properties }) =
                delta.restore_data()
            {
                if let Err(err) = self
                    .loader
                    .restore_relationship(*record, properties.clone())
                {
                    warn!("rollback: restore {id} failed: {err}");
                }
            }
        }

        for (key, delta) in changes.iter() {
            let EntityKey::Node(id) = key else {
                continue;
            };
            if delta.is_created() {
                self.cache.evict_node(id);
                if let Err(err) = self.loader.undo_create_node(id) {
                    warn!("rollback: undo create {id} failed: {err}");
                }
            } else if let Some(RestoreData::Node { properties }) = delta.restore_data() {
                if let Err(err) = self.loader.restore_node(id, properties.clone()) {
                    warn!("rollback: restore {id} failed: {err}");
                }
            }
        }
    }
}

/// Endpoint node ids in lock-acquisition order: ascending, deduplicated
/// for self-loops.
fn ordered_endpoints(a: NodeId, b: NodeId) -> Vec<NodeId> {
    if a == b {
        vec![a]
    } else if a < b {
        vec![a, b]
    } else {
        vec![b, a]
    }
}

/// Lazy scan over all node ids; absent ids are skipped silently.
pub struct NodeScan {
    manager: Arc<EntityManager>,
    next: u64,
    highest: Option<u64>,
    deleted_in_tx: HashSet<NodeId>,
}

impl Iterator for NodeScan {
    type Item = NodeProxy;

    fn next(&mut self) -> Option<NodeProxy> {
        let highest = self.highest?;
        while self.next <= highest {
            let id = NodeId::new(self.next);
            self.next += 1;

            if self.deleted_in_tx.contains(&id) {
                continue;
            }
            match self.manager.cache.node(id) {
                Ok(Some(_)) => {
                    return Some(NodeProxy::new(id, Arc::clone(&self.manager)));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!("node scan stopped at {id}: {err}");
                    return None;
                }
            }
        }
        None
    }
}

/// Lazy scan over all relationship ids; absent ids are skipped silently.
pub struct RelationshipScan {
    manager: Arc<EntityManager>,
    next: u64,
    highest: Option<u64>,
    deleted_in_tx: HashSet<RelationshipId>,
}

impl Iterator for RelationshipScan {
    type Item = RelationshipProxy;

    fn next(&mut self) -> Option<RelationshipProxy> {
        let highest = self.highest?;
        while self.next <= highest {
            let id = RelationshipId::new(self.next);
            self.next += 1;

            if self.deleted_in_tx.contains(&id) {
                continue;
            }
            match self.manager.cache.relationship(id) {
                Ok(Some(_)) => {
                    return Some(RelationshipProxy::new(id, Arc::clone(&self.manager)));
                }
                Ok(None) => continue,
                Err(err) => {
                    warn!("relationship scan stopped at {id}: {err}");
                    return None;
                }
            }
        }
        None
    }
}
