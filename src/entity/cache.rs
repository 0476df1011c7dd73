//! Entity cache and load coordinator.
//!
//! The [`EntityCache`] sits between the facade and the record store. It
//! owns the two policy caches (nodes, relationships) and the striped
//! load locks, and guarantees that any entity id is loaded from the
//! store at most once concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::cache::{Cache, StatsSnapshot, StripedLoadLocks};
use crate::common::{CacheSettings, NodeId, RelationshipId, Result};
use crate::entity::names::RelationshipTypeHolder;
use crate::entity::node::{ChainProgress, InternalNode};
use crate::entity::relationship::InternalRelationship;
use crate::store::{Direction, RecordLoader};

/// Caches materialized entities and coordinates loading.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                        EntityCache                          │
/// │  ┌────────────────────┐   ┌─────────────────────────────┐  │
/// │  │ nodes:             │   │ relationships:              │  │
/// │  │ Cache<NodeId, _>   │   │ Cache<RelationshipId, _>    │  │
/// │  └────────────────────┘   └─────────────────────────────┘  │
/// │  ┌────────────────────┐   ┌─────────────────────────────┐  │
/// │  │ node_load_locks    │   │ relationship_load_locks     │  │
/// │  │ StripedLoadLocks   │   │ StripedLoadLocks            │  │
/// │  └────────────────────┘   └─────────────────────────────┘  │
/// │                  loader: Arc<dyn RecordLoader>             │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Load protocol
/// The fast path is a plain cache lookup. On a miss the caller takes the
/// id's stripe lock, re-checks the cache (another thread may have loaded
/// meanwhile), asks the loader, installs the result, and releases the
/// stripe. A loader error releases the stripe and propagates; the cache
/// never turns a loader error into a hit.
pub struct EntityCache {
    nodes: Arc<Cache<NodeId, InternalNode>>,
    relationships: Arc<Cache<RelationshipId, InternalRelationship>>,
    node_load_locks: StripedLoadLocks,
    relationship_load_locks: StripedLoadLocks,
    loader: Arc<dyn RecordLoader>,
}

impl EntityCache {
    /// Build both caches from the settings.
    pub fn new(settings: &CacheSettings, loader: Arc<dyn RecordLoader>) -> Result<Self> {
        Ok(Self {
            nodes: Arc::new(Cache::with_kind(
                settings.cache_kind,
                "nodes",
                settings.max_node_cache_size,
            )?),
            relationships: Arc::new(Cache::with_kind(
                settings.cache_kind,
                "relationships",
                settings.max_relationship_cache_size,
            )?),
            node_load_locks: StripedLoadLocks::default(),
            relationship_load_locks: StripedLoadLocks::default(),
            loader,
        })
    }

    /// Fetch a node, loading it on a miss. `None` when the id has never
    /// existed or is tombstoned.
    pub fn node(&self, id: NodeId) -> Result<Option<Arc<InternalNode>>> {
        // Fast path: cache hit takes no exclusive lock.
        if let Some(node) = self.nodes.get(&id) {
            return Ok(Some(node));
        }

        let _stripe = self.node_load_locks.lock(id.0);

        // Re-check: the load may have happened while we waited.
        if let Some(node) = self.nodes.get(&id) {
            return Ok(Some(node));
        }

        match self.loader.load_light_node(id)? {
            Some(record) => {
                let node = Arc::new(InternalNode::from_record(record));
                self.nodes.put(id, Arc::clone(&node));
                self.nodes.stats().record_load();
                debug!("loaded light {id}");
                Ok(Some(node))
            }
            None => Ok(None),
        }
    }

    /// Fetch a relationship, loading it on a miss.
    pub fn relationship(&self, id: RelationshipId) -> Result<Option<Arc<InternalRelationship>>> {
        if let Some(rel) = self.relationships.get(&id) {
            return Ok(Some(rel));
        }

        let _stripe = self.relationship_load_locks.lock(id.0);

        if let Some(rel) = self.relationships.get(&id) {
            return Ok(Some(rel));
        }

        match self.loader.load_light_relationship(id)? {
            Some(record) => {
                let rel = Arc::new(InternalRelationship::from_record(record));
                self.relationships.put(id, Arc::clone(&rel));
                self.relationships.stats().record_load();
                debug!("loaded light {id}");
                Ok(Some(rel))
            }
            None => Ok(None),
        }
    }

    /// Install a node constructed by a write operation.
    pub fn insert_node(&self, node: Arc<InternalNode>) {
        self.nodes.put(node.id(), node);
    }

    /// Install a relationship constructed by a write operation.
    pub fn insert_relationship(&self, relationship: Arc<InternalRelationship>) {
        self.relationships.put(relationship.id(), relationship);
    }

    /// Remove a node from the cache. Does not touch the store.
    pub fn evict_node(&self, id: NodeId) {
        self.nodes.remove(&id);
    }

    /// Remove a relationship from the cache. Does not touch the store.
    pub fn evict_relationship(&self, id: RelationshipId) {
        self.relationships.remove(&id);
    }

    /// Empty both caches.
    pub fn clear(&self) {
        self.nodes.clear();
        self.relationships.clear();
    }

    /// Fetch one more chain page for `node` and merge it in.
    ///
    /// The batch is materialized into a local map first, merged into the
    /// node atomically, and only then are the relationship objects bulk
    /// inserted into the relationship cache. Returns `false` once the
    /// chain is exhausted.
    ///
    /// # Errors
    /// `Store` when the loader fails; `CacheState` when a batch names a
    /// relationship type the store never registered.
    pub fn load_more_relationships(
        &self,
        node: &InternalNode,
        types: &RelationshipTypeHolder,
    ) -> Result<bool> {
        loop {
            let progress = node.chain_progress();
            let position = match progress {
                ChainProgress::Exhausted => return Ok(false),
                ChainProgress::Unstarted => None,
                ChainProgress::At(position) => Some(position),
            };

            let (batch, next) = self.loader.more_relationships(node.id(), position)?;

            // Materialize locally before anything global is touched.
            let mut local: HashMap<String, Vec<(RelationshipId, Direction)>> = HashMap::new();
            let mut materialized = Vec::with_capacity(batch.len());
            for (record, direction) in batch.iter() {
                let type_name = types.name_of(record.type_id).ok_or_else(|| {
                    crate::common::Error::CacheState(format!(
                        "chain page for {} names unregistered {}",
                        node.id(),
                        record.type_id
                    ))
                })?;
                local
                    .entry(type_name)
                    .or_default()
                    .push((record.id, direction));
                materialized.push(Arc::new(InternalRelationship::from_record(*record)));
            }

            if node.merge_batch(progress, local, next) {
                // Bulk-insert after the merge so a reader that sees the
                // ids can immediately resolve them.
                for rel in materialized {
                    self.relationships.put(rel.id(), rel);
                }
                self.relationships.stats().record_chain_page();
                debug!("paged {} relationships for {}", batch.len(), node.id());
                return Ok(next.is_some() || !batch.is_empty());
            }
            // A concurrent pager merged this page first; re-read the
            // progress and continue from wherever it got to.
        }
    }

    /// Page the whole chain in.
    pub fn load_full_chain(
        &self,
        node: &InternalNode,
        types: &RelationshipTypeHolder,
    ) -> Result<()> {
        while node.has_more_chain() {
            self.load_more_relationships(node, types)?;
        }
        Ok(())
    }

    /// Snapshot of both caches' counters.
    pub fn stats(&self) -> (StatsSnapshot, StatsSnapshot) {
        (
            self.nodes.stats().snapshot(),
            self.relationships.stats().snapshot(),
        )
    }

    /// The node cache, for adaptive registration.
    pub fn node_cache(&self) -> &Arc<Cache<NodeId, InternalNode>> {
        &self.nodes
    }

    /// The relationship cache, for adaptive registration.
    pub fn relationship_cache(&self) -> &Arc<Cache<RelationshipId, InternalRelationship>> {
        &self.relationships
    }
}
