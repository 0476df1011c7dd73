//! Internal node representation.
//!
//! An [`InternalNode`] is the cached materialization of a node record:
//! the committed first-relationship and first-property pointers plus the
//! lazily paged relationship chains, segmented per type and direction.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::common::{NodeId, PropertyId, RelationshipId};
use crate::store::{ChainPosition, Direction, NodeRecord};

/// How much of a node has been materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Core fields only; the relationship chain may have more pages.
    Light,
    /// The relationship chain is fully paged in.
    FullyLoaded,
    /// Created by a live transaction; there is nothing to page in.
    New,
}

/// Progress through a node's on-disk relationship chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainProgress {
    /// No page fetched yet.
    Unstarted,
    /// Next fetch continues from this cursor.
    At(ChainPosition),
    /// The chain is exhausted.
    Exhausted,
}

/// Relationship ids of one type, segmented by direction.
///
/// The loops segment is absent until the first self-loop of this type
/// arrives; from then on the array is loops-capable.
#[derive(Debug, Default)]
pub struct RelIdArray {
    outgoing: Vec<RelationshipId>,
    incoming: Vec<RelationshipId>,
    loops: Option<Vec<RelationshipId>>,
}

impl RelIdArray {
    /// Append an id to the segment for `direction`, skipping ids already
    /// present so a commit-time merge and a chain page cannot double-add.
    pub fn add(&mut self, direction: Direction, id: RelationshipId) {
        if self.contains(id) {
            return;
        }
        match direction {
            Direction::Outgoing => self.outgoing.push(id),
            Direction::Incoming => self.incoming.push(id),
            Direction::Both => self.loops.get_or_insert_with(Vec::new).push(id),
        }
    }

    pub fn remove(&mut self, id: RelationshipId) {
        self.outgoing.retain(|r| *r != id);
        self.incoming.retain(|r| *r != id);
        if let Some(loops) = &mut self.loops {
            loops.retain(|r| *r != id);
        }
    }

    pub fn contains(&self, id: RelationshipId) -> bool {
        self.outgoing.contains(&id)
            || self.incoming.contains(&id)
            || self.loops.as_ref().is_some_and(|l| l.contains(&id))
    }

    /// Whether this array has switched to the loops-capable variant.
    pub fn has_loops(&self) -> bool {
        self.loops.is_some()
    }

    pub fn len(&self) -> usize {
        self.outgoing.len()
            + self.incoming.len()
            + self.loops.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelationshipId, Direction)> + '_ {
        self.outgoing
            .iter()
            .map(|id| (*id, Direction::Outgoing))
            .chain(self.incoming.iter().map(|id| (*id, Direction::Incoming)))
            .chain(
                self.loops
                    .iter()
                    .flatten()
                    .map(|id| (*id, Direction::Both)),
            )
    }
}

#[derive(Debug)]
struct RelationshipChains {
    per_type: HashMap<String, RelIdArray>,
    progress: ChainProgress,
}

/// The cached, shareable materialization of one node.
///
/// Immutable core fields; the relationship chains grow monotonically
/// under an internal lock as pages arrive, so concurrent readers always
/// see a consistent prefix of the committed chain.
#[derive(Debug)]
pub struct InternalNode {
    id: NodeId,
    first_relationship: Option<RelationshipId>,
    first_property: Option<PropertyId>,
    created: bool,
    chains: RwLock<RelationshipChains>,
}

impl InternalNode {
    /// Materialize a light node from its record.
    pub fn from_record(record: NodeRecord) -> Self {
        let progress = if record.first_relationship.is_none() {
            // Empty chain: nothing to page.
            ChainProgress::Exhausted
        } else {
            ChainProgress::Unstarted
        };

        Self {
            id: record.id,
            first_relationship: record.first_relationship,
            first_property: record.first_property,
            created: false,
            chains: RwLock::new(RelationshipChains {
                per_type: HashMap::new(),
                progress,
            }),
        }
    }

    /// A node created by a live transaction: fully materialized, empty.
    pub fn new_created(id: NodeId) -> Self {
        Self {
            id,
            first_relationship: None,
            first_property: None,
            created: true,
            chains: RwLock::new(RelationshipChains {
                per_type: HashMap::new(),
                progress: ChainProgress::Exhausted,
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Committed first-relationship pointer, as loaded.
    pub fn first_relationship(&self) -> Option<RelationshipId> {
        self.first_relationship
    }

    /// Committed first-property pointer, as loaded.
    pub fn first_property(&self) -> Option<PropertyId> {
        self.first_property
    }

    pub fn load_state(&self) -> LoadState {
        if self.created {
            return LoadState::New;
        }
        match self.chains.read().progress {
            ChainProgress::Exhausted => LoadState::FullyLoaded,
            _ => LoadState::Light,
        }
    }

    pub fn chain_progress(&self) -> ChainProgress {
        self.chains.read().progress
    }

    /// Whether the store may still hold unpaged relationships.
    pub fn has_more_chain(&self) -> bool {
        self.chain_progress() != ChainProgress::Exhausted
    }

    /// Merge one locally materialized chain page into the node.
    ///
    /// The merge applies only if the node's progress still equals
    /// `expected`; a `false` return means a concurrent pager merged
    /// first and the caller should re-read the progress. This keeps each
    /// page merged exactly once while readers proceed lock-free.
    pub fn merge_batch(
        &self,
        expected: ChainProgress,
        batch: HashMap<String, Vec<(RelationshipId, Direction)>>,
        next: Option<ChainPosition>,
    ) -> bool {
        let mut chains = self.chains.write();
        if chains.progress != expected {
            return false;
        }

        for (type_name, items) in batch {
            let array = chains.per_type.entry(type_name).or_default();
            for (id, direction) in items {
                array.add(direction, id);
            }
        }

        chains.progress = match next {
            Some(position) => ChainProgress::At(position),
            None => ChainProgress::Exhausted,
        };
        true
    }

    /// Add one relationship to the in-memory arrays (commit-time merge
    /// of a created relationship).
    pub fn add_relationship(&self, type_name: &str, id: RelationshipId, direction: Direction) {
        let mut chains = self.chains.write();
        chains
            .per_type
            .entry(type_name.to_owned())
            .or_default()
            .add(direction, id);
    }

    /// Drop one relationship from the in-memory arrays.
    pub fn remove_relationship(&self, id: RelationshipId) {
        let mut chains = self.chains.write();
        for array in chains.per_type.values_mut() {
            array.remove(id);
        }
    }

    /// Snapshot of the currently materialized relationship ids.
    pub fn relationship_ids(&self) -> Vec<(String, RelationshipId, Direction)> {
        let chains = self.chains.read();
        let mut out = Vec::new();
        for (type_name, array) in &chains.per_type {
            for (id, direction) in array.iter() {
                out.push((type_name.clone(), id, direction));
            }
        }
        out
    }

    /// Number of materialized relationship ids.
    pub fn relationship_count(&self) -> usize {
        self.chains.read().per_type.values().map(RelIdArray::len).sum()
    }
}
