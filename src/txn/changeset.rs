//! Per-transaction copy-on-write side maps.
//!
//! Every mutation a transaction performs is recorded here before it is
//! visible anywhere else. Reads merge these deltas over the cached base
//! state; commit materializes them into the cache; rollback replays the
//! recorded inverse effects and drops the set.

use std::collections::{HashMap, HashSet};

use crate::common::{KeyId, NodeId, RelationshipId};
use crate::store::{Direction, PropertySet, PropertyValue, RelationshipRecord};

/// Identifies an entity a transaction has touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKey {
    Node(NodeId),
    Relationship(RelationshipId),
    Graph,
}

/// A recorded property mutation, keeping the old value for rollback and
/// tracker notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyChange {
    Added(PropertyValue),
    Changed {
        old: PropertyValue,
        new: PropertyValue,
    },
    Removed(PropertyValue),
}

impl PropertyChange {
    /// The value a reader in this transaction should observe, or `None`
    /// if the property reads as absent.
    pub fn visible_value(&self) -> Option<&PropertyValue> {
        match self {
            PropertyChange::Added(value) => Some(value),
            PropertyChange::Changed { new, .. } => Some(new),
            PropertyChange::Removed(_) => None,
        }
    }
}

/// What restoring a deleted entity needs.
#[derive(Debug, Clone)]
pub enum RestoreData {
    Node {
        properties: PropertySet,
    },
    Relationship {
        record: RelationshipRecord,
        properties: PropertySet,
    },
}

/// Pending mutations for one entity.
#[derive(Debug, Default)]
pub struct EntityDelta {
    /// Property mutations keyed by property key.
    properties: HashMap<KeyId, PropertyChange>,

    /// Relationship ids added, keyed by type name, direction tagged.
    /// Populated only for node entities.
    relationship_adds: HashMap<String, Vec<(RelationshipId, Direction)>>,

    /// Relationship ids removed from this node's arrays.
    relationship_removes: HashSet<RelationshipId>,

    /// The entity was created by this transaction.
    created: bool,

    /// The entity was deleted by this transaction, with the state a
    /// rollback would need to reinstate.
    deleted: Option<RestoreData>,
}

impl EntityDelta {
    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.is_some()
    }

    pub fn restore_data(&self) -> Option<&RestoreData> {
        self.deleted.as_ref()
    }

    pub fn property_change(&self, key: KeyId) -> Option<&PropertyChange> {
        self.properties.get(&key)
    }

    pub fn has_property_changes(&self) -> bool {
        !self.properties.is_empty()
    }

    pub fn property_changes(&self) -> impl Iterator<Item = (KeyId, &PropertyChange)> {
        self.properties.iter().map(|(k, c)| (*k, c))
    }

    pub fn relationship_adds(
        &self,
    ) -> impl Iterator<Item = (&str, RelationshipId, Direction)> {
        self.relationship_adds
            .iter()
            .flat_map(|(name, items)| items.iter().map(move |(id, d)| (name.as_str(), *id, *d)))
    }

    pub fn removes_relationship(&self, id: RelationshipId) -> bool {
        self.relationship_removes.contains(&id)
    }

    pub fn relationship_removes(&self) -> impl Iterator<Item = RelationshipId> + '_ {
        self.relationship_removes.iter().copied()
    }

    /// Merge this delta's property view over a base property set.
    pub fn merge_properties(&self, base: &mut PropertySet) {
        for (key, change) in &self.properties {
            match change.visible_value() {
                Some(value) => {
                    base.insert(*key, value.clone());
                }
                None => {
                    base.remove(key);
                }
            }
        }
    }
}

/// The transaction's copy-on-write view of everything it touched.
#[derive(Debug, Default)]
pub struct TransactionChangeSet {
    entities: HashMap<EntityKey, EntityDelta>,
}

impl TransactionChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta for an entity, if it was touched.
    pub fn delta(&self, key: EntityKey) -> Option<&EntityDelta> {
        self.entities.get(&key)
    }

    /// Whether the transaction deleted this entity.
    pub fn is_deleted(&self, key: EntityKey) -> bool {
        self.delta(key).is_some_and(EntityDelta::is_deleted)
    }

    /// Whether the transaction created this entity.
    pub fn is_created(&self, key: EntityKey) -> bool {
        self.delta(key).is_some_and(EntityDelta::is_created)
    }

    /// All touched entities and their deltas.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &EntityDelta)> {
        self.entities.iter().map(|(k, d)| (*k, d))
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn mark_created(&mut self, key: EntityKey) {
        self.entity(key).created = true;
    }

    pub fn mark_deleted(&mut self, key: EntityKey, restore: RestoreData) {
        let delta = self.entity(key);
        delta.deleted = Some(restore);
        // Deltas recorded before the delete no longer apply.
        delta.properties.clear();
        delta.relationship_adds.clear();
    }

    pub fn record_property_add(&mut self, key: EntityKey, property: KeyId, value: PropertyValue) {
        self.entity(key)
            .properties
            .insert(property, PropertyChange::Added(value));
    }

    pub fn record_property_change(
        &mut self,
        key: EntityKey,
        property: KeyId,
        old: PropertyValue,
        new: PropertyValue,
    ) {
        let delta = self.entity(key);
        // An add followed by a change in the same transaction is still
        // an add of the latest value.
        let change = match delta.properties.remove(&property) {
            Some(PropertyChange::Added(_)) => PropertyChange::Added(new),
            Some(PropertyChange::Changed { old, .. }) => PropertyChange::Changed { old, new },
            _ => PropertyChange::Changed { old, new },
        };
        delta.properties.insert(property, change);
    }

    pub fn record_property_remove(
        &mut self,
        key: EntityKey,
        property: KeyId,
        old: PropertyValue,
    ) {
        let delta = self.entity(key);
        match delta.properties.remove(&property) {
            // Added then removed in the same transaction: no net change.
            Some(PropertyChange::Added(_)) => {}
            Some(PropertyChange::Changed { old, .. }) | Some(PropertyChange::Removed(old)) => {
                delta
                    .properties
                    .insert(property, PropertyChange::Removed(old));
            }
            None => {
                delta
                    .properties
                    .insert(property, PropertyChange::Removed(old));
            }
        }
    }

    pub fn record_relationship_add(
        &mut self,
        node: NodeId,
        type_name: &str,
        id: RelationshipId,
        direction: Direction,
    ) {
        self.entity(EntityKey::Node(node))
            .relationship_adds
            .entry(type_name.to_owned())
            .or_default()
            .push((id, direction));
    }

    pub fn record_relationship_remove(&mut self, node: NodeId, id: RelationshipId) {
        let delta = self.entity(EntityKey::Node(node));
        for items in delta.relationship_adds.values_mut() {
            items.retain(|(added, _)| *added != id);
        }
        delta.relationship_removes.insert(id);
    }

    fn entity(&mut self, key: EntityKey) -> &mut EntityDelta {
        self.entities.entry(key).or_default()
    }
}
