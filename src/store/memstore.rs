//! Transient in-memory record store.
//!
//! Implements [`RecordLoader`] and [`IdGenerator`] over plain maps with no
//! durability. Used by the test suites and by embedded callers that want a
//! graph with no files behind it. Load-invocation counters are kept so
//! tests can assert how often the object layer actually reached the store.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;

use crate::common::{EntityKind, Error, KeyId, NodeId, PropertyId, RelationshipId, Result, TypeId};
use crate::store::{
    ChainPosition, DirectionalBatch, IdGenerator, NodeRecord, PropertySet, PropertyValue,
    RecordLoader, RelationshipRecord,
};

/// Default relationship-chain page size.
pub const DEFAULT_CHAIN_BATCH_SIZE: usize = 16;

#[derive(Default)]
struct NodeData {
    /// Relationship ids in chain order; self-loops appear once.
    relationships: Vec<RelationshipId>,
    properties: PropertySet,
}

struct RelationshipData {
    start: NodeId,
    end: NodeId,
    type_id: TypeId,
    properties: PropertySet,
}

#[derive(Default)]
struct StoreState {
    nodes: HashMap<NodeId, NodeData>,
    relationships: HashMap<RelationshipId, RelationshipData>,
    deleted_nodes: HashSet<NodeId>,
    deleted_relationships: HashSet<RelationshipId>,
    graph_properties: PropertySet,
    relationship_types: HashMap<TypeId, String>,
    property_keys: HashMap<KeyId, String>,
    next_node_id: u64,
    next_relationship_id: u64,
    next_type_id: u64,
    next_key_id: u64,
    node_loads: HashMap<NodeId, u64>,
    relationship_loads: HashMap<RelationshipId, u64>,
}

impl StoreState {
    fn node(&self, id: NodeId) -> Result<&NodeData> {
        self.nodes.get(&id).ok_or_else(|| Error::node_not_found(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut NodeData> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| Error::node_not_found(id))
    }

    fn relationship(&self, id: RelationshipId) -> Result<&RelationshipData> {
        self.relationships
            .get(&id)
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    fn relationship_mut(&mut self, id: RelationshipId) -> Result<&mut RelationshipData> {
        self.relationships
            .get_mut(&id)
            .ok_or_else(|| Error::relationship_not_found(id))
    }

    fn relationship_record(&self, id: RelationshipId, data: &RelationshipData) -> RelationshipRecord {
        RelationshipRecord {
            id,
            start: data.start,
            end: data.end,
            type_id: data.type_id,
            first_property: first_property(id.0, &data.properties),
        }
    }
}

fn first_property(entity_id: u64, properties: &PropertySet) -> Option<PropertyId> {
    if properties.is_empty() {
        None
    } else {
        Some(PropertyId::new(entity_id))
    }
}

/// An ephemeral record store backed by maps.
///
/// Deleted ids are tombstoned: they read as absent and can never be
/// re-created, matching the id semantics of the durable store.
pub struct MemoryRecordStore {
    state: Mutex<StoreState>,
    batch_size: usize,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_batch_size(DEFAULT_CHAIN_BATCH_SIZE)
    }

    /// Use a custom relationship-chain page size (tests shrink it to
    /// force multi-page chains).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            batch_size: batch_size.max(1),
        }
    }

    /// How many times `load_light_node` ran for `id`.
    pub fn node_load_count(&self, id: NodeId) -> u64 {
        self.state.lock().node_loads.get(&id).copied().unwrap_or(0)
    }

    /// How many times `load_light_relationship` ran for `id`.
    pub fn relationship_load_count(&self, id: RelationshipId) -> u64 {
        self.state
            .lock()
            .relationship_loads
            .get(&id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of live (created, not deleted) nodes.
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }

    /// Number of live relationships.
    pub fn relationship_count(&self) -> usize {
        self.state.lock().relationships.len()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordLoader for MemoryRecordStore {
    fn load_light_node(&self, id: NodeId) -> Result<Option<NodeRecord>> {
        let mut state = self.state.lock();
        *state.node_loads.entry(id).or_insert(0) += 1;

        Ok(state.nodes.get(&id).map(|data| NodeRecord {
            id,
            first_relationship: data.relationships.first().copied(),
            first_property: first_property(id.0, &data.properties),
        }))
    }

    fn load_light_relationship(&self, id: RelationshipId) -> Result<Option<RelationshipRecord>> {
        let mut state = self.state.lock();
        *state.relationship_loads.entry(id).or_insert(0) += 1;

        Ok(state
            .relationships
            .get(&id)
            .map(|data| state.relationship_record(id, data)))
    }

    fn more_relationships(
        &self,
        node: NodeId,
        position: Option<ChainPosition>,
    ) -> Result<(DirectionalBatch, Option<ChainPosition>)> {
        let state = self.state.lock();
        let data = state.node(node)?;

        let start = position.map(|p| p.0 as usize).unwrap_or(0);
        let end = (start + self.batch_size).min(data.relationships.len());

        let mut batch = DirectionalBatch::default();
        for rel_id in &data.relationships[start..end] {
            let rel = state.relationship(*rel_id)?;
            let record = state.relationship_record(*rel_id, rel);
            match record.direction_from(node) {
                crate::store::Direction::Both => batch.loops.push(record),
                crate::store::Direction::Outgoing => batch.outgoing.push(record),
                crate::store::Direction::Incoming => batch.incoming.push(record),
            }
        }

        let next = if end < data.relationships.len() {
            Some(ChainPosition(end as u64))
        } else {
            None
        };
        Ok((batch, next))
    }

    fn create_node(&self, id: NodeId) -> Result<()> {
        let mut state = self.state.lock();
        if state.deleted_nodes.contains(&id) || state.nodes.contains_key(&id) {
            return Err(Error::Store(format!("node id {} already in use", id.0)));
        }
        state.nodes.insert(id, NodeData::default());
        Ok(())
    }

    fn create_relationship(
        &self,
        id: RelationshipId,
        type_id: TypeId,
        start: NodeId,
        end: NodeId,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.deleted_relationships.contains(&id) || state.relationships.contains_key(&id) {
            return Err(Error::Store(format!(
                "relationship id {} already in use",
                id.0
            )));
        }
        if !state.nodes.contains_key(&start) {
            return Err(Error::node_not_found(start));
        }
        if !state.nodes.contains_key(&end) {
            return Err(Error::node_not_found(end));
        }

        state.relationships.insert(
            id,
            RelationshipData {
                start,
                end,
                type_id,
                properties: PropertySet::new(),
            },
        );
        state.node_mut(start)?.relationships.push(id);
        if start != end {
            state.node_mut(end)?.relationships.push(id);
        }
        Ok(())
    }

    fn delete_node(&self, id: NodeId) -> Result<PropertySet> {
        let mut state = self.state.lock();
        let data = state.node(id)?;
        if !data.relationships.is_empty() {
            return Err(Error::Store(format!(
                "node {} still has relationships",
                id.0
            )));
        }

        let data = state.nodes.remove(&id).expect("checked above");
        state.deleted_nodes.insert(id);
        Ok(data.properties)
    }

    fn delete_relationship(&self, id: RelationshipId) -> Result<PropertySet> {
        let mut state = self.state.lock();
        let data = state
            .relationships
            .remove(&id)
            .ok_or_else(|| Error::relationship_not_found(id))?;
        state.deleted_relationships.insert(id);

        for endpoint in [data.start, data.end] {
            if let Some(node) = state.nodes.get_mut(&endpoint) {
                node.relationships.retain(|r| *r != id);
            }
        }
        Ok(data.properties)
    }

    fn node_properties(&self, id: NodeId) -> Result<PropertySet> {
        Ok(self.state.lock().node(id)?.properties.clone())
    }

    fn node_add_property(&self, id: NodeId, key: KeyId, value: PropertyValue) -> Result<()> {
        self.state.lock().node_mut(id)?.properties.insert(key, value);
        Ok(())
    }

    fn node_change_property(&self, id: NodeId, key: KeyId, value: PropertyValue) -> Result<()> {
        self.node_add_property(id, key, value)
    }

    fn node_remove_property(&self, id: NodeId, key: KeyId) -> Result<()> {
        self.state.lock().node_mut(id)?.properties.remove(&key);
        Ok(())
    }

    fn relationship_properties(&self, id: RelationshipId) -> Result<PropertySet> {
        Ok(self.state.lock().relationship(id)?.properties.clone())
    }

    fn relationship_add_property(
        &self,
        id: RelationshipId,
        key: KeyId,
        value: PropertyValue,
    ) -> Result<()> {
        self.state
            .lock()
            .relationship_mut(id)?
            .properties
            .insert(key, value);
        Ok(())
    }

    fn relationship_change_property(
        &self,
        id: RelationshipId,
        key: KeyId,
        value: PropertyValue,
    ) -> Result<()> {
        self.relationship_add_property(id, key, value)
    }

    fn relationship_remove_property(&self, id: RelationshipId, key: KeyId) -> Result<()> {
        self.state
            .lock()
            .relationship_mut(id)?
            .properties
            .remove(&key);
        Ok(())
    }

    fn graph_property(&self, key: KeyId) -> Result<Option<PropertyValue>> {
        Ok(self.state.lock().graph_properties.get(&key).cloned())
    }

    fn graph_add_property(&self, key: KeyId, value: PropertyValue) -> Result<()> {
        self.state.lock().graph_properties.insert(key, value);
        Ok(())
    }

    fn graph_change_property(&self, key: KeyId, value: PropertyValue) -> Result<()> {
        self.graph_add_property(key, value)
    }

    fn graph_remove_property(&self, key: KeyId) -> Result<()> {
        self.state.lock().graph_properties.remove(&key);
        Ok(())
    }

    fn create_relationship_type(&self, id: TypeId, name: &str) -> Result<()> {
        self.state
            .lock()
            .relationship_types
            .insert(id, name.to_owned());
        Ok(())
    }

    fn create_property_key(&self, id: KeyId, name: &str) -> Result<()> {
        self.state.lock().property_keys.insert(id, name.to_owned());
        Ok(())
    }

    fn relationship_types(&self) -> Result<Vec<(TypeId, String)>> {
        let state = self.state.lock();
        let mut types: Vec<(TypeId, String)> = state
            .relationship_types
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect();
        types.sort_by_key(|(id, _)| *id);
        Ok(types)
    }

    fn property_keys(&self) -> Result<Vec<(KeyId, String)>> {
        let state = self.state.lock();
        let mut keys: Vec<(KeyId, String)> = state
            .property_keys
            .iter()
            .map(|(id, name)| (*id, name.clone()))
            .collect();
        keys.sort_by_key(|(id, _)| *id);
        Ok(keys)
    }

    fn highest_id_in_use(&self, kind: EntityKind) -> Result<Option<u64>> {
        let state = self.state.lock();
        let next = match kind {
            EntityKind::Node => state.next_node_id,
            EntityKind::Relationship => state.next_relationship_id,
            EntityKind::RelationshipType => state.next_type_id,
            EntityKind::PropertyKey => state.next_key_id,
        };
        Ok(next.checked_sub(1))
    }

    fn is_created(&self, kind: EntityKind, id: u64) -> Result<bool> {
        let state = self.state.lock();
        Ok(match kind {
            EntityKind::Node => state.nodes.contains_key(&NodeId::new(id)),
            EntityKind::Relationship => state
                .relationships
                .contains_key(&RelationshipId::new(id)),
            EntityKind::RelationshipType => state
                .relationship_types
                .contains_key(&TypeId::new(id as u32)),
            EntityKind::PropertyKey => state.property_keys.contains_key(&KeyId::new(id as u32)),
        })
    }

    fn undo_create_node(&self, id: NodeId) -> Result<()> {
        self.state.lock().nodes.remove(&id);
        Ok(())
    }

    fn undo_create_relationship(&self, id: RelationshipId) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(data) = state.relationships.remove(&id) {
            for endpoint in [data.start, data.end] {
                if let Some(node) = state.nodes.get_mut(&endpoint) {
                    node.relationships.retain(|r| *r != id);
                }
            }
        }
        Ok(())
    }

    fn restore_node(&self, id: NodeId, properties: PropertySet) -> Result<()> {
        let mut state = self.state.lock();
        state.deleted_nodes.remove(&id);
        state.nodes.insert(
            id,
            NodeData {
                relationships: Vec::new(),
                properties,
            },
        );
        Ok(())
    }

    fn restore_relationship(
        &self,
        record: RelationshipRecord,
        properties: PropertySet,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.deleted_relationships.remove(&record.id);
        state.relationships.insert(
            record.id,
            RelationshipData {
                start: record.start,
                end: record.end,
                type_id: record.type_id,
                properties,
            },
        );
        state.node_mut(record.start)?.relationships.push(record.id);
        if record.start != record.end {
            state.node_mut(record.end)?.relationships.push(record.id);
        }
        Ok(())
    }
}

impl IdGenerator for MemoryRecordStore {
    fn next_id(&self, kind: EntityKind) -> u64 {
        let mut state = self.state.lock();
        let counter = match kind {
            EntityKind::Node => &mut state.next_node_id,
            EntityKind::Relationship => &mut state.next_relationship_id,
            EntityKind::RelationshipType => &mut state.next_type_id,
            EntityKind::PropertyKey => &mut state.next_key_id,
        };
        let id = *counter;
        *counter += 1;
        id
    }
}
