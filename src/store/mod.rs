//! Record store seam - the interfaces this layer consumes.
//!
//! The object layer never touches record files itself: it asks a
//! [`RecordLoader`] for light entity records and relationship-chain
//! batches, and an [`IdGenerator`] for fresh ids. The
//! [`MemoryRecordStore`] is a transient implementation of both, used by
//! tests and embedded callers that want no persistence.

mod memstore;

pub use memstore::MemoryRecordStore;

use std::collections::HashMap;
use std::fmt;

use crate::common::{EntityKind, KeyId, NodeId, PropertyId, RelationshipId, Result, TypeId};

/// Direction of a relationship relative to one of its endpoints.
///
/// Self-loops are tagged `Both` and stored once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// A property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Long(i64),
    Double(f64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Long(v) => write!(f, "{v}"),
            PropertyValue::Double(v) => write!(f, "{v}"),
            PropertyValue::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::Text(v.to_owned())
    }
}

/// Core fields of a node, without properties or relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeRecord {
    pub id: NodeId,
    pub first_relationship: Option<RelationshipId>,
    pub first_property: Option<PropertyId>,
}

/// Core fields of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub start: NodeId,
    pub end: NodeId,
    pub type_id: TypeId,
    pub first_property: Option<PropertyId>,
}

impl RelationshipRecord {
    /// Direction of this relationship as seen from `node`.
    pub fn direction_from(&self, node: NodeId) -> Direction {
        if self.start == self.end {
            Direction::Both
        } else if self.start == node {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }
}

/// Opaque cursor into a node's on-disk relationship chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPosition(pub(crate) u64);

/// One page of a node's relationship chain, segmented by direction.
#[derive(Debug, Default)]
pub struct DirectionalBatch {
    pub outgoing: Vec<RelationshipRecord>,
    pub incoming: Vec<RelationshipRecord>,
    pub loops: Vec<RelationshipRecord>,
}

impl DirectionalBatch {
    /// Total records in the batch.
    pub fn len(&self) -> usize {
        self.outgoing.len() + self.incoming.len() + self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate all records with their direction tag.
    pub fn iter(&self) -> impl Iterator<Item = (&RelationshipRecord, Direction)> {
        self.outgoing
            .iter()
            .map(|r| (r, Direction::Outgoing))
            .chain(self.incoming.iter().map(|r| (r, Direction::Incoming)))
            .chain(self.loops.iter().map(|r| (r, Direction::Both)))
    }
}

/// Properties of an entity as the store last committed them.
pub type PropertySet = HashMap<KeyId, PropertyValue>;

/// The durable record store, as consumed by the object layer.
///
/// Implementations must be thread-safe: the striped load protocol
/// guarantees at most one concurrent load per id, but loads of distinct
/// ids and all write operations may overlap freely.
pub trait RecordLoader: Send + Sync {
    /// Load a node's core fields, or `None` if the id has never existed
    /// or is tombstoned.
    fn load_light_node(&self, id: NodeId) -> Result<Option<NodeRecord>>;

    /// Load a relationship's core fields.
    fn load_light_relationship(&self, id: RelationshipId) -> Result<Option<RelationshipRecord>>;

    /// Fetch the next page of `node`'s relationship chain.
    ///
    /// `position` of `None` starts from the chain head. Returns the batch
    /// and the cursor for the following page, or `None` when the chain is
    /// exhausted.
    fn more_relationships(
        &self,
        node: NodeId,
        position: Option<ChainPosition>,
    ) -> Result<(DirectionalBatch, Option<ChainPosition>)>;

    fn create_node(&self, id: NodeId) -> Result<()>;

    fn create_relationship(
        &self,
        id: RelationshipId,
        type_id: TypeId,
        start: NodeId,
        end: NodeId,
    ) -> Result<()>;

    /// Delete a node, returning the properties it held.
    fn delete_node(&self, id: NodeId) -> Result<PropertySet>;

    /// Delete a relationship, returning the properties it held.
    fn delete_relationship(&self, id: RelationshipId) -> Result<PropertySet>;

    fn node_properties(&self, id: NodeId) -> Result<PropertySet>;
    fn node_add_property(&self, id: NodeId, key: KeyId, value: PropertyValue) -> Result<()>;
    fn node_change_property(&self, id: NodeId, key: KeyId, value: PropertyValue) -> Result<()>;
    fn node_remove_property(&self, id: NodeId, key: KeyId) -> Result<()>;

    fn relationship_properties(&self, id: RelationshipId) -> Result<PropertySet>;
    fn relationship_add_property(
        &self,
        id: RelationshipId,
        key: KeyId,
        value: PropertyValue,
    ) -> Result<()>;
    fn relationship_change_property(
        &self,
        id: RelationshipId,
        key: KeyId,
        value: PropertyValue,
    ) -> Result<()>;
    fn relationship_remove_property(&self, id: RelationshipId, key: KeyId) -> Result<()>;

    fn graph_property(&self, key: KeyId) -> Result<Option<PropertyValue>>;
    fn graph_add_property(&self, key: KeyId, value: PropertyValue) -> Result<()>;
    fn graph_change_property(&self, key: KeyId, value: PropertyValue) -> Result<()>;
    fn graph_remove_property(&self, key: KeyId) -> Result<()>;

    /// Record a lazily registered relationship type.
    fn create_relationship_type(&self, id: TypeId, name: &str) -> Result<()>;

    /// Record a lazily registered property key.
    fn create_property_key(&self, id: KeyId, name: &str) -> Result<()>;

    /// All registered relationship types, for holder bootstrap.
    fn relationship_types(&self) -> Result<Vec<(TypeId, String)>>;

    /// All registered property keys, for holder bootstrap.
    fn property_keys(&self) -> Result<Vec<(KeyId, String)>>;

    /// Highest id ever allocated for `kind`, or `None` when none were.
    fn highest_id_in_use(&self, kind: EntityKind) -> Result<Option<u64>>;

    /// Whether `id` names a live (created, not tombstoned) entity.
    fn is_created(&self, kind: EntityKind, id: u64) -> Result<bool>;

    // Rollback interface: inverse effects replayed when a transaction
    // rolls back. Ids undone this way were never visible as committed
    // and are not tombstoned.

    /// Discard a node created by the rolling-back transaction.
    fn undo_create_node(&self, id: NodeId) -> Result<()>;

    /// Discard a relationship created by the rolling-back transaction.
    fn undo_create_relationship(&self, id: RelationshipId) -> Result<()>;

    /// Reinstate a node deleted by the rolling-back transaction.
    fn restore_node(&self, id: NodeId, properties: PropertySet) -> Result<()>;

    /// Reinstate a relationship deleted by the rolling-back transaction.
    fn restore_relationship(
        &self,
        record: RelationshipRecord,
        properties: PropertySet,
    ) -> Result<()>;
}

/// Allocates fresh entity ids.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, kind: EntityKind) -> u64;
}
