//! Internal relationship representation.

use crate::common::{NodeId, PropertyId, RelationshipId, TypeId};
use crate::store::{Direction, RelationshipRecord};

/// The cached materialization of one relationship.
///
/// Core fields never change after creation, so the struct is immutable
/// and freely shareable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InternalRelationship {
    id: RelationshipId,
    start: NodeId,
    end: NodeId,
    type_id: TypeId,
    first_property: Option<PropertyId>,
}

impl InternalRelationship {
    pub fn from_record(record: RelationshipRecord) -> Self {
        Self {
            id: record.id,
            start: record.start,
            end: record.end,
            type_id: record.type_id,
            first_property: record.first_property,
        }
    }

    pub fn new(id: RelationshipId, type_id: TypeId, start: NodeId, end: NodeId) -> Self {
        Self {
            id,
            start,
            end,
            type_id,
            first_property: None,
        }
    }

    pub fn id(&self) -> RelationshipId {
        self.id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn end(&self) -> NodeId {
        self.end
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn first_property(&self) -> Option<PropertyId> {
        self.first_property
    }

    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }

    /// Direction of this relationship as seen from `node`.
    pub fn direction_from(&self, node: NodeId) -> Direction {
        if self.is_loop() {
            Direction::Both
        } else if self.start == node {
            Direction::Outgoing
        } else {
            Direction::Incoming
        }
    }

    /// The endpoint opposite `node`, or `None` when `node` is not an
    /// endpoint.
    pub fn other_node(&self, node: NodeId) -> Option<NodeId> {
        if node == self.start {
            Some(self.end)
        } else if node == self.end {
            Some(self.start)
        } else {
            None
        }
    }

    /// Reconstruct the record this relationship was materialized from.
    pub fn to_record(self) -> RelationshipRecord {
        RelationshipRecord {
            id: self.id,
            start: self.start,
            end: self.end,
            type_id: self.type_id,
            first_property: self.first_property,
        }
    }
}
