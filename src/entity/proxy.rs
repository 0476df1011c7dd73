//! Proxy handles for nodes and relationships.
//!
//! A proxy is a lightweight value: the entity id plus a shared handle to
//! the [`EntityManager`]. Accessors fault the underlying data in through
//! the manager on first use. Proxies appear in no container the manager
//! owns, so no reference cycle exists.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::common::{NodeId, RelationshipId, Result};
use crate::entity::manager::EntityManager;
use crate::store::{Direction, PropertySet, PropertyValue};
use crate::txn::Transaction;

/// Handle to a node.
///
/// Equality and hashing use the id alone: two proxies for the same node
/// are the same node.
#[derive(Clone)]
pub struct NodeProxy {
    id: NodeId,
    manager: Arc<EntityManager>,
}

impl NodeProxy {
    pub(crate) fn new(id: NodeId, manager: Arc<EntityManager>) -> Self {
        Self { id, manager }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read a property, merging this transaction's pending changes.
    pub fn property(&self, tx: &Transaction, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.node_property(tx, self.id, key)
    }

    /// All properties visible to this transaction.
    pub fn properties(&self, tx: &Transaction) -> Result<PropertySet> {
        self.manager.node_properties(tx, self.id)
    }

    pub fn set_property(&self, tx: &Transaction, key: &str, value: PropertyValue) -> Result<()> {
        self.manager.set_node_property(tx, self.id, key, value)
    }

    /// Remove a property, returning the value it had.
    pub fn remove_property(&self, tx: &Transaction, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.remove_node_property(tx, self.id, key)
    }

    /// Relationships of this node visible to the transaction, paging the
    /// chain in as needed.
    pub fn relationships(&self, tx: &Transaction) -> Result<Vec<RelationshipProxy>> {
        self.manager.relationships_of(tx, self.id)
    }

    pub fn create_relationship_to(
        &self,
        tx: &Transaction,
        other: &NodeProxy,
        type_name: &str,
    ) -> Result<RelationshipProxy> {
        self.manager.create_relationship(tx, self, other, type_name)
    }

    pub fn delete(&self, tx: &Transaction) -> Result<()> {
        self.manager.delete_node(tx, self.id)
    }
}

impl PartialEq for NodeProxy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for NodeProxy {}

impl Hash for NodeProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for NodeProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeProxy").field(&self.id).finish()
    }
}

/// Handle to a relationship.
#[derive(Clone)]
pub struct RelationshipProxy {
    id: RelationshipId,
    manager: Arc<EntityManager>,
}

impl RelationshipProxy {
    pub(crate) fn new(id: RelationshipId, manager: Arc<EntityManager>) -> Self {
        Self { id, manager }
    }

    pub fn id(&self) -> RelationshipId {
        self.id
    }

    /// Start node of this relationship.
    pub fn start_node(&self) -> Result<NodeProxy> {
        let rel = self.manager.relationship_internal(self.id)?;
        Ok(NodeProxy::new(rel.start(), Arc::clone(&self.manager)))
    }

    /// End node of this relationship.
    pub fn end_node(&self) -> Result<NodeProxy> {
        let rel = self.manager.relationship_internal(self.id)?;
        Ok(NodeProxy::new(rel.end(), Arc::clone(&self.manager)))
    }

    /// The relationship's type name.
    pub fn type_name(&self) -> Result<String> {
        self.manager.relationship_type_name(self.id)
    }

    /// Whether start and end are the same node.
    pub fn is_loop(&self) -> Result<bool> {
        Ok(self.manager.relationship_internal(self.id)?.is_loop())
    }

    /// Direction of this relationship as seen from `node`.
    pub fn direction_from(&self, node: NodeId) -> Result<Direction> {
        Ok(self
            .manager
            .relationship_internal(self.id)?
            .direction_from(node))
    }

    /// The endpoint opposite `node`.
    pub fn other_node(&self, node: NodeId) -> Result<Option<NodeProxy>> {
        let rel = self.manager.relationship_internal(self.id)?;
        Ok(rel
            .other_node(node)
            .map(|id| NodeProxy::new(id, Arc::clone(&self.manager))))
    }

    pub fn property(&self, tx: &Transaction, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.relationship_property(tx, self.id, key)
    }

    pub fn properties(&self, tx: &Transaction) -> Result<PropertySet> {
        self.manager.relationship_properties(tx, self.id)
    }

    pub fn set_property(&self, tx: &Transaction, key: &str, value: PropertyValue) -> Result<()> {
        self.manager
            .set_relationship_property(tx, self.id, key, value)
    }

    pub fn remove_property(&self, tx: &Transaction, key: &str) -> Result<Option<PropertyValue>> {
        self.manager.remove_relationship_property(tx, self.id, key)
    }

    pub fn delete(&self, tx: &Transaction) -> Result<()> {
        self.manager.delete_relationship(tx, self.id)
    }
}

impl PartialEq for RelationshipProxy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RelationshipProxy {}

impl Hash for RelationshipProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RelationshipProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RelationshipProxy").field(&self.id).finish()
    }
}
