//! Entity identifier types.

use std::fmt;

/// Identifies a node in the graph.
///
/// Node ids are allocated by the record store's id generator and are
/// stable for the lifetime of the node, including across cache evictions.
///
/// # Example
/// ```
/// use graphmem::NodeId;
///
/// let id = NodeId::new(42);
/// assert_eq!(id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Create a new NodeId.
    #[inline]
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

/// Identifies a relationship in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipId(pub u64);

impl RelationshipId {
    /// Create a new RelationshipId.
    #[inline]
    pub fn new(id: u64) -> Self {
        RelationshipId(id)
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relationship({})", self.0)
    }
}

/// Identifies a relationship type.
///
/// Type ids are small integers allocated lazily the first time a type
/// name is used. They are never reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    /// Create a new TypeId.
    #[inline]
    pub fn new(id: u32) -> Self {
        TypeId(id)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.0)
    }
}

/// Identifies a property key.
///
/// Like [`TypeId`], key ids are allocated lazily at first use and are
/// never reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u32);

impl KeyId {
    /// Create a new KeyId.
    #[inline]
    pub fn new(id: u32) -> Self {
        KeyId(id)
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

/// Identifies the head of an entity's property chain in the record store.
///
/// Opaque to this layer: it only matters whether a chain exists and where
/// the record loader should start reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertyId(pub u64);

impl PropertyId {
    /// Create a new PropertyId.
    #[inline]
    pub fn new(id: u64) -> Self {
        PropertyId(id)
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Property({})", self.0)
    }
}

/// The kinds of entities the record store tracks ids for.
///
/// Used when allocating ids and when reporting which id space a lookup
/// failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Node,
    Relationship,
    RelationshipType,
    PropertyKey,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Node => "node",
            EntityKind::Relationship => "relationship",
            EntityKind::RelationshipType => "relationship type",
            EntityKind::PropertyKey => "property key",
        };
        f.write_str(name)
    }
}
