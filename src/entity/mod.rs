//! The entity layer: cached graph objects and the facade over them.
//!
//! # Components
//! - [`EntityManager`] - the public facade
//! - [`EntityCache`] - load coordination and the policy caches
//! - [`NodeProxy`] / [`RelationshipProxy`] - lazily faulting handles
//! - [`InternalNode`] / [`InternalRelationship`] - cached materializations
//! - name holders for relationship types, property keys, and reference
//!   nodes

mod cache;
mod manager;
mod names;
mod node;
mod proxy;
mod relationship;

pub use cache::EntityCache;
pub use manager::{EntityManager, NodeScan, PropertyTracker, RelationshipScan};
pub use names::{PropertyKeyHolder, ReferenceNodeHolder, RelationshipTypeHolder};
pub use node::{ChainProgress, InternalNode, LoadState, RelIdArray};
pub use proxy::{NodeProxy, RelationshipProxy};
pub use relationship::InternalRelationship;
