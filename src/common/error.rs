//! Error types for GraphMem.

use thiserror::Error;

use crate::common::EntityKind;

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in GraphMem.
///
/// A single error type keeps handling consistent across the cache,
/// transaction, and facade layers.
#[derive(Debug, Error)]
pub enum Error {
    /// A caller-supplied value was rejected at the public boundary.
    ///
    /// Fails fast with no transaction effect.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested id has never existed or has been tombstoned.
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: u64 },

    /// A lock could not be acquired or released.
    ///
    /// Release failures are aggregated so sibling locks still get their
    /// release attempt before this surfaces.
    #[error("lock failure: {0}")]
    Lock(String),

    /// The record store reported an I/O or corruption failure.
    ///
    /// Always marks the surrounding transaction rollback-only.
    #[error("store failure: {0}")]
    Store(String),

    /// An internal cache invariant was violated. Fatal.
    #[error("cache state violation: {0}")]
    CacheState(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] about a node.
    pub fn node_not_found(id: crate::common::NodeId) -> Self {
        Error::NotFound {
            kind: EntityKind::Node,
            id: id.0,
        }
    }

    /// Shorthand for a [`Error::NotFound`] about a relationship.
    pub fn relationship_not_found(id: crate::common::RelationshipId) -> Self {
        Error::NotFound {
            kind: EntityKind::Relationship,
            id: id.0,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Store(err.to_string())
    }
}
