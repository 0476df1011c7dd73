//! GraphMem - the in-memory object layer of an embedded graph database.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           GraphMem                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Facade (entity/manager)                     │   │
//! │  │   EntityManager + NodeProxy / RelationshipProxy          │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Transaction Layer (txn/)                       │   │
//! │  │   Transaction + LockManager + TransactionChangeSet       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │     Entity Cache (entity/cache)  [Load Coordinator]     │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │ Eviction: CLOCK | LRU | WEAK | SOFT | STRONG |  │   │   │
//! │  │   │ NONE          (runtime selectable)               │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  │      StripedLoadLocks + AdaptiveCacheManager             │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Record Store Seam (store/)                     │   │
//! │  │     RecordLoader + IdGenerator + MemoryRecordStore       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (ids, Error, configuration)
//! - [`cache`] - Bounded caches, eviction policies, striped load locks
//! - [`entity`] - Cached entities, proxies, name holders, the facade
//! - [`store`] - The record store seam and its in-memory implementation
//! - [`txn`] - Transactions, entity locks, change sets
//!
//! # Quick Start
//! ```
//! use std::sync::Arc;
//! use graphmem::{CacheSettings, EntityManager, MemoryRecordStore, PropertyValue};
//!
//! let store = Arc::new(MemoryRecordStore::new());
//! let manager = EntityManager::new(
//!     CacheSettings::default(),
//!     store.clone(),
//!     store,
//! ).unwrap();
//!
//! let tx = manager.begin_tx();
//! let alice = manager.create_node(&tx).unwrap();
//! let bob = manager.create_node(&tx).unwrap();
//! let knows = alice.create_relationship_to(&tx, &bob, "KNOWS").unwrap();
//! alice.set_property(&tx, "name", PropertyValue::from("Alice")).unwrap();
//! tx.commit().unwrap();
//! # let _ = knows;
//! ```

// Core modules
pub mod cache;
pub mod common;
pub mod entity;
pub mod store;
pub mod txn;

// Re-export commonly used items at crate root for convenience
pub use common::config::{CacheKind, CacheSettings};
pub use common::{EntityKind, Error, KeyId, NodeId, PropertyId, RelationshipId, Result, TypeId};

pub use cache::{CacheStats, StatsSnapshot};
pub use entity::{EntityManager, NodeProxy, PropertyTracker, RelationshipProxy};
pub use store::{
    Direction, IdGenerator, MemoryRecordStore, NodeRecord, PropertySet, PropertyValue,
    RecordLoader, RelationshipRecord,
};
pub use txn::{EntityKey, LockManager, LockMode, Resource, Transaction, TxOutcome};
