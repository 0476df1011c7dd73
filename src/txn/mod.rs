//! Transactions: lock protocol, change accumulation, completion hooks.
//!
//! # Components
//! - [`Transaction`] - handle owning the change set and held locks
//! - [`LockManager`] - entity-level shared/exclusive locks
//! - [`TransactionChangeSet`] - copy-on-write side maps

mod changeset;
mod locks;

pub use changeset::{
    EntityDelta, EntityKey, PropertyChange, RestoreData, TransactionChangeSet,
};
pub use locks::{LockManager, LockMode, Resource, DEFAULT_LOCK_TIMEOUT};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;

use crate::common::{Error, Result};

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Commit,
    Rollback,
}

/// A completion hook registered with [`Transaction::register_synchronization`].
///
/// Runs exactly once, at commit or rollback, with the outcome and the
/// transaction's final change set.
pub type Synchronization = Box<dyn FnOnce(TxOutcome, &TransactionChangeSet) + Send>;

struct TxInner {
    changes: TransactionChangeSet,
    /// Locks in acquisition order; released in reverse.
    held_locks: Vec<(Resource, LockMode)>,
    synchronizations: Vec<Synchronization>,
    completed: bool,
}

/// A transaction over the entity layer.
///
/// Owns the change set and every lock taken on its behalf. Completion
/// (commit or rollback) runs the registered synchronizations, then
/// releases all locks in reverse acquisition order - every release is
/// attempted even when an earlier one fails, and the failures are
/// aggregated into one [`Error::Lock`].
///
/// Dropping an uncompleted transaction rolls it back.
pub struct Transaction {
    id: u64,
    rollback_only: AtomicBool,
    inner: Mutex<TxInner>,
    lock_manager: Arc<LockManager>,
}

impl Transaction {
    pub(crate) fn new(id: u64, lock_manager: Arc<LockManager>) -> Self {
        Self {
            id,
            rollback_only: AtomicBool::new(false),
            inner: Mutex::new(TxInner {
                changes: TransactionChangeSet::new(),
                held_locks: Vec::new(),
                synchronizations: Vec::new(),
                completed: false,
            }),
            lock_manager,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Mark the transaction so commit is refused and only rollback can
    /// complete it.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::Relaxed);
    }

    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::Relaxed)
    }

    /// Register a hook to run at completion.
    pub fn register_synchronization(&self, hook: Synchronization) {
        self.inner.lock().synchronizations.push(hook);
    }

    /// Run `f` against the change set.
    pub(crate) fn with_changes<R>(&self, f: impl FnOnce(&mut TransactionChangeSet) -> R) -> R {
        f(&mut self.inner.lock().changes)
    }

    /// Read `f` against the change set.
    pub(crate) fn read_changes<R>(&self, f: impl FnOnce(&TransactionChangeSet) -> R) -> R {
        f(&self.inner.lock().changes)
    }

    /// Remember a lock for release at completion.
    pub(crate) fn record_lock(&self, resource: Resource, mode: LockMode) {
        self.inner.lock().held_locks.push((resource, mode));
    }

    /// Commit the transaction.
    ///
    /// # Errors
    /// `InvalidArgument` when the transaction is rollback-only (it is
    /// rolled back instead); `Lock` when one or more lock releases fail.
    pub fn commit(self) -> Result<()> {
        if self.is_rollback_only() {
            self.complete(TxOutcome::Rollback)?;
            return Err(Error::InvalidArgument(
                "transaction is rollback-only and was rolled back".into(),
            ));
        }
        self.complete(TxOutcome::Commit)
    }

    /// Roll the transaction back, dropping the change set.
    ///
    /// # Errors
    /// `Lock` when one or more lock releases fail.
    pub fn rollback(self) -> Result<()> {
        self.complete(TxOutcome::Rollback)
    }

    fn complete(&self, outcome: TxOutcome) -> Result<()> {
        let (changes, held_locks, synchronizations) = {
            let mut inner = self.inner.lock();
            if inner.completed {
                return Ok(());
            }
            inner.completed = true;
            (
                std::mem::take(&mut inner.changes),
                std::mem::take(&mut inner.held_locks),
                std::mem::take(&mut inner.synchronizations),
            )
        };

        for hook in synchronizations {
            hook(outcome, &changes);
        }

        // Reverse-order release with independent failure accounting:
        // every lock gets its release attempt, failures aggregate.
        let mut failures = Vec::new();
        for (resource, mode) in held_locks.into_iter().rev() {
            if let Err(err) = self.lock_manager.release(self.id, resource, mode) {
                warn!("transaction {}: {}", self.id, err);
                failures.push(err.to_string());
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Lock(failures.join("; ")))
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        // Completed transactions make this a no-op.
        let _ = self.complete(TxOutcome::Rollback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NodeId;
    use std::sync::atomic::AtomicU32;

    fn transaction(id: u64) -> (Transaction, Arc<LockManager>) {
        let manager = Arc::new(LockManager::new());
        (Transaction::new(id, Arc::clone(&manager)), manager)
    }

    #[test]
    fn test_commit_runs_hooks_with_outcome() {
        let (tx, _manager) = transaction(1);
        let outcome = Arc::new(Mutex::new(None));

        let seen = Arc::clone(&outcome);
        tx.register_synchronization(Box::new(move |o, _| {
            *seen.lock() = Some(o);
        }));

        tx.commit().unwrap();
        assert_eq!(*outcome.lock(), Some(TxOutcome::Commit));
    }

    #[test]
    fn test_rollback_only_refuses_commit() {
        let (tx, _manager) = transaction(1);
        let outcome = Arc::new(Mutex::new(None));

        let seen = Arc::clone(&outcome);
        tx.register_synchronization(Box::new(move |o, _| {
            *seen.lock() = Some(o);
        }));

        tx.set_rollback_only();
        let err = tx.commit().unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(*outcome.lock(), Some(TxOutcome::Rollback));
    }

    #[test]
    fn test_completion_releases_locks() {
        let (tx, manager) = transaction(1);
        let resource = Resource::Node(NodeId::new(5));

        manager.acquire(1, resource, LockMode::Exclusive).unwrap();
        tx.record_lock(resource, LockMode::Exclusive);

        tx.commit().unwrap();
        assert_eq!(manager.held_resources(), 0);
    }

    #[test]
    fn test_release_failures_aggregate() {
        let (tx, manager) = transaction(1);
        let good = Resource::Node(NodeId::new(1));
        let bogus = Resource::Node(NodeId::new(2));

        manager.acquire(1, good, LockMode::Exclusive).unwrap();
        tx.record_lock(good, LockMode::Exclusive);
        // Recorded but never acquired: its release must fail without
        // stopping the release of the genuinely held lock.
        tx.record_lock(bogus, LockMode::Exclusive);

        let err = tx.commit().unwrap_err();
        assert!(matches!(err, Error::Lock(_)));
        assert_eq!(manager.held_resources(), 0, "held lock was not released");
    }

    #[test]
    fn test_drop_rolls_back() {
        let manager = Arc::new(LockManager::new());
        let counter = Arc::new(AtomicU32::new(0));

        {
            let tx = Transaction::new(1, Arc::clone(&manager));
            let resource = Resource::Node(NodeId::new(5));
            manager.acquire(1, resource, LockMode::Exclusive).unwrap();
            tx.record_lock(resource, LockMode::Exclusive);

            let counter = Arc::clone(&counter);
            tx.register_synchronization(Box::new(move |outcome, _| {
                assert_eq!(outcome, TxOutcome::Rollback);
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(manager.held_resources(), 0);
    }

    #[test]
    fn test_changes_survive_until_completion() {
        let (tx, _manager) = transaction(1);

        tx.with_changes(|changes| {
            changes.mark_created(EntityKey::Node(NodeId::new(9)));
        });
        assert!(tx.read_changes(|changes| changes.is_created(EntityKey::Node(NodeId::new(9)))));

        let observed = Arc::new(Mutex::new(false));
        let seen = Arc::clone(&observed);
        tx.register_synchronization(Box::new(move |_, changes| {
            *seen.lock() = changes.is_created(EntityKey::Node(NodeId::new(9)));
        }));

        tx.commit().unwrap();
        assert!(*observed.lock());
    }
}
