//! Entity-level lock manager.
//!
//! Write operations bracket short critical sections with locks on the
//! entities they touch. Locks are held until the transaction completes;
//! the [`Transaction`](crate::txn::Transaction) releases them in reverse
//! acquisition order, attempting every release even when one fails.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::common::{Error, NodeId, RelationshipId, Result};

/// How long an acquire waits before giving up.
///
/// A timeout stands in for deadlock detection: a cycle shows up as an
/// acquire that never succeeds.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// A lockable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Node(NodeId),
    Relationship(RelationshipId),
    Graph,
}

/// Lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Default)]
struct LockState {
    /// Reader transaction id -> reentrant hold count.
    readers: HashMap<u64, usize>,
    /// Writer transaction id and its reentrant hold count.
    writer: Option<(u64, usize)>,
}

impl LockState {
    fn is_free(&self) -> bool {
        self.readers.is_empty() && self.writer.is_none()
    }

    /// Whether `tx` may take the lock in `mode` right now.
    fn grantable(&self, tx: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => match self.writer {
                // A writer's own shared request is compatible.
                Some((writer, _)) => writer == tx,
                None => true,
            },
            LockMode::Exclusive => {
                let writer_ok = match self.writer {
                    Some((writer, _)) => writer == tx,
                    None => true,
                };
                // Upgrading is allowed only for a sole reader.
                let readers_ok = self.readers.is_empty()
                    || (self.readers.len() == 1 && self.readers.contains_key(&tx));
                writer_ok && readers_ok
            }
        }
    }

    fn grant(&mut self, tx: u64, mode: LockMode) {
        match mode {
            LockMode::Shared => *self.readers.entry(tx).or_insert(0) += 1,
            LockMode::Exclusive => match &mut self.writer {
                Some((writer, count)) if *writer == tx => *count += 1,
                _ => self.writer = Some((tx, 1)),
            },
        }
    }

    /// Release one hold, returning whether the holder was found.
    fn release(&mut self, tx: u64, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => match self.readers.get_mut(&tx) {
                Some(count) => {
                    *count -= 1;
                    if *count == 0 {
                        self.readers.remove(&tx);
                    }
                    true
                }
                None => false,
            },
            LockMode::Exclusive => match &mut self.writer {
                Some((writer, count)) if *writer == tx => {
                    *count -= 1;
                    if *count == 0 {
                        self.writer = None;
                    }
                    true
                }
                _ => false,
            },
        }
    }
}

/// Blocking shared/exclusive locks keyed by entity resource.
///
/// Reentrant per transaction: a transaction re-acquiring a lock it holds
/// increments a hold count, and every acquisition needs a matching
/// release.
pub struct LockManager {
    locks: Mutex<HashMap<Resource, LockState>>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_LOCK_TIMEOUT)
    }

    /// Use a custom acquire timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Acquire `resource` in `mode` for transaction `tx`, blocking until
    /// granted.
    ///
    /// # Errors
    /// `Lock` when the wait times out.
    pub fn acquire(&self, tx: u64, resource: Resource, mode: LockMode) -> Result<()> {
        let mut locks = self.locks.lock();
        loop {
            let state = locks.entry(resource).or_default();
            if state.grantable(tx, mode) {
                state.grant(tx, mode);
                return Ok(());
            }

            if self
                .released
                .wait_for(&mut locks, self.timeout)
                .timed_out()
            {
                // Drop the state entry if this waiter was its only reason
                // to exist.
                if locks.get(&resource).is_some_and(LockState::is_free) {
                    locks.remove(&resource);
                }
                return Err(Error::Lock(format!(
                    "timed out acquiring {mode:?} lock on {resource:?} for transaction {tx}"
                )));
            }
        }
    }

    /// Release one hold of `resource` in `mode` for transaction `tx`.
    ///
    /// # Errors
    /// `Lock` when the transaction does not hold the lock.
    pub fn release(&self, tx: u64, resource: Resource, mode: LockMode) -> Result<()> {
        let mut locks = self.locks.lock();

        let Some(state) = locks.get_mut(&resource) else {
            return Err(Error::Lock(format!(
                "transaction {tx} released {mode:?} lock on {resource:?} it does not hold"
            )));
        };

        if !state.release(tx, mode) {
            return Err(Error::Lock(format!(
                "transaction {tx} released {mode:?} lock on {resource:?} it does not hold"
            )));
        }

        if state.is_free() {
            locks.remove(&resource);
        }
        drop(locks);

        self.released.notify_all();
        Ok(())
    }

    /// Number of resources with at least one holder.
    pub fn held_resources(&self) -> usize {
        self.locks.lock().len()
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}
