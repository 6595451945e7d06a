//! Per-VM operation locks.
//!
//! Operations on the same VM identifier run one at a time; operations on
//! different identifiers never wait on each other. An entry lives in the
//! registry only while some task holds or waits for it.

use crate::vm::VmId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Arc<Mutex<HashMap<VmId, Slot>>>;

/// One identifier's lock and the number of tasks holding or waiting for it.
#[derive(Debug, Default)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    claims: usize,
}

/// Registry of per-identifier locks.
#[derive(Debug, Default, Clone)]
pub struct VmLocks {
    slots: Slots,
}

impl VmLocks {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other operation holds `id`, then hold it until the
    /// returned guard is dropped.
    ///
    /// Dropping the future while it waits gives up its place in the queue.
    pub async fn acquire(&self, id: VmId) -> VmLockGuard {
        let (claim, lock) = self.claim(id);
        let guard = lock.lock_owned().await;
        tracing::trace!(vm_id = %id, "Acquired VM lock");
        VmLockGuard {
            _guard: guard,
            _claim: claim,
        }
    }

    fn claim(&self, id: VmId) -> (Claim, Arc<AsyncMutex<()>>) {
        let mut slots = self.slots.lock();
        let slot = slots.entry(id).or_default();
        slot.claims += 1;
        let lock = Arc::clone(&slot.lock);
        drop(slots);
        let claim = Claim {
            id,
            slots: Arc::clone(&self.slots),
        };
        (claim, lock)
    }

    /// Number of identifiers currently held or waited on.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if no identifier is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Holds one identifier's lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct VmLockGuard {
    _guard: OwnedMutexGuard<()>,
    _claim: Claim,
}

/// A task's interest in one slot, held while waiting and while locked.
#[derive(Debug)]
struct Claim {
    id: VmId,
    slots: Slots,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        let idle = match slots.get_mut(&self.id) {
            Some(slot) => {
                slot.claims = slot.claims.saturating_sub(1);
                slot.claims == 0
            }
            None => false,
        };
        if idle {
            slots.remove(&self.id);
        }
    }
}
