//! Per-document-id locking.
//!
//! Link maintenance is a read-check-write sequence across several documents;
//! the lock manager serializes those sequences within one process. Lock
//! objects live in a shared registry keyed by document id, weakly referenced
//! so unused locks are reclaimed. Acquisition always happens in sorted id
//! order, and release in reverse order, which rules out deadlock between
//! operations locking overlapping id sets.
//!
//! These are process-local, re-entrant locks. Cross-process races are caught
//! by the store's revision check and surface as conflicts.

use parking_lot::{lock_api::ArcReentrantMutexGuard, Mutex, RawMutex, RawThreadId, ReentrantMutex};
use std::collections::HashMap;
use std::sync::{Arc, Weak};

type IdLock = ReentrantMutex<()>;
type IdLockGuard = ArcReentrantMutexGuard<RawMutex, RawThreadId, ()>;

/// Hands out per-document-id locks from a shared, weakly-referenced
/// registry.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Weak<IdLock>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the locks for a set of document ids. Ids are deduplicated
    /// and sorted before acquisition; the returned guard releases in
    /// reverse order when dropped, on every exit path.
    pub fn lock<I, S>(&self, ids: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut sorted: Vec<String> = ids.into_iter().map(Into::into).collect();
        sorted.sort();
        sorted.dedup();

        // The master lock is held only long enough to obtain the lock
        // objects, never across an acquisition.
        let handles: Vec<Arc<IdLock>> = {
            let mut registry = self.locks.lock();
            registry.retain(|_, weak| weak.strong_count() > 0);
            sorted
                .into_iter()
                .map(|id| match registry.get(&id).and_then(Weak::upgrade) {
                    Some(existing) => existing,
                    None => {
                        let fresh = Arc::new(ReentrantMutex::new(()));
                        registry.insert(id, Arc::downgrade(&fresh));
                        fresh
                    }
                })
                .collect()
        };

        let guards = handles.iter().map(|lock| lock.lock_arc()).collect();
        LockSet { guards }
    }
}

/// A held set of per-id locks, released in reverse acquisition order.
pub struct LockSet {
    guards: Vec<IdLockGuard>,
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while self.guards.pop().is_some() {}
    }
}
