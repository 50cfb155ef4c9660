//! Reentrant, path-scoped advisory locks
//!
//! One lock per logical node path (`/`, `/users`, `/users/<id>`, ...), so
//! writers on unrelated subtrees do not contend while writers on the same
//! subtree serialize. Operations spanning more than one subtree (deletion
//! cascades, role mutation, cascading commits) take the root path first, so
//! acquisition is always ordered root before child and cannot deadlock.
//!
//! The per-node state mutexes elsewhere in the crate are leaf locks held only
//! for short map accesses; cross-node ordering comes from these path locks.

use parking_lot::lock_api::ArcReentrantMutexGuard;
use parking_lot::{Mutex, RawMutex, RawThreadId, ReentrantMutex};
use std::collections::HashMap;
use std::sync::Arc;

/// Logical path of the root node
pub(crate) const ROOT_PATH: &str = "/";

/// Guard for a path-scoped lock; released on drop, reentrant per thread
pub(crate) type PathGuard = ArcReentrantMutexGuard<RawMutex, RawThreadId, ()>;

/// Registry of per-path reentrant locks
#[derive(Default)]
pub(crate) struct LockRegistry {
    locks: Mutex<HashMap<String, Arc<ReentrantMutex<()>>>>,
}

impl LockRegistry {
    pub(crate) fn new() -> Self {
        LockRegistry::default()
    }

    /// Acquire the lock for a logical node path, blocking until available
    pub(crate) fn lock(&self, path: &str) -> PathGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            locks
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(ReentrantMutex::new(())))
                .clone()
        };
        mutex.lock_arc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_reentrant_on_same_thread() {
        let registry = LockRegistry::new();
        let _outer = registry.lock("/users");
        let _inner = registry.lock("/users");
    }

    #[test]
    fn test_excludes_other_threads_on_same_path() {
        let registry = Arc::new(LockRegistry::new());
        let guard = registry.lock("/users/max");

        let (tx, rx) = mpsc::channel();
        let other = registry.clone();
        let handle = thread::spawn(move || {
            let _guard = other.lock("/users/max");
            tx.send(()).unwrap();
        });

        // blocked while the guard is held
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(guard);
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn test_unrelated_paths_do_not_contend() {
        let registry = Arc::new(LockRegistry::new());
        let _guard = registry.lock("/users/max");

        let (tx, rx) = mpsc::channel();
        let other = registry.clone();
        let handle = thread::spawn(move || {
            let _guard = other.lock("/users/sepp");
            tx.send(()).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        handle.join().unwrap();
    }
}
