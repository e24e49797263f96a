//! Per-record mutual exclusion.
//!
//! [`IdLocks`] is a table of ids currently held. A holder gets an [`IdGuard`];
//! dropping it removes the id from the table and wakes waiters. Different ids
//! only share the brief table critical section.

use parking_lot::{Condvar, Mutex};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct IdLocks {
    held: Mutex<HashSet<Uuid>>,
    released: Condvar,
}

impl IdLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `id` is free, then hold it until the guard drops.
    pub fn lock(&self, id: Uuid) -> IdGuard<'_> {
        let mut held = self.held.lock();
        while held.contains(&id) {
            self.released.wait(&mut held);
        }
        held.insert(id);
        IdGuard { locks: self, id }
    }
}

/// RAII hold on one id.
#[derive(Debug)]
pub struct IdGuard<'a> {
    locks: &'a IdLocks,
    id: Uuid,
}

impl Drop for IdGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.id);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn held(locks: &IdLocks) -> usize {
        locks.held.lock().len()
    }

    #[test]
    fn test_guard_removes_entry() {
        let locks = IdLocks::new();
        let id = Uuid::new_v4();
        {
            let _guard = locks.lock(id);
            assert_eq!(held(&locks), 1);
        }
        assert_eq!(held(&locks), 0);
        let _again = locks.lock(id);
        assert_eq!(held(&locks), 1);
    }

    #[test]
    fn test_waiter_wakes_on_release() {
        let locks = Arc::new(IdLocks::new());
        let id = Uuid::new_v4();
        let acquired = Arc::new(AtomicUsize::new(0));
        let guard = locks.lock(id);

        let waiter = {
            let locks = Arc::clone(&locks);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _g = locks.lock(id);
                acquired.store(1, Ordering::SeqCst);
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        drop(guard);
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_distinct_ids_do_not_block() {
        let locks = IdLocks::new();
        let _a = locks.lock(Uuid::new_v4());
        let _b = locks.lock(Uuid::new_v4());
        assert_eq!(held(&locks), 2);
    }

    #[test]
    fn test_same_id_is_exclusive() {
        let locks = Arc::new(IdLocks::new());
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    for _ in 0..20 {
                        let _g = locks.lock(id);
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(held(&locks), 0);
    }
}
