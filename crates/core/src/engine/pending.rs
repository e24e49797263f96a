//! Registry of ingests that have committed to the store but may not be indexed yet.
//!
//! Reconciliation skips these ids so it never races an ingest that is still
//! inside its store-then-index window.

use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct PendingSet {
    // id -> number of in-flight operations on it
    ids: Mutex<HashMap<Uuid, usize>>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` in flight until the returned guard drops.
    pub fn register(&self, id: Uuid) -> PendingGuard<'_> {
        *self.ids.lock().entry(id).or_insert(0) += 1;
        PendingGuard { set: self, id }
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.ids.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, id: &Uuid) {
        let mut ids = self.ids.lock();
        if let Some(count) = ids.get_mut(id) {
            *count -= 1;
            if *count == 0 {
                ids.remove(id);
            }
        }
    }
}

/// Deregisters its id on drop, on both success and error paths.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    set: &'a PendingSet,
    id: Uuid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.set.release(&self.id);
    }
}
