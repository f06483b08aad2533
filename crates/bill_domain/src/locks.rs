use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bill::BillId;

/// One lazily created mutex per bill id. An entry lives only while some
/// caller holds or waits on it.
#[derive(Debug, Default)]
pub struct BillLocks {
    locks: Mutex<HashMap<BillId, Arc<Mutex<()>>>>,
}

impl BillLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `id`.
    pub fn with<T>(&self, id: BillId, f: impl FnOnce() -> T) -> T {
        let lock = self.locks.lock().entry(id).or_default().clone();
        let result = {
            let _guard = lock.lock();
            f()
        };
        let mut locks = self.locks.lock();
        // Clones are only taken under the map lock, so this count is stable.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&id);
        }
        result
    }

    /// Ids that currently have a live lock.
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
