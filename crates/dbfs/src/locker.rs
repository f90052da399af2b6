//! Advisory read/write locks keyed by file id

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

const WRITER: i32 = -1;

#[derive(Debug, Default)]
struct LockTable {
    /// Reader count, or WRITER for an exclusive holder
    locks: HashMap<i64, i32>,
    paused: bool,
    /// Bumped by clear() so that guards taken before it are ignored
    generation: u64,
}

/// In-memory lock table shared by the engine and its streams
#[derive(Debug, Default)]
pub struct FileLocker {
    table: Mutex<LockTable>,
}

impl FileLocker {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn table(&self) -> MutexGuard<'_, LockTable> {
        // The table stays consistent even if a holder panicked
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes a read or write lock on `id`. Returns None on contention or
    /// while paused.
    pub fn lock(self: &Arc<Self>, id: i64, write: bool) -> Option<FileLock> {
        let mut table = self.table();
        if table.paused {
            return None;
        }
        let count = table.locks.get(&id).copied().unwrap_or(0);
        if write {
            if count != 0 {
                return None;
            }
            _ = table.locks.insert(id, WRITER);
        } else {
            if count == WRITER {
                return None;
            }
            _ = table.locks.insert(id, count + 1);
        }
        diagnostics::debug!("Locked file {id} write={write}", id: id, write: write);
        Some(FileLock {
            locker: Arc::clone(self),
            id,
            generation: table.generation,
            released: false,
        })
    }

    /// Releases one holder of `id`
    pub fn unlock(&self, id: i64) {
        let mut table = self.table();
        Self::unlock_locked(&mut table, id);
    }

    fn unlock_locked(table: &mut LockTable, id: i64) {
        match table.locks.get(&id).copied() {
            Some(count) if count > 1 => {
                _ = table.locks.insert(id, count - 1);
            }
            Some(_) => {
                _ = table.locks.remove(&id);
            }
            None => {
                diagnostics::warn!("Unlock of file {id} that is not locked", id: id);
            }
        }
    }

    fn release(&self, id: i64, generation: u64) {
        let mut table = self.table();
        if table.generation == generation {
            Self::unlock_locked(&mut table, id);
        }
    }

    /// Rejects new locks. Returns true if nothing is currently locked.
    pub fn pause(&self) -> bool {
        let mut table = self.table();
        table.paused = true;
        table.locks.is_empty()
    }

    pub fn resume(&self) {
        self.table().paused = false;
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.table().paused
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.table().locks.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.table().locks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.is_idle()
    }

    /// Drops every lock. Outstanding guards become no-ops.
    pub fn clear(&self) {
        let mut table = self.table();
        table.locks.clear();
        table.generation += 1;
    }
}

/// A held lock, released when dropped
#[derive(Debug)]
pub struct FileLock {
    locker: Arc<FileLocker>,
    id: i64,
    generation: u64,
    released: bool,
}

impl FileLock {
    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.locker.release(self.id, self.generation);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_excludes_everyone() {
        let locker = FileLocker::new();
        let w = locker.lock(7, true).unwrap();
        assert!(locker.lock(7, true).is_none());
        assert!(locker.lock(7, false).is_none());
        assert!(locker.lock(8, true).is_some());
        drop(w);
        assert!(locker.lock(7, false).is_some());
    }

    #[test]
    fn test_readers_share() {
        let locker = FileLocker::new();
        let r1 = locker.lock(7, false).unwrap();
        let r2 = locker.lock(7, false).unwrap();
        assert!(locker.lock(7, true).is_none());
        r1.release();
        assert!(locker.lock(7, true).is_none());
        drop(r2);
        assert!(locker.is_idle());
        assert!(locker.lock(7, true).is_some());
    }

    #[test]
    fn test_pause_and_clear() {
        let locker = FileLocker::new();
        let r = locker.lock(1, false).unwrap();
        assert!(!locker.pause());
        assert!(locker.lock(2, false).is_none());

        locker.clear();
        assert!(locker.pause());
        locker.resume();

        let w = locker.lock(1, true).unwrap();
        // Guard from before clear() must not release the new holder
        drop(r);
        assert_eq!(locker.len(), 1);
        drop(w);
        assert!(locker.is_idle());
    }
}
