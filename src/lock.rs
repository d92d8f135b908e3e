//! Non-waiting per-primary-key reader/writer lock.
//!
//! `try_acquire_read`/`try_acquire_write` never block: they fail fast and
//! hand the caller a guard that releases on drop. Every count mutation is
//! serialized through a single internal mutex per key, matching spec 4.12.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct LockState {
    readers: usize,
    writer: bool,
}

pub struct KeyLock {
    state: Mutex<LockState>,
}

impl KeyLock {
    fn new() -> Self {
        KeyLock {
            state: Mutex::new(LockState::default()),
        }
    }

    pub fn try_acquire_read(self: &Arc<Self>) -> Option<ReadGuard> {
        let mut state = self.state.lock().unwrap();
        if state.writer {
            return None;
        }
        state.readers += 1;
        Some(ReadGuard { lock: self.clone() })
    }

    pub fn try_acquire_write(self: &Arc<Self>) -> Option<WriteGuard> {
        let mut state = self.state.lock().unwrap();
        if state.writer || state.readers > 0 {
            return None;
        }
        state.writer = true;
        Some(WriteGuard { lock: self.clone() })
    }

    fn release_read(&self) {
        let mut state = self.state.lock().unwrap();
        state.readers = state.readers.saturating_sub(1);
    }

    fn release_write(&self) {
        let mut state = self.state.lock().unwrap();
        state.writer = false;
    }
}

pub struct ReadGuard {
    lock: Arc<KeyLock>,
}

impl Drop for ReadGuard {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

pub struct WriteGuard {
    lock: Arc<KeyLock>,
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

/// Table-wide map from primary-key value to its lock, created lazily on
/// first insert or lookup miss (spec 4.3 / 4.4).
#[derive(Default)]
pub struct LockMap {
    locks: Mutex<HashMap<i64, Arc<KeyLock>>>,
}

impl LockMap {
    pub fn new() -> Self {
        LockMap {
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, key: i64) -> Arc<KeyLock> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(key).or_insert_with(|| Arc::new(KeyLock::new())).clone()
    }

    pub fn rename(&self, old_key: i64, new_key: i64) {
        let mut locks = self.locks.lock().unwrap();
        if let Some(lock) = locks.remove(&old_key) {
            locks.insert(new_key, lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readers_dont_block_each_other() {
        let map = LockMap::new();
        let lock = map.get_or_create(1);
        let g1 = lock.try_acquire_read();
        let g2 = lock.try_acquire_read();
        assert!(g1.is_some());
        assert!(g2.is_some());
    }

    #[test]
    fn writer_excludes_everyone() {
        let map = LockMap::new();
        let lock = map.get_or_create(1);
        let _w = lock.try_acquire_write().unwrap();
        assert!(lock.try_acquire_read().is_none());
        assert!(lock.try_acquire_write().is_none());
    }

    #[test]
    fn release_on_drop_reopens_lock() {
        let map = LockMap::new();
        let lock = map.get_or_create(1);
        {
            let _w = lock.try_acquire_write().unwrap();
        }
        assert!(lock.try_acquire_write().is_some());
    }

    #[test]
    fn reader_blocks_writer() {
        let map = LockMap::new();
        let lock = map.get_or_create(1);
        let _r = lock.try_acquire_read().unwrap();
        assert!(lock.try_acquire_write().is_none());
    }
}
