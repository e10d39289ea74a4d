//! Guards tie a held stamp to a scope, the same way a `MutexGuard` does:
//! the only way to get one is to lock, dropping it is the unlock.
//!
//! The lock doesn't own the protected data, so unlike a `MutexGuard` these don't Deref to anything.

use tracing::warn;

use super::{Stamp, StampedLock};

/// A held read lock, released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
pub struct ReadGuard<'a> {
    lock: &'a StampedLock,
    stamp: Stamp,
}

impl<'a> ReadGuard<'a> {
    pub(crate) fn new(lock: &'a StampedLock, stamp: Stamp) -> Self {
        Self { lock, stamp }
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        // only fails if someone unlocked our stamp behind the guard's back
        if let Err(e) = self.lock.unlock_read(self.stamp) {
            warn!(error = %e, "read guard dropped on a lock it no longer holds");
        }
    }
}

/// A held write lock, released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
pub struct WriteGuard<'a> {
    lock: &'a StampedLock,
    stamp: Stamp,
}

impl<'a> WriteGuard<'a> {
    pub(crate) fn new(lock: &'a StampedLock, stamp: Stamp) -> Self {
        Self { lock, stamp }
    }

    pub fn stamp(&self) -> Stamp {
        self.stamp
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock_write(self.stamp) {
            warn!(error = %e, "write guard dropped on a lock it no longer holds");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_guards_release_on_drop() {
        let lock = StampedLock::new();
        {
            let a = lock.read();
            let b = lock.read();
            assert_eq!(lock.read_lock_count(), 2);
            assert!(lock.validate(a.stamp()));
            assert_ne!(a.stamp(), b.stamp());
        }
        assert!(!lock.is_read_locked());

        let before = lock.version();
        {
            let w = lock.write();
            assert!(lock.is_write_locked());
            assert!(w.stamp().is_write_lock());
            assert!(lock.try_read_lock().is_none());
        }
        assert!(!lock.is_write_locked());
        assert_eq!(lock.version(), before + 1);
    }

    #[test]
    fn test_guard_survives_manual_unlock() {
        let lock = StampedLock::new();
        let guard = lock.write();
        assert!(lock.try_unlock_write());
        // the drop finds nothing to release and leaves the lock alone
        drop(guard);
        assert!(!lock.is_write_locked());
        assert_eq!(lock.version(), 1);
    }
}
