// Copyright (c) 2025 Leonard Contributors
// Licensed under the MIT License. See LICENSE file for details.

//! Resilient lock helpers.
//!
//! Lock poisoning occurs when a thread panics while holding a lock. For the
//! shared client state (resource collections, active download set) stale data
//! is preferable to propagating the panic, so these helpers log the event and
//! recover the guard instead of unwrapping.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Acquire a read lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "sync",
                event = "LOCK_POISONED_READ",
                "RwLock was poisoned during read acquisition; recovering data"
            );
            poisoned.into_inner()
        }
    }
}

/// Acquire a write lock, recovering from poisoning if necessary.
#[inline]
pub fn resilient_write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::error!(
                target: "sync",
                event = "LOCK_POISONED_WRITE",
                "RwLock was poisoned during write acquisition; recovering data"
            );
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_resilient_read_normal() {
        let lock = RwLock::new(42);
        let guard = resilient_read(&lock);
        assert_eq!(*guard, 42);
    }

    #[test]
    fn test_resilient_write_normal() {
        let lock = RwLock::new(42);
        {
            let mut guard = resilient_write(&lock);
            *guard = 100;
        }
        assert_eq!(*resilient_read(&lock), 100);
    }

    #[test]
    fn test_resilient_read_poisoned() {
        let lock = Arc::new(RwLock::new(42));
        let lock_clone = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let _guard = lock_clone.write().unwrap();
            panic!("intentional panic to poison lock");
        });
        let _ = handle.join();

        let guard = resilient_read(&lock);
        assert_eq!(*guard, 42);
    }
}
