//! Thread-safe object pooling for allocation reuse.
//!
//! A [`SyncPool<T>`] hands out [`PoolGuard`]s. When a guard drops, the value
//! is [reset](Poolable::reset) and returned to the pool, keeping its
//! allocations (`Vec`/`HashMap` capacity) alive for the next user.
//!
//! # Example
//!
//! ```
//! use redlilium_core::pool::{Poolable, SyncPool};
//!
//! #[derive(Debug, Default)]
//! struct Scratch {
//!     data: Vec<u8>,
//! }
//!
//! impl Poolable for Scratch {
//!     fn new_empty() -> Self {
//!         Self::default()
//!     }
//!     fn reset(&mut self) {
//!         self.data.clear();
//!     }
//! }
//!
//! let pool = SyncPool::<Scratch>::new();
//! {
//!     let mut scratch = pool.acquire();
//!     scratch.data.extend_from_slice(&[1, 2, 3]);
//! }
//! assert_eq!(pool.idle_count(), 1);
//! assert!(pool.acquire().data.is_empty());
//! ```

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

/// Trait for types that can be pooled and reused.
///
/// Implementors must be able to create an empty instance and clear their
/// contents while preserving allocated capacity.
pub trait Poolable {
    /// Create a new empty instance for pool initialization.
    fn new_empty() -> Self;

    /// Reset the value to an empty state, preserving allocated capacity.
    ///
    /// For example, call `Vec::clear()` rather than replacing with a new `Vec`.
    fn reset(&mut self);
}

/// A pool of reusable values guarded by a short lock.
///
/// Acquire and release only hold the lock for a `Vec` push/pop, so the pool
/// can be shared by worker threads.
pub struct SyncPool<T: Poolable> {
    idle: Mutex<Vec<T>>,
}

impl<T: Poolable> SyncPool<T> {
    /// Creates an empty pool.
    pub const fn new() -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
        }
    }

    /// Takes an idle value (or creates a new empty one).
    pub fn acquire(&self) -> PoolGuard<'_, T> {
        let value = self.idle.lock().pop().unwrap_or_else(T::new_empty);
        PoolGuard { pool: self, value }
    }

    /// Number of values waiting for reuse.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut value: T) {
        value.reset();
        self.idle.lock().push(value);
    }
}

impl<T: Poolable> Default for SyncPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Poolable> fmt::Debug for SyncPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncPool")
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// A value borrowed from a [`SyncPool`]; returned to the pool on drop.
pub struct PoolGuard<'a, T: Poolable> {
    pool: &'a SyncPool<T>,
    value: T,
}

impl<T: Poolable> Deref for PoolGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Poolable> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: Poolable> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        let value = std::mem::replace(&mut self.value, T::new_empty());
        self.pool.release(value);
    }
}

impl<T: Poolable + fmt::Debug> fmt::Debug for PoolGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct TestBuffer {
        data: Vec<u32>,
    }

    impl Poolable for TestBuffer {
        fn new_empty() -> Self {
            Self::default()
        }
        fn reset(&mut self) {
            self.data.clear();
        }
    }

    #[test]
    fn acquire_from_empty_pool_creates_value() {
        let pool = SyncPool::<TestBuffer>::new();
        let guard = pool.acquire();
        assert!(guard.data.is_empty());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn dropped_guard_is_reset_and_keeps_capacity() {
        let pool = SyncPool::<TestBuffer>::new();
        {
            let mut guard = pool.acquire();
            guard.data.extend(0..100);
        }
        assert_eq!(pool.idle_count(), 1);

        let guard = pool.acquire();
        assert!(guard.data.is_empty());
        assert!(guard.data.capacity() >= 100);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn pool_is_shared_across_threads() {
        let pool = SyncPool::<TestBuffer>::new();
        std::thread::scope(|s| {
            for i in 0..4 {
                let pool = &pool;
                s.spawn(move || {
                    let mut guard = pool.acquire();
                    guard.data.push(i);
                });
            }
        });
        assert!(pool.idle_count() >= 1);
        assert!(pool.idle_count() <= 4);
    }
}
