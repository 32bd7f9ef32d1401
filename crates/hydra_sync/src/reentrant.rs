//! # Reentrant Mutex
//!
//! A lock that may be re-acquired by the thread already holding it, layered
//! over any [`RawLock`]. Each `lock()` must be paired with exactly one
//! `unlock()`; the underlying lock is released on the last one.

use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::ident::{thread_id, UNOWNED_THREAD_ID};
use crate::spin::{RawLock, SpinMutex};

/// Reentrant wrapper over a [`RawLock`].
///
/// Holds the owner's thread identity next to the inner lock. Depth is only
/// ever touched by the owning thread, so it needs no ordering beyond the
/// acquire/release pair on the owner field.
///
/// ## Example
///
/// ```rust,ignore
/// let mutex = ReentrantSpinMutex::new();
/// mutex.lock();
/// mutex.lock();    // same thread: no deadlock, depth = 1
/// mutex.unlock();
/// mutex.unlock();  // now other threads may acquire
/// ```
#[derive(Debug)]
pub struct ReentrantMutex<L: RawLock = SpinMutex> {
    owner: AtomicU64,
    depth: AtomicU32,
    inner: L,
}

impl<L: RawLock + Default> Default for ReentrantMutex<L> {
    fn default() -> Self {
        Self::with_lock(L::default())
    }
}

/// The default reentrant lock: [`ReentrantMutex`] over a [`SpinMutex`].
pub type ReentrantSpinMutex = ReentrantMutex<SpinMutex>;

impl ReentrantMutex<SpinMutex> {
    /// Creates a new, unowned reentrant spin mutex.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNOWNED_THREAD_ID),
            depth: AtomicU32::new(0),
            inner: SpinMutex::new(),
        }
    }
}

impl<L: RawLock> ReentrantMutex<L> {
    /// Creates a reentrant wrapper over the given inner lock.
    #[inline]
    pub const fn with_lock(inner: L) -> Self {
        Self {
            owner: AtomicU64::new(UNOWNED_THREAD_ID),
            depth: AtomicU32::new(0),
            inner,
        }
    }

    /// Returns whether any thread currently owns the lock.
    ///
    /// Best-effort probe; may be stale immediately.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != UNOWNED_THREAD_ID
    }

    /// Blocks until the lock is released by its current owner.
    ///
    /// Returns immediately if the lock is unowned or owned by the calling
    /// thread. Acquires and releases otherwise.
    pub fn wait(&self) {
        let owner = self.owner.load(Ordering::Acquire);
        if owner == UNOWNED_THREAD_ID || owner == thread_id() {
            return;
        }
        self.wait_force();
    }

    /// Unconditionally acquires and immediately releases the lock.
    ///
    /// A full barrier against the current owner: once this returns, the
    /// owner's critical section has ended at least once.
    pub fn wait_force(&self) {
        self.lock();
        self.unlock();
    }
}

impl<L: RawLock> RawLock for ReentrantMutex<L> {
    fn lock(&self) {
        let me = thread_id();
        if self.owner.load(Ordering::Acquire) == me {
            let depth = self.depth.fetch_add(1, Ordering::Relaxed);
            debug_assert!(depth < u32::MAX, "reentrant depth overflow");
        } else {
            self.inner.lock();
            self.owner.store(me, Ordering::Release);
        }
    }

    fn try_lock(&self) -> bool {
        let me = thread_id();
        if self.owner.load(Ordering::Acquire) == me {
            let depth = self.depth.fetch_add(1, Ordering::Relaxed);
            debug_assert!(depth < u32::MAX, "reentrant depth overflow");
        } else {
            if !self.inner.try_lock() {
                return false;
            }
            self.owner.store(me, Ordering::Release);
        }
        true
    }

    fn unlock(&self) {
        debug_assert_eq!(
            self.owner.load(Ordering::Acquire),
            thread_id(),
            "unlock of a ReentrantMutex the thread does not own"
        );
        if self.depth.load(Ordering::Relaxed) > 0 {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        } else {
            self.owner.store(UNOWNED_THREAD_ID, Ordering::Release);
            self.inner.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_reentry_does_not_deadlock() {
        let mutex = ReentrantSpinMutex::new();
        mutex.lock();
        mutex.lock();
        mutex.lock();
        assert!(mutex.is_locked());
        mutex.unlock();
        mutex.unlock();
        assert!(mutex.is_locked());
        mutex.unlock();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_try_lock_reenters_for_owner() {
        let mutex = ReentrantSpinMutex::new();
        assert!(mutex.try_lock());
        assert!(mutex.try_lock());
        mutex.unlock();
        mutex.unlock();
    }

    #[test]
    fn test_released_only_after_matching_unlocks() {
        let mutex = Arc::new(ReentrantSpinMutex::new());
        let acquired = Arc::new(AtomicUsize::new(0));

        mutex.lock();
        mutex.lock();

        let contender = {
            let mutex = Arc::clone(&mutex);
            let acquired = Arc::clone(&acquired);
            std::thread::spawn(move || {
                mutex.lock();
                acquired.store(1, Ordering::Release);
                mutex.unlock();
            })
        };

        // One unlock is not enough: the other thread must still be out.
        mutex.unlock();
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(acquired.load(Ordering::Acquire), 0);

        mutex.unlock();
        contender.join().unwrap();
        assert_eq!(acquired.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_mutual_exclusion_between_threads() {
        const THREADS: usize = 4;
        const ITERATIONS: usize = 5_000;

        struct Shared {
            mutex: ReentrantSpinMutex,
            counter: std::cell::UnsafeCell<usize>,
        }
        // SAFETY: counter is only touched under the mutex.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            mutex: ReentrantSpinMutex::new(),
            counter: std::cell::UnsafeCell::new(0),
        });

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        shared.mutex.lock();
                        // Nested acquire on purpose.
                        shared.mutex.lock();
                        // SAFETY: the mutex is held.
                        unsafe { *shared.counter.get() += 1 };
                        shared.mutex.unlock();
                        shared.mutex.unlock();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        // SAFETY: all writers have joined.
        assert_eq!(unsafe { *shared.counter.get() }, THREADS * ITERATIONS);
    }

    #[test]
    fn test_wait_returns_for_owner() {
        let mutex = ReentrantSpinMutex::new();
        mutex.lock();
        // Must not deadlock: the owner is us.
        mutex.wait();
        mutex.unlock();
    }
}
