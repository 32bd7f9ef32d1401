//! # Spin Mutex
//!
//! The plain CAS spinlock that underpins the whole locking family, the
//! [`RawLock`] seam the reentrant/advance wrappers build on, and the
//! OS-backed [`OsMutex`] alternative for code that genuinely wants to block.
//!
//! ## Fairness
//!
//! There is no ordering guarantee between competing acquirers - no FIFO
//! queue, no ticket. Starvation is possible under pathological contention.
//! That trade-off buys an uncontended acquire of a single CAS and an
//! unlock of a single release store.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::backoff::Backoff;

/// A raw mutual-exclusion primitive: lockable, unlockable, no payload.
///
/// Implementors guard *external* state (a queue index, a counter block);
/// the lock itself carries no data. The blanket [`guard`](RawLock::guard)
/// method provides scoped RAII acquisition over any implementor.
pub trait RawLock {
    /// Acquires the lock, blocking until it is held.
    fn lock(&self);

    /// Attempts to acquire the lock once.
    ///
    /// Returns `true` on success. Never blocks.
    fn try_lock(&self) -> bool;

    /// Releases the lock.
    ///
    /// Contract: the calling thread must hold the lock. Unlocking a lock
    /// you do not hold is a programmer error.
    fn unlock(&self);

    /// Acquires the lock for the current scope, releasing it on drop.
    #[inline]
    fn guard(&self) -> LockGuard<'_, Self>
    where
        Self: Sized,
    {
        self.lock();
        LockGuard { lock: self }
    }
}

/// Scoped lock over any [`RawLock`], released on drop.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: RawLock> {
    lock: &'a L,
}

impl<L: RawLock> Drop for LockGuard<'_, L> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

const UNLOCKED: u8 = 0;
const LOCKED: u8 = 1;

/// Simple mutex based on an atomic CAS over a byte flag.
///
/// `0` = unlocked, `1` = locked. At most one thread observes itself as the
/// holder between a successful [`lock`](SpinMutex::lock) /
/// [`try_lock`](SpinMutex::try_lock) and the matching
/// [`unlock`](SpinMutex::unlock).
///
/// ## Example
///
/// ```rust,ignore
/// let mutex = SpinMutex::new();
/// {
///     let _guard = mutex.guard();
///     // exclusive section
/// }
/// assert!(!mutex.is_locked());
/// ```
#[derive(Debug, Default)]
pub struct SpinMutex {
    state: AtomicU8,
}

impl SpinMutex {
    /// Creates a new, unlocked mutex.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(UNLOCKED),
        }
    }

    /// Best-effort probe of the locked flag.
    ///
    /// The answer may be stale by the time the caller acts on it.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) != UNLOCKED
    }

    /// Waits until the mutex is unlocked without acquiring it.
    ///
    /// Unbounded spin with backoff; returns with acquire ordering so the
    /// caller observes the holder's writes.
    pub fn wait(&self) {
        let mut backoff = Backoff::new();
        while self.state.load(Ordering::Acquire) != UNLOCKED {
            backoff.spin();
        }
    }
}

impl RawLock for SpinMutex {
    fn lock(&self) {
        let mut backoff = Backoff::new();
        while self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            // Spin on a plain read until the flag looks clear before
            // retrying the CAS: keeps the cache line shared while waiting.
            loop {
                backoff.spin();
                if self.state.load(Ordering::Relaxed) == UNLOCKED {
                    break;
                }
            }
        }
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    fn unlock(&self) {
        debug_assert!(self.is_locked(), "unlock of an unheld SpinMutex");
        // Only the holder may clear the flag, so a release store suffices.
        self.state.store(UNLOCKED, Ordering::Release);
    }
}

impl Drop for SpinMutex {
    fn drop(&mut self) {
        debug_assert!(!self.is_locked(), "SpinMutex dropped while locked");
    }
}

/// OS-backed mutex with the same [`RawLock`] surface.
///
/// The "native" side of the locking family: parks the thread instead of
/// spinning. Use it where the critical section is long enough that burning
/// a core is worse than a scheduler round-trip. Never used by the task
/// pool's own queue.
pub struct OsMutex {
    raw: parking_lot::RawMutex,
}

impl core::fmt::Debug for OsMutex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("OsMutex").finish_non_exhaustive()
    }
}

impl Default for OsMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl OsMutex {
    /// Creates a new, unlocked mutex.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            raw: <parking_lot::RawMutex as parking_lot::lock_api::RawMutex>::INIT,
        }
    }
}

impl RawLock for OsMutex {
    #[inline]
    fn lock(&self) {
        parking_lot::lock_api::RawMutex::lock(&self.raw);
    }

    #[inline]
    fn try_lock(&self) -> bool {
        parking_lot::lock_api::RawMutex::try_lock(&self.raw)
    }

    #[inline]
    fn unlock(&self) {
        // SAFETY: RawLock's contract requires the caller to hold the lock.
        unsafe { parking_lot::lock_api::RawMutex::unlock(&self.raw) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_lock_unlock() {
        let mutex = SpinMutex::new();
        assert!(!mutex.is_locked());

        mutex.lock();
        assert!(mutex.is_locked());

        mutex.unlock();
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_try_lock_fails_while_held() {
        let mutex = SpinMutex::new();
        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        mutex.unlock();
        assert!(mutex.try_lock());
        mutex.unlock();
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let mutex = SpinMutex::new();
        {
            let _guard = mutex.guard();
            assert!(mutex.is_locked());
        }
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_mutual_exclusion() {
        const THREADS: usize = 8;
        const ITERATIONS: usize = 10_000;

        struct Shared {
            mutex: SpinMutex,
            counter: std::cell::UnsafeCell<usize>,
        }
        // SAFETY: counter is only touched under the mutex.
        unsafe impl Sync for Shared {}

        let shared = Arc::new(Shared {
            mutex: SpinMutex::new(),
            counter: std::cell::UnsafeCell::new(0),
        });

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..ITERATIONS {
                        let _guard = shared.mutex.guard();
                        // SAFETY: the spin mutex is held.
                        unsafe { *shared.counter.get() += 1 };
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
    fn test_wait_observes_release() {
        let mutex = Arc::new(SpinMutex::new());
        mutex.lock();

        let waiter = {
            let mutex = Arc::clone(&mutex);
            std::thread::spawn(move || mutex.wait())
        };

        std::thread::sleep(std::time::Duration::from_millis(10));
        mutex.unlock();
        waiter.join().unwrap();
    }

    #[test]
    fn test_os_mutex_roundtrip() {
        let mutex = OsMutex::new();
        assert!(mutex.try_lock());
        assert!(!mutex.try_lock());
        mutex.unlock();
        let _guard = mutex.guard();
    }
}
