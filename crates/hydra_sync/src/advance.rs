//! # Advance Mutex
//!
//! Any lock plus an independently readable "is locked" flag, so other code
//! can probe lock status without contending on the primitive itself.

use core::sync::atomic::{AtomicU8, Ordering};

use crate::spin::{RawLock, SpinMutex};

/// Wrapper adding an observable locked flag to any [`RawLock`].
///
/// The flag is maintained next to the underlying lock: set after a
/// successful acquire, cleared just before release. Probing it never
/// touches the primitive, so diagnostics and opportunistic `try_lock`
/// callers stay off the contended line.
#[derive(Debug)]
pub struct AdvanceMutex<L: RawLock = SpinMutex> {
    inner: L,
    flag: AtomicU8,
}

impl AdvanceMutex<SpinMutex> {
    /// Creates a new, unlocked advance mutex over a [`SpinMutex`].
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(),
            flag: AtomicU8::new(0),
        }
    }
}

impl Default for AdvanceMutex<SpinMutex> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: RawLock> AdvanceMutex<L> {
    /// Creates an advance wrapper over the given inner lock.
    #[inline]
    pub const fn with_lock(inner: L) -> Self {
        Self {
            inner,
            flag: AtomicU8::new(0),
        }
    }

    /// Probes the observable flag without touching the primitive.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Acquire) != 0
    }

    /// Blocks until the lock is released, if it currently looks held.
    pub fn wait(&self) {
        if self.is_locked() {
            self.wait_force();
        }
    }

    /// Unconditionally acquires and immediately releases the lock.
    pub fn wait_force(&self) {
        self.lock();
        self.unlock();
    }
}

impl<L: RawLock> RawLock for AdvanceMutex<L> {
    fn lock(&self) {
        self.inner.lock();
        self.flag.store(1, Ordering::Release);
    }

    fn try_lock(&self) -> bool {
        // Cheap flag probe first: a held lock never succeeds, and the probe
        // stays off the primitive's cache line.
        if self.is_locked() {
            return false;
        }
        if self.inner.try_lock() {
            self.flag.store(1, Ordering::Release);
            return true;
        }
        false
    }

    fn unlock(&self) {
        self.flag.store(0, Ordering::Release);
        self.inner.unlock();
    }
}
