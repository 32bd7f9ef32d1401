//! # Reader-Writer Spinlock
//!
//! Write-preferring readers-writer lock: a reader count plus a writer flag.
//!
//! ## The Core Invariant
//!
//! A reader checks the writer flag **before and after** incrementing the
//! reader count. If a writer committed in between, the reader backs out and
//! retries. That ordering is what keeps a continuous stream of new readers
//! from starving a writer, and what keeps a reader from slipping inside
//! once a writer has committed.

use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::backoff::Backoff;
use crate::spin::RawLock;

const WRITER_CLEAR: u8 = 0;
const WRITER_SET: u8 = 1;

/// Write-preferring readers-writer mutex spin lock.
///
/// Any number of readers may hold the lock concurrently while the writer
/// flag is clear; a writer first wins the flag (announcing intent, which
/// blocks new readers from completing acquisition), then drains the reader
/// count to zero before proceeding.
///
/// ## Example
///
/// ```rust,ignore
/// let lock = RwSpinLock::new();
/// {
///     let _read = lock.read();
///     // shared section
/// }
/// {
///     let _write = lock.write();
///     // exclusive section
/// }
/// ```
#[derive(Debug, Default)]
pub struct RwSpinLock {
    readers: AtomicU32,
    writer: AtomicU8,
}

impl RwSpinLock {
    /// Creates a new, unheld lock.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            readers: AtomicU32::new(0),
            writer: AtomicU8::new(WRITER_CLEAR),
        }
    }

    /// Acquires the lock for shared reading.
    pub fn lock_read(&self) {
        let mut backoff = Backoff::new();
        loop {
            while self.writer.load(Ordering::Acquire) != WRITER_CLEAR {
                backoff.spin();
            }

            self.readers.fetch_add(1, Ordering::AcqRel);
            if self.writer.load(Ordering::Acquire) == WRITER_CLEAR {
                return;
            }
            // A writer committed between our check and our increment:
            // back out so it can drain, then retry.
            self.readers.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Attempts a single shared acquisition. Never blocks.
    #[must_use]
    pub fn try_lock_read(&self) -> bool {
        if self.writer.load(Ordering::Acquire) != WRITER_CLEAR {
            return false;
        }

        self.readers.fetch_add(1, Ordering::AcqRel);
        if self.writer.load(Ordering::Acquire) == WRITER_CLEAR {
            return true;
        }

        self.readers.fetch_sub(1, Ordering::AcqRel);
        false
    }

    /// Releases one shared acquisition.
    #[inline]
    pub fn unlock_read(&self) {
        let previous = self.readers.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "unlock_read with no readers inside");
    }

    /// Acquires the lock for exclusive writing.
    ///
    /// Wins the writer flag first, then spins until the reader count drains
    /// to zero.
    pub fn lock_write(&self) {
        let mut backoff = Backoff::new();
        loop {
            while self.writer.load(Ordering::Acquire) != WRITER_CLEAR {
                backoff.spin();
            }

            if self
                .writer
                .compare_exchange(
                    WRITER_CLEAR,
                    WRITER_SET,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                while self.readers.load(Ordering::Acquire) != 0 {
                    backoff.spin();
                }
                return;
            }
        }
    }

    /// Attempts a single exclusive acquisition. Never blocks on the flag,
    /// but does drain in-flight readers once the flag is won.
    #[must_use]
    pub fn try_lock_write(&self) -> bool {
        if self.writer.load(Ordering::Acquire) != WRITER_CLEAR
            || self.readers.load(Ordering::Acquire) != 0
        {
            return false;
        }

        if self
            .writer
            .compare_exchange(
                WRITER_CLEAR,
                WRITER_SET,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return false;
        }

        let mut backoff = Backoff::new();
        while self.readers.load(Ordering::Acquire) != 0 {
            backoff.spin();
        }
        true
    }

    /// Releases the exclusive acquisition.
    #[inline]
    pub fn unlock_write(&self) {
        debug_assert_eq!(
            self.writer.load(Ordering::Acquire),
            WRITER_SET,
            "unlock_write with no writer inside"
        );
        self.writer.store(WRITER_CLEAR, Ordering::Release);
    }

    /// Acquires a shared scoped guard.
    #[inline]
    pub fn read(&self) -> ReadGuard<'_> {
        self.lock_read();
        ReadGuard { lock: self }
    }

    /// Acquires an exclusive scoped guard.
    #[inline]
    pub fn write(&self) -> WriteGuard<'_> {
        self.lock_write();
        WriteGuard { lock: self }
    }
}

/// Maps the plain-lock surface onto the write side, so an `RwSpinLock` can
/// stand anywhere a [`RawLock`] is expected.
impl RawLock for RwSpinLock {
    #[inline]
    fn lock(&self) {
        self.lock_write();
    }

    #[inline]
    fn try_lock(&self) -> bool {
        self.try_lock_write()
    }

    #[inline]
    fn unlock(&self) {
        self.unlock_write();
    }
}

/// Scoped reader lock, released on drop.
#[must_use = "the read lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ReadGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for ReadGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock_read();
    }
}

/// Scoped writer lock, released on drop.
#[must_use = "the write lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct WriteGuard<'a> {
    lock: &'a RwSpinLock,
}

impl Drop for WriteGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_multiple_readers_coexist() {
        let lock = RwSpinLock::new();
        let first = lock.read();
        let second = lock.read();
        assert!(lock.try_lock_read());
        lock.unlock_read();
        drop(first);
        drop(second);
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = RwSpinLock::new();
        let write = lock.write();
        assert!(!lock.try_lock_read());
        drop(write);
        assert!(lock.try_lock_read());
        lock.unlock_read();
    }

    #[test]
    fn test_reader_excludes_writer() {
        let lock = RwSpinLock::new();
        let read = lock.read();
        assert!(!lock.try_lock_write());
        drop(read);
        assert!(lock.try_lock_write());
        lock.unlock_write();
    }

    #[test]
    fn test_readers_never_observe_active_writer() {
        const READERS: usize = 4;
        const ROUNDS: usize = 2_000;

        struct Shared {
            lock: RwSpinLock,
            writer_inside: AtomicBool,
        }

        let shared = Arc::new(Shared {
            lock: RwSpinLock::new(),
            writer_inside: AtomicBool::new(false),
        });

        let readers: Vec<_> = (0..READERS)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        let _guard = shared.lock.read();
                        assert!(
                            !shared.writer_inside.load(Ordering::Acquire),
                            "reader overlapped an active writer"
                        );
                    }
                })
            })
            .collect();

        let writer = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let _guard = shared.lock.write();
                    shared.writer_inside.store(true, Ordering::Release);
                    core::hint::spin_loop();
                    shared.writer_inside.store(false, Ordering::Release);
                }
            })
        };

        for handle in readers {
            handle.join().unwrap();
        }
        writer.join().unwrap();
    }
}
