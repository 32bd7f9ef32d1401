//! # Thread Identity
//!
//! Cheap numeric identity for the calling thread.
//!
//! The reentrant mutex and the thread-role registry both compare thread
//! identities as plain integers, so the identity must be a word that fits
//! in an atomic and must never collide with the "unowned" sentinel.

use core::sync::atomic::{AtomicU64, Ordering};

/// Sentinel identity meaning "no thread": larger than any id ever handed
/// out. Used as the unowned marker by [`ReentrantMutex`](crate::ReentrantMutex).
pub const UNOWNED_THREAD_ID: u64 = u64::MAX;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Returns the calling thread's process-unique identity.
///
/// Ids are assigned lazily, start at 1, and are never reused within a
/// process. Always strictly less than [`UNOWNED_THREAD_ID`].
#[inline]
#[must_use]
pub fn thread_id() -> u64 {
    THREAD_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_within_thread() {
        assert_eq!(thread_id(), thread_id());
    }

    #[test]
    fn test_distinct_across_threads() {
        let here = thread_id();
        let there = std::thread::spawn(thread_id).join().unwrap();
        assert_ne!(here, there);
        assert_ne!(here, UNOWNED_THREAD_ID);
        assert_ne!(there, UNOWNED_THREAD_ID);
    }
}
