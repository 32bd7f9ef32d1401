//! # HYDRA Sync - Lock-Free Foundation
//!
//! Spin-based synchronization primitives for the HYDRA engine:
//! - Exponential backoff for every spin-wait loop
//! - A spinlock family (plain, reentrant, reader-writer, advance)
//! - Generic atomic cells with automatic lock-free / guarded selection
//!
//! ## Architecture Rules
//!
//! 1. **No OS mutex on the hot path** - worker queues and task counters are
//!    guarded exclusively by the primitives in this crate
//! 2. **Unlock is a release store** - only the holder may clear a lock, so
//!    no CAS is spent on the way out
//! 3. **Waits are unbounded** - no primitive exposes a timed wait; the
//!    fast path stays fast and liveness is the caller's contract
//!
//! ## Example
//!
//! ```rust,ignore
//! use hydra_sync::{SpinMutex, Atomic};
//!
//! let lock = SpinMutex::new();
//! let _guard = lock.guard();
//! // critical section, released on drop
//! ```

#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod atomic;
pub mod backoff;
pub mod spin;

mod advance;
mod ident;
mod reentrant;
mod rwlock;

pub use advance::AdvanceMutex;
pub use atomic::{Atomic, AtomicBool8, AtomicDouble, AtomicFloat, AtomicInt, AtomicPtrCell};
pub use backoff::Backoff;
pub use ident::{thread_id, UNOWNED_THREAD_ID};
pub use reentrant::{ReentrantMutex, ReentrantSpinMutex};
pub use rwlock::{ReadGuard, RwSpinLock, WriteGuard};
pub use spin::{LockGuard, OsMutex, RawLock, SpinMutex};
