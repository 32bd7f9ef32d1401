//! # Thread Role Registry
//!
//! Process-wide identity for the engine's named threads, plus the sticky
//! engine shutdown flag. Subsystems ask "am I on the main thread?" or
//! "has shutdown been requested?" without holding a handle to anything.
//!
//! A role binds to exactly one thread for the life of the process:
//! registration is a one-shot claim, and a second claim is an error rather
//! than a silent hand-over.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::cell::Cell;

use hydra_sync::{thread_id, UNOWNED_THREAD_ID};

use crate::error::RoleError;

/// The engine's named thread roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum ThreadRole {
    /// The main engine loop.
    Main = 0,
    /// GPU resource streaming.
    GpuStream = 1,
    /// Filesystem streaming.
    FileStream = 2,
    /// General asynchronous work.
    Async = 3,
    /// Low-priority background work.
    Background = 4,
    /// Asynchronous render submission.
    AsyncRender = 5,
}

const ROLE_COUNT: usize = 6;

const ALL_ROLES: [ThreadRole; ROLE_COUNT] = [
    ThreadRole::Main,
    ThreadRole::GpuStream,
    ThreadRole::FileStream,
    ThreadRole::Async,
    ThreadRole::Background,
    ThreadRole::AsyncRender,
];

const UNOWNED: AtomicU64 = AtomicU64::new(UNOWNED_THREAD_ID);
static ROLE_OWNERS: [AtomicU64; ROLE_COUNT] = [UNOWNED; ROLE_COUNT];

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

thread_local! {
    static POOL_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Claims `role` for the calling thread.
///
/// Idempotent for the thread that already holds the role; an error if any
/// other thread does. Roles are never released.
pub fn register_current_thread(role: ThreadRole) -> Result<(), RoleError> {
    register_role(role, thread_id())
}

/// Claims `role` for the thread identified by `id`.
///
/// Bootstrap code uses this to wire a role to a thread it just spawned,
/// before that thread runs. Same one-shot semantics as
/// [`register_current_thread`]: idempotent for the current holder, an error
/// if another thread holds the role. The unowned sentinel is rejected.
pub fn register_role(role: ThreadRole, id: u64) -> Result<(), RoleError> {
    if id == UNOWNED_THREAD_ID {
        return Err(RoleError::ReservedThreadId(id));
    }
    let owner = &ROLE_OWNERS[role as usize];
    match owner.compare_exchange(UNOWNED_THREAD_ID, id, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => Ok(()),
        Err(current) if current == id => Ok(()),
        Err(_) => Err(RoleError::AlreadyRegistered(role)),
    }
}

/// Returns whether the calling thread holds `role`.
#[must_use]
pub fn is_role(role: ThreadRole) -> bool {
    ROLE_OWNERS[role as usize].load(Ordering::Acquire) == thread_id()
}

/// Returns the role held by the calling thread, if any.
#[must_use]
pub fn current_role() -> Option<ThreadRole> {
    let me = thread_id();
    ALL_ROLES
        .into_iter()
        .find(|&role| ROLE_OWNERS[role as usize].load(Ordering::Acquire) == me)
}

/// Returns whether the calling thread is the main engine thread.
#[must_use]
pub fn is_main_thread() -> bool {
    is_role(ThreadRole::Main)
}

/// Returns whether the calling thread is the GPU streaming thread.
#[must_use]
pub fn is_gpu_stream_thread() -> bool {
    is_role(ThreadRole::GpuStream)
}

/// Returns whether the calling thread is the file streaming thread.
#[must_use]
pub fn is_file_stream_thread() -> bool {
    is_role(ThreadRole::FileStream)
}

/// Returns whether the calling thread is the async work thread.
#[must_use]
pub fn is_async_thread() -> bool {
    is_role(ThreadRole::Async)
}

/// Returns whether the calling thread is the background work thread.
#[must_use]
pub fn is_background_thread() -> bool {
    is_role(ThreadRole::Background)
}

/// Returns whether the calling thread is the async render thread.
#[must_use]
pub fn is_async_render_thread() -> bool {
    is_role(ThreadRole::AsyncRender)
}

/// Returns whether the calling thread is a [`TaskPool`](crate::TaskPool)
/// worker.
#[must_use]
pub fn is_pool_thread() -> bool {
    POOL_THREAD.with(Cell::get)
}

/// Marks the calling thread as a pool worker. Set once at worker startup.
pub(crate) fn mark_pool_thread() {
    POOL_THREAD.with(|flag| flag.set(true));
}

/// Raises the engine shutdown flag.
///
/// Sticky: once raised it is never cleared for the life of the process.
/// Long-running loops poll [`is_shutdown`] and drain out.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Release);
    tracing::info!("engine shutdown requested");
}

/// Returns whether engine shutdown has been requested.
#[must_use]
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Acquire)
}
