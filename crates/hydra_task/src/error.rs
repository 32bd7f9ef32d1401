//! # Task Errors
//!
//! Error types for thread control, pool submission and configuration.

use thiserror::Error;

/// Errors from [`EngineThread`](crate::EngineThread) lifecycle operations.
#[derive(Debug, Error)]
pub enum ThreadError {
    /// `run` was called while the thread is already running.
    #[error("thread is already running")]
    AlreadyRunning,

    /// A control operation needs a running thread and there is none.
    #[error("thread is not running")]
    NotRunning,

    /// Priority outside the engine range.
    #[error("priority {0} outside the engine range [-3, 3]")]
    PriorityOutOfRange(i32),

    /// An empty CPU affinity mask selects no core to run on.
    #[error("affinity mask selects no CPU")]
    EmptyAffinityMask,

    /// The operation has no implementation on this platform.
    #[error("operation not supported on this platform")]
    Unsupported,

    /// The thread body panicked; observed on join.
    #[error("thread panicked")]
    Panicked,

    /// The underlying OS call failed.
    #[error("os error: {0}")]
    Os(#[from] std::io::Error),
}

/// Errors from submitting work to the [`TaskPool`](crate::TaskPool).
#[derive(Debug, Error)]
pub enum TaskError {
    /// The fixed-capacity queue cannot take the requested slices.
    ///
    /// Submission is all-or-nothing: no partial task is ever queued.
    #[error("task queue full: {requested} slices requested, {available} of {capacity} slots free")]
    QueueFull {
        /// Slices the submission needed.
        requested: usize,
        /// Slots that were free at submission time.
        available: usize,
        /// Total queue capacity.
        capacity: usize,
    },

    /// The pool is shutting down and no longer accepts work.
    #[error("task pool is shut down")]
    ShutDown,
}

/// Errors from the thread role registry.
#[derive(Debug, Error)]
pub enum RoleError {
    /// The role is already held by another thread.
    ///
    /// Roles are assigned once at startup and never move between live
    /// threads; re-registration is a wiring bug, not a runtime condition.
    #[error("thread role {0:?} is already registered to another thread")]
    AlreadyRegistered(crate::registry::ThreadRole),

    /// The id is the unowned sentinel and can never hold a role.
    #[error("thread id {0:#x} is reserved and cannot hold a role")]
    ReservedThreadId(u64),
}

/// Errors from loading or validating a [`PoolConfig`](crate::PoolConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML source failed to parse.
    #[error("invalid pool config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Parsed fine but the values are out of range.
    #[error("invalid pool config: {0}")]
    Invalid(String),
}
