//! # HYDRA Task - Engine Threads and the CPU Pool
//!
//! Thread lifecycle and data-parallel execution for the HYDRA engine:
//! - [`EngineThread`]: named, stoppable worker threads with wake signaling,
//!   scheduling priority and CPU affinity
//! - A process-wide registry of engine thread roles plus the engine
//!   shutdown flag
//! - [`TaskPool`]: a fixed-capacity fork-join pool for CPU tasks
//!
//! ## Execution Model
//!
//! ```text
//!   caller                    queue (spin-guarded)           workers
//!   ──────                    ────────────────────           ───────
//!   run_async(task, n) ─────▶ n slices enqueued ──┬────────▶ process(0, n)
//!        │                                        ├────────▶ process(1, n)
//!        ▼                                        └────────▶ ...
//!   TaskHandle ◀──────────── active_threads hits 0: done(), state = Done
//!        │
//!   wait() or drop ────────── spin with backoff until Done
//! ```
//!
//! A [`TaskHandle`] waits for completion on drop, so a task can never
//! outlive the data it borrows through its `Arc`.

#![deny(missing_docs)]
#![allow(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod pool;
pub mod task;
pub mod thread;

mod error;
mod registry;

pub use config::PoolConfig;
pub use error::{ConfigError, RoleError, TaskError, ThreadError};
pub use pool::TaskPool;
pub use registry::{
    current_role, is_async_render_thread, is_async_thread, is_background_thread,
    is_file_stream_thread, is_gpu_stream_thread, is_main_thread, is_pool_thread, is_role,
    is_shutdown, register_current_thread, register_role, request_shutdown, ThreadRole,
};
pub use task::{task_fn, ClosureTask, CpuTask, TaskHandle};
pub use thread::{sleep, switch_thread, EngineThread, ThreadControl, ThreadProcess};
