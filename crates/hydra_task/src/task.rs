//! # CPU Tasks
//!
//! The work unit for the task pool and the completion handle callers hold
//! while it runs.
//!
//! A task is split into `threads_count` slices; each worker calls
//! [`CpuTask::process`] with its own `thread_index`. The last slice to
//! finish fires [`CpuTask::done`] once, then marks the state `Done`.

use std::sync::Arc;

use hydra_sync::{AtomicInt, Backoff};

use crate::registry::is_shutdown;

/// Sentinel stored in the active-slice counter once the task is complete.
const DONE: i32 = -1;

/// A unit of data-parallel CPU work.
///
/// `process` runs concurrently on every slice, so the task only gets
/// shared access to itself; interior state must be atomics or locks.
pub trait CpuTask: Send + Sync + 'static {
    /// Processes slice `thread_index` of `threads_count`.
    fn process(&self, thread_index: usize, threads_count: usize);

    /// Runs exactly once, on the worker that finishes the last slice.
    fn done(&self) {}
}

/// Shared completion state for one submitted task.
///
/// Holds the count of slices still running; `-1` means complete. The
/// counter only reaches zero once, so `done()` fires exactly once.
pub(crate) struct TaskState {
    active: AtomicInt<i32>,
}

impl TaskState {
    pub(crate) fn new(slices: i32) -> Self {
        debug_assert!(slices > 0);
        Self {
            active: AtomicInt::new(slices),
        }
    }

    /// Marks one slice finished; fires `done` on the last.
    ///
    /// Returns whether this call completed the task.
    pub(crate) fn finish_slice(&self, task: &dyn CpuTask) -> bool {
        if self.active.sub_fetch(1) == 0 {
            task.done();
            self.active.store(DONE);
            return true;
        }
        false
    }

    pub(crate) fn is_done(&self) -> bool {
        self.active.load() == DONE
    }

    /// Spins with backoff until the task completes.
    ///
    /// Also returns once engine shutdown is requested: a slice stranded in
    /// the queue after the workers drain out would otherwise pin the waiter
    /// forever.
    pub(crate) fn wait(&self) {
        let mut backoff = Backoff::new();
        while !self.is_done() && !is_shutdown() {
            backoff.spin();
        }
    }
}

/// Completion handle for an asynchronously submitted task.
///
/// **Waits on drop.** Letting the handle fall out of scope blocks until
/// every slice has run, so a task can never outlive data reachable through
/// it. Call [`wait`](TaskHandle::wait) to make the join explicit.
#[must_use = "dropping the handle blocks until the task completes"]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(state: Arc<TaskState>) -> Self {
        Self { state }
    }

    /// Returns whether every slice has finished and `done` has fired.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    /// Returns whether any slice is still queued or executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.is_done()
    }

    /// Blocks until the task completes. Spin with backoff, no OS park.
    ///
    /// Unblocks on engine shutdown even if slices never ran; check
    /// [`is_done`](TaskHandle::is_done) afterwards when that matters.
    pub fn wait(&self) {
        self.state.wait();
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.state.wait();
    }
}

impl core::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("done", &self.is_done())
            .finish()
    }
}

/// A [`CpuTask`] wrapping a plain closure.
pub struct ClosureTask<F> {
    body: F,
}

impl<F> ClosureTask<F>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    /// Wraps `body` as a task; called once per slice.
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F> CpuTask for ClosureTask<F>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    fn process(&self, thread_index: usize, threads_count: usize) {
        (self.body)(thread_index, threads_count);
    }
}

/// Wraps a closure as a shareable [`CpuTask`].
pub fn task_fn<F>(body: F) -> Arc<dyn CpuTask>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    Arc::new(ClosureTask::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingTask {
        processed: AtomicUsize,
        completed: AtomicUsize,
    }

    impl CpuTask for CountingTask {
        fn process(&self, _thread_index: usize, _threads_count: usize) {
            self.processed.fetch_add(1, Ordering::AcqRel);
        }

        fn done(&self) {
            self.completed.fetch_add(1, Ordering::AcqRel);
        }
    }

    #[test]
    fn test_done_fires_exactly_once() {
        const SLICES: usize = 6;

        let task = CountingTask {
            processed: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
        };
        let state = TaskState::new(SLICES as i32);

        for index in 0..SLICES {
            task.process(index, SLICES);
            state.finish_slice(&task);
        }

        assert!(state.is_done());
        assert_eq!(task.processed.load(Ordering::Acquire), SLICES);
        assert_eq!(task.completed.load(Ordering::Acquire), 1);
    }

    #[test]
    fn test_handle_drop_waits_for_completion() {
        let state = Arc::new(TaskState::new(1));

        let finisher = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(10));
                state.finish_slice(&ClosureTask::new(|_, _| {}));
            })
        };

        let handle = TaskHandle::new(Arc::clone(&state));
        drop(handle);
        // Drop returned, so the state must be fully complete.
        assert!(state.is_done());
        finisher.join().unwrap();
    }

    #[test]
    fn test_wait_is_idempotent() {
        let state = Arc::new(TaskState::new(1));
        state.finish_slice(&ClosureTask::new(|_, _| {}));

        let handle = TaskHandle::new(state);
        handle.wait();
        handle.wait();
        assert!(handle.is_done());
    }
}
