//! # CPU Task Pool
//!
//! Fixed-capacity fork-join pool. Submission splits a task into slices and
//! pushes them onto a spin-guarded queue; parked workers are woken through
//! a channel, one token per slice.
//!
//! ## Queue Policy
//!
//! The queue never grows and never blocks the submitter: when the free
//! slots cannot take every slice of a task, submission fails whole with
//! [`TaskError::QueueFull`] and nothing is enqueued. Callers that can
//! tolerate waiting retry; callers that cannot skip the parallel path.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};
use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use hydra_sync::{AtomicInt, Backoff, RawLock, SpinMutex};

use crate::config::PoolConfig;
use crate::error::{TaskError, ThreadError};
use crate::registry::{is_shutdown, mark_pool_thread};
use crate::task::{task_fn, CpuTask, TaskHandle, TaskState};
use crate::thread::{EngineThread, ThreadControl};

/// One queued slice of a submitted task.
struct Slice {
    task: Arc<dyn CpuTask>,
    state: Arc<TaskState>,
    thread_index: usize,
    threads_count: usize,
}

/// The slice queue: a deque under a [`SpinMutex`].
///
/// Critical sections are a push or pop of one element, short enough that
/// spinning beats an OS mutex at every contention level the pool sees.
struct SliceQueue {
    lock: SpinMutex,
    slices: UnsafeCell<VecDeque<Slice>>,
}

// SAFETY: `slices` is only touched while `lock` is held.
unsafe impl Sync for SliceQueue {}

impl SliceQueue {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            lock: SpinMutex::new(),
            slices: UnsafeCell::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Pushes every slice or none. Returns the free slot count on failure.
    fn push_all(&self, capacity: usize, batch: Vec<Slice>) -> Result<(), usize> {
        let _guard = self.lock.guard();
        // SAFETY: the spin mutex is held.
        let slices = unsafe { &mut *self.slices.get() };
        let available = capacity - slices.len();
        if batch.len() > available {
            return Err(available);
        }
        slices.extend(batch);
        Ok(())
    }

    fn pop(&self) -> Option<Slice> {
        let _guard = self.lock.guard();
        // SAFETY: the spin mutex is held.
        unsafe { (*self.slices.get()).pop_front() }
    }

    fn len(&self) -> usize {
        let _guard = self.lock.guard();
        // SAFETY: the spin mutex is held.
        unsafe { (*self.slices.get()).len() }
    }
}

struct PoolShared {
    queue: SliceQueue,
    capacity: usize,
    /// Tasks submitted and not yet complete.
    active_tasks: AtomicInt<usize>,
    stopping: AtomicBool,
    wake_rx: Receiver<()>,
}

impl PoolShared {
    /// Pops and runs one slice. Returns whether anything was there.
    fn run_one(&self) -> bool {
        let Some(slice) = self.queue.pop() else {
            return false;
        };
        slice.task.process(slice.thread_index, slice.threads_count);
        if slice.state.finish_slice(&*slice.task) {
            self.active_tasks.fetch_sub(1);
        }
        true
    }
}

/// Fork-join pool over a fixed set of [`EngineThread`] workers.
///
/// ## Example
///
/// ```rust,ignore
/// let pool = TaskPool::new(PoolConfig::default())?;
/// let chunks = 8;
/// pool.run_sync_fn(chunks, |index, count| {
///     // process chunk `index` of `count`
/// })?;
/// ```
pub struct TaskPool {
    shared: Arc<PoolShared>,
    workers: Vec<EngineThread>,
    wake_tx: Sender<()>,
}

impl TaskPool {
    /// Starts the pool with `config.effective_workers()` worker threads.
    ///
    /// Worker priority and pinning failures are logged and ignored: they
    /// degrade performance, not correctness, and commonly need privileges
    /// the process does not have.
    pub fn new(config: PoolConfig) -> Result<Self, ThreadError> {
        let worker_count = config.effective_workers().max(1);
        let capacity = config.queue_capacity;
        let (wake_tx, wake_rx) = crossbeam_channel::unbounded();

        let shared = Arc::new(PoolShared {
            queue: SliceQueue::with_capacity(capacity),
            capacity,
            active_tasks: AtomicInt::new(0),
            stopping: AtomicBool::new(false),
            wake_rx,
        });

        let mut workers: Vec<EngineThread> = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let worker_shared = Arc::clone(&shared);
            let mut worker = EngineThread::new(format!("hydra_worker_{index}"));
            let spawned = worker.run(move |control: &ThreadControl| {
                worker_loop(&worker_shared, control, index);
            });
            if let Err(error) = spawned {
                // Unpark the workers already started so their drops can join.
                for started in &workers {
                    started.request_stop();
                }
                for _ in &workers {
                    let _ = wake_tx.send(());
                }
                return Err(error);
            }

            if config.worker_priority != 0 {
                if let Err(error) = worker.set_priority(config.worker_priority) {
                    tracing::warn!(worker = index, %error, "worker priority not applied");
                }
            }
            if config.pin_workers {
                if let Err(error) = worker.set_affinity(1 << (index % 64)) {
                    tracing::warn!(worker = index, %error, "worker pinning not applied");
                }
            }
            workers.push(worker);
        }

        tracing::info!(workers = worker_count, capacity, "task pool started");
        Ok(Self {
            shared,
            workers,
            wake_tx,
        })
    }

    /// Number of worker threads.
    #[must_use]
    pub fn workers_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue capacity in slices.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Slices currently waiting in the queue.
    #[must_use]
    pub fn queued_slices(&self) -> usize {
        self.shared.queue.len()
    }

    /// Tasks submitted and not yet complete.
    #[must_use]
    pub fn active_tasks(&self) -> usize {
        self.shared.active_tasks.load()
    }

    /// Returns whether the pool still accepts submissions.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.shared.stopping.load(Ordering::Acquire) && !is_shutdown()
    }

    /// The calling worker's index in its pool, or `None` off the pool.
    #[must_use]
    pub fn current_worker_index() -> Option<usize> {
        WORKER_INDEX.with(std::cell::Cell::get)
    }

    /// Submits `task` split into `threads` slices; returns immediately.
    ///
    /// `threads == 0` means one slice per worker. The returned handle
    /// waits for completion on drop.
    pub fn run_async(
        &self,
        task: Arc<dyn CpuTask>,
        threads: usize,
    ) -> Result<TaskHandle, TaskError> {
        if self.shared.stopping.load(Ordering::Acquire) || is_shutdown() {
            return Err(TaskError::ShutDown);
        }

        let threads = if threads == 0 {
            self.workers.len()
        } else {
            threads
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let state = Arc::new(TaskState::new(threads.min(i32::MAX as usize) as i32));

        let batch: Vec<Slice> = (0..threads)
            .map(|thread_index| Slice {
                task: Arc::clone(&task),
                state: Arc::clone(&state),
                thread_index,
                threads_count: threads,
            })
            .collect();

        self.shared.active_tasks.fetch_add(1);
        if let Err(available) = self.shared.queue.push_all(self.shared.capacity, batch) {
            self.shared.active_tasks.fetch_sub(1);
            tracing::warn!(
                requested = threads,
                available,
                capacity = self.shared.capacity,
                "task queue full"
            );
            return Err(TaskError::QueueFull {
                requested: threads,
                available,
                capacity: self.shared.capacity,
            });
        }

        for _ in 0..threads {
            // Workers also drain without tokens, so a send to a closing
            // channel is harmless.
            let _ = self.wake_tx.send(());
        }
        Ok(TaskHandle::new(state))
    }

    /// Submits `task` and blocks until it completes.
    pub fn run_sync(&self, task: Arc<dyn CpuTask>, threads: usize) -> Result<(), TaskError> {
        let handle = self.run_async(task, threads)?;
        handle.wait();
        Ok(())
    }

    /// Runs a closure as a task, split into `threads` slices, blocking.
    pub fn run_sync_fn<F>(&self, threads: usize, body: F) -> Result<(), TaskError>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.run_sync(task_fn(body), threads)
    }

    /// Runs a closure as a task without blocking.
    pub fn run_async_fn<F>(&self, threads: usize, body: F) -> Result<TaskHandle, TaskError>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.run_async(task_fn(body), threads)
    }

    /// Blocks until every submitted task has completed.
    ///
    /// Unblocks on engine shutdown: slices stranded by the worker drain-out
    /// will never complete, and spinning on them would hang teardown.
    pub fn wait_all(&self) {
        let mut backoff = Backoff::new();
        while self.shared.active_tasks.load() != 0 && !is_shutdown() {
            backoff.spin();
        }
    }

    /// Stops accepting work, drains the queue and joins every worker.
    pub fn shutdown(&mut self) {
        if self.shared.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        self.wait_all();

        for worker in &self.workers {
            worker.request_stop();
        }
        // One token per worker so none stays parked on the channel.
        for _ in &self.workers {
            let _ = self.wake_tx.send(());
        }
        for worker in &mut self.workers {
            if let Err(error) = worker.stop() {
                tracing::error!(%error, "task pool worker failed to stop");
            }
        }
        tracing::info!("task pool stopped");
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TaskPool")
            .field("workers", &self.workers.len())
            .field("capacity", &self.shared.capacity)
            .field("queued_slices", &self.queued_slices())
            .field("active_tasks", &self.active_tasks())
            .finish()
    }
}

thread_local! {
    static WORKER_INDEX: std::cell::Cell<Option<usize>> =
        const { std::cell::Cell::new(None) };
}

/// Worker body: drain the queue, then park on the wake channel.
fn worker_loop(shared: &PoolShared, control: &ThreadControl, index: usize) {
    mark_pool_thread();
    WORKER_INDEX.with(|slot| slot.set(Some(index)));
    loop {
        while shared.run_one() {}
        if control.need_stop() || is_shutdown() {
            return;
        }
        // Parked until a submission (or shutdown) sends a token. A spurious
        // token just means one empty drain pass.
        if shared.wake_rx.recv().is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn small_pool(workers: usize, capacity: usize) -> TaskPool {
        TaskPool::new(PoolConfig {
            worker_threads: workers,
            queue_capacity: capacity,
            ..PoolConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_every_slice_runs_once() {
        const SLICES: usize = 32;

        let pool = small_pool(4, 256);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        pool.run_sync_fn(SLICES, move |index, count| {
            assert!(index < count);
            assert_eq!(count, SLICES);
            counter.fetch_add(1, Ordering::AcqRel);
        })
        .unwrap();

        assert_eq!(hits.load(Ordering::Acquire), SLICES);
    }

    #[test]
    fn test_zero_threads_means_one_per_worker() {
        let pool = small_pool(3, 256);
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&hits);
        pool.run_sync_fn(0, move |_, count| {
            assert_eq!(count, 3);
            counter.fetch_add(1, Ordering::AcqRel);
        })
        .unwrap();

        assert_eq!(hits.load(Ordering::Acquire), 3);
    }

    #[test]
    fn test_queue_full_is_all_or_nothing() {
        let pool = small_pool(1, 4);

        // Hold the single worker hostage so the queue stays full.
        let gate = Arc::new(AtomicBool::new(false));
        let blocker = {
            let gate = Arc::clone(&gate);
            pool.run_async_fn(1, move |_, _| {
                while !gate.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
            })
            .unwrap()
        };

        // Let the worker pick up the blocker so all 4 slots are free.
        while pool.queued_slices() != 0 {
            std::hint::spin_loop();
        }

        // Fill the remaining slots.
        let filler = pool.run_async_fn(4, |_, _| {}).unwrap();

        let result = pool.run_async_fn(2, |_, _| {});
        assert!(matches!(
            result,
            Err(TaskError::QueueFull { requested: 2, .. })
        ));

        gate.store(true, Ordering::Release);
        blocker.wait();
        filler.wait();
    }

    #[test]
    fn test_wait_all_drains_everything() {
        const TASKS: usize = 20;

        let pool = small_pool(4, 1024);
        let hits = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let counter = Arc::clone(&hits);
            handles.push(
                pool.run_async_fn(4, move |_, _| {
                    counter.fetch_add(1, Ordering::AcqRel);
                })
                .unwrap(),
            );
        }

        pool.wait_all();
        assert_eq!(hits.load(Ordering::Acquire), TASKS * 4);
        assert_eq!(pool.active_tasks(), 0);
        for handle in handles {
            assert!(handle.is_done());
        }
    }

    #[test]
    fn test_workers_report_as_pool_threads() {
        let pool = small_pool(2, 64);
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        pool.run_sync_fn(2, move |_, _| {
            if crate::registry::is_pool_thread() && TaskPool::current_worker_index().is_some() {
                counter.fetch_add(1, Ordering::AcqRel);
            }
        })
        .unwrap();

        assert_eq!(seen.load(Ordering::Acquire), 2);
        assert!(!crate::registry::is_pool_thread());
        assert_eq!(TaskPool::current_worker_index(), None);
    }

    #[test]
    fn test_shutdown_rejects_new_work() {
        let mut pool = small_pool(2, 64);
        pool.shutdown();
        assert!(matches!(
            pool.run_sync_fn(1, |_, _| {}),
            Err(TaskError::ShutDown)
        ));
    }

    #[test]
    fn test_done_callback_runs_after_all_slices() {
        struct SummingTask {
            partials: Vec<AtomicUsize>,
            total: AtomicUsize,
        }

        impl CpuTask for SummingTask {
            fn process(&self, thread_index: usize, _threads_count: usize) {
                self.partials[thread_index].store(thread_index + 1, Ordering::Release);
            }

            fn done(&self) {
                let sum = self
                    .partials
                    .iter()
                    .map(|p| p.load(Ordering::Acquire))
                    .sum();
                self.total.store(sum, Ordering::Release);
            }
        }

        const SLICES: usize = 8;
        let pool = small_pool(4, 64);
        let task = Arc::new(SummingTask {
            partials: (0..SLICES).map(|_| AtomicUsize::new(0)).collect(),
            total: AtomicUsize::new(0),
        });

        pool.run_sync(Arc::<SummingTask>::clone(&task) as Arc<dyn CpuTask>, SLICES)
            .unwrap();

        // 1 + 2 + ... + 8: done() saw every slice's write.
        assert_eq!(task.total.load(Ordering::Acquire), SLICES * (SLICES + 1) / 2);
    }
}
