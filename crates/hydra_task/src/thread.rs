//! # Engine Thread
//!
//! Named, stoppable thread wrapper with wake signaling, scheduling
//! priority and CPU affinity. The thread body is a [`ThreadProcess`]; it
//! owns its loop and cooperates through the [`ThreadControl`] it is given:
//! poll [`need_stop`](ThreadControl::need_stop), park on
//! [`wait_wake`](ThreadControl::wait_wake), drain out when told to stop.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::ThreadError;

/// Default stack size for engine threads: 1 MiB.
pub const DEFAULT_STACK_SIZE: usize = 0x0010_0000;

/// The body of an [`EngineThread`].
///
/// `process` is the entire thread body: it is called exactly once and
/// should loop until [`ThreadControl::need_stop`] turns true.
pub trait ThreadProcess: Send + 'static {
    /// Runs the thread body to completion.
    fn process(&mut self, control: &ThreadControl);
}

impl<F: FnMut(&ThreadControl) + Send + 'static> ThreadProcess for F {
    fn process(&mut self, control: &ThreadControl) {
        self(control);
    }
}

/// Lost-wakeup-proof wake signal: a pending flag consumed under the lock.
struct WakeSignal {
    pending: AtomicBool,
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl WakeSignal {
    fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    fn notify(&self) {
        // The lock orders the flag store against a waiter's check, so a
        // signal sent just before wait() is never lost.
        let _guard = self.mutex.lock();
        self.pending.store(true, Ordering::Release);
        self.condvar.notify_all();
    }

    fn wait(&self) {
        let mut guard = self.mutex.lock();
        while !self.pending.swap(false, Ordering::AcqRel) {
            self.condvar.wait(&mut guard);
        }
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.mutex.lock();
        if self.pending.swap(false, Ordering::AcqRel) {
            return true;
        }
        self.condvar.wait_for(&mut guard, timeout);
        self.pending.swap(false, Ordering::AcqRel)
    }
}

struct Shared {
    name: String,
    running: AtomicBool,
    need_stop: AtomicBool,
    waiting: AtomicBool,
    wake: WakeSignal,
    priority: core::sync::atomic::AtomicI32,
    /// Last applied affinity mask; 0 = never set.
    affinity: core::sync::atomic::AtomicU64,
}

/// The cooperative control surface handed to a [`ThreadProcess`].
pub struct ThreadControl {
    shared: Arc<Shared>,
}

impl ThreadControl {
    /// The thread's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns whether [`EngineThread::stop`] has been requested.
    #[must_use]
    pub fn need_stop(&self) -> bool {
        self.shared.need_stop.load(Ordering::Acquire)
    }

    /// Parks until the owner calls [`EngineThread::signal`] or
    /// [`EngineThread::stop`].
    pub fn wait_wake(&self) {
        self.shared.waiting.store(true, Ordering::Release);
        self.shared.wake.wait();
        self.shared.waiting.store(false, Ordering::Release);
    }

    /// Parks for at most `timeout`. Returns whether a wake arrived.
    pub fn wait_wake_timeout(&self, timeout: Duration) -> bool {
        self.shared.waiting.store(true, Ordering::Release);
        let woke = self.shared.wake.wait_timeout(timeout);
        self.shared.waiting.store(false, Ordering::Release);
        woke
    }
}

/// Sleeps the calling thread for `ms` milliseconds.
pub fn sleep(ms: u64) {
    std::thread::sleep(Duration::from_millis(ms));
}

/// Yields the calling thread's remaining timeslice to the scheduler.
pub fn switch_thread() {
    std::thread::yield_now();
}

/// A named engine thread.
///
/// ## Example
///
/// ```rust,ignore
/// let mut streamer = EngineThread::new("file_stream");
/// streamer.run(|control: &ThreadControl| {
///     while !control.need_stop() {
///         // drain work, then park until signaled
///         control.wait_wake();
///     }
/// })?;
/// streamer.signal();
/// streamer.stop()?;
/// ```
pub struct EngineThread {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl EngineThread {
    /// Creates a thread wrapper. Nothing runs until [`run`](Self::run).
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                running: AtomicBool::new(false),
                need_stop: AtomicBool::new(false),
                waiting: AtomicBool::new(false),
                wake: WakeSignal::new(),
                priority: core::sync::atomic::AtomicI32::new(0),
                affinity: core::sync::atomic::AtomicU64::new(0),
            }),
            handle: None,
        }
    }

    /// Starts the thread with the default 1 MiB stack.
    pub fn run<P: ThreadProcess>(&mut self, process: P) -> Result<(), ThreadError> {
        self.run_with_stack(process, DEFAULT_STACK_SIZE)
    }

    /// Starts the thread with an explicit stack size.
    pub fn run_with_stack<P: ThreadProcess>(
        &mut self,
        mut process: P,
        stack_size: usize,
    ) -> Result<(), ThreadError> {
        if self.handle.is_some() {
            return Err(ThreadError::AlreadyRunning);
        }

        self.shared.need_stop.store(false, Ordering::Release);
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawn = std::thread::Builder::new()
            .name(self.shared.name.clone())
            .stack_size(stack_size)
            .spawn(move || {
                let control = ThreadControl {
                    shared: Arc::clone(&shared),
                };
                tracing::debug!(thread = control.name(), "engine thread started");
                process.process(&control);
                shared.running.store(false, Ordering::Release);
                tracing::debug!(thread = shared.name.as_str(), "engine thread finished");
            });

        match spawn {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(error) => {
                self.shared.running.store(false, Ordering::Release);
                Err(ThreadError::Os(error))
            }
        }
    }

    /// Returns whether the thread body is still executing.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Returns whether the thread is parked in [`ThreadControl::wait_wake`].
    ///
    /// Best-effort probe; may be stale immediately.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.shared.waiting.load(Ordering::Acquire)
    }

    /// Last priority applied through [`set_priority`](Self::set_priority).
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.shared.priority.load(Ordering::Acquire)
    }

    /// Last affinity mask applied through
    /// [`set_affinity`](Self::set_affinity), or `None` if never set.
    #[must_use]
    pub fn affinity_mask(&self) -> Option<u64> {
        match self.shared.affinity.load(Ordering::Acquire) {
            0 => None,
            mask => Some(mask),
        }
    }

    /// Wakes the thread if it is parked in [`ThreadControl::wait_wake`].
    pub fn signal(&self) {
        self.shared.wake.notify();
    }

    /// Requests a stop and wakes the thread, without joining.
    ///
    /// For stopping a group of threads: request on all, then join all.
    pub fn request_stop(&self) {
        self.shared.need_stop.store(true, Ordering::Release);
        self.shared.wake.notify();
    }

    /// Requests a stop, wakes the thread and joins it.
    pub fn stop(&mut self) -> Result<(), ThreadError> {
        self.request_stop();
        self.wait()
    }

    /// Joins the thread without requesting a stop.
    pub fn wait(&mut self) -> Result<(), ThreadError> {
        let handle = self.handle.take().ok_or(ThreadError::NotRunning)?;
        handle.join().map_err(|_| {
            tracing::error!(thread = self.shared.name.as_str(), "engine thread panicked");
            ThreadError::Panicked
        })
    }

    /// Kills the thread at the OS level without cooperation.
    ///
    /// Last-resort shutdown for a wedged thread. Unix only.
    ///
    /// # Safety
    ///
    /// The thread is cancelled at an arbitrary point: locks it holds stay
    /// held, destructors may not run, shared state may be mid-update. The
    /// caller must guarantee nothing else will touch state the thread
    /// could have been mutating.
    #[cfg(unix)]
    pub unsafe fn terminate(&mut self) -> Result<(), ThreadError> {
        use std::os::unix::thread::JoinHandleExt;

        let handle = self.handle.take().ok_or(ThreadError::NotRunning)?;
        tracing::warn!(
            thread = self.shared.name.as_str(),
            "terminating engine thread"
        );
        let rc = libc::pthread_cancel(handle.as_pthread_t());
        if rc != 0 {
            return Err(os_error(rc));
        }
        // The cancelled thread never reaches its normal epilogue.
        let _ = handle.join();
        self.shared.running.store(false, Ordering::Release);
        Ok(())
    }

    /// Kills the thread at the OS level. Not available on this platform.
    ///
    /// # Safety
    ///
    /// See the unix implementation; this stub never runs anything.
    #[cfg(not(unix))]
    pub unsafe fn terminate(&mut self) -> Result<(), ThreadError> {
        Err(ThreadError::Unsupported)
    }

    /// Sets the thread's scheduling priority, in the engine range `[-3, 3]`.
    ///
    /// Positive values map onto the platform's round-robin real-time band;
    /// zero and below keep the default policy and timeslice.
    pub fn set_priority(&self, priority: i32) -> Result<(), ThreadError> {
        if !(-3..=3).contains(&priority) {
            return Err(ThreadError::PriorityOutOfRange(priority));
        }
        let handle = self.handle.as_ref().ok_or(ThreadError::NotRunning)?;
        set_priority_impl(handle, priority)?;
        self.shared.priority.store(priority, Ordering::Release);
        Ok(())
    }

    /// Pins the thread to the CPUs set in `mask` (bit N = CPU N).
    pub fn set_affinity(&self, mask: u64) -> Result<(), ThreadError> {
        if mask == 0 {
            return Err(ThreadError::EmptyAffinityMask);
        }
        let handle = self.handle.as_ref().ok_or(ThreadError::NotRunning)?;
        set_affinity_impl(handle, mask)?;
        self.shared.affinity.store(mask, Ordering::Release);
        Ok(())
    }
}

impl Drop for EngineThread {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

impl core::fmt::Debug for EngineThread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EngineThread")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(unix)]
fn os_error(code: i32) -> ThreadError {
    ThreadError::Os(std::io::Error::from_raw_os_error(code))
}

#[cfg(unix)]
fn set_priority_impl(handle: &JoinHandle<()>, priority: i32) -> Result<(), ThreadError> {
    use std::os::unix::thread::JoinHandleExt;

    let pthread = handle.as_pthread_t();
    // SAFETY: pthread is a live thread id; the sched structs are plain C
    // data initialized before use.
    unsafe {
        let mut param: libc::sched_param = core::mem::zeroed();
        let (policy, sched_priority) = if priority > 0 {
            let min = libc::sched_get_priority_min(libc::SCHED_RR);
            let max = libc::sched_get_priority_max(libc::SCHED_RR);
            if min < 0 || max < 0 {
                return Err(ThreadError::Os(std::io::Error::last_os_error()));
            }
            (libc::SCHED_RR, min + (max - min) * priority / 3)
        } else {
            // Negative engine priorities share the default timeslice.
            (libc::SCHED_OTHER, 0)
        };
        param.sched_priority = sched_priority;
        let rc = libc::pthread_setschedparam(pthread, policy, &param);
        if rc != 0 {
            return Err(os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_priority_impl(_handle: &JoinHandle<()>, _priority: i32) -> Result<(), ThreadError> {
    Err(ThreadError::Unsupported)
}

#[cfg(target_os = "linux")]
fn set_affinity_impl(handle: &JoinHandle<()>, mask: u64) -> Result<(), ThreadError> {
    use std::os::unix::thread::JoinHandleExt;

    // SAFETY: cpu_set_t is plain C data; CPU_ZERO/CPU_SET only write into
    // the set we own; pthread is a live thread id.
    unsafe {
        let mut set: libc::cpu_set_t = core::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        for cpu in 0..64usize {
            if mask & (1 << cpu) != 0 && cpu < libc::CPU_SETSIZE as usize {
                libc::CPU_SET(cpu, &mut set);
            }
        }
        let rc = libc::pthread_setaffinity_np(
            handle.as_pthread_t(),
            core::mem::size_of::<libc::cpu_set_t>(),
            &set,
        );
        if rc != 0 {
            return Err(os_error(rc));
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_affinity_impl(_handle: &JoinHandle<()>, _mask: u64) -> Result<(), ThreadError> {
    Err(ThreadError::Unsupported)
}
