//! Kernel threads.
//!
//! ## The threading model
//!
//! An executing kernel consists of a collection of threads, each with its
//! own execution context. Exactly one of them is running; the others are
//! either ready to run, blocked on a synchronization primitive, or waiting
//! to be destroyed. Threads switch only at well defined points: yielding,
//! sleeping, finishing, and the deferred yield after an interrupt handler.
pub(crate) mod context;
pub mod scheduler;

use crate::sync::Semaphore;
use crate::Kernel;
use abyss::spin_lock::SpinLock;
use context::Context;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// A possible state of the thread.
#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum ThreadState {
    /// Created but not forked yet.
    JustCreated,
    /// Waiting in the ready queue.
    Ready,
    /// Running on the processor.
    Running,
    /// Waiting for a synchronization event.
    Blocked,
    /// Finished and reclaimed.
    Destroyed,
}

/// State a thread keeps beyond its execution context, e.g. an address space
/// and user registers. Saved when the thread is switched out and restored
/// when it is switched back in.
pub trait SwitchHooks: Send {
    /// Called just before the thread is switched out.
    fn save_state(&mut self);
    /// Called right after the thread is switched back in.
    fn restore_state(&mut self);
}

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// A kernel thread.
pub struct Thread {
    name: String,
    id: usize,
    state: SpinLock<ThreadState>,
    /// Set while the thread is in the ready queue or a wait queue.
    pub(crate) queued: AtomicBool,
    pub(crate) context: OnceLock<Context>,
    hooks: SpinLock<Option<Box<dyn SwitchHooks>>>,
}

impl Thread {
    /// Creates a thread that is not runnable until forked.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            state: SpinLock::new(ThreadState::JustCreated),
            queued: AtomicBool::new(false),
            context: OnceLock::new(),
            hooks: SpinLock::new(None),
        })
    }

    /// Name of the thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process-wide unique id of the thread.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Current state of the thread.
    pub fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: ThreadState) {
        *self.state.lock() = state;
    }

    /// Makes the thread runnable: `entry` will run when it is first
    /// dispatched. See [`Scheduler::fork`](scheduler::Scheduler::fork).
    ///
    /// Must be called from a kernel thread.
    pub fn fork(self: &Arc<Self>, entry: impl FnOnce() + Send + 'static) {
        let kernel = Kernel::current();
        kernel.scheduler().fork(&kernel, self, entry);
    }

    /// Installs the hooks run on every switch of this thread.
    pub fn set_hooks(&self, hooks: impl SwitchHooks + 'static) {
        *self.hooks.lock() = Some(Box::new(hooks));
    }

    pub(crate) fn save_state(&self) {
        if let Some(hooks) = self.hooks.lock().as_mut() {
            debug!(ADDRSPACE, "Saving state of \"{}\"", self.name);
            hooks.save_state();
        }
    }

    pub(crate) fn restore_state(&self) {
        if let Some(hooks) = self.hooks.lock().as_mut() {
            debug!(ADDRSPACE, "Restoring state of \"{}\"", self.name);
            hooks.restore_state();
        }
    }
}

impl core::fmt::Debug for Thread {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Thread")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

/// Run a function `f` with current thread as an argument.
///
/// # Panics
///
/// Panics if the caller is not a kernel thread.
pub fn with_current<R>(f: impl FnOnce(&Arc<Thread>) -> R) -> R {
    match context::current_thread() {
        Some(th) => f(&th),
        None => panic!("Not running on a kernel thread"),
    }
}

/// A handle to join thread.
pub struct JoinHandle<T> {
    thread: Arc<Thread>,
    done: Arc<Semaphore>,
    result: Arc<SpinLock<Option<T>>>,
}

impl<T> JoinHandle<T> {
    /// The underlying thread.
    pub fn thread(&self) -> &Arc<Thread> {
        &self.thread
    }

    /// Blocks until the thread's function returned, and returns its result.
    pub fn join(self) -> T {
        self.done.p();
        let result = self.result.lock().take();
        result.unwrap_or_else(|| unreachable!("thread signalled completion without a result"))
    }
}

/// A struct to build a new thread.
pub struct ThreadBuilder {
    th: Arc<Thread>,
}

impl ThreadBuilder {
    /// Create a new thread builder for thread `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            th: Thread::new(name),
        }
    }

    /// Installs switch hooks on the new thread.
    pub fn hooks(self, hooks: impl SwitchHooks + 'static) -> Self {
        self.th.set_hooks(hooks);
        self
    }

    /// Spawn the thread on the calling thread's kernel.
    pub fn spawn<F, T>(self, thread_fn: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.spawn_on(&Kernel::current(), thread_fn)
    }

    /// Spawn the thread on `kernel`.
    pub fn spawn_on<F, T>(self, kernel: &Kernel, thread_fn: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let Self { th } = self;
        let done = Arc::new(Semaphore::new(format!("join {}", th.name()), 0));
        let result = Arc::new(SpinLock::new(None));
        let handle = JoinHandle {
            thread: th.clone(),
            done: done.clone(),
            result: result.clone(),
        };
        kernel.scheduler().fork(kernel, &th, move || {
            let value = thread_fn();
            *result.lock() = Some(value);
            done.v();
        });
        handle
    }
}
