//! Thread scheduler
//!
//! A plain FIFO round-robin scheduler for a single processor. The ready
//! queue, the current thread and the thread waiting to be destroyed are
//! touched only with interrupts disabled.
//!
//! [`Scheduler::dispatch`] is the only place the current thread changes
//! (besides [`Scheduler::start`] at boot). A finished thread cannot free its
//! own context while running on it, so it leaves itself in a single slot
//! and the next thread to run reclaims it.

use super::context::{self, Context};
use super::{with_current, Thread, ThreadState};
use crate::sync::WaitQueue;
use crate::Kernel;
use abyss::interrupt::{InterruptGuard, InterruptState};
use abyss::spin_lock::SpinLock;
use abyss::Machine;
use std::collections::BTreeMap;
use std::sync::Arc;

struct SchedulerInner {
    ready: WaitQueue,
    current: Option<Arc<Thread>>,
    to_be_destroyed: Option<Arc<Thread>>,
    threads: BTreeMap<usize, Arc<Thread>>,
}

/// The scheduler of one kernel.
pub struct Scheduler {
    machine: Arc<Machine>,
    inner: SpinLock<SchedulerInner>,
}

impl Scheduler {
    pub(crate) fn new(machine: Arc<Machine>) -> Self {
        Self {
            machine,
            inner: SpinLock::new(SchedulerInner {
                ready: WaitQueue::new(),
                current: None,
                to_be_destroyed: None,
                threads: BTreeMap::new(),
            }),
        }
    }

    /// Makes the just created thread `th` runnable on `kernel`.
    ///
    /// When `th` is first dispatched, it reclaims the thread that finished
    /// before it, enables interrupts, runs `entry` and finishes.
    ///
    /// # Panics
    ///
    /// Panics if `th` was already forked.
    pub fn fork(&self, kernel: &Kernel, th: &Arc<Thread>, entry: impl FnOnce() + Send + 'static) {
        assert_eq!(
            th.state(),
            ThreadState::JustCreated,
            "Thread \"{}\" forked twice",
            th.name()
        );
        debug!(THREAD, "Forking thread \"{}\"", th.name());
        let body = {
            let kernel = kernel.clone();
            move || {
                kernel.scheduler().finish_switch();
                kernel.machine().set_level(InterruptState::On);
                entry();
                kernel.scheduler().finish()
            }
        };
        let context = Context::spawn(kernel.clone(), th.clone(), body);
        assert!(
            th.context.set(context).is_ok(),
            "Thread \"{}\" already has a context",
            th.name()
        );

        let _guard = InterruptGuard::new(&self.machine);
        self.inner.lock().threads.insert(th.id(), th.clone());
        self.ready_to_run(th.clone());
    }

    /// Marks `th` ready and puts it at the end of the ready queue.
    ///
    /// Interrupts must be disabled.
    pub fn ready_to_run(&self, th: Arc<Thread>) {
        assert_eq!(
            self.machine.level(),
            InterruptState::Off,
            "ready_to_run() called with interrupts enabled"
        );
        debug!(THREAD, "Putting thread \"{}\" on ready list.", th.name());
        th.set_state(ThreadState::Ready);
        self.inner.lock().ready.push(th);
    }

    /// Runs the first ready thread. Called once at boot, outside any kernel
    /// thread.
    pub(crate) fn start(&self) {
        let first = self.inner.lock().ready.pop();
        let Some(first) = first else {
            panic!("No thread ready to run at boot");
        };
        debug!(THREAD, "Starting thread \"{}\"", first.name());
        first.set_state(ThreadState::Running);
        self.inner.lock().current = Some(first.clone());
        if let Some(context) = first.context.get() {
            context.resume();
        }
    }

    /// The running thread.
    pub fn current(&self) -> Option<Arc<Thread>> {
        self.inner.lock().current.clone()
    }

    /// Names of the threads in the ready queue, in dispatch order.
    pub fn ready_threads(&self) -> Vec<String> {
        self.inner
            .lock()
            .ready
            .iter()
            .map(|th| th.name().to_string())
            .collect()
    }

    /// Gives up the processor to the next ready thread, if there is one.
    /// The caller goes to the end of the ready queue.
    pub fn yield_now(&self) {
        let _guard = InterruptGuard::new(&self.machine);
        let next = self.inner.lock().ready.pop();
        if let Some(next) = next {
            let current = with_current(Arc::clone);
            debug!(THREAD, "Yielding thread \"{}\"", current.name());
            self.ready_to_run(current);
            self.dispatch(next);
        }
    }

    /// Blocks the caller until some other code makes it ready again.
    ///
    /// Interrupts must be disabled. While nothing is ready to run, the
    /// machine idles, which may halt it.
    pub fn sleep(&self) {
        assert_eq!(
            self.machine.level(),
            InterruptState::Off,
            "sleep() called with interrupts enabled"
        );
        let current = with_current(Arc::clone);
        debug!(THREAD, "Sleeping thread \"{}\"", current.name());
        current.set_state(ThreadState::Blocked);
        let next = loop {
            let next = self.inner.lock().ready.pop();
            match next {
                Some(next) => break next,
                None => self.machine.idle(),
            }
        };
        if Arc::ptr_eq(&next, &current) {
            // Woken up by an interrupt while the machine idled.
            current.set_state(ThreadState::Running);
        } else {
            self.dispatch(next);
        }
    }

    /// Terminates the calling thread. Its context is reclaimed by the next
    /// thread to run.
    pub fn finish(&self) -> ! {
        self.machine.set_level(InterruptState::Off);
        let current = with_current(Arc::clone);
        debug!(THREAD, "Finishing thread \"{}\"", current.name());
        {
            let mut inner = self.inner.lock();
            assert!(
                inner.to_be_destroyed.is_none(),
                "Two threads finished without a switch in between"
            );
            inner.to_be_destroyed = Some(current);
        }
        self.sleep();
        unreachable!("Finished thread was dispatched again")
    }

    /// Switches the processor from the calling thread to `next`.
    fn dispatch(&self, next: Arc<Thread>) {
        let old = with_current(Arc::clone);
        assert!(
            !Arc::ptr_eq(&old, &next),
            "Thread \"{}\" dispatched to itself",
            old.name()
        );
        assert_ne!(
            old.state(),
            ThreadState::Running,
            "Thread \"{}\" switched out while still running",
            old.name()
        );
        old.save_state();
        debug!(
            THREAD,
            "Switching from thread \"{}\" to thread \"{}\"",
            old.name(),
            next.name()
        );
        next.set_state(ThreadState::Running);
        self.inner.lock().current = Some(next.clone());
        if let Some(context) = next.context.get() {
            context.resume();
        }
        context::suspend();

        debug!(THREAD, "Now in thread \"{}\"", old.name());
        old.restore_state();
        self.finish_switch();
    }

    /// Reclaims the thread that finished just before the caller took over.
    pub(crate) fn finish_switch(&self) {
        let carcass = self.inner.lock().to_be_destroyed.take();
        if let Some(carcass) = carcass {
            debug!(THREAD, "Deleting thread \"{}\"", carcass.name());
            carcass.set_state(ThreadState::Destroyed);
            self.inner.lock().threads.remove(&carcass.id());
            if let Some(context) = carcass.context.get() {
                context.kill();
                context.join();
            }
        }
    }

    /// Dumps the ready queue.
    pub fn print(&self) {
        debug!(
            THREAD,
            "Ready list contents: {}",
            self.ready_threads().join(", ")
        );
    }

    /// Makes every host thread of this kernel unwind.
    pub(crate) fn kill_all(&self) {
        let threads: Vec<_> = self.inner.lock().threads.values().cloned().collect();
        for th in threads {
            if let Some(context) = th.context.get() {
                context.kill();
            }
        }
    }

    /// Waits for every host thread of this kernel to exit.
    pub(crate) fn join_all(&self) {
        let threads = std::mem::take(&mut self.inner.lock().threads);
        for th in threads.into_values() {
            if let Some(context) = th.context.get() {
                context.join();
            }
        }
    }
}

/// Relinquishes the processor if another thread is ready.
pub fn yield_now() {
    Kernel::current().scheduler().yield_now()
}

/// Blocks the calling thread. Interrupts must be disabled.
pub fn sleep() {
    Kernel::current().scheduler().sleep()
}

/// Terminates the calling thread.
pub fn finish() -> ! {
    Kernel::current().scheduler().finish()
}

/// The calling thread.
pub fn current() -> Arc<Thread> {
    with_current(Arc::clone)
}
