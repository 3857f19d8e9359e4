use super::{Lock, WaitQueue};
use crate::thread::scheduler;
use crate::Kernel;
use abyss::interrupt::InterruptGuard;
use abyss::spin_lock::SpinLock;
use std::sync::Arc;

/// A Mesa-style condition variable.
///
/// [`signal`](Condition::signal) only makes a waiter ready: the lock and the
/// processor stay with the signaller, so a woken waiter must recheck the
/// condition it waited for. Every operation requires holding the associated
/// lock.
pub struct Condition {
    name: String,
    lock: Arc<Lock>,
    waiters: SpinLock<WaitQueue>,
}

impl Condition {
    /// Creates a condition variable protected by `lock`.
    pub fn new(name: impl Into<String>, lock: Arc<Lock>) -> Self {
        Self {
            name: name.into(),
            lock,
            waiters: SpinLock::new(WaitQueue::new()),
        }
    }

    /// Name of the condition variable.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The associated lock.
    pub fn lock(&self) -> &Arc<Lock> {
        &self.lock
    }

    fn assert_held(&self) {
        assert!(
            self.lock.is_held_by_current_thread(),
            "Condition \"{}\" used without holding lock \"{}\"",
            self.name,
            self.lock.name()
        );
    }

    /// Releases the lock, waits to be signalled and reacquires the lock.
    pub fn wait(&self) {
        self.assert_held();
        let kernel = Kernel::current();
        {
            let _guard = InterruptGuard::new(kernel.machine());
            self.lock.release();
            self.waiters.lock().push(scheduler::current());
            debug!(SYNC, "Condition \"{}\": waiting", self.name);
            kernel.scheduler().sleep();
        }
        self.lock.acquire();
    }

    /// Wakes up one waiter, if any.
    pub fn signal(&self) {
        self.assert_held();
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        let waiter = self.waiters.lock().pop();
        if let Some(th) = waiter {
            debug!(SYNC, "Condition \"{}\": signalling \"{}\"", self.name, th.name());
            kernel.scheduler().ready_to_run(th);
        }
    }

    /// Wakes up every waiter.
    pub fn broadcast(&self) {
        self.assert_held();
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        loop {
            let waiter = self.waiters.lock().pop();
            match waiter {
                Some(th) => kernel.scheduler().ready_to_run(th),
                None => break,
            }
        }
    }
}
