use super::WaitQueue;
use crate::thread::scheduler;
use crate::Kernel;
use abyss::interrupt::InterruptGuard;
use abyss::spin_lock::SpinLock;

struct SemaphoreInner {
    value: usize,
    waiters: WaitQueue,
}

/// A counting semaphore.
///
/// [`p`] waits until the value is positive and decrements it; [`v`]
/// increments it and wakes up one waiter, in FIFO order. No wakeup is ever
/// lost: a [`v`] with nobody waiting is remembered in the value.
///
/// [`p`]: Semaphore::p
/// [`v`]: Semaphore::v
pub struct Semaphore {
    name: String,
    inner: SpinLock<SemaphoreInner>,
}

impl Semaphore {
    /// Creates a semaphore with the initial value `value`.
    pub fn new(name: impl Into<String>, value: usize) -> Self {
        Self {
            name: name.into(),
            inner: SpinLock::new(SemaphoreInner {
                value,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Name of the semaphore.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value.
    pub fn value(&self) -> usize {
        self.inner.lock().value
    }

    /// Waits until the value is positive, then decrements it.
    pub fn p(&self) {
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        loop {
            let acquired = {
                let mut inner = self.inner.lock();
                if inner.value > 0 {
                    inner.value -= 1;
                    true
                } else {
                    inner.waiters.push(scheduler::current());
                    false
                }
            };
            if acquired {
                break;
            }
            debug!(SYNC, "Semaphore \"{}\": waiting", self.name);
            kernel.scheduler().sleep();
        }
    }

    /// Increments the value and makes the first waiter, if any, ready.
    pub fn v(&self) {
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        let waiter = {
            let mut inner = self.inner.lock();
            inner.value += 1;
            inner.waiters.pop()
        };
        if let Some(th) = waiter {
            debug!(SYNC, "Semaphore \"{}\": waking \"{}\"", self.name, th.name());
            kernel.scheduler().ready_to_run(th);
        }
    }
}
