//! Timer-driven sleeping and preemption.

use crate::interrupt::InterruptHandler;
use crate::sync::WaitQueue;
use crate::thread::scheduler;
use crate::Kernel;
use abyss::interrupt::{InterruptGuard, MachineStatus};
use abyss::spin_lock::SpinLock;

/// Threads sleeping until a point in simulated time.
pub struct Alarm {
    sleepers: SpinLock<WaitQueue<u64>>,
}

impl Alarm {
    pub(crate) fn new() -> Self {
        Self {
            sleepers: SpinLock::new(WaitQueue::new()),
        }
    }

    /// Blocks the calling thread for at least `ticks` ticks of simulated
    /// time.
    ///
    /// The machine stays up while anybody sleeps here, even if nothing else
    /// is pending.
    pub fn sleep_for(&self, ticks: u64) {
        let kernel = Kernel::current();
        let machine = kernel.machine();
        let _awake = machine.keep_awake();
        machine.timer().enable();
        let _guard = InterruptGuard::new(machine);
        let when = machine.ticks() + ticks;
        debug!(THREAD, "Alarm: sleeping until {}", when);
        self.sleepers
            .lock()
            .sorted_insert(when, scheduler::current());
        kernel.scheduler().sleep();
    }

    /// Number of sleeping threads.
    pub fn sleepers(&self) -> usize {
        self.sleepers.lock().len()
    }

    /// Makes every thread whose time has come ready.
    fn wake_due(&self, kernel: &Kernel) {
        let now = kernel.machine().ticks();
        loop {
            let due = {
                let mut sleepers = self.sleepers.lock();
                match sleepers.peek_key() {
                    Some(&when) if when <= now => sleepers.pop(),
                    _ => None,
                }
            };
            match due {
                Some(th) => kernel.scheduler().ready_to_run(th),
                None => break,
            }
        }
    }
}

/// Handler of the timer interrupt: wakes up due sleepers and, on a
/// preemptive kernel, time-slices the running thread.
pub struct TimerInterruptHandler;

impl InterruptHandler for TimerInterruptHandler {
    fn service_device(&self, kernel: &Kernel) {
        kernel.alarm().wake_due(kernel);
        if kernel.is_preemptive() && kernel.machine().status() != MachineStatus::Idle {
            kernel.yield_on_return();
        }
    }
}

/// Blocks the calling thread for `ticks` ticks.
pub fn sleep_for(ticks: u64) {
    Kernel::current().alarm().sleep_for(ticks)
}
