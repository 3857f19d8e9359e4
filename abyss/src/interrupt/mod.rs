//! Interrupt
//!
//! The processor has exactly one atomicity mechanism: the interrupt level.
//! While it is Off, no device completion can preempt the running code.
//!
//! Devices schedule their completions as pending interrupts stamped with a
//! simulated time. The simulated clock advances only when interrupts are
//! re-enabled (one tick) and when the processor idles (the clock jumps to
//! the next pending interrupt). Due interrupts fire in time order, FIFO among
//! equal times, with the level forced Off.
mod entry;

pub use entry::{Irq, IrqSink, NUM_IRQ};

use crate::machine::Machine;
use crate::stats::{SYSTEM_TICK, USER_TICK};
use std::collections::BTreeMap;

/// Enumeration for representing interrupt state
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InterruptState {
    /// Interrupt is on.
    On,
    /// Interrupt is off.
    Off,
}

/// What the processor is doing.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MachineStatus {
    /// Nothing to run; waiting for an interrupt.
    Idle,
    /// Running kernel code.
    System,
    /// Running user code.
    User,
}

/// Whether a pending interrupt keeps an idle machine running.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Wakeup {
    /// A completion some thread is waiting for.
    Event,
    /// A periodic poll (timer, console input, network mailbox). Polls alone
    /// keep the machine from halting only while somebody holds it awake or
    /// the polling device has work it can make progress on.
    Poll,
}

/// Payload of the unwind that ends a host thread once its machine halts.
#[derive(Debug)]
pub struct Halted;

/// Device side of a pending interrupt. Returns true if the interrupt must be
/// delivered to the kernel.
pub(crate) type Action = Box<dyn FnOnce(&Machine) -> bool + Send>;

struct PendingInterrupt {
    irq: Irq,
    wakeup: Wakeup,
    action: Action,
}

pub(crate) struct InterruptController {
    level: InterruptState,
    status: MachineStatus,
    in_handler: bool,
    halted: bool,
    awake_holds: usize,
    next_seq: u64,
    pending: BTreeMap<(u64, u64), PendingInterrupt>,
}

impl InterruptController {
    pub(crate) fn new() -> Self {
        Self {
            level: InterruptState::Off,
            status: MachineStatus::System,
            in_handler: false,
            halted: false,
            awake_holds: 0,
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }
}

/// An RAII implementation of an interrupt disable. When this structure is
/// dropped (falls out of scope), the interrupt will be recovered into state on creation of this struct.
/// Therefore, you must dropped the this struct in reverse of creation order.
///
/// This structure is created by the [`new`].
///
/// [`new`]: InterruptGuard::new
pub struct InterruptGuard<'a> {
    machine: &'a Machine,
    state: InterruptState,
}

impl<'a> InterruptGuard<'a> {
    /// Create a new InterruptGuard.
    pub fn new(machine: &'a Machine) -> Self {
        let state = machine.set_level(InterruptState::Off);
        Self { machine, state }
    }
}

impl Drop for InterruptGuard<'_> {
    fn drop(&mut self) {
        // A halted machine unwinds its threads with interrupts off; leave it so.
        if !std::thread::panicking() {
            self.machine.set_level(self.state);
        }
    }
}

/// Holds the machine awake: while any of these lives, pending polls are
/// enough for [`Machine::idle`] to advance time instead of halting.
///
/// This structure is created by [`Machine::keep_awake`].
pub struct KeepAwake<'a> {
    machine: &'a Machine,
}

impl Drop for KeepAwake<'_> {
    fn drop(&mut self) {
        self.machine.interrupt.lock().awake_holds -= 1;
    }
}

impl Machine {
    /// Current interrupt level.
    pub fn level(&self) -> InterruptState {
        self.interrupt.lock().level
    }

    /// Installs the interrupt level `now` and returns the previous one.
    ///
    /// Going from Off to On advances the clock by one tick and fires every
    /// interrupt that has come due.
    pub fn set_level(&self, now: InterruptState) -> InterruptState {
        let (old, tick) = {
            let mut intr = self.interrupt.lock();
            assert!(
                now == InterruptState::Off || !intr.in_handler,
                "Interrupts re-enabled inside an interrupt handler"
            );
            let old = core::mem::replace(&mut intr.level, now);
            (
                old,
                old == InterruptState::Off && now == InterruptState::On && !intr.halted,
            )
        };
        if tick {
            self.one_tick();
        }
        old
    }

    pub fn status(&self) -> MachineStatus {
        self.interrupt.lock().status
    }

    pub fn set_status(&self, status: MachineStatus) {
        self.interrupt.lock().status = status;
    }

    /// Returns true while the kernel runs an interrupt handler.
    pub fn in_handler(&self) -> bool {
        self.interrupt.lock().in_handler
    }

    pub fn set_in_handler(&self, in_handler: bool) {
        self.interrupt.lock().in_handler = in_handler;
    }

    pub fn is_halted(&self) -> bool {
        self.interrupt.lock().halted
    }

    /// Number of interrupts not yet delivered.
    pub fn pending_interrupts(&self) -> usize {
        self.interrupt.lock().pending.len()
    }

    /// Keeps the machine from halting on pending polls alone.
    pub fn keep_awake(&self) -> KeepAwake<'_> {
        self.interrupt.lock().awake_holds += 1;
        KeepAwake { machine: self }
    }

    /// Arranges for `action` to run `delay` ticks from now, on line `irq`.
    ///
    /// Devices call this to model their latency. Nothing is scheduled on a
    /// halted machine.
    pub(crate) fn schedule(
        &self,
        irq: Irq,
        delay: u64,
        wakeup: Wakeup,
        action: impl FnOnce(&Machine) -> bool + Send + 'static,
    ) {
        assert!(delay > 0, "Interrupt {:?} scheduled without delay", irq);
        let when = self.ticks() + delay;
        {
            let mut intr = self.interrupt.lock();
            if intr.halted {
                return;
            }
            let seq = intr.next_seq;
            intr.next_seq += 1;
            intr.pending.insert(
                (when, seq),
                PendingInterrupt {
                    irq,
                    wakeup,
                    action: Box::new(action),
                },
            );
        }
        debug!(INTERRUPT, "Scheduling interrupt {:?} at time = {}", irq, when);
    }

    fn one_tick(&self) {
        let status = {
            let mut intr = self.interrupt.lock();
            intr.level = InterruptState::Off;
            intr.status
        };
        self.with_stats(|stats| {
            if status == MachineStatus::User {
                stats.total_ticks += USER_TICK;
                stats.user_ticks += USER_TICK;
            } else {
                stats.total_ticks += SYSTEM_TICK;
                stats.system_ticks += SYSTEM_TICK;
            }
        });
        while self.check_if_due(false) {}
        self.interrupt.lock().level = InterruptState::On;
    }

    /// Fires the earliest pending interrupt if it is due.
    ///
    /// With `advance_clock`, an interrupt in the future is made due by moving
    /// the clock forward, unless only polls are pending and nobody holds the
    /// machine awake. Returns true if an interrupt fired.
    fn check_if_due(&self, advance_clock: bool) -> bool {
        let now = self.ticks();
        let devices_busy = advance_clock && self.devices_want_wakeup();
        let (when, pending) = {
            let mut intr = self.interrupt.lock();
            let only_polls = intr.awake_holds == 0
                && !devices_busy
                && intr.pending.values().all(|p| p.wakeup == Wakeup::Poll);
            let Some(entry) = intr.pending.first_entry() else {
                return false;
            };
            let when = entry.key().0;
            if when > now && (!advance_clock || only_polls) {
                return false;
            }
            (when, entry.remove())
        };
        if when > now {
            self.with_stats(|stats| {
                stats.idle_ticks += when - now;
                stats.total_ticks = when;
            });
        }
        debug!(
            INTERRUPT,
            "Invoking interrupt handler for {:?} at time {}", pending.irq, when
        );
        if (pending.action)(self) {
            match self.sink() {
                Some(sink) => sink.handle_interrupt(pending.irq),
                None => panic!("Unknown interrupt {:?}: no kernel attached", pending.irq),
            }
        }
        true
    }

    /// Nothing is ready to run: advance the clock to the next pending
    /// interrupt and service it. Halts if there is nothing left to wait for.
    pub fn idle(&self) {
        debug!(INTERRUPT, "Machine idling; checking for interrupts.");
        self.set_status(MachineStatus::Idle);
        if self.check_if_due(true) {
            while self.check_if_due(false) {}
            self.set_status(MachineStatus::System);
            // Give machines sharing this host a chance to make progress.
            std::thread::yield_now();
            return;
        }
        debug!(INTERRUPT, "Machine idle.  No interrupts to do.");
        info!("No threads ready or runnable, and no pending interrupts.");
        self.halt()
    }

    /// Stops the machine and unwinds the calling host thread.
    pub fn halt(&self) -> ! {
        self.stop();
        std::panic::resume_unwind(Box::new(Halted))
    }

    /// Stops the machine: drops every pending interrupt, leaves the network
    /// and tells the kernel to release its parked threads. Returns false if
    /// the machine had already stopped.
    pub fn stop(&self) -> bool {
        {
            let mut intr = self.interrupt.lock();
            if intr.halted {
                return false;
            }
            intr.halted = true;
            intr.status = MachineStatus::Idle;
            intr.pending.clear();
        }
        info!("Machine halting!");
        debug!(MACHINE, "{}", self.stats());
        self.network().detach();
        if let Some(sink) = self.sink() {
            sink.on_halt();
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MachineConfig;
    use spin_lock::SpinLock;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;

    fn machine() -> Arc<Machine> {
        Machine::new(MachineConfig::default()).unwrap()
    }

    #[test]
    fn time_advances_on_reenable_only() {
        let machine = machine();
        assert_eq!(machine.level(), InterruptState::Off);
        assert_eq!(machine.ticks(), 0);
        assert_eq!(machine.set_level(InterruptState::On), InterruptState::Off);
        assert_eq!(machine.ticks(), SYSTEM_TICK);
        machine.set_level(InterruptState::On);
        assert_eq!(machine.ticks(), SYSTEM_TICK);
        machine.set_level(InterruptState::Off);
        machine.set_level(InterruptState::Off);
        assert_eq!(machine.ticks(), SYSTEM_TICK);
        machine.set_level(InterruptState::On);
        assert_eq!(machine.ticks(), 2 * SYSTEM_TICK);

        machine.set_level(InterruptState::Off);
        machine.set_status(MachineStatus::User);
        machine.set_level(InterruptState::On);
        assert_eq!(machine.ticks(), 2 * SYSTEM_TICK + USER_TICK);
        assert_eq!(machine.stats().user_ticks, USER_TICK);
    }

    #[test]
    fn guard_restores_prior_level() {
        let machine = machine();
        {
            let _outer = InterruptGuard::new(&machine);
            {
                let _inner = InterruptGuard::new(&machine);
                assert_eq!(machine.level(), InterruptState::Off);
            }
            assert_eq!(machine.level(), InterruptState::Off);
        }
        assert_eq!(machine.level(), InterruptState::Off);
        machine.set_level(InterruptState::On);
        {
            let _guard = InterruptGuard::new(&machine);
            assert_eq!(machine.level(), InterruptState::Off);
        }
        assert_eq!(machine.level(), InterruptState::On);
    }

    #[test]
    fn due_interrupts_fire_in_time_order() {
        let machine = machine();
        let log = Arc::new(SpinLock::new(Vec::new()));
        for (name, delay) in [("late", 15), ("first", 5), ("second", 5)] {
            let log = log.clone();
            machine.schedule(Irq::Disk, delay, Wakeup::Event, move |_| {
                log.lock().push(name);
                false
            });
        }
        machine.set_level(InterruptState::On);
        assert_eq!(*log.lock(), ["first", "second"]);
        machine.set_level(InterruptState::Off);
        machine.set_level(InterruptState::On);
        assert_eq!(*log.lock(), ["first", "second", "late"]);
        assert_eq!(machine.pending_interrupts(), 0);
    }

    #[test]
    fn idle_jumps_to_next_interrupt() {
        let machine = machine();
        machine.schedule(Irq::Disk, 1000, Wakeup::Event, |_| false);
        machine.idle();
        assert_eq!(machine.ticks(), 1000);
        assert_eq!(machine.stats().idle_ticks, 1000);
        assert_eq!(machine.status(), MachineStatus::System);

        let err = catch_unwind(AssertUnwindSafe(|| machine.idle())).unwrap_err();
        assert!(err.is::<Halted>());
        assert!(machine.is_halted());
    }

    #[test]
    fn polls_alone_do_not_keep_machine_up() {
        let machine = machine();
        machine.schedule(Irq::Timer, 100, Wakeup::Poll, |_| false);
        {
            let _awake = machine.keep_awake();
            machine.idle();
            assert_eq!(machine.ticks(), 100);
        }
        machine.schedule(Irq::Timer, 100, Wakeup::Poll, |_| false);
        let err = catch_unwind(AssertUnwindSafe(|| machine.idle())).unwrap_err();
        assert!(err.is::<Halted>());
        assert_eq!(machine.pending_interrupts(), 0);
    }

    #[test]
    #[should_panic(expected = "re-enabled inside an interrupt handler")]
    fn reenable_in_handler_is_fatal() {
        let machine = machine();
        machine.set_in_handler(true);
        machine.set_level(InterruptState::On);
    }

    #[test]
    #[should_panic(expected = "Unknown interrupt")]
    fn undelivered_interrupt_is_fatal() {
        let machine = machine();
        machine.schedule(Irq::Serial1, 1, Wakeup::Event, |_| true);
        machine.set_level(InterruptState::On);
    }
}
