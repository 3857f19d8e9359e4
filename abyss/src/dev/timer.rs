//! Hardware timer.
//!
//! Once enabled, the timer raises [`Irq::Timer`] every
//! [`TIMER_TICKS`](crate::stats::TIMER_TICKS) ticks, or after a random delay
//! when the machine is configured with [`TimerMode::Random`].

use crate::config::TimerMode;
use crate::interrupt::{Irq, Wakeup};
use crate::machine::Machine;
use crate::stats::TIMER_TICKS;
use core::sync::atomic::{AtomicBool, Ordering};
use rand::Rng;

pub(crate) struct TimerState {
    enabled: AtomicBool,
    armed: AtomicBool,
}

impl TimerState {
    pub(crate) fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        }
    }
}

/// View of the machine's timer.
pub struct Timer<'a> {
    machine: &'a Machine,
    state: &'a TimerState,
}

impl<'a> Timer<'a> {
    pub(crate) fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            state: &machine.timer,
        }
    }

    /// Starts raising timer interrupts.
    pub fn enable(&self) {
        self.state.enabled.store(true, Ordering::SeqCst);
        if !self.state.armed.swap(true, Ordering::SeqCst) {
            self.schedule_next();
        }
    }

    /// Stops raising timer interrupts. A tick already in flight is swallowed.
    pub fn disable(&self) {
        self.state.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.state.enabled.load(Ordering::SeqCst)
    }

    fn schedule_next(&self) {
        let delay = match self.machine.timer_mode() {
            TimerMode::Random => self
                .machine
                .with_rng(|rng| rng.gen_range(1..=2 * TIMER_TICKS)),
            TimerMode::Off | TimerMode::Periodic => TIMER_TICKS,
        };
        self.machine
            .schedule(Irq::Timer, delay, Wakeup::Poll, |machine| {
                machine.timer().expired()
            });
    }

    fn expired(&self) -> bool {
        if !self.is_enabled() {
            self.state.armed.store(false, Ordering::SeqCst);
            return false;
        }
        self.schedule_next();
        true
    }
}
