//! Simulated console.
//!
//! The keyboard side polls its input every [`CONSOLE_TIME`] ticks and raises
//! [`Irq::ConsoleRead`] when a character becomes available. The display side
//! accepts one character at a time and raises [`Irq::ConsoleWrite`]
//! [`CONSOLE_TIME`] ticks later.

use crate::interrupt::{Irq, Wakeup};
use crate::machine::Machine;
use crate::stats::CONSOLE_TIME;
use spin_lock::SpinLock;
use std::collections::VecDeque;

struct ConsoleInner {
    input: VecDeque<u8>,
    incoming: Option<u8>,
    polling: bool,
    output: Vec<u8>,
    writing: bool,
    echo: bool,
}

pub(crate) struct ConsoleState {
    inner: SpinLock<ConsoleInner>,
}

impl ConsoleState {
    pub(crate) fn new(input: Vec<u8>, echo: bool) -> Self {
        Self {
            inner: SpinLock::new(ConsoleInner {
                input: input.into(),
                incoming: None,
                polling: false,
                output: Vec::new(),
                writing: false,
                echo,
            }),
        }
    }
}

/// View of the machine's console.
pub struct Console<'a> {
    machine: &'a Machine,
    state: &'a ConsoleState,
}

impl<'a> Console<'a> {
    pub(crate) fn new(machine: &'a Machine) -> Self {
        Self {
            machine,
            state: &machine.console,
        }
    }

    /// Starts polling the keyboard if there is input to deliver.
    pub(crate) fn start_polling(&self) {
        {
            let mut inner = self.state.inner.lock();
            if inner.polling || inner.input.is_empty() {
                return;
            }
            inner.polling = true;
        }
        self.schedule_poll();
    }

    fn schedule_poll(&self) {
        self.machine
            .schedule(Irq::ConsoleRead, CONSOLE_TIME, Wakeup::Poll, |machine| {
                machine.console().poll()
            });
    }

    fn poll(&self) -> bool {
        let (ch, more) = {
            let mut inner = self.state.inner.lock();
            if !inner.polling {
                return false;
            }
            let ch = match inner.incoming {
                Some(_) => None,
                None => inner.input.pop_front(),
            };
            inner.incoming = inner.incoming.or(ch);
            inner.polling = !inner.input.is_empty();
            (ch, inner.polling)
        };
        if more {
            self.schedule_poll();
        }
        match ch {
            Some(ch) => {
                debug!(CONSOLE, "Console read {:?}", ch as char);
                self.machine
                    .with_stats(|stats| stats.num_console_chars_read += 1);
                true
            }
            None => false,
        }
    }

    /// Queues more keyboard input.
    pub fn feed(&self, bytes: &[u8]) {
        self.state.inner.lock().input.extend(bytes);
        self.start_polling();
    }

    /// Unplugs the keyboard: pending input is discarded and polling stops.
    pub fn stop(&self) {
        let mut inner = self.state.inner.lock();
        inner.input.clear();
        inner.polling = false;
    }

    /// Takes the character that raised the last read interrupt, if any.
    pub fn get_char(&self) -> Option<u8> {
        self.state.inner.lock().incoming.take()
    }

    /// Writes `ch` to the display. Completion is signalled by
    /// [`Irq::ConsoleWrite`].
    pub fn put_char(&self, ch: u8) {
        let echo = {
            let mut inner = self.state.inner.lock();
            assert!(!inner.writing, "Console: only one write at a time");
            inner.writing = true;
            inner.output.push(ch);
            inner.echo
        };
        if echo {
            print!("{}", ch as char);
        }
        self.machine
            .with_stats(|stats| stats.num_console_chars_written += 1);
        self.machine
            .schedule(Irq::ConsoleWrite, CONSOLE_TIME, Wakeup::Event, |machine| {
                machine.console().state.inner.lock().writing = false;
                true
            });
    }

    /// Everything written to the display so far.
    pub fn output(&self) -> Vec<u8> {
        self.state.inner.lock().output.clone()
    }

    /// Returns true if the keyboard can deliver a character at its next
    /// poll.
    pub(crate) fn wants_poll(&self) -> bool {
        let inner = self.state.inner.lock();
        inner.polling && inner.incoming.is_none()
    }
}

#[cfg(test)]
mod tests {
    use crate::interrupt::{Halted, InterruptState};
    use crate::{Machine, MachineConfig};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    #[test]
    fn keyboard_stops_polling_when_drained() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        assert_eq!(machine.pending_interrupts(), 0);
        machine.console().feed(b"a");
        assert_eq!(machine.pending_interrupts(), 1);
        assert!(machine.console().wants_poll());
        assert!(machine.console().get_char().is_none());

        // The read interrupt is delivered to the kernel; none is attached.
        let err = catch_unwind(AssertUnwindSafe(|| machine.idle())).unwrap_err();
        assert!(!err.is::<Halted>());
        assert_eq!(machine.console().get_char(), Some(b'a'));
        assert_eq!(machine.pending_interrupts(), 0);
        assert_eq!(machine.level(), InterruptState::Off);
    }
}
