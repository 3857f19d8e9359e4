//! Synchronous console access.

use crate::sync::{Lock, Semaphore};
use crate::Kernel;
use abyss::interrupt::Irq;
use abyss::Machine;
use std::sync::Arc;

/// Blocking character I/O on the console.
pub struct ConsoleDriver {
    machine: Arc<Machine>,
    read_lock: Lock,
    read_avail: Semaphore,
    write_lock: Lock,
    write_done: Semaphore,
}

impl ConsoleDriver {
    /// Creates the driver and registers its interrupt handlers on `kernel`.
    pub fn new(kernel: &Kernel) -> Arc<Self> {
        let driver = Arc::new(Self {
            machine: kernel.machine().clone(),
            read_lock: Lock::new("console read lock"),
            read_avail: Semaphore::new("console read avail", 0),
            write_lock: Lock::new("console write lock"),
            write_done: Semaphore::new("console write done", 0),
        });
        let reader = driver.clone();
        kernel.register_handler(
            Irq::ConsoleRead,
            Arc::new(move |_: &Kernel| reader.read_avail.v()),
        );
        let writer = driver.clone();
        kernel.register_handler(
            Irq::ConsoleWrite,
            Arc::new(move |_: &Kernel| writer.write_done.v()),
        );
        driver
    }

    /// Waits for the next character typed on the keyboard.
    pub fn get_char(&self) -> u8 {
        self.read_lock.acquire();
        self.read_avail.p();
        let ch = self.machine.console().get_char();
        self.read_lock.release();
        ch.unwrap_or_else(|| unreachable!("console read interrupt without a character"))
    }

    /// Writes `ch` to the display, waiting until it is out.
    pub fn put_char(&self, ch: u8) {
        self.write_lock.acquire();
        self.machine.console().put_char(ch);
        self.write_done.p();
        self.write_lock.release();
    }

    /// Writes every byte of `s`.
    pub fn put_str(&self, s: &str) {
        for ch in s.bytes() {
            self.put_char(ch);
        }
    }

    /// Stops the keyboard. Characters already delivered remain readable.
    pub fn stop(&self) {
        self.read_lock.acquire();
        self.machine.console().stop();
        self.read_lock.release();
    }
}
