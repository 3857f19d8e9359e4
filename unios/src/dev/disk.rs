//! Synchronous disk access.

use crate::interrupt::InterruptHandler;
use crate::sync::{Lock, Semaphore};
use crate::{Kernel, KernelError};
use abyss::interrupt::Irq;
use abyss::Machine;
use std::sync::Arc;

/// Turns the asynchronous disk into blocking sector reads and writes.
///
/// Only one request is outstanding at a time; other requesters wait on the
/// driver's lock.
pub struct DiskDriver {
    machine: Arc<Machine>,
    lock: Lock,
    done: Semaphore,
}

impl DiskDriver {
    /// Creates the driver and registers its interrupt handler on `kernel`.
    pub fn new(kernel: &Kernel) -> Arc<Self> {
        let driver = Arc::new(Self {
            machine: kernel.machine().clone(),
            lock: Lock::new("synch disk lock"),
            done: Semaphore::new("synch disk", 0),
        });
        kernel.register_handler(Irq::Disk, driver.clone());
        driver
    }

    /// Reads `sector` into `data`, waiting for the disk to finish.
    pub fn read_sector(&self, sector: usize, data: &mut [u8]) -> Result<(), KernelError> {
        self.lock.acquire();
        let result = self.machine.disk().read_request(sector, data);
        if result.is_ok() {
            self.done.p();
        }
        self.lock.release();
        Ok(result?)
    }

    /// Writes `data` to `sector`, waiting for the disk to finish.
    pub fn write_sector(&self, sector: usize, data: &[u8]) -> Result<(), KernelError> {
        self.lock.acquire();
        let result = self.machine.disk().write_request(sector, data);
        if result.is_ok() {
            self.done.p();
        }
        self.lock.release();
        Ok(result?)
    }
}

impl InterruptHandler for DiskDriver {
    fn service_device(&self, _kernel: &Kernel) {
        self.done.v();
    }
}
