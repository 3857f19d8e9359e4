//! Interrupt-driven serial port driver.
//!
//! Each open port has a software output queue fed by [`put_byte`] and
//! drained by the interrupt handler whenever the transmitter becomes ready,
//! and an input queue the handler fills from the receive FIFO.
//!
//! [`put_byte`]: SerialDriver::put_byte

use crate::sync::Semaphore;
use crate::{Kernel, KernelError};
use abyss::dev::serial::{Lsr, Mcr, NUM_UNITS};
use abyss::dev::DeviceError;
use abyss::interrupt::{InterruptGuard, Irq};
use abyss::spin_lock::SpinLock;
use abyss::Machine;
use std::collections::VecDeque;
use std::sync::Arc;

struct Queues {
    output: VecDeque<u8>,
    input: VecDeque<u8>,
    busy: bool,
}

struct Port {
    unit: usize,
    queues: SpinLock<Queues>,
    data_avail: Semaphore,
    space_avail: Semaphore,
}

impl Port {
    // Starts transmitting the next queued byte if the transmitter is idle.
    // Interrupts must be disabled.
    fn start_xmit(&self, machine: &Machine) -> Result<(), DeviceError> {
        let next = {
            let mut queues = self.queues.lock();
            if queues.busy {
                return Ok(());
            }
            let next = queues.output.pop_front();
            queues.busy = next.is_some();
            next
        };
        if let Some(byte) = next {
            machine.serial(self.unit)?.write_thr(byte);
            self.space_avail.v();
        }
        Ok(())
    }

    fn service(&self, kernel: &Kernel) -> Result<(), DeviceError> {
        let machine = kernel.machine();
        let uart = machine.serial(self.unit)?;
        debug!(
            SERIAL,
            "Serial interrupt: unit #{} at time {}",
            self.unit,
            machine.ticks()
        );
        if uart.lsr().contains(Lsr::TRDY) {
            self.queues.lock().busy = false;
            self.start_xmit(machine)?;
        }
        while uart.lsr().contains(Lsr::RRDY) {
            if let Some(byte) = uart.read_rbr() {
                self.queues.lock().input.push_back(byte);
                self.data_avail.v();
            }
        }
        Ok(())
    }
}

/// Driver of the machine's serial ports.
pub struct SerialDriver {
    machine: Arc<Machine>,
    ports: [SpinLock<Option<Arc<Port>>>; NUM_UNITS],
}

impl SerialDriver {
    /// Creates the driver. Ports are opened individually with
    /// [`open_port`](Self::open_port).
    pub fn new(kernel: &Kernel) -> Arc<Self> {
        Arc::new(Self {
            machine: kernel.machine().clone(),
            ports: core::array::from_fn(|_| SpinLock::new(None)),
        })
    }

    fn port(&self, unit: usize) -> Result<Arc<Port>, KernelError> {
        self.ports
            .get(unit)
            .ok_or(DeviceError::NoSuchUnit(unit))?
            .lock()
            .clone()
            .ok_or(KernelError::PortNotOpen(unit))
    }

    fn irq(unit: usize) -> Result<Irq, KernelError> {
        Ok(Irq::serial(unit).ok_or(DeviceError::NoSuchUnit(unit))?)
    }

    /// Opens serial unit `unit` and enables its interrupts.
    pub fn open_port(&self, kernel: &Kernel, unit: usize) -> Result<(), KernelError> {
        let irq = Self::irq(unit)?;
        let uart = self.machine.serial(unit)?;
        let _guard = InterruptGuard::new(&self.machine);
        let port = Arc::new(Port {
            unit,
            queues: SpinLock::new(Queues {
                output: VecDeque::new(),
                input: VecDeque::new(),
                busy: false,
            }),
            data_avail: Semaphore::new(format!("data available: serial unit {}", unit), 0),
            space_avail: Semaphore::new(format!("space available: serial unit {}", unit), 1),
        });
        {
            let mut slot = self.ports[unit].lock();
            if slot.is_some() {
                return Err(KernelError::PortInUse(unit));
            }
            *slot = Some(port.clone());
        }
        kernel.register_handler(
            irq,
            Arc::new(move |kernel: &Kernel| {
                if let Err(e) = port.service(kernel) {
                    warning!("Serial unit {}: {}", port.unit, e);
                }
            }),
        );
        uart.set_mcr(Mcr::DTR | Mcr::RTS);
        debug!(SERIAL, "Serial port {} open", unit);
        Ok(())
    }

    /// Disables the interrupts of `unit` and forgets its queues. Closing a
    /// port that is not open does nothing.
    pub fn close_port(&self, kernel: &Kernel, unit: usize) -> Result<(), KernelError> {
        let irq = Self::irq(unit)?;
        let uart = self.machine.serial(unit)?;
        let _guard = InterruptGuard::new(&self.machine);
        let port = self.ports[unit].lock().take();
        if port.is_some() {
            uart.set_mcr(Mcr::empty());
            kernel.unregister_handler(irq);
            debug!(SERIAL, "Serial port {} closed", unit);
        }
        Ok(())
    }

    /// Cross-connects units `a` and `b`, which are otherwise loopbacks.
    pub fn connect_ports(&self, a: usize, b: usize) -> Result<(), KernelError> {
        Ok(self.machine.serial(a)?.connect(b)?)
    }

    /// Queues `byte` for transmission on `unit`. Waits while a byte is
    /// already queued.
    pub fn put_byte(&self, unit: usize, byte: u8) -> Result<(), KernelError> {
        let port = self.port(unit)?;
        let _guard = InterruptGuard::new(&self.machine);
        port.space_avail.p();
        port.queues.lock().output.push_back(byte);
        port.start_xmit(&self.machine)?;
        Ok(())
    }

    /// Waits for a byte to arrive on `unit`.
    pub fn get_byte(&self, unit: usize) -> Result<u8, KernelError> {
        let port = self.port(unit)?;
        let _guard = InterruptGuard::new(&self.machine);
        port.data_avail.p();
        let byte = port.queues.lock().input.pop_front();
        Ok(byte.unwrap_or_else(|| unreachable!("serial data signalled without data")))
    }

    /// Closes every port.
    pub fn stop(&self, kernel: &Kernel) -> Result<(), KernelError> {
        (0..NUM_UNITS).try_for_each(|unit| self.close_port(kernel, unit))
    }
}
