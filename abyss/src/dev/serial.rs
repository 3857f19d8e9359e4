//! Serial ports.
//!
//! The machine has [`NUM_UNITS`] UART-like ports. Writing the transmit
//! holding register clears [`Lsr::TRDY`]; [`CONSOLE_TIME`] ticks later the
//! byte lands in the peer's receive FIFO and both sides raise their interrupt
//! line. A port only raises interrupts while its modem control register has
//! [`Mcr::DTR`] set. Every port is its own peer (loopback) until connected to
//! another one.

use super::DeviceError;
use crate::interrupt::{Irq, Wakeup};
use crate::machine::Machine;
use crate::stats::CONSOLE_TIME;
use spin_lock::SpinLock;
use std::collections::VecDeque;

/// Number of serial ports.
pub const NUM_UNITS: usize = 4;

bitflags::bitflags! {
    /// Line status register.
    pub struct Lsr: u8 {
        /// Receive buffer holds data.
        const RRDY = 0x01;
        /// Transmitter is ready for another byte.
        const TRDY = 0x20;
    }
}

bitflags::bitflags! {
    /// Modem control register.
    pub struct Mcr: u8 {
        /// Data terminal ready; the port raises interrupts.
        const DTR = 0x01;
        /// Request to send.
        const RTS = 0x02;
    }
}

struct Uart {
    rx: VecDeque<u8>,
    transmitting: bool,
    mcr: Mcr,
    peer: usize,
}

pub(crate) struct SerialState {
    units: [SpinLock<Uart>; NUM_UNITS],
}

impl SerialState {
    pub(crate) fn new() -> Self {
        Self {
            units: core::array::from_fn(|unit| {
                SpinLock::new(Uart {
                    rx: VecDeque::new(),
                    transmitting: false,
                    mcr: Mcr::empty(),
                    peer: unit,
                })
            }),
        }
    }
}

/// View of one serial port.
pub struct SerialPort<'a> {
    machine: &'a Machine,
    unit: usize,
    irq: Irq,
    uart: &'a SpinLock<Uart>,
}

impl<'a> SerialPort<'a> {
    pub(crate) fn new(machine: &'a Machine, unit: usize) -> Result<Self, DeviceError> {
        let uart = machine
            .serial
            .units
            .get(unit)
            .ok_or(DeviceError::NoSuchUnit(unit))?;
        let irq = Irq::serial(unit).ok_or(DeviceError::NoSuchUnit(unit))?;
        Ok(Self {
            machine,
            unit,
            irq,
            uart,
        })
    }

    pub fn unit(&self) -> usize {
        self.unit
    }

    /// Reads the line status register.
    pub fn lsr(&self) -> Lsr {
        let uart = self.uart.lock();
        let mut lsr = Lsr::empty();
        lsr.set(Lsr::RRDY, !uart.rx.is_empty());
        lsr.set(Lsr::TRDY, !uart.transmitting);
        lsr
    }

    pub fn mcr(&self) -> Mcr {
        self.uart.lock().mcr
    }

    pub fn set_mcr(&self, mcr: Mcr) {
        self.uart.lock().mcr = mcr;
    }

    /// Wires this port's transmitter to unit `peer`'s receiver and back.
    pub fn connect(&self, peer: usize) -> Result<(), DeviceError> {
        let other = self.machine.serial(peer)?;
        self.uart.lock().peer = peer;
        other.uart.lock().peer = self.unit;
        debug!(SERIAL, "Serial unit {} connected to unit {}", self.unit, peer);
        Ok(())
    }

    /// Writes the transmit holding register. [`Lsr::TRDY`] must be set.
    pub fn write_thr(&self, byte: u8) {
        let peer = {
            let mut uart = self.uart.lock();
            assert!(!uart.transmitting, "Serial unit {}: transmitter busy", self.unit);
            uart.transmitting = true;
            uart.peer
        };
        debug!(SERIAL, "Serial unit {} sends {:#04x}", self.unit, byte);
        self.machine
            .with_stats(|stats| stats.num_serial_chars_written += 1);
        let unit = self.unit;
        self.machine
            .schedule(self.irq, CONSOLE_TIME, Wakeup::Event, move |machine| {
                let Ok(sender) = machine.serial(unit) else {
                    return false;
                };
                sender.uart.lock().transmitting = false;
                if let Ok(receiver) = machine.serial(peer) {
                    receiver.uart.lock().rx.push_back(byte);
                    if peer != unit {
                        receiver.raise();
                    }
                }
                sender.interrupts_enabled()
            });
    }

    /// Reads the receive buffer register.
    pub fn read_rbr(&self) -> Option<u8> {
        let byte = self.uart.lock().rx.pop_front();
        if byte.is_some() {
            self.machine
                .with_stats(|stats| stats.num_serial_chars_read += 1);
        }
        byte
    }

    fn raise(&self) {
        let unit = self.unit;
        self.machine.schedule(self.irq, 1, Wakeup::Event, move |machine| {
            machine
                .serial(unit)
                .map(|port| port.interrupts_enabled())
                .unwrap_or(false)
        });
    }

    fn interrupts_enabled(&self) -> bool {
        self.uart.lock().mcr.contains(Mcr::DTR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptState;
    use crate::MachineConfig;

    #[test]
    fn loopback_without_interrupts() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        assert!(matches!(machine.serial(NUM_UNITS), Err(DeviceError::NoSuchUnit(4))));
        let port = machine.serial(1).unwrap();
        assert_eq!(port.lsr(), Lsr::TRDY);
        port.write_thr(b'x');
        assert_eq!(port.lsr(), Lsr::empty());

        // DTR is clear, so the completion is not raised.
        while machine.pending_interrupts() > 0 {
            machine.set_level(InterruptState::Off);
            machine.set_level(InterruptState::On);
        }
        assert_eq!(port.lsr(), Lsr::TRDY | Lsr::RRDY);
        assert_eq!(port.read_rbr(), Some(b'x'));
        assert_eq!(port.read_rbr(), None);
    }

    #[test]
    fn connected_ports_cross_over() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        let a = machine.serial(0).unwrap();
        let b = machine.serial(2).unwrap();
        a.connect(2).unwrap();
        a.write_thr(1);
        b.write_thr(2);
        while machine.pending_interrupts() > 0 {
            machine.set_level(InterruptState::Off);
            machine.set_level(InterruptState::On);
        }
        assert_eq!(a.read_rbr(), Some(2));
        assert_eq!(b.read_rbr(), Some(1));
        assert_eq!(machine.stats().num_serial_chars_written, 2);
        assert_eq!(machine.stats().num_serial_chars_read, 2);
    }
}
