//! Devices.
//!
//! Each device keeps its state inside the [`Machine`] and is driven through a
//! short-lived view borrowed from it, e.g. `machine.disk()`. A device accepts
//! one request at a time and reports completion by raising its interrupt line.

pub mod console;
pub mod disk;
pub mod network;
pub mod serial;
pub mod timer;

use crate::machine::Machine;
use thiserror::Error;

/// Errors raised by a device for a request it cannot accept.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("sector {0} is out of range")]
    SectorOutOfRange(usize),
    #[error("sector buffer holds {0} bytes, expected {size}", size = disk::SECTOR_SIZE)]
    BadBufferSize(usize),
    #[error("disk image of {0} bytes does not fit on the disk")]
    ImageTooLarge(usize),
    #[error("serial unit {0} does not exist")]
    NoSuchUnit(usize),
    #[error("packet payload of {0} bytes exceeds {max} bytes", max = network::MAX_PAYLOAD)]
    PacketTooLarge(usize),
    #[error("machine is not attached to a network")]
    NoNetwork,
    #[error("network address {0} is already in use")]
    AddressInUse(u8),
    #[error("network reliability {0} is outside [0, 1]")]
    InvalidReliability(f64),
}

impl Machine {
    pub fn timer(&self) -> timer::Timer<'_> {
        timer::Timer::new(self)
    }

    pub fn disk(&self) -> disk::Disk<'_> {
        disk::Disk::new(self)
    }

    pub fn console(&self) -> console::Console<'_> {
        console::Console::new(self)
    }

    /// Serial port `unit`.
    pub fn serial(&self, unit: usize) -> Result<serial::SerialPort<'_>, DeviceError> {
        serial::SerialPort::new(self, unit)
    }

    pub fn network(&self) -> network::Network<'_> {
        network::Network::new(self)
    }

    /// Returns true if a polling device can make progress by itself, so the
    /// machine must keep running.
    pub(crate) fn devices_want_wakeup(&self) -> bool {
        self.console().wants_poll() || self.network().wants_poll()
    }
}
