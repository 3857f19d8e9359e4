//! Interrupt lines and the entry point into the kernel.

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::sync::Arc;

/// Number of interrupt lines of the machine.
pub const NUM_IRQ: usize = 10;

/// Interrupt lines, one per device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(usize)]
pub enum Irq {
    Timer = 0,
    Disk,
    ConsoleRead,
    ConsoleWrite,
    NetworkSend,
    NetworkRecv,
    Serial0,
    Serial1,
    Serial2,
    Serial3,
}

impl Irq {
    /// Interrupt line of serial unit `unit`.
    pub fn serial(unit: usize) -> Option<Self> {
        (Irq::Serial0 as usize)
            .checked_add(unit)
            .and_then(|line| Self::try_from(line).ok())
    }

    /// The serial unit this line belongs to, if any.
    pub fn serial_unit(self) -> Option<usize> {
        match self {
            Irq::Serial0 | Irq::Serial1 | Irq::Serial2 | Irq::Serial3 => {
                Some(self as usize - Irq::Serial0 as usize)
            }
            _ => None,
        }
    }
}

/// Whoever services the machine's interrupts; the kernel.
///
/// The machine calls [`handle_interrupt`] with the interrupt level Off, from
/// the host thread of whichever kernel thread happened to be running.
///
/// [`handle_interrupt`]: IrqSink::handle_interrupt
pub trait IrqSink: Send + Sync {
    /// Service interrupt `irq`.
    fn handle_interrupt(self: Arc<Self>, irq: Irq);

    /// The machine halted; wake up everything parked on it.
    fn on_halt(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_lines() {
        assert_eq!(Irq::serial(0), Some(Irq::Serial0));
        assert_eq!(Irq::serial(3), Some(Irq::Serial3));
        assert_eq!(Irq::serial(4), None);
        assert_eq!(Irq::Serial2.serial_unit(), Some(2));
        assert_eq!(Irq::Disk.serial_unit(), None);
        assert_eq!(usize::from(Irq::Serial3) + 1, NUM_IRQ);
    }
}
