//! Performance counters of the simulated machine.
//!
//! Simulated time only moves forward when interrupts are re-enabled (the
//! kernel pays [`SYSTEM_TICK`] for every such transition) and when the
//! processor idles, in which case the clock jumps to the next pending
//! interrupt.

use core::fmt;

/// Ticks charged for a re-enable of interrupts while running user code.
pub const USER_TICK: u64 = 1;
/// Ticks charged for a re-enable of interrupts while running the kernel.
pub const SYSTEM_TICK: u64 = 10;
/// Ticks for the disk to rotate by one sector.
pub const ROTATION_TIME: u64 = 500;
/// Ticks for the disk arm to move by one track.
pub const SEEK_TIME: u64 = 500;
/// Ticks for the console to consume or produce a character.
pub const CONSOLE_TIME: u64 = 100;
/// Ticks for a packet to cross the network.
pub const NETWORK_TIME: u64 = 100;
/// Ticks between timer interrupts.
pub const TIMER_TICKS: u64 = 100;

/// Counters the machine keeps while it runs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub total_ticks: u64,
    pub idle_ticks: u64,
    pub system_ticks: u64,
    pub user_ticks: u64,
    pub num_disk_reads: u64,
    pub num_disk_writes: u64,
    pub num_console_chars_read: u64,
    pub num_console_chars_written: u64,
    pub num_serial_chars_read: u64,
    pub num_serial_chars_written: u64,
    pub num_packets_sent: u64,
    pub num_packets_recvd: u64,
}

impl fmt::Display for Statistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Ticks: total {}, idle {}, system {}, user {}",
            self.total_ticks, self.idle_ticks, self.system_ticks, self.user_ticks
        )?;
        writeln!(
            f,
            "Disk I/O: reads {}, writes {}",
            self.num_disk_reads, self.num_disk_writes
        )?;
        writeln!(
            f,
            "Console I/O: reads {}, writes {}",
            self.num_console_chars_read, self.num_console_chars_written
        )?;
        writeln!(
            f,
            "Serial I/O: reads {}, writes {}",
            self.num_serial_chars_read, self.num_serial_chars_written
        )?;
        write!(
            f,
            "Network I/O: packets received {}, sent {}",
            self.num_packets_recvd, self.num_packets_sent
        )
    }
}
