//! Kernel print utilities.
//!
//! Besides the plain printing macros, the kernel emits per-subsystem debug
//! messages through [`debug!`]. They are silent until their [`DebugFlags`]
//! are switched on, usually from the letters given on the command line.

use core::fmt::Write;
use core::sync::atomic::{AtomicU32, Ordering};
use spin_lock::SpinLock;

bitflags::bitflags! {
    /// Subsystems whose debug messages can be enabled.
    pub struct DebugFlags: u32 {
        /// `t`: thread creation, switching and destruction.
        const THREAD = 1 << 0;
        /// `s`: semaphores, locks and condition variables.
        const SYNC = 1 << 1;
        /// `i`: interrupt scheduling and delivery.
        const INTERRUPT = 1 << 2;
        /// `m`: the machine itself.
        const MACHINE = 1 << 3;
        /// `d`: disk requests.
        const DISK = 1 << 4;
        /// `c`: console reads and writes.
        const CONSOLE = 1 << 5;
        /// `p`: serial ports.
        const SERIAL = 1 << 6;
        /// `n`: network packets.
        const NETWORK = 1 << 7;
        /// `a`: address spaces.
        const ADDRSPACE = 1 << 8;
    }
}

impl DebugFlags {
    /// Parses a string of flag letters.
    ///
    /// `+` enables every flag. Letters that name no flag are ignored.
    pub fn from_letters(letters: &str) -> Self {
        letters.chars().fold(Self::empty(), |flags, c| {
            flags
                | match c {
                    '+' => Self::all(),
                    't' => Self::THREAD,
                    's' => Self::SYNC,
                    'i' => Self::INTERRUPT,
                    'm' => Self::MACHINE,
                    'd' => Self::DISK,
                    'c' => Self::CONSOLE,
                    'p' => Self::SERIAL,
                    'n' => Self::NETWORK,
                    'a' => Self::ADDRSPACE,
                    _ => Self::empty(),
                }
        })
    }
}

static ENABLED: AtomicU32 = AtomicU32::new(0);

/// Enables the given debug flags, in addition to those already on.
pub fn enable(flags: DebugFlags) {
    ENABLED.fetch_or(flags.bits(), Ordering::SeqCst);
}

/// Returns true if any of `flags` is enabled.
pub fn is_enabled(flags: DebugFlags) -> bool {
    DebugFlags::from_bits_truncate(ENABLED.load(Ordering::Relaxed)).intersects(flags)
}

struct HostConsole;

impl Write for HostConsole {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        std::print!("{}", s);
        Ok(())
    }
}

static CONSOLE: SpinLock<HostConsole> = SpinLock::new(HostConsole);

#[doc(hidden)]
pub fn _print(fmt: core::fmt::Arguments<'_>) {
    let _ = write!(&mut *CONSOLE.lock(), "{}", fmt);
}

/// Prints out the message.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::kprint::_print(format_args!($($arg)*)));
}

/// Prints out the message with a newline.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}

/// Display an information message.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => ($crate::kprint::_print(
            format_args!(
                "[INFO] {}\n",
                format_args!($($arg)*)
            )
        )
    );
}

/// Display a warning message.
///
/// Use the format! syntax to write data to the standard output.
/// This first holds the lock for console device.
#[macro_export]
macro_rules! warning {
    ($($arg:tt)*) => ($crate::kprint::_print(
            format_args!(
                "[WARNING] {}\n",
                format_args!($($arg)*)
            )
        )
    );
}

/// Print msg if the subsystem's debug flag is enabled.
///
/// ```ignore
/// debug!(DISK, "Reading sector {}", sector);
/// ```
#[macro_export]
macro_rules! debug {
    ($flag:ident, $($arg:tt)*) => {
        if $crate::kprint::is_enabled($crate::kprint::DebugFlags::$flag) {
            $crate::kprint::_print(
                format_args!(
                    "[DEBUG] {}\n",
                    format_args!($($arg)*)
                )
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::DebugFlags;

    #[test]
    fn parse_flag_letters() {
        assert_eq!(DebugFlags::from_letters(""), DebugFlags::empty());
        assert_eq!(
            DebugFlags::from_letters("td"),
            DebugFlags::THREAD | DebugFlags::DISK
        );
        assert_eq!(DebugFlags::from_letters("x+"), DebugFlags::all());
        assert_eq!(DebugFlags::from_letters("zq"), DebugFlags::empty());
    }
}
