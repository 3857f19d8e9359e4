//! The abyss of the kernel that operates the hardware.
//!
//! This crate simulates the machine the kernel runs on: a single processor
//! whose only atomicity mechanism is the interrupt level, a simulated clock,
//! and devices (timer, disk, console, serial ports, network) that complete
//! requests by raising an interrupt some simulated ticks later.
//!
//! Treat these codes as the hardware. The kernel issues a request to a device
//! and then waits for the interrupt; it never peeks at device internals.

#[macro_use]
pub mod kprint;
pub mod config;
pub mod dev;
pub mod interrupt;
pub mod machine;
pub mod stats;

pub use config::{MachineConfig, TimerMode};
pub use kprint::DebugFlags;
pub use machine::Machine;
pub use spin_lock;
