//! Device drivers.
//!
//! Every driver follows the same idiom: a [`Lock`](crate::sync::Lock)
//! serializes requesters against a device that accepts one request at a
//! time, and a [`Semaphore`](crate::sync::Semaphore) signalled by the
//! device's interrupt handler lets the requester wait for completion.

pub mod alarm;
pub mod console;
pub mod disk;
pub mod network;
pub mod serial;

pub use alarm::Alarm;
pub use console::ConsoleDriver;
pub use disk::DiskDriver;
pub use network::NetworkDriver;
pub use serial::SerialDriver;
