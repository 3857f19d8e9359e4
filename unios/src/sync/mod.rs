//! Synchronization primitives.
//!
//! Everything here is built on the interrupt level alone: an operation
//! disables interrupts, inspects or mutates its wait queue, possibly sleeps,
//! and restores the previous level.

mod condition;
mod lock;
mod semaphore;
mod synch_list;
mod wait_queue;

pub use condition::Condition;
pub use lock::Lock;
pub use semaphore::Semaphore;
pub use synch_list::SynchList;
pub use wait_queue::WaitQueue;
