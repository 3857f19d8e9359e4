//! An instructional uniprocessor kernel.
//!
//! The kernel runs on a simulated [`Machine`](abyss::Machine). Every kernel
//! thread is backed by a host thread, but exactly one of them runs kernel
//! code at any time; the others are parked until the scheduler dispatches
//! them. The only mutual exclusion the kernel relies on is the machine's
//! interrupt level, on top of which it builds [`Semaphore`](sync::Semaphore),
//! [`Lock`](sync::Lock) and Mesa-style [`Condition`](sync::Condition)
//! variables. Device drivers turn "issue a request, wait for the interrupt"
//! into ordinary blocking calls.
//!
//! ```no_run
//! use unios::{thread::ThreadBuilder, Kernel};
//!
//! let report = Kernel::boot(abyss::MachineConfig::default(), || {
//!     let child = ThreadBuilder::new("child").spawn(|| 42);
//!     assert_eq!(child.join(), 42);
//! })
//! .unwrap();
//! println!("{}", report.stats);
//! ```
#![warn(missing_docs)]

#[macro_use]
extern crate abyss;

pub mod dev;
pub mod interrupt;
pub mod kernel;
pub mod sync;
pub mod thread;

pub use abyss::{debug, info, print, println, spin_lock, warning};
pub use kernel::{Kernel, KernelError, Report};

use abyss::interrupt::{Halted, InterruptState};
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

// Test utilities
#[doc(hidden)]
pub trait TestFn
where
    Self: Sync + Send,
{
    fn run(&'static self) -> bool;
}

/// Returns true if a panic payload only carries a halt or a thread teardown,
/// which must keep unwinding.
pub(crate) fn is_quiet(payload: &(dyn std::any::Any + Send)) -> bool {
    payload.is::<Halted>() || thread::context::is_exit(payload)
}

/// Run the given tests, each on a kernel thread of its own.
///
/// Must be called from a kernel thread. Returns the number of failed tests.
pub fn do_tests(tests: &'static [&'static dyn TestFn]) -> usize {
    impl<T> TestFn for T
    where
        T: Fn() + Send + Sync + 'static,
    {
        fn run(&'static self) -> bool {
            print!("test {} ... ", core::any::type_name::<T>());
            let passed = crate::thread::ThreadBuilder::new(core::any::type_name::<T>())
                .spawn(move || match catch_unwind(AssertUnwindSafe(|| self())) {
                    Ok(()) => true,
                    Err(payload) if is_quiet(&*payload) => resume_unwind(payload),
                    Err(_) => {
                        // A failed test may leave interrupts disabled.
                        Kernel::current().machine().set_level(InterruptState::On);
                        false
                    }
                })
                .join();
            if passed {
                println!("ok");
            } else {
                println!("FAILED");
            }
            passed
        }
    }

    let (total, mut succ) = (tests.len(), 0);
    println!(
        "running {} test{}",
        total,
        if total == 1 { "" } else { "s" }
    );

    for test in tests {
        if test.run() {
            succ += 1;
        }
    }
    println!(
        "test result: {}. {} passed; {} failed",
        if total == succ { "ok" } else { "FAILED" },
        succ,
        total - succ
    );
    total - succ
}
