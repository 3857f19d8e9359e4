//! Saved execution contexts.
//!
//! Each kernel thread runs on a host thread of its own. A host thread that is
//! not the running kernel thread sits parked in [`suspend`] until somebody
//! hands it the baton with [`Context::resume`]. Exactly one host thread per
//! kernel holds the baton at any time.

use super::Thread;
use crate::Kernel;
use crossbeam_utils::sync::{Parker, Unparker};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use abyss::spin_lock::SpinLock;

const WAIT: u8 = 0;
const RUN: u8 = 1;
const EXIT: u8 = 2;

/// Payload of the unwind that tears down a destroyed thread's host thread.
struct ContextExit;

pub(crate) fn is_exit(payload: &(dyn Any + Send)) -> bool {
    payload.is::<ContextExit>()
}

struct Cpu {
    kernel: Kernel,
    thread: Arc<Thread>,
    baton: Arc<AtomicU8>,
    parker: Parker,
}

thread_local! {
    static CPU: RefCell<Option<Cpu>> = const { RefCell::new(None) };
}

pub(crate) fn current_kernel() -> Option<Kernel> {
    CPU.with(|cpu| cpu.borrow().as_ref().map(|cpu| cpu.kernel.clone()))
}

pub(crate) fn current_thread() -> Option<Arc<Thread>> {
    CPU.with(|cpu| cpu.borrow().as_ref().map(|cpu| cpu.thread.clone()))
}

/// Parks the calling kernel thread until it is resumed.
///
/// Unwinds with a private payload if the thread is killed instead.
pub(crate) fn suspend() {
    CPU.with(|cpu| {
        let cpu = cpu.borrow();
        let Some(cpu) = cpu.as_ref() else {
            panic!("suspend() called outside a kernel thread");
        };
        loop {
            match cpu
                .baton
                .compare_exchange(RUN, WAIT, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return,
                Err(EXIT) => resume_unwind(Box::new(ContextExit)),
                Err(_) => cpu.parker.park(),
            }
        }
    })
}

/// The host side of a kernel thread.
pub(crate) struct Context {
    baton: Arc<AtomicU8>,
    unparker: Unparker,
    host: SpinLock<Option<std::thread::JoinHandle<()>>>,
}

impl Context {
    /// Starts the host thread of `thread`. It waits to be resumed before
    /// running `body`.
    pub(crate) fn spawn(
        kernel: Kernel,
        thread: Arc<Thread>,
        body: impl FnOnce() + Send + 'static,
    ) -> Self {
        let baton = Arc::new(AtomicU8::new(WAIT));
        let parker = Parker::new();
        let unparker = parker.unparker().clone();
        let name = thread.name().to_string();
        let cpu = Cpu {
            kernel,
            thread,
            baton: baton.clone(),
            parker,
        };
        let host = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                CPU.with(|slot| *slot.borrow_mut() = Some(cpu));
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    suspend();
                    body()
                }));
                let cpu = CPU.with(|slot| slot.borrow_mut().take());
                if let (Err(payload), Some(cpu)) = (outcome, cpu) {
                    if !crate::is_quiet(&*payload) {
                        cpu.kernel.fail(payload);
                    }
                }
            })
            .unwrap_or_else(|e| panic!("Cannot start host thread for \"{}\": {}", name, e));
        Self {
            baton,
            unparker,
            host: SpinLock::new(Some(host)),
        }
    }

    /// Hands the baton to this context.
    pub(crate) fn resume(&self) {
        if self
            .baton
            .compare_exchange(WAIT, RUN, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.unparker.unpark();
        }
    }

    /// Makes this context unwind and exit at its next suspension point.
    pub(crate) fn kill(&self) {
        self.baton.store(EXIT, Ordering::Release);
        self.unparker.unpark();
    }

    /// Waits for the host thread to exit.
    pub(crate) fn join(&self) {
        let host = self.host.lock().take();
        if let Some(host) = host {
            let _ = host.join();
        }
    }
}
