//! Interrupt management.
//!
//! Every device interrupt line has at most one [`InterruptHandler`]. The
//! kernel's wrapper runs it with interrupts disabled, on whatever thread
//! happened to be running when the interrupt fired. A handler must never
//! switch threads itself; it asks for a switch with
//! [`Kernel::yield_on_return`], which the wrapper honors once the handler
//! has returned.
use crate::Kernel;
use abyss::interrupt::{Irq, MachineStatus, NUM_IRQ};
use abyss::spin_lock::SpinLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A device interrupt handler.
pub trait InterruptHandler: Send + Sync {
    /// Services the device. Runs with interrupts disabled.
    fn service_device(&self, kernel: &Kernel);
}

impl<F> InterruptHandler for F
where
    F: Fn(&Kernel) + Send + Sync,
{
    fn service_device(&self, kernel: &Kernel) {
        self(kernel)
    }
}

type Handler = SpinLock<Option<Arc<dyn InterruptHandler>>>;

pub(crate) struct InterruptTable {
    handlers: [Handler; NUM_IRQ],
    yield_on_return: AtomicBool,
}

impl InterruptTable {
    pub(crate) fn new() -> Self {
        Self {
            handlers: core::array::from_fn(|_| SpinLock::new(None)),
            yield_on_return: AtomicBool::new(false),
        }
    }
}

impl Kernel {
    /// Register interrupt handler
    ///
    /// Replaces the handler previously registered for `irq`, if any.
    pub fn register_handler(&self, irq: Irq, handler: Arc<dyn InterruptHandler>) {
        debug!(INTERRUPT, "Registering handler for {:?}", irq);
        *self.interrupts().handlers[usize::from(irq)].lock() = Some(handler);
    }

    /// Removes the handler of `irq` and returns it.
    pub fn unregister_handler(&self, irq: Irq) -> Option<Arc<dyn InterruptHandler>> {
        self.interrupts().handlers[usize::from(irq)].lock().take()
    }

    /// Asks for the interrupted thread to yield once the running handler
    /// returns.
    ///
    /// # Panics
    ///
    /// Panics if called outside an interrupt handler.
    pub fn yield_on_return(&self) {
        assert!(
            self.machine().in_handler(),
            "yield_on_return() called outside an interrupt handler"
        );
        self.interrupts().yield_on_return.store(true, Ordering::SeqCst);
    }

    pub(crate) fn handle_interrupt(&self, irq: Irq) {
        let handler = self.interrupts().handlers[usize::from(irq)].lock().clone();
        let Some(handler) = handler else {
            panic!("Unknown interrupt {:?}", irq);
        };
        let machine = self.machine();
        machine.set_in_handler(true);
        handler.service_device(self);
        machine.set_in_handler(false);

        let yield_requested = self
            .interrupts()
            .yield_on_return
            .swap(false, Ordering::SeqCst);
        if yield_requested && machine.status() != MachineStatus::Idle {
            debug!(INTERRUPT, "Yielding after interrupt {:?}", irq);
            self.scheduler().yield_now();
        }
    }
}
