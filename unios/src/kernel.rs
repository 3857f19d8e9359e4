//! The kernel instance.
//!
//! All mutable kernel state (ready queue, current thread, the thread waiting
//! to be destroyed, interrupt handlers) belongs to one [`Kernel`], which
//! runs one [`Machine`]. Several kernels may run side by side in a process,
//! e.g. to simulate a network of machines.

use crate::dev::alarm::{Alarm, TimerInterruptHandler};
use crate::interrupt::InterruptTable;
use crate::thread::{context, scheduler::Scheduler, ThreadBuilder};
use abyss::dev::DeviceError;
use abyss::interrupt::{Irq, IrqSink};
use abyss::spin_lock::SpinLock;
use abyss::stats::Statistics;
use abyss::{Machine, MachineConfig, TimerMode};
use crossbeam_utils::sync::{Parker, Unparker};
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the kernel to its callers.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelError {
    /// The device refused the request.
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// The serial port has not been opened.
    #[error("serial unit {0} is not open")]
    PortNotOpen(usize),
    /// The serial port is already open.
    #[error("serial unit {0} is already open")]
    PortInUse(usize),
}

/// What is left of a machine after its kernel halted.
#[derive(Clone, Debug)]
pub struct Report {
    /// Final performance counters.
    pub stats: Statistics,
    /// Everything written to the console.
    pub console_output: Vec<u8>,
}

pub(crate) struct KernelInner {
    machine: Arc<Machine>,
    scheduler: Scheduler,
    interrupts: InterruptTable,
    alarm: Alarm,
    preemptive: bool,
    failure: SpinLock<Option<Box<dyn Any + Send>>>,
    boot_waiter: SpinLock<Option<Unparker>>,
}

/// A handle to a kernel instance.
#[derive(Clone)]
pub struct Kernel(pub(crate) Arc<KernelInner>);

impl Kernel {
    fn new(machine: Arc<Machine>) -> Self {
        let preemptive = machine.timer_mode() != TimerMode::Off;
        Self(Arc::new(KernelInner {
            scheduler: Scheduler::new(machine.clone()),
            machine,
            interrupts: InterruptTable::new(),
            alarm: Alarm::new(),
            preemptive,
            failure: SpinLock::new(None),
            boot_waiter: SpinLock::new(None),
        }))
    }

    /// Builds a machine from `config` and boots a kernel on it.
    ///
    /// See [`Kernel::boot_on`].
    pub fn boot(
        config: MachineConfig,
        main: impl FnOnce() + Send + 'static,
    ) -> Result<Report, KernelError> {
        let machine = Machine::new(config)?;
        Self::boot_on(machine, main)
    }

    /// Boots a kernel on `machine`, running `main` as its first thread.
    ///
    /// Returns once the machine halts: either some thread called
    /// [`Kernel::halt`], or no thread is runnable and no interrupt is left
    /// to wait for. If a kernel thread panicked, the machine is halted and
    /// the panic is resumed on the caller.
    pub fn boot_on(
        machine: Arc<Machine>,
        main: impl FnOnce() + Send + 'static,
    ) -> Result<Report, KernelError> {
        info!("Booting the kernel...");
        let kernel = Self::new(machine.clone());
        let sink: Arc<dyn IrqSink> = kernel.0.clone();
        machine.attach(Arc::downgrade(&sink));
        kernel.register_handler(Irq::Timer, Arc::new(TimerInterruptHandler));
        if kernel.is_preemptive() {
            machine.timer().enable();
        }

        ThreadBuilder::new("main").spawn_on(&kernel, main);

        let parker = Parker::new();
        *kernel.0.boot_waiter.lock() = Some(parker.unparker().clone());
        kernel.scheduler().start();
        while !machine.is_halted() {
            parker.park();
        }

        kernel.scheduler().join_all();
        let failure = kernel.0.failure.lock().take();
        if let Some(payload) = failure {
            std::panic::resume_unwind(payload);
        }
        Ok(Report {
            stats: machine.stats(),
            console_output: machine.console().output(),
        })
    }

    /// The kernel the calling kernel thread belongs to.
    ///
    /// # Panics
    ///
    /// Panics if the caller is not a kernel thread.
    pub fn current() -> Self {
        Self::try_current().unwrap_or_else(|| panic!("Not running on a kernel thread"))
    }

    /// The kernel the calling kernel thread belongs to, if any.
    pub fn try_current() -> Option<Self> {
        context::current_kernel()
    }

    /// The machine this kernel runs on.
    pub fn machine(&self) -> &Arc<Machine> {
        &self.0.machine
    }

    /// The thread scheduler.
    pub fn scheduler(&self) -> &Scheduler {
        &self.0.scheduler
    }

    pub(crate) fn interrupts(&self) -> &InterruptTable {
        &self.0.interrupts
    }

    /// The timer-driven sleep service.
    pub fn alarm(&self) -> &Alarm {
        &self.0.alarm
    }

    /// Returns true if the timer preempts running threads.
    pub fn is_preemptive(&self) -> bool {
        self.0.preemptive
    }

    /// Halts the machine. Never returns.
    pub fn halt(&self) -> ! {
        self.machine().halt()
    }

    /// A kernel thread died of `payload`: remember it and stop the machine.
    pub(crate) fn fail(&self, payload: Box<dyn Any + Send>) {
        {
            let mut failure = self.0.failure.lock();
            if failure.is_none() {
                *failure = Some(payload);
            }
        }
        self.machine().stop();
    }
}

impl IrqSink for KernelInner {
    fn handle_interrupt(self: Arc<Self>, irq: Irq) {
        Kernel(self).handle_interrupt(irq)
    }

    fn on_halt(&self) {
        self.scheduler.kill_all();
        let waiter = self.boot_waiter.lock().clone();
        if let Some(waiter) = waiter {
            waiter.unpark();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "No thread ready to run at boot")]
    fn start_needs_a_ready_thread() {
        let machine = Machine::new(MachineConfig::default()).unwrap();
        Kernel::new(machine).scheduler().start();
    }

    #[test]
    fn boot_reports_device_errors() {
        let config = MachineConfig::default().with_reliability(-1.0);
        assert_eq!(
            Kernel::boot(config, || {}).err(),
            Some(KernelError::Device(DeviceError::InvalidReliability(-1.0)))
        );
    }

    #[test]
    fn empty_main_halts_at_once() {
        let report = Kernel::boot(MachineConfig::default(), || {}).unwrap();
        // Interrupts are enabled when main starts, and once more when it
        // signals its join handle.
        assert_eq!(report.stats.total_ticks, 2 * abyss::stats::SYSTEM_TICK);
        assert!(report.console_output.is_empty());
    }
}
