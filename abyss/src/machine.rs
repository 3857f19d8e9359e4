//! The simulated machine.

use crate::config::{MachineConfig, TimerMode};
use crate::dev::{
    console::ConsoleState, disk::DiskState, network::NetworkState, serial::SerialState,
    timer::TimerState, DeviceError,
};
use crate::interrupt::{InterruptController, IrqSink};
use crate::kprint;
use crate::stats::Statistics;
use rand::rngs::StdRng;
use rand::SeedableRng;
use spin_lock::SpinLock;
use std::sync::{Arc, Weak};

/// A single-processor machine with a timer, a disk, a console, serial ports
/// and a network interface.
pub struct Machine {
    pub(crate) interrupt: SpinLock<InterruptController>,
    stats: SpinLock<Statistics>,
    rng: SpinLock<StdRng>,
    sink: SpinLock<Option<Weak<dyn IrqSink>>>,
    timer_mode: TimerMode,
    pub(crate) timer: TimerState,
    pub(crate) disk: DiskState,
    pub(crate) console: ConsoleState,
    pub(crate) serial: SerialState,
    pub(crate) network: NetworkState,
}

impl Machine {
    /// Builds a machine from `config`.
    ///
    /// The machine starts with interrupts Off and the clock at zero. Devices
    /// that poll (console input, network mailbox) start polling right away;
    /// the timer starts when the kernel enables it.
    pub fn new(config: MachineConfig) -> Result<Arc<Self>, DeviceError> {
        config.validate()?;
        kprint::enable(config.debug);
        let network = NetworkState::new(config.network_id, config.hub, config.reliability)?;
        let machine = Arc::new(Self {
            interrupt: SpinLock::new(InterruptController::new()),
            stats: SpinLock::new(Statistics::default()),
            rng: SpinLock::new(StdRng::seed_from_u64(config.seed)),
            sink: SpinLock::new(None),
            timer_mode: config.timer,
            timer: TimerState::new(),
            disk: DiskState::new(config.disk_image.unwrap_or_default()),
            console: ConsoleState::new(config.console_input, config.console_echo),
            serial: SerialState::new(),
            network,
        });
        debug!(MACHINE, "Machine created: {:?}", config.timer);
        machine.console().start_polling();
        machine.network().start_polling();
        Ok(machine)
    }

    /// Installs the kernel that services this machine's interrupts.
    pub fn attach(&self, sink: Weak<dyn IrqSink>) {
        *self.sink.lock() = Some(sink);
    }

    pub(crate) fn sink(&self) -> Option<Arc<dyn IrqSink>> {
        self.sink.lock().as_ref().and_then(Weak::upgrade)
    }

    /// Current simulated time.
    pub fn ticks(&self) -> u64 {
        self.stats.lock().total_ticks
    }

    /// A snapshot of the performance counters.
    pub fn stats(&self) -> Statistics {
        self.stats.lock().clone()
    }

    pub(crate) fn with_stats<R>(&self, f: impl FnOnce(&mut Statistics) -> R) -> R {
        f(&mut self.stats.lock())
    }

    /// Runs `f` on the machine's seeded random number generator.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut StdRng) -> R) -> R {
        f(&mut self.rng.lock())
    }

    pub fn timer_mode(&self) -> TimerMode {
        self.timer_mode
    }
}

impl Drop for Machine {
    fn drop(&mut self) {
        self.network.detach();
    }
}
