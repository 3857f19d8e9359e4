//! Machine configuration.

use crate::dev::disk::DISK_SIZE;
use crate::dev::network::NetworkHub;
use crate::dev::DeviceError;
use crate::kprint::DebugFlags;
use std::sync::Arc;

/// How the hardware timer fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// No timer interrupts unless something enables the timer explicitly.
    #[default]
    Off,
    /// An interrupt every [`TIMER_TICKS`](crate::stats::TIMER_TICKS) ticks.
    Periodic,
    /// An interrupt after a random delay in `1..=2 * TIMER_TICKS`, drawn from
    /// the machine's seeded generator.
    Random,
}

/// Everything needed to build a [`Machine`](crate::Machine).
#[derive(Clone, Debug)]
pub struct MachineConfig {
    pub debug: DebugFlags,
    pub timer: TimerMode,
    pub seed: u64,
    /// Initial disk contents, zero-padded to the disk size.
    pub disk_image: Option<Vec<u8>>,
    /// Bytes the console keyboard will produce, in order.
    pub console_input: Vec<u8>,
    /// Also print console output to the host stdout.
    pub console_echo: bool,
    pub network_id: u8,
    pub hub: Option<Arc<NetworkHub>>,
    /// Probability that a sent packet is delivered.
    pub reliability: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            debug: DebugFlags::empty(),
            timer: TimerMode::Off,
            seed: 0,
            disk_image: None,
            console_input: Vec::new(),
            console_echo: false,
            network_id: 0,
            hub: None,
            reliability: 1.0,
        }
    }
}

impl MachineConfig {
    pub fn with_debug(mut self, debug: DebugFlags) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_timer(mut self, timer: TimerMode) -> Self {
        self.timer = timer;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_disk_image(mut self, image: Vec<u8>) -> Self {
        self.disk_image = Some(image);
        self
    }

    pub fn with_console_input(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.console_input = input.into();
        self
    }

    pub fn with_console_echo(mut self, echo: bool) -> Self {
        self.console_echo = echo;
        self
    }

    /// Attaches the machine to `hub` under network address `id`.
    pub fn with_network(mut self, hub: Arc<NetworkHub>, id: u8) -> Self {
        self.hub = Some(hub);
        self.network_id = id;
        self
    }

    pub fn with_reliability(mut self, reliability: f64) -> Self {
        self.reliability = reliability;
        self
    }

    /// Checks the values a machine cannot be built with.
    pub fn validate(&self) -> Result<(), DeviceError> {
        if !(0.0..=1.0).contains(&self.reliability) {
            return Err(DeviceError::InvalidReliability(self.reliability));
        }
        match &self.disk_image {
            Some(image) if image.len() > DISK_SIZE => Err(DeviceError::ImageTooLarge(image.len())),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_reliability() {
        let config = MachineConfig::default().with_reliability(1.5);
        assert_eq!(
            config.validate(),
            Err(DeviceError::InvalidReliability(1.5))
        );
        assert!(MachineConfig::default()
            .with_reliability(0.25)
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_oversized_image() {
        let config = MachineConfig::default().with_disk_image(vec![0; DISK_SIZE + 1]);
        assert_eq!(config.validate(), Err(DeviceError::ImageTooLarge(DISK_SIZE + 1)));
    }
}
