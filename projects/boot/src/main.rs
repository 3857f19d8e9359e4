//! Boots a simulated machine and runs one of the demo programs on it.
//!
//! ```text
//! boot --test thread --debug t
//! boot --test console --console-input "echo me q"
//! boot --test network --machines 3
//! ```

mod devices;
mod selftest;
mod threads;

use abyss::{DebugFlags, MachineConfig, TimerMode};
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use unios::{print, Report};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Demo {
    /// Two threads ping-pong the processor.
    Thread,
    /// Threads sleep on the alarm and wake in deadline order.
    Alarm,
    /// Echo console input until a 'q'.
    Console,
    /// Send a message through a loopback serial port.
    Serial,
    /// Machines on a shared network greet each other.
    Network,
    /// Run the in-kernel self tests.
    Selftest,
}

/// unios - an instructional kernel on a simulated machine
#[derive(Debug, Parser)]
#[command(name = "boot", version, about, long_about = None)]
struct Args {
    /// Debug message flags: '+' for all, or any of "tsimdcpna".
    #[arg(short, long, default_value = "")]
    debug: String,

    /// Yield at random but repeatable points, seeded with SEED.
    #[arg(long, value_name = "SEED")]
    random_seed: Option<u64>,

    /// Time-slice threads with a periodic timer.
    #[arg(long)]
    preempt: bool,

    /// Demo program to run.
    #[arg(short, long, value_enum, default_value_t = Demo::Thread)]
    test: Demo,

    /// Characters typed on the console.
    #[arg(long, default_value = "hello, world\nq")]
    console_input: String,

    /// Number of machines on the network.
    #[arg(long, default_value_t = 2)]
    machines: u8,

    /// Probability that the network delivers a packet.
    #[arg(long, default_value_t = 1.0)]
    reliability: f64,
}

impl Args {
    fn config(&self) -> MachineConfig {
        let config = MachineConfig::default()
            .with_debug(DebugFlags::from_letters(&self.debug))
            .with_reliability(self.reliability);
        match (self.random_seed, self.preempt) {
            (Some(seed), _) => config.with_timer(TimerMode::Random).with_seed(seed),
            (None, true) => config.with_timer(TimerMode::Periodic),
            (None, false) => config,
        }
    }
}

fn print_report(report: &Report) {
    print!("{}", report.stats);
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.config();
    match args.test {
        Demo::Thread => print_report(&threads::ping_pong(config)?),
        Demo::Alarm => print_report(&threads::alarm(config)?),
        Demo::Console => {
            let config = config
                .with_console_input(args.console_input.as_bytes())
                .with_console_echo(true);
            print_report(&devices::console_echo(config)?);
        }
        Demo::Serial => print_report(&devices::serial_loopback(config)?),
        Demo::Network => {
            if args.machines < 2 {
                bail!("the network demo needs at least 2 machines");
            }
            for report in devices::network_greetings(config, args.machines)? {
                print_report(&report);
            }
        }
        Demo::Selftest => {
            let failed = selftest::run(config)?;
            if failed > 0 {
                bail!("{} self test(s) failed", failed);
            }
        }
    }
    Ok(())
}
