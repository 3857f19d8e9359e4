//! Thread demos.

use abyss::MachineConfig;
use unios::dev::alarm;
use unios::thread::{scheduler, ThreadBuilder};
use unios::{debug, println, Kernel, KernelError, Report};

/// Two threads take turns, yielding the processor at every iteration.
pub fn ping_pong(config: MachineConfig) -> Result<Report, KernelError> {
    Kernel::boot(config, || {
        debug!(THREAD, "Entering thread demo");
        let handles: Vec<_> = (1..=2)
            .map(|which| {
                ThreadBuilder::new(format!("Test thread {}", which)).spawn(move || {
                    for num in 0..5 {
                        println!("*** thread {} looped {} times", which, num);
                        scheduler::yield_now();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join();
        }
    })
}

/// Three threads sleep on the alarm for different lengths of time.
pub fn alarm(config: MachineConfig) -> Result<Report, KernelError> {
    Kernel::boot(config, || {
        debug!(THREAD, "Entering alarm demo");
        let handles: Vec<_> = [(1, 1000), (2, 300), (3, 600)]
            .into_iter()
            .map(|(which, ticks)| {
                ThreadBuilder::new(format!("Alarm thread {}", which)).spawn(move || {
                    alarm::sleep_for(ticks);
                    let now = Kernel::current().machine().ticks();
                    println!("Alarm {} at time {}", which, now);
                })
            })
            .collect();
        for handle in handles {
            handle.join();
        }
    })
}
