use abyss::interrupt::{InterruptGuard, InterruptState, Irq};
use abyss::dev::serial::Mcr;
use abyss::{MachineConfig, TimerMode};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use unios::dev::alarm;
use unios::spin_lock::SpinLock;
use unios::sync::Semaphore;
use unios::thread::{scheduler, ThreadBuilder};
use unios::Kernel;

fn boot(main: impl FnOnce() + Send + 'static) {
    Kernel::boot(MachineConfig::default(), main).unwrap();
}

#[test]
#[should_panic(expected = "called outside an interrupt handler")]
fn yield_on_return_outside_handler_is_fatal() {
    boot(|| Kernel::current().yield_on_return());
}

#[test]
fn alarm_wakes_sleepers_in_time_order() {
    let woken = Arc::new(SpinLock::new(Vec::new()));
    let woken2 = woken.clone();
    boot(move || {
        let handles: Vec<_> = [("long", 700), ("short", 150), ("middle", 400)]
            .into_iter()
            .map(|(name, ticks)| {
                let woken = woken2.clone();
                ThreadBuilder::new(name).spawn(move || {
                    let machine = Kernel::current().machine().clone();
                    let start = machine.ticks();
                    alarm::sleep_for(ticks);
                    assert!(machine.ticks() >= start + ticks);
                    woken.lock().push(name);
                })
            })
            .collect();
        scheduler::yield_now();
        assert_eq!(Kernel::current().alarm().sleepers(), 3);
        for handle in handles {
            handle.join();
        }
        assert_eq!(Kernel::current().alarm().sleepers(), 0);
    });
    assert_eq!(*woken.lock(), ["short", "middle", "long"]);
}

#[test]
fn timer_preempts_a_spinning_thread() {
    let config = MachineConfig::default().with_timer(TimerMode::Periodic);
    let spins = Arc::new(AtomicUsize::new(0));
    let spins2 = spins.clone();
    Kernel::boot(config, move || {
        let kernel = Kernel::current();
        assert!(kernel.is_preemptive());
        let flag = Arc::new(AtomicBool::new(false));
        let spinner = {
            let (flag, machine) = (flag.clone(), kernel.machine().clone());
            ThreadBuilder::new("spinner").spawn(move || {
                // Never yields; only the timer gets the setter to run.
                while !flag.load(Ordering::SeqCst) {
                    let _guard = InterruptGuard::new(&machine);
                    spins2.fetch_add(1, Ordering::SeqCst);
                }
            })
        };
        let setter = ThreadBuilder::new("setter").spawn(move || flag.store(true, Ordering::SeqCst));
        spinner.join();
        setter.join();
    })
    .unwrap();
    assert!(spins.load(Ordering::SeqCst) > 0);
}

#[test]
fn handler_runs_with_interrupts_off() {
    let seen = Arc::new(SpinLock::new(Vec::new()));
    let seen2 = seen.clone();
    boot(move || {
        let kernel = Kernel::current();
        let arrived = Arc::new(Semaphore::new("arrived", 0));
        {
            let (arrived, seen) = (arrived.clone(), seen2.clone());
            kernel.register_handler(
                Irq::Serial0,
                Arc::new(move |kernel: &Kernel| {
                    let machine = kernel.machine();
                    assert!(machine.in_handler());
                    assert_eq!(machine.level(), InterruptState::Off);
                    if let Some(byte) = machine.serial(0).unwrap().read_rbr() {
                        seen.lock().push(byte);
                        arrived.v();
                    }
                }),
            );
        }
        let uart = kernel.machine().serial(0).unwrap();
        uart.set_mcr(Mcr::DTR);
        uart.write_thr(b'!');
        arrived.p();
        assert!(!kernel.machine().in_handler());
    });
    assert_eq!(*seen.lock(), [b'!']);
}

#[test]
fn yield_on_return_switches_the_interrupted_thread() {
    let log = Arc::new(SpinLock::new(Vec::new()));
    let log2 = log.clone();
    boot(move || {
        let kernel = Kernel::current();
        let fired = Arc::new(AtomicBool::new(false));
        {
            let fired = fired.clone();
            kernel.register_handler(
                Irq::Serial0,
                Arc::new(move |kernel: &Kernel| {
                    fired.store(true, Ordering::SeqCst);
                    kernel.yield_on_return();
                }),
            );
        }
        let other = {
            let log = log2.clone();
            ThreadBuilder::new("other").spawn(move || log.lock().push("other"))
        };
        let machine = kernel.machine().clone();
        let uart = machine.serial(0).unwrap();
        uart.set_mcr(Mcr::DTR);
        uart.write_thr(0);
        while !fired.load(Ordering::SeqCst) {
            drop(InterruptGuard::new(&machine));
        }
        // The handler's request put us behind "other".
        log2.lock().push("main");
        other.join();
    });
    assert_eq!(*log.lock(), ["other", "main"]);
}

#[test]
#[should_panic(expected = "Interrupts re-enabled inside an interrupt handler")]
fn reenabling_interrupts_in_handler_is_fatal() {
    boot(|| {
        let kernel = Kernel::current();
        kernel.register_handler(
            Irq::Serial0,
            Arc::new(|kernel: &Kernel| {
                kernel.machine().set_level(InterruptState::On);
            }),
        );
        let uart = kernel.machine().serial(0).unwrap();
        uart.set_mcr(Mcr::DTR);
        uart.write_thr(0);
        Semaphore::new("forever", 0).p();
    });
}

#[test]
#[should_panic(expected = "Unknown interrupt Serial0")]
fn interrupt_without_handler_is_fatal() {
    boot(|| {
        let kernel = Kernel::current();
        let uart = kernel.machine().serial(0).unwrap();
        uart.set_mcr(Mcr::DTR);
        uart.write_thr(0);
        Semaphore::new("forever", 0).p();
    });
}

#[test]
fn unregistered_handler_is_returned() {
    boot(|| {
        let kernel = Kernel::current();
        kernel.register_handler(Irq::Serial3, Arc::new(|_: &Kernel| {}));
        assert!(kernel.unregister_handler(Irq::Serial3).is_some());
        assert!(kernel.unregister_handler(Irq::Serial3).is_none());
    });
}
