use abyss::interrupt::{InterruptGuard, InterruptState};
use abyss::MachineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use unios::thread::scheduler;
use unios::{do_tests, Kernel, TestFn};

fn yields_and_passes() {
    scheduler::yield_now();
}

fn fails_with_interrupts_off() {
    let kernel = Kernel::current();
    let _guard = InterruptGuard::new(kernel.machine());
    panic!("expected failure");
}

fn passes_after_a_failure() {
    assert_eq!(Kernel::current().machine().level(), InterruptState::On);
}

static TESTS: &[&'static dyn TestFn] = &[
    &yields_and_passes,
    &fails_with_interrupts_off,
    &passes_after_a_failure,
];

#[test]
fn do_tests_counts_failures() {
    let failed = Arc::new(AtomicUsize::new(usize::MAX));
    let failed2 = failed.clone();
    Kernel::boot(MachineConfig::default(), move || {
        failed2.store(do_tests(TESTS), Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(failed.load(Ordering::SeqCst), 1);
}
