//! In-kernel self tests, run with the kernel's test harness.

use abyss::MachineConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use unios::spin_lock::SpinLock;
use unios::sync::{Condition, Lock, Semaphore, SynchList};
use unios::thread::{scheduler, ThreadBuilder};
use unios::{do_tests, Kernel, KernelError, TestFn};

static TESTS: &[&'static dyn TestFn] = &[
    &threads::round_robin,
    &threads::join,
    &primitives::semaphore_ping_pong,
    &primitives::lock_excludes,
    &primitives::condition_mesa,
    &primitives::synch_list,
];

/// Boots a kernel that runs every self test. Returns the number of
/// failures.
pub fn run(config: MachineConfig) -> Result<usize, KernelError> {
    let failed = Arc::new(AtomicUsize::new(0));
    let failed2 = failed.clone();
    Kernel::boot(config, move || {
        failed2.store(do_tests(TESTS), Ordering::SeqCst);
    })?;
    Ok(failed.load(Ordering::SeqCst))
}

mod threads {
    use super::*;

    pub fn round_robin() {
        let log = Arc::new(SpinLock::new(String::new()));
        let handles: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|name| {
                let log = log.clone();
                ThreadBuilder::new(name).spawn(move || {
                    for _ in 0..3 {
                        log.lock().push_str(name);
                        scheduler::yield_now();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join();
        }
        // Preemption may interleave differently; each thread still ran thrice.
        let log = log.lock();
        for name in ["a", "b", "c"] {
            assert_eq!(log.matches(name).count(), 3);
        }
        if !Kernel::current().is_preemptive() {
            assert_eq!(*log, "abcabcabc");
        }
    }

    pub fn join() {
        let handles: Vec<_> = (0..10usize)
            .map(|i| ThreadBuilder::new(format!("t{}", i)).spawn(move || i * i))
            .collect();
        let sum: usize = handles.into_iter().map(|h| h.join()).sum();
        assert_eq!(sum, 285);
    }
}

mod primitives {
    use super::*;

    pub fn semaphore_ping_pong() {
        let ping = Arc::new(Semaphore::new("ping", 0));
        let pong = Arc::new(Semaphore::new("pong", 0));
        let rounds = Arc::new(AtomicUsize::new(0));
        let partner = {
            let (ping, pong, rounds) = (ping.clone(), pong.clone(), rounds.clone());
            ThreadBuilder::new("pong").spawn(move || {
                for _ in 0..5 {
                    ping.p();
                    rounds.fetch_add(1, Ordering::SeqCst);
                    pong.v();
                }
            })
        };
        for round in 1..=5 {
            ping.v();
            pong.p();
            assert_eq!(rounds.load(Ordering::SeqCst), round);
        }
        partner.join();
    }

    pub fn lock_excludes() {
        let lock = Arc::new(Lock::new("self test lock"));
        let inside = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let (lock, inside) = (lock.clone(), inside.clone());
                ThreadBuilder::new(format!("locker {}", i)).spawn(move || {
                    for _ in 0..3 {
                        lock.acquire();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        scheduler::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join();
        }
    }

    pub fn condition_mesa() {
        let lock = Arc::new(Lock::new("ready lock"));
        let cond = Arc::new(Condition::new("ready", lock.clone()));
        let ready = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let (lock, cond, ready) = (lock.clone(), cond.clone(), ready.clone());
            ThreadBuilder::new("waiter").spawn(move || {
                lock.acquire();
                while ready.load(Ordering::SeqCst) == 0 {
                    cond.wait();
                }
                assert!(lock.is_held_by_current_thread());
                lock.release();
            })
        };
        scheduler::yield_now();
        lock.acquire();
        ready.store(1, Ordering::SeqCst);
        cond.signal();
        lock.release();
        waiter.join();
    }

    pub fn synch_list() {
        let list = Arc::new(SynchList::new("self test list"));
        let consumer = {
            let list = list.clone();
            ThreadBuilder::new("consumer").spawn(move || (0..4).map(|_| list.remove()).sum::<u32>())
        };
        for i in 1..=4 {
            list.append(i);
        }
        assert_eq!(consumer.join(), 10);
    }
}
