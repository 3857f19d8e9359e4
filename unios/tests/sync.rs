use abyss::MachineConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use unios::spin_lock::SpinLock;
use unios::sync::{Condition, Lock, Semaphore, SynchList};
use unios::thread::{scheduler, ThreadBuilder};
use unios::Kernel;

fn boot(main: impl FnOnce() + Send + 'static) {
    Kernel::boot(MachineConfig::default(), main).unwrap();
}

fn yield_many(n: usize) {
    for _ in 0..n {
        scheduler::yield_now();
    }
}

#[test]
fn semaphore_admits_one_per_unit() {
    boot(|| {
        let sem = Arc::new(Semaphore::new("one", 1));
        let entered = Arc::new(AtomicUsize::new(0));
        for name in ["a", "b", "c"] {
            let (sem, entered) = (sem.clone(), entered.clone());
            ThreadBuilder::new(name).spawn(move || {
                sem.p();
                entered.fetch_add(1, Ordering::SeqCst);
            });
        }
        yield_many(10);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(sem.value(), 0);
        sem.v();
        yield_many(10);
        assert_eq!(entered.load(Ordering::SeqCst), 2);
        // The last waiter stays blocked; the machine halts without it.
    });
}

#[test]
fn semaphore_wakes_in_fifo_order() {
    let order = Arc::new(SpinLock::new(Vec::new()));
    let order2 = order.clone();
    boot(move || {
        let sem = Arc::new(Semaphore::new("gate", 0));
        let handles: Vec<_> = ["first", "second", "third"]
            .into_iter()
            .map(|name| {
                let (sem, order) = (sem.clone(), order2.clone());
                ThreadBuilder::new(name).spawn(move || {
                    sem.p();
                    order.lock().push(name);
                })
            })
            .collect();
        yield_many(3);
        for _ in 0..3 {
            sem.v();
        }
        for handle in handles {
            handle.join();
        }
    });
    assert_eq!(*order.lock(), ["first", "second", "third"]);
}

#[test]
fn v_before_p_is_not_lost() {
    boot(|| {
        let sem = Semaphore::new("early", 0);
        sem.v();
        sem.v();
        assert_eq!(sem.value(), 2);
        sem.p();
        sem.p();
        assert_eq!(sem.value(), 0);
        assert_eq!(sem.name(), "early");
    });
}

#[test]
fn lock_blocks_second_acquirer() {
    boot(|| {
        let lock = Arc::new(Lock::new("lock"));
        lock.acquire();
        lock.release();
        // Free again: no blocking.
        lock.acquire();
        assert!(lock.is_held_by_current_thread());

        let acquired = Arc::new(AtomicUsize::new(0));
        let contender = {
            let (lock, acquired) = (lock.clone(), acquired.clone());
            ThreadBuilder::new("contender").spawn(move || {
                lock.acquire();
                acquired.store(1, Ordering::SeqCst);
                assert!(lock.is_held_by_current_thread());
                lock.release();
            })
        };
        yield_many(5);
        assert_eq!(acquired.load(Ordering::SeqCst), 0);
        lock.release();
        assert!(!lock.is_held_by_current_thread());
        contender.join();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    });
}

#[test]
#[should_panic(expected = "does not hold it")]
fn release_by_non_owner_is_fatal() {
    boot(|| {
        let lock = Arc::new(Lock::new("owned"));
        lock.acquire();
        let lock2 = lock.clone();
        ThreadBuilder::new("thief")
            .spawn(move || lock2.release())
            .join();
    });
}

#[test]
fn condition_waiters_hold_lock_on_return() {
    let consumed = Arc::new(SpinLock::new(Vec::new()));
    let consumed2 = consumed.clone();
    boot(move || {
        let lock = Arc::new(Lock::new("buffer"));
        let not_empty = Arc::new(Condition::new("not empty", lock.clone()));
        let items = Arc::new(SpinLock::new(Vec::new()));
        let inside = Arc::new(AtomicUsize::new(0));

        let consumers: Vec<_> = (0..2)
            .map(|i| {
                let (lock, not_empty, items, inside, consumed) = (
                    lock.clone(),
                    not_empty.clone(),
                    items.clone(),
                    inside.clone(),
                    consumed2.clone(),
                );
                ThreadBuilder::new(format!("consumer {}", i)).spawn(move || {
                    for _ in 0..3 {
                        lock.acquire();
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        loop {
                            let item = items.lock().pop();
                            match item {
                                Some(item) => {
                                    consumed.lock().push(item);
                                    break;
                                }
                                None => {
                                    inside.fetch_sub(1, Ordering::SeqCst);
                                    not_empty.wait();
                                    assert!(lock.is_held_by_current_thread());
                                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                                }
                            }
                        }
                        inside.fetch_sub(1, Ordering::SeqCst);
                        lock.release();
                        scheduler::yield_now();
                    }
                })
            })
            .collect();

        for item in 0..6 {
            yield_many(2);
            lock.acquire();
            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
            items.lock().push(item);
            not_empty.signal();
            inside.fetch_sub(1, Ordering::SeqCst);
            lock.release();
        }
        for consumer in consumers {
            consumer.join();
        }
    });
    let mut consumed = consumed.lock().clone();
    consumed.sort();
    assert_eq!(consumed, [0, 1, 2, 3, 4, 5]);
}

#[test]
fn broadcast_wakes_everyone() {
    boot(|| {
        let lock = Arc::new(Lock::new("lock"));
        let cond = Arc::new(Condition::new("go", lock.clone()));
        let woken = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let (lock, cond, woken) = (lock.clone(), cond.clone(), woken.clone());
                ThreadBuilder::new(format!("waiter {}", i)).spawn(move || {
                    lock.acquire();
                    cond.wait();
                    woken.fetch_add(1, Ordering::SeqCst);
                    lock.release();
                })
            })
            .collect();
        yield_many(4);
        lock.acquire();
        cond.signal();
        lock.release();
        yield_many(4);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        lock.acquire();
        cond.broadcast();
        lock.release();
        for handle in handles {
            handle.join();
        }
        assert_eq!(woken.load(Ordering::SeqCst), 4);
    });
}

#[test]
#[should_panic(expected = "without holding lock")]
fn signal_without_lock_is_fatal() {
    boot(|| {
        let cond = Condition::new("orphan", Arc::new(Lock::new("unheld")));
        cond.signal();
    });
}

#[test]
fn synch_list_remove_waits_for_append() {
    let got = Arc::new(SpinLock::new(Vec::new()));
    let got2 = got.clone();
    boot(move || {
        let list = Arc::new(SynchList::new("mailbox"));
        let remover = {
            let (list, got) = (list.clone(), got2.clone());
            ThreadBuilder::new("remover").spawn(move || {
                for _ in 0..3 {
                    let item = list.remove();
                    got.lock().push(item);
                }
            })
        };
        yield_many(3);
        assert!(got2.lock().is_empty());
        list.append(2);
        list.append(3);
        list.prepend(1);
        assert_eq!(list.len(), 3);
        remover.join();
        assert!(list.is_empty());
    });
    assert_eq!(*got.lock(), [1, 2, 3]);
}

#[test]
fn random_yields_keep_mutual_exclusion() {
    let total = Arc::new(AtomicUsize::new(0));
    let total2 = total.clone();
    boot(move || {
        let lock = Arc::new(Lock::new("counter"));
        let counter = Arc::new(SpinLock::new(0usize));
        let handles: Vec<_> = (0..5u64)
            .map(|seed| {
                let (lock, counter) = (lock.clone(), counter.clone());
                ThreadBuilder::new(format!("worker {}", seed)).spawn(move || {
                    let mut rng = StdRng::seed_from_u64(seed);
                    for _ in 0..20 {
                        lock.acquire();
                        let seen = *counter.lock();
                        for _ in 0..rng.gen_range(0..3) {
                            scheduler::yield_now();
                        }
                        *counter.lock() = seen + 1;
                        lock.release();
                        if rng.gen_bool(0.5) {
                            scheduler::yield_now();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join();
        }
        total2.store(*counter.lock(), Ordering::SeqCst);
    });
    assert_eq!(total.load(Ordering::SeqCst), 100);
}
