use super::Semaphore;
use crate::thread::with_current;
use crate::Kernel;
use abyss::interrupt::InterruptGuard;
use abyss::spin_lock::SpinLock;

/// A mutual exclusion lock.
///
/// Unlike a binary semaphore, a lock has an owner: only the thread that
/// acquired it may release it.
pub struct Lock {
    name: String,
    semaphore: Semaphore,
    owner: SpinLock<Option<usize>>,
}

impl Lock {
    /// Creates a free lock.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            semaphore: Semaphore::new(format!("{} (semaphore)", name), 1),
            name,
            owner: SpinLock::new(None),
        }
    }

    /// Name of the lock.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until the lock is free, then takes it.
    pub fn acquire(&self) {
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        self.semaphore.p();
        let id = with_current(|th| th.id());
        *self.owner.lock() = Some(id);
        debug!(SYNC, "Lock \"{}\" acquired by thread {}", self.name, id);
    }

    /// Releases the lock.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock.
    pub fn release(&self) {
        let kernel = Kernel::current();
        let _guard = InterruptGuard::new(kernel.machine());
        assert!(
            self.is_held_by_current_thread(),
            "Lock \"{}\" released by a thread that does not hold it",
            self.name
        );
        *self.owner.lock() = None;
        debug!(SYNC, "Lock \"{}\" released", self.name);
        self.semaphore.v();
    }

    /// Returns true if the calling thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        let owner = *self.owner.lock();
        owner.is_some() && owner == with_current(|th| Some(th.id()))
    }
}
