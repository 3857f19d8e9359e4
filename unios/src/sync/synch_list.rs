use super::{Condition, Lock};
use abyss::spin_lock::SpinLock;
use std::collections::VecDeque;
use std::sync::Arc;

/// A FIFO list shared between threads.
///
/// [`remove`](SynchList::remove) waits until the list is non-empty.
pub struct SynchList<T> {
    lock: Arc<Lock>,
    list_empty: Condition,
    items: SpinLock<VecDeque<T>>,
}

impl<T: Send> SynchList<T> {
    /// Creates an empty list.
    pub fn new(name: &str) -> Self {
        let lock = Arc::new(Lock::new(format!("{} (lock)", name)));
        Self {
            list_empty: Condition::new(format!("{} (not empty)", name), lock.clone()),
            lock,
            items: SpinLock::new(VecDeque::new()),
        }
    }

    /// Appends `item` and wakes up a waiting remover.
    pub fn append(&self, item: T) {
        self.lock.acquire();
        self.items.lock().push_back(item);
        self.list_empty.signal();
        self.lock.release();
    }

    /// Puts `item` at the front and wakes up a waiting remover.
    pub fn prepend(&self, item: T) {
        self.lock.acquire();
        self.items.lock().push_front(item);
        self.list_empty.signal();
        self.lock.release();
    }

    /// Removes the first item, waiting for one if the list is empty.
    pub fn remove(&self) -> T {
        self.lock.acquire();
        let item = loop {
            let item = self.items.lock().pop_front();
            match item {
                Some(item) => break item,
                None => self.list_empty.wait(),
            }
        };
        self.lock.release();
        item
    }

    /// Returns true if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Number of items in the list.
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }
}
