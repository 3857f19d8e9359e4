use crate::thread::Thread;
use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// A queue of threads waiting for something.
///
/// Threads are served in FIFO order, or in key order for queues filled with
/// [`sorted_insert`](WaitQueue::sorted_insert) (FIFO among equal keys). A
/// thread is in at most one queue at a time.
///
/// The queue itself does no locking; callers mutate it with interrupts
/// disabled.
pub struct WaitQueue<K = ()> {
    waiters: VecDeque<(K, Arc<Thread>)>,
}

impl<K> WaitQueue<K> {
    /// Creates an empty queue.
    pub const fn new() -> Self {
        Self {
            waiters: VecDeque::new(),
        }
    }

    fn mark(th: &Thread) {
        assert!(
            !th.queued.swap(true, Ordering::SeqCst),
            "Thread \"{}\" is already in a queue",
            th.name()
        );
    }

    /// Removes the first thread, if any.
    pub fn pop(&mut self) -> Option<Arc<Thread>> {
        self.pop_with_key().map(|(_, th)| th)
    }

    /// Removes the first thread along with its key, if any.
    pub fn pop_with_key(&mut self) -> Option<(K, Arc<Thread>)> {
        let (key, th) = self.waiters.pop_front()?;
        th.queued.store(false, Ordering::SeqCst);
        Some((key, th))
    }

    /// Key of the first thread.
    pub fn peek_key(&self) -> Option<&K> {
        self.waiters.front().map(|(key, _)| key)
    }

    /// Returns true if no thread waits.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Number of waiting threads.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Waiting threads in service order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Thread>> {
        self.waiters.iter().map(|(_, th)| th)
    }
}

impl WaitQueue {
    /// Appends `th` at the tail.
    pub fn push(&mut self, th: Arc<Thread>) {
        Self::mark(&th);
        self.waiters.push_back(((), th));
    }
}

impl<K: Ord> WaitQueue<K> {
    /// Inserts `th` after every thread whose key is not greater than `key`.
    pub fn sorted_insert(&mut self, key: K, th: Arc<Thread>) {
        Self::mark(&th);
        let at = self.waiters.partition_point(|(k, _)| *k <= key);
        self.waiters.insert(at, (key, th));
    }
}

impl<K> Default for WaitQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}
