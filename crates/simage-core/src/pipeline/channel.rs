//! Queues connecting the pipeline stages.
//!
//! [`Backlog`] is an unbounded FIFO of pending work; [`BoundedQueue`] holds
//! finished items and blocks its producer when full, which is what keeps the
//! loader from running ahead of consumers. Both can be cleared from outside,
//! which a plain `mpsc` channel does not allow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{watch, Notify};

fn lock<T>(items: &Mutex<VecDeque<T>>) -> MutexGuard<'_, VecDeque<T>> {
    items.lock().unwrap_or_else(|e| e.into_inner())
}

/// Unbounded FIFO backlog. Pushing never blocks.
pub struct Backlog<T> {
    items: Mutex<VecDeque<T>>,
    available: Notify,
    closed: AtomicBool,
}

impl<T> Default for Backlog<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Backlog<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            available: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Append items in order.
    pub fn push_all(&self, new_items: impl IntoIterator<Item = T>) {
        let added = {
            let mut items = lock(&self.items);
            let before = items.len();
            items.extend(new_items);
            items.len() - before
        };
        for _ in 0..added {
            self.available.notify_one();
        }
    }

    /// Wait for the next item. Returns `None` once the backlog is closed.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(item) = lock(&self.items).pop_front() {
                return Some(item);
            }

            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all queued items.
    pub fn clear(&self) {
        lock(&self.items).clear();
    }

    /// Stop handing out items; waiting and future `pop`s return `None`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_waiters();
    }
}

/// FIFO with a fixed capacity that reports its fill level.
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
    closed: AtomicBool,
    level: watch::Sender<usize>,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items (at least one).
    pub fn new(capacity: usize) -> Self {
        let (level, _) = watch::channel(0);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            capacity: capacity.max(1),
            not_empty: Notify::new(),
            not_full: Notify::new(),
            closed: AtomicBool::new(false),
            level,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the number of queued items.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.level.subscribe()
    }

    /// Append `item`, waiting while the queue is full.
    ///
    /// Hands the item back if the queue has been closed.
    pub async fn push(&self, item: T) -> Result<(), T> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return Err(item);
            }
            {
                let mut items = lock(&self.items);
                if items.len() < self.capacity {
                    items.push_back(item);
                    self.level.send_replace(items.len());
                    drop(items);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Wait for the next item. Returns `None` once closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }

    /// Take the next item if one is queued.
    pub fn try_pop(&self) -> Option<T> {
        let mut items = lock(&self.items);
        let item = items.pop_front()?;
        let remaining = items.len();
        self.level.send_replace(remaining);
        drop(items);

        self.not_full.notify_one();
        if remaining > 0 {
            // Pass the wakeup on in case several consumers are parked.
            self.not_empty.notify_one();
        }
        Some(item)
    }

    /// Drop all queued items and wake a blocked producer.
    pub fn clear(&self) {
        lock(&self.items).clear();
        self.level.send_replace(0);
        self.not_full.notify_waiters();
    }

    /// Reject further pushes. Queued items can still be popped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_backlog_is_fifo() {
        let backlog = Backlog::new();
        backlog.push_all([1, 2, 3]);

        assert_eq!(backlog.pop().await, Some(1));
        assert_eq!(backlog.pop().await, Some(2));
        assert_eq!(backlog.len(), 1);
    }

    #[tokio::test]
    async fn test_backlog_pop_waits_for_push() {
        let backlog = Arc::new(Backlog::new());
        let waiter = {
            let backlog = Arc::clone(&backlog);
            tokio::spawn(async move { backlog.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        backlog.push_all(["late"]);
        assert_eq!(waiter.await.unwrap(), Some("late"));
    }

    #[tokio::test]
    async fn test_backlog_close_releases_waiter() {
        let backlog: Arc<Backlog<u32>> = Arc::new(Backlog::new());
        let waiter = {
            let backlog = Arc::clone(&backlog);
            tokio::spawn(async move { backlog.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        backlog.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_bounded_push_blocks_when_full() {
        let queue = Arc::new(BoundedQueue::new(2));
        queue.push(1).await.unwrap();
        queue.push(2).await.unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(3).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pusher.is_finished());
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().await, Some(1));
        pusher.await.unwrap().unwrap();
        assert_eq!(queue.pop().await, Some(2));
        assert_eq!(queue.pop().await, Some(3));
    }

    #[tokio::test]
    async fn test_bounded_level_follows_contents() {
        let queue = BoundedQueue::new(4);
        let level = queue.subscribe();

        queue.push("a").await.unwrap();
        queue.push("b").await.unwrap();
        assert_eq!(*level.borrow(), 2);

        queue.try_pop();
        assert_eq!(*level.borrow(), 1);

        queue.clear();
        assert_eq!(*level.borrow(), 0);
    }

    #[tokio::test]
    async fn test_bounded_close_drains_then_ends() {
        let queue = BoundedQueue::new(2);
        queue.push(10).await.unwrap();
        queue.close();

        assert_eq!(queue.push(11).await, Err(11));
        assert_eq!(queue.pop().await, Some(10));
        assert_eq!(queue.pop().await, None);
    }
}
