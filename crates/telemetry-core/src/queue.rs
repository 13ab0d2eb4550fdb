//! Bounded, single-consumer, drop-oldest-on-full queue.
//!
//! This is the one primitive the hub (C4), the UDP-input backpressure
//! buffer, and the archive writer's subscription buffer are all built from.
//! Per the design notes in §9: "the natural primitive is one bounded queue
//! per subscriber plus a publish loop that performs a non-blocking enqueue,
//! dropping the head on a full queue" — deliberately not a single shared
//! queue with cursors.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

struct Inner<T> {
    buffer: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// A bounded FIFO that never blocks its producer: pushing past capacity
/// silently drops the oldest buffered item.
pub struct DropOldestQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DropOldestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> DropOldestQueue<T> {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be at least 1");
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(VecDeque::with_capacity(capacity)),
                notify: Notify::new(),
                capacity,
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Enqueue an item. Never blocks or fails; a full queue drops its oldest
    /// entry and counts the drop. A no-op once closed.
    pub async fn push(&self, item: T) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut buffer = self.inner.buffer.lock().await;
            if buffer.len() >= self.inner.capacity {
                buffer.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.push_back(item);
        }
        self.inner.notify.notify_one();
    }

    /// Await the next item in FIFO order, or `None` once closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut buffer = self.inner.buffer.lock().await;
                if let Some(item) = buffer.pop_front() {
                    return Some(item);
                }
                if self.inner.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    /// Idempotent. Wakes any pending `recv` so it can observe closure once
    /// the buffer drains.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.buffer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order_preserved_under_capacity() {
        let q = DropOldestQueue::new(4);
        for i in 0..4 {
            q.push(i).await;
        }
        for i in 0..4 {
            assert_eq!(q.recv().await, Some(i));
        }
    }

    #[tokio::test]
    async fn overflow_drops_oldest_not_newest() {
        let q = DropOldestQueue::new(2);
        q.push(1).await;
        q.push(2).await;
        q.push(3).await; // drops 1
        assert_eq!(q.len().await, 2);
        assert_eq!(q.dropped_count(), 1);
        assert_eq!(q.recv().await, Some(2));
        assert_eq!(q.recv().await, Some(3));
    }

    #[tokio::test]
    async fn recv_wakes_on_push() {
        let q = DropOldestQueue::new(4);
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.recv().await });
        tokio::task::yield_now().await;
        q.push(42).await;
        assert_eq!(handle.await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_returns_none() {
        let q = DropOldestQueue::new(4);
        q.push(1).await;
        q.close();
        assert_eq!(q.recv().await, Some(1));
        assert_eq!(q.recv().await, None);
    }

    #[tokio::test]
    async fn push_after_close_is_a_no_op() {
        let q = DropOldestQueue::new(4);
        q.close();
        q.push(1).await;
        assert_eq!(q.recv().await, None);
    }
}
