//! C4 — Broadcast hub: one producer, many independent subscribers, each
//! with its own bounded drop-oldest buffer. §4.4.

use crate::queue::DropOldestQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Opaque handle returned by `subscribe`, used to `unsubscribe` later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberHandle(u64);

/// The receive end of a subscription. Not `Clone`: exactly one task should
/// drain a given subscription.
pub struct Subscription<T> {
    queue: DropOldestQueue<T>,
}

impl<T> Subscription<T> {
    pub async fn recv(&self) -> Option<T> {
        self.queue.recv().await
    }

    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }
}

struct SubscriberEntry<T> {
    id: u64,
    queue: DropOldestQueue<T>,
}

/// Single-producer, many-subscriber broadcast hub.
pub struct Hub<T> {
    subscribers: RwLock<Vec<SubscriberEntry<T>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl<T: Clone> Default for Hub<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Hub<T> {
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Fresh buffer; only packets published after this call are visible to
    /// it, never a replay of earlier ones.
    pub async fn subscribe(&self, buffer_capacity: usize) -> (SubscriberHandle, Subscription<T>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = DropOldestQueue::new(buffer_capacity);
        let mut subs = self.subscribers.write().await;
        subs.push(SubscriberEntry {
            id,
            queue: queue.clone(),
        });
        (SubscriberHandle(id), Subscription { queue })
    }

    /// Idempotent: unsubscribing an unknown or already-removed handle is a
    /// no-op.
    pub async fn unsubscribe(&self, handle: SubscriberHandle) {
        let mut subs = self.subscribers.write().await;
        if let Some(pos) = subs.iter().position(|s| s.id == handle.0) {
            let entry = subs.remove(pos);
            entry.queue.close();
        }
    }

    /// Deliver `item` to every live subscriber's buffer. A full buffer drops
    /// its own oldest entry; this never blocks and never fails, even after
    /// shutdown (a post-shutdown publish is simply a no-op).
    pub async fn publish(&self, item: T) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let subs = self.subscribers.read().await;
        for sub in subs.iter() {
            sub.queue.push(item.clone()).await;
        }
    }

    /// Close every subscriber and refuse further publishes.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let mut subs = self.subscribers.write().await;
        let total_dropped: u64 = subs.iter().map(|s| s.queue.dropped_count()).sum();
        debug!(subscribers = subs.len(), total_dropped, "hub closing");
        for sub in subs.drain(..) {
            sub.queue.close();
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Sum of every live subscriber's drop-oldest count. Subscribers that
    /// have already unsubscribed are not represented; this is a live
    /// snapshot, not a lifetime total.
    pub async fn total_dropped(&self) -> u64 {
        self.subscribers
            .read()
            .await
            .iter()
            .map(|s| s.queue.dropped_count())
            .sum()
    }
}
