//! Progress fan-out to connected observers
//!
//! Each observer owns a bounded channel. Publishing never waits on an
//! observer: a full channel drops that record for that observer only, and a
//! closed channel unregisters the observer.

use crate::types::ProgressRecord;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{Mutex, mpsc};
use tokio::sync::mpsc::error::TrySendError;
use tokio_stream::Stream;

/// Identifier of a registered observer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiving side of one observer registration
///
/// Dropping it closes the channel; the next publish removes the observer.
#[derive(Debug)]
pub struct Subscription {
    id: ObserverId,
    receiver: mpsc::Receiver<ProgressRecord>,
}

impl Subscription {
    /// Identifier to pass to [`ProgressBroadcaster::unsubscribe`]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Wait for the next record; `None` once the broadcaster closed this observer
    pub async fn recv(&mut self) -> Option<ProgressRecord> {
        self.receiver.recv().await
    }
}

impl Stream for Subscription {
    type Item = ProgressRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Registry of progress observers
///
/// Constructed once and shared as `Arc<ProgressBroadcaster>`.
#[derive(Debug)]
pub struct ProgressBroadcaster {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<ProgressRecord>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ProgressBroadcaster {
    /// Create a broadcaster whose observers buffer up to `buffer` records
    ///
    /// A zero buffer is raised to 1.
    pub fn new(buffer: usize) -> Self {
        Self {
            observers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a new observer
    pub async fn subscribe(&self) -> Subscription {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::channel(self.buffer);
        self.observers.lock().await.insert(id, sender);
        tracing::debug!(observer_id = %id, "progress observer connected");
        Subscription { id, receiver }
    }

    /// Remove an observer; returns whether it was registered
    pub async fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.observers.lock().await.remove(&id).is_some();
        if removed {
            tracing::debug!(observer_id = %id, "progress observer disconnected");
        }
        removed
    }

    /// Deliver a record to every observer registered right now
    ///
    /// Returns the number of observers that accepted the record. Zero
    /// observers is not an error.
    pub async fn publish(&self, record: &ProgressRecord) -> usize {
        let mut delivered = 0;
        let mut observers = self.observers.lock().await;

        observers.retain(|id, sender| match sender.try_send(*record) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::trace!(observer_id = %id, "observer buffer full, record dropped");
                true
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(observer_id = %id, "progress observer gone, removing");
                false
            }
        });

        delivered
    }

    /// Number of registered observers
    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }

    /// Unregister every observer, ending their subscriptions
    pub async fn close_all(&self) {
        let mut observers = self.observers.lock().await;
        let count = observers.len();
        observers.clear();
        if count > 0 {
            tracing::info!(count, "closed progress observers");
        }
    }
}

impl Default for ProgressBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_stream::StreamExt;

    fn record(percent: f64) -> ProgressRecord {
        ProgressRecord {
            percent_complete: percent,
            bytes_downloaded: percent as u64,
            bytes_total: 100,
        }
    }

    #[tokio::test]
    async fn publish_with_no_observers_is_a_no_op() {
        let broadcaster = ProgressBroadcaster::new(4);
        assert_eq!(broadcaster.publish(&record(1.0)).await, 0);
    }

    #[tokio::test]
    async fn every_observer_receives_records_in_order() {
        let broadcaster = ProgressBroadcaster::new(8);
        let mut first = broadcaster.subscribe().await;
        let mut second = broadcaster.subscribe().await;
        assert_ne!(first.id(), second.id());

        for percent in [10.0, 20.0, 30.0] {
            assert_eq!(broadcaster.publish(&record(percent)).await, 2);
        }

        for subscription in [&mut first, &mut second] {
            for expected in [10.0, 20.0, 30.0] {
                assert_eq!(subscription.recv().await.unwrap().percent_complete, expected);
            }
        }
    }

    #[tokio::test]
    async fn dropped_observer_is_removed_on_next_publish() {
        let broadcaster = ProgressBroadcaster::new(4);
        let mut alive = broadcaster.subscribe().await;
        let gone = broadcaster.subscribe().await;
        drop(gone);

        assert_eq!(broadcaster.observer_count().await, 2);
        assert_eq!(broadcaster.publish(&record(50.0)).await, 1);
        assert_eq!(broadcaster.observer_count().await, 1);
        assert_eq!(alive.recv().await.unwrap().percent_complete, 50.0);
    }

    #[tokio::test]
    async fn slow_observer_drops_records_but_stays_registered() {
        let broadcaster = ProgressBroadcaster::new(1);
        let mut slow = broadcaster.subscribe().await;
        let mut fast = broadcaster.subscribe().await;

        assert_eq!(broadcaster.publish(&record(1.0)).await, 2);
        assert_eq!(fast.recv().await.unwrap().percent_complete, 1.0);
        // slow has not drained its single slot
        assert_eq!(broadcaster.publish(&record(2.0)).await, 1);
        assert_eq!(fast.recv().await.unwrap().percent_complete, 2.0);

        assert_eq!(broadcaster.observer_count().await, 2);
        assert_eq!(slow.recv().await.unwrap().percent_complete, 1.0);
        assert_eq!(broadcaster.publish(&record(3.0)).await, 2);
        assert_eq!(slow.recv().await.unwrap().percent_complete, 3.0);
    }

    #[tokio::test]
    async fn unsubscribe_removes_only_that_observer() {
        let broadcaster = ProgressBroadcaster::new(4);
        let first = broadcaster.subscribe().await;
        let _second = broadcaster.subscribe().await;

        assert!(broadcaster.unsubscribe(first.id()).await);
        assert!(!broadcaster.unsubscribe(first.id()).await);
        assert_eq!(broadcaster.observer_count().await, 1);
    }

    #[tokio::test]
    async fn close_all_ends_subscriptions() {
        let broadcaster = ProgressBroadcaster::new(4);
        let mut subscription = broadcaster.subscribe().await;
        broadcaster.publish(&record(5.0)).await;
        broadcaster.close_all().await;

        assert_eq!(subscription.next().await.unwrap().percent_complete, 5.0);
        assert!(subscription.next().await.is_none());
        assert_eq!(broadcaster.observer_count().await, 0);
    }

    #[tokio::test]
    async fn concurrent_subscribe_and_publish() {
        let broadcaster = Arc::new(ProgressBroadcaster::new(256));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let b = broadcaster.clone();
            handles.push(tokio::spawn(async move { b.subscribe().await }));
        }
        let publisher = {
            let b = broadcaster.clone();
            tokio::spawn(async move {
                for i in 0..50 {
                    b.publish(&record(i as f64)).await;
                }
            })
        };

        let mut subscriptions = Vec::new();
        for handle in handles {
            subscriptions.push(handle.await.unwrap());
        }
        publisher.await.unwrap();

        assert_eq!(broadcaster.observer_count().await, 8);
        for mut subscription in subscriptions {
            broadcaster.unsubscribe(subscription.id()).await;
            let mut last = -1.0;
            while let Some(r) = subscription.next().await {
                assert!(r.percent_complete > last);
                last = r.percent_complete;
            }
        }
    }
}
