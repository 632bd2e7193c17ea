//! Fan-out of advisory refresh pulses to live dashboard subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DashboardEvent {
    Refresh,
}

impl DashboardEvent {
    pub fn to_json(&self) -> String {
        match self {
            DashboardEvent::Refresh => r#"{"type":"refresh"}"#.to_string(),
        }
    }
}

/// Receiving half handed to a subscriber's sender loop.
#[derive(Debug)]
pub struct Subscription {
    pub id: u64,
    pub events: mpsc::Receiver<DashboardEvent>,
}

#[derive(Debug)]
pub struct DashboardHub {
    subscribers: Mutex<HashMap<u64, mpsc::Sender<DashboardEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for DashboardHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl DashboardHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: capacity.max(1),
        }
    }

    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);
        let count = {
            let mut subscribers = self.subscribers.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        tracing::info!(subscriber = id, subscribers = count, "Dashboard subscriber attached");
        Subscription { id, events: rx }
    }

    /// Dropping the sender closes the subscriber's queue.
    pub fn unregister(&self, id: u64) {
        let removed = self.subscribers.lock().remove(&id).is_some();
        if removed {
            tracing::info!(subscriber = id, "Dashboard subscriber detached");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Non-blocking enqueue to every subscriber; full queues drop the pulse.
    /// Returns how many subscribers received it.
    pub fn broadcast_refresh(&self) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.lock();
            for (id, tx) in subscribers.iter() {
                match tx.try_send(DashboardEvent::Refresh) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        tracing::debug!(subscriber = id, "Dashboard queue full, refresh dropped");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(*id),
                }
            }
        }
        if !closed.is_empty() {
            let mut subscribers = self.subscribers.lock();
            for id in closed {
                subscribers.remove(&id);
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_wire_format() {
        assert_eq!(
            serde_json::to_string(&DashboardEvent::Refresh).unwrap(),
            DashboardEvent::Refresh.to_json()
        );
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_subscriber() {
        let hub = DashboardHub::new(4);
        let mut a = hub.register();
        let mut b = hub.register();

        assert_eq!(hub.broadcast_refresh(), 2);
        assert_eq!(a.events.recv().await, Some(DashboardEvent::Refresh));
        assert_eq!(b.events.recv().await, Some(DashboardEvent::Refresh));
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking_others() {
        let hub = DashboardHub::new(2);
        let _slow = hub.register();
        let mut fast = hub.register();

        for _ in 0..2 {
            hub.broadcast_refresh();
            assert!(fast.events.recv().await.is_some());
        }
        // slow never drains; its queue is now full
        assert_eq!(hub.broadcast_refresh(), 1);
        assert!(fast.events.recv().await.is_some());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_unregister_closes_queue() {
        let hub = DashboardHub::default();
        let mut sub = hub.register();
        hub.unregister(sub.id);

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.broadcast_refresh(), 0);
        assert!(sub.events.recv().await.is_none());
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let hub = DashboardHub::default();
        let sub = hub.register();
        drop(sub);

        assert_eq!(hub.broadcast_refresh(), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }
}
