//! The consumer registry owned by the coordinator actor.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use talkpush_core::{ConsumerId, Delivery};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use super::commands::{ConsumerInfo, DeliveryStream};

/// Deliveries queued per consumer before new ones are dropped.
pub const DELIVERY_BUFFER: usize = 256;

#[derive(Debug)]
struct Consumer {
    registered_at: DateTime<Utc>,
    sender: mpsc::Sender<Delivery>,
}

/// Registered consumers keyed by id, one entry per id.
#[derive(Debug, Default)]
pub struct ConsumerRegistry {
    consumers: BTreeMap<ConsumerId, Consumer>,
}

impl ConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `id`, returning a fresh delivery stream.
    ///
    /// Re-registering keeps the original registration time; the previous
    /// stream ends.
    pub fn register(&mut self, id: ConsumerId) -> DeliveryStream {
        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        let registered_at = self
            .consumers
            .get(&id)
            .map(|c| c.registered_at)
            .unwrap_or_else(Utc::now);

        self.consumers.insert(
            id,
            Consumer {
                registered_at,
                sender: tx,
            },
        );
        rx
    }

    pub fn unregister(&mut self, id: &ConsumerId) -> bool {
        self.consumers.remove(id).is_some()
    }

    /// Sends `delivery` to every consumer without waiting. A consumer whose
    /// queue is full misses this delivery; one whose stream was dropped is
    /// removed. Returns the number reached.
    pub fn broadcast(&mut self, delivery: &Delivery) -> usize {
        let mut delivered = 0;
        self.consumers
            .retain(|id, consumer| match consumer.sender.try_send(delivery.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!(consumer = %id, "Consumer lagging, delivery dropped");
                    true
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(consumer = %id, "Pruning consumer with closed stream");
                    false
                }
            });
        delivered
    }

    pub fn list(&self) -> Vec<ConsumerInfo> {
        self.consumers
            .iter()
            .map(|(id, c)| ConsumerInfo {
                id: id.clone(),
                registered_at: c.registered_at,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.consumers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use talkpush_core::{Event, EventKind};

    fn delivery() -> Delivery {
        Delivery::Room(Arc::new(Event::builder(EventKind::Room, 1).build()))
    }

    #[test]
    fn test_broadcast_reaches_all() {
        let mut registry = ConsumerRegistry::new();
        let mut a = registry.register(ConsumerId::new("a"));
        let mut b = registry.register(ConsumerId::new("b"));

        assert_eq!(registry.broadcast(&delivery()), 2);
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());
    }

    #[test]
    fn test_dropped_stream_is_pruned() {
        let mut registry = ConsumerRegistry::new();
        let a = registry.register(ConsumerId::new("a"));
        let _b = registry.register(ConsumerId::new("b"));
        drop(a);

        assert_eq!(registry.broadcast(&delivery()), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reregister_keeps_time_and_replaces_stream() {
        let mut registry = ConsumerRegistry::new();
        let mut first = registry.register(ConsumerId::new("a"));
        let registered_at = registry.list()[0].registered_at;

        let mut second = registry.register(ConsumerId::new("a"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].registered_at, registered_at);

        registry.broadcast(&delivery());
        assert!(second.try_recv().is_ok());
        // old sender was dropped on replacement
        assert!(matches!(
            first.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_stalled_consumer_queue_is_capped() {
        let mut registry = ConsumerRegistry::new();
        let mut stalled = registry.register(ConsumerId::new("stalled"));

        for _ in 0..DELIVERY_BUFFER * 4 {
            registry.broadcast(&delivery());
        }
        // full queue drops deliveries but keeps the registration
        assert_eq!(registry.broadcast(&delivery()), 0);
        assert_eq!(registry.len(), 1);

        let mut queued = 0;
        while stalled.try_recv().is_ok() {
            queued += 1;
        }
        assert_eq!(queued, DELIVERY_BUFFER);

        // once drained it receives again
        assert_eq!(registry.broadcast(&delivery()), 1);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = ConsumerRegistry::new();
        let _a = registry.register(ConsumerId::new("a"));
        assert!(registry.unregister(&ConsumerId::new("a")));
        assert!(!registry.unregister(&ConsumerId::new("a")));
        assert!(registry.is_empty());
    }
}
