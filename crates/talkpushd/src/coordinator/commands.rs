//! Coordinator commands, outcomes and errors.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use talkpush_core::{ChannelKey, ConsumerId, Delivery, Event};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Stream of deliveries handed to a registered consumer.
///
/// Ends when the consumer is unregistered, re-registered, or the
/// coordinator shuts down.
pub type DeliveryStream = mpsc::Receiver<Delivery>;

// ============================================================================
// Outcomes
// ============================================================================

/// Result of submitting an event for dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// New event. `suppress_notify` is set for the first event seen on a
    /// channel, which only establishes the baseline.
    Accepted { suppress_notify: bool },
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// True only for an accepted, non-baseline event.
    pub fn should_notify(&self) -> bool {
        matches!(
            self,
            Self::Accepted {
                suppress_notify: false
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Not newer than the last accepted event and outside the recent window
    Duplicate,
    /// Event has no channel key
    Unroutable,
}

/// A registered consumer as reported by [`CoordinatorCommand::Consumers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerInfo {
    pub id: ConsumerId,
    pub registered_at: DateTime<Utc>,
}

// ============================================================================
// Commands
// ============================================================================

#[derive(Debug)]
pub enum CoordinatorCommand {
    /// Dedup check only.
    Submit {
        event: Arc<Event>,
        respond_to: oneshot::Sender<SubmitOutcome>,
    },

    /// Dedup check, then broadcast a chat delivery if accepted.
    Publish {
        event: Arc<Event>,
        respond_to: oneshot::Sender<SubmitOutcome>,
    },

    /// Deliver to every registered consumer; responds with the count reached.
    Broadcast {
        delivery: Delivery,
        respond_to: oneshot::Sender<usize>,
    },

    Register {
        id: ConsumerId,
        respond_to: oneshot::Sender<DeliveryStream>,
    },

    /// Responds true if the consumer was registered.
    Unregister {
        id: ConsumerId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Sweep entries older than `max_age`. Sent without a responder by the
    /// periodic cleanup task.
    Cleanup {
        max_age: Duration,
        respond_to: Option<oneshot::Sender<usize>>,
    },

    LastAccepted {
        channel: ChannelKey,
        respond_to: oneshot::Sender<Option<i64>>,
    },

    Consumers {
        respond_to: oneshot::Sender<Vec<ConsumerInfo>>,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("coordinator channel closed")]
    ChannelClosed,
}
