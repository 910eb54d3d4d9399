//! Cheap-to-clone client side of the coordinator actor.

use std::sync::Arc;
use std::time::Duration;

use talkpush_core::{ChannelKey, ConsumerId, Delivery, Event, Registration};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::commands::{
    ConsumerInfo, CoordinatorCommand, CoordinatorError, DeliveryStream, SubmitOutcome,
};

/// Handle for the dedup & fan-out coordinator.
///
/// Shared by the router, the poller and every consumer. All methods fail
/// with [`CoordinatorError::ChannelClosed`] once the actor has stopped.
#[derive(Clone)]
pub struct CoordinatorHandle {
    sender: mpsc::Sender<CoordinatorCommand>,
    cancel: CancellationToken,
}

impl CoordinatorHandle {
    pub(crate) fn new(sender: mpsc::Sender<CoordinatorCommand>, cancel: CancellationToken) -> Self {
        Self { sender, cancel }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CoordinatorCommand,
    ) -> Result<T, CoordinatorError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(make(tx))
            .await
            .map_err(|_| CoordinatorError::ChannelClosed)?;

        rx.await.map_err(|_| CoordinatorError::ChannelClosed)
    }

    /// Dedup decision for `event` without any fan-out.
    pub async fn submit(&self, event: Arc<Event>) -> Result<SubmitOutcome, CoordinatorError> {
        self.request(|respond_to| CoordinatorCommand::Submit { event, respond_to })
            .await
    }

    /// Dedup decision, and on acceptance a chat delivery to all consumers
    /// (`notify` is false for a channel's baseline event).
    pub async fn publish(&self, event: Arc<Event>) -> Result<SubmitOutcome, CoordinatorError> {
        self.request(|respond_to| CoordinatorCommand::Publish { event, respond_to })
            .await
    }

    /// Delivers to every registered consumer without dedup. Returns the
    /// number of consumers reached.
    pub async fn broadcast(&self, delivery: Delivery) -> Result<usize, CoordinatorError> {
        self.request(|respond_to| CoordinatorCommand::Broadcast {
            delivery,
            respond_to,
        })
        .await
    }

    pub async fn register(
        &self,
        id: impl Into<ConsumerId>,
    ) -> Result<DeliveryStream, CoordinatorError> {
        let id = id.into();
        self.request(|respond_to| CoordinatorCommand::Register { id, respond_to })
            .await
    }

    /// Returns true if `id` was registered.
    pub async fn unregister(&self, id: impl Into<ConsumerId>) -> Result<bool, CoordinatorError> {
        let id = id.into();
        self.request(|respond_to| CoordinatorCommand::Unregister { id, respond_to })
            .await
    }

    /// Applies a registration message. Yields the delivery stream for
    /// `Register`, `None` for `Unregister`.
    pub async fn apply(
        &self,
        registration: Registration,
    ) -> Result<Option<DeliveryStream>, CoordinatorError> {
        match registration {
            Registration::Register { service_id } => self.register(service_id).await.map(Some),
            Registration::Unregister { service_id } => {
                self.unregister(service_id).await.map(|_| None)
            }
        }
    }

    /// Sweeps dedup entries older than `max_age`; returns the number removed.
    pub async fn cleanup(&self, max_age: Duration) -> Result<usize, CoordinatorError> {
        self.request(|tx| CoordinatorCommand::Cleanup {
            max_age,
            respond_to: Some(tx),
        })
        .await
    }

    pub async fn last_accepted(
        &self,
        channel: impl Into<ChannelKey>,
    ) -> Result<Option<i64>, CoordinatorError> {
        let channel = channel.into();
        self.request(|respond_to| CoordinatorCommand::LastAccepted {
            channel,
            respond_to,
        })
        .await
    }

    pub async fn consumers(&self) -> Result<Vec<ConsumerInfo>, CoordinatorError> {
        self.request(|respond_to| CoordinatorCommand::Consumers { respond_to })
            .await
    }

    /// Stops the cleanup timer and the actor. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
