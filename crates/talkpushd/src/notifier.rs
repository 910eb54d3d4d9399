//! Built-in consumer that turns deliveries into user notifications.

use std::sync::Arc;

use talkpush_core::{Delivery, Notification, NotificationSink, Registration, UserProvider};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::coordinator::{CoordinatorError, CoordinatorHandle, DeliveryStream};

/// Consumer id the notifier registers under.
pub const NOTIFIER_ID: &str = "message-notifier";

pub struct Notifier {
    sink: Arc<dyn NotificationSink>,
    users: Arc<dyn UserProvider>,
}

impl Notifier {
    pub fn new(sink: Arc<dyn NotificationSink>, users: Arc<dyn UserProvider>) -> Self {
        Self { sink, users }
    }

    /// Registers with the coordinator and presents notifications until
    /// `cancel` fires or the coordinator stops. Unregisters on cancel.
    pub async fn spawn(
        self,
        coordinator: CoordinatorHandle,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>, CoordinatorError> {
        let Some(stream) = coordinator.apply(Registration::register(NOTIFIER_ID)).await? else {
            return Err(CoordinatorError::ChannelClosed);
        };

        Ok(tokio::spawn(self.run(stream, coordinator, cancel)))
    }

    async fn run(
        self,
        mut stream: DeliveryStream,
        coordinator: CoordinatorHandle,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = coordinator.apply(Registration::unregister(NOTIFIER_ID)).await;
                    break;
                }

                delivery = stream.recv() => match delivery {
                    Some(delivery) => {
                        if let Some(notification) = self.notification_for(&delivery) {
                            self.sink.present(notification).await;
                        }
                    }
                    None => break,
                },
            }
        }
        debug!("Notifier stopped");
    }

    /// Chat deliveries flagged for notification (not authored by the local
    /// user) and calls become notifications.
    pub fn notification_for(&self, delivery: &Delivery) -> Option<Notification> {
        if !delivery.is_notify_worthy() {
            return None;
        }
        match delivery {
            Delivery::Chat { message, .. } => {
                let own = self
                    .users
                    .current_user()
                    .is_some_and(|user| user.is_own(&message.sender_id));
                (!own).then(|| Notification::for_chat(message))
            }
            Delivery::Call {
                channel,
                channel_name,
            } => Some(Notification::for_call(channel, channel_name)),
            Delivery::Room(_) | Delivery::System(_) => None,
        }
    }
}
