//! Coordinator actor - single owner of the dedup table and consumer set.
//!
//! Commands are processed one at a time, so the read and conditional write
//! of a `submit` (and the broadcast that follows a `publish`) are atomic with
//! respect to every other caller.

use std::sync::Arc;
use std::time::Duration;

use talkpush_core::{unix_now, ConsumerId, Delivery, Event};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::commands::{CoordinatorCommand, DeliveryStream, RejectReason, SubmitOutcome};
use super::consumers::ConsumerRegistry;
use super::dedup::DedupTable;

pub struct CoordinatorActor {
    receiver: mpsc::Receiver<CoordinatorCommand>,
    dedup: DedupTable,
    consumers: ConsumerRegistry,
    cancel: CancellationToken,
}

impl CoordinatorActor {
    pub fn new(
        receiver: mpsc::Receiver<CoordinatorCommand>,
        recent_window: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            dedup: DedupTable::new(recent_window),
            consumers: ConsumerRegistry::new(),
            cancel,
        }
    }

    /// Runs until shutdown is requested or every handle is dropped.
    /// Consumer streams end when the actor stops.
    pub async fn run(mut self) {
        info!("Coordinator starting");

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
            }
        }

        info!(
            channels = self.dedup.len(),
            consumers = self.consumers.len(),
            "Coordinator stopped"
        );
    }

    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Submit { event, respond_to } => {
                let _ = respond_to.send(self.handle_submit(&event));
            }
            CoordinatorCommand::Publish { event, respond_to } => {
                let _ = respond_to.send(self.handle_publish(&event));
            }
            CoordinatorCommand::Broadcast {
                delivery,
                respond_to,
            } => {
                let _ = respond_to.send(self.consumers.broadcast(&delivery));
            }
            CoordinatorCommand::Register { id, respond_to } => {
                let _ = respond_to.send(self.handle_register(id));
            }
            CoordinatorCommand::Unregister { id, respond_to } => {
                let removed = self.consumers.unregister(&id);
                debug!(consumer = %id, removed, "Consumer unregistered");
                let _ = respond_to.send(removed);
            }
            CoordinatorCommand::Cleanup {
                max_age,
                respond_to,
            } => {
                let removed = self.dedup.cleanup(max_age, unix_now());
                if removed > 0 {
                    debug!(removed, remaining = self.dedup.len(), "Expired dedup entries");
                }
                if let Some(tx) = respond_to {
                    let _ = tx.send(removed);
                }
            }
            CoordinatorCommand::LastAccepted {
                channel,
                respond_to,
            } => {
                let _ = respond_to.send(self.dedup.last_accepted(&channel));
            }
            CoordinatorCommand::Consumers { respond_to } => {
                let _ = respond_to.send(self.consumers.list());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_submit(&mut self, event: &Event) -> SubmitOutcome {
        let Some(channel) = event.channel() else {
            debug!(kind = %event.kind(), "Rejecting event without channel");
            return SubmitOutcome::Rejected(RejectReason::Unroutable);
        };

        let outcome = self.dedup.submit(channel, event.timestamp(), unix_now());
        debug!(
            channel = %channel,
            timestamp = event.timestamp(),
            ?outcome,
            "Submitted event"
        );
        outcome
    }

    fn handle_publish(&mut self, event: &Arc<Event>) -> SubmitOutcome {
        let outcome = self.handle_submit(event);
        let SubmitOutcome::Accepted { suppress_notify } = outcome else {
            return outcome;
        };

        match Delivery::for_event(event, !suppress_notify) {
            Some(delivery) => {
                let delivered = self.consumers.broadcast(&delivery);
                debug!(
                    channel = ?delivery.channel(),
                    notify = !suppress_notify,
                    delivered,
                    "Published event"
                );
            }
            None => debug!(kind = %event.kind(), "Accepted event has no delivery form"),
        }
        outcome
    }

    fn handle_register(&mut self, id: ConsumerId) -> DeliveryStream {
        debug!(consumer = %id, "Consumer registered");
        self.consumers.register(id)
    }
}
