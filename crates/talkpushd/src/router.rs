//! Routes inbound push frames to the coordinator.
//!
//! Frames are handled in wire order:
//! - chat message: dedup + fan-out via `publish` (own messages skipped)
//! - call: fan-out as a call delivery
//! - room / other system events: fan-out without dedup
//! - ping: dropped
//!
//! Malformed frames are logged and dropped; they never stop the router.

use std::sync::Arc;

use talkpush_core::{Delivery, Event, EventKind, ParseError, UserProvider};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::coordinator::{CoordinatorError, CoordinatorHandle, SubmitOutcome};

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Published(SubmitOutcome),
    /// Broadcast without dedup to this many consumers
    Broadcast(usize),
    SkippedOwn,
    Ping,
    /// Parsed, but has no delivery form (e.g. a call without a room)
    Undeliverable,
    Malformed(ParseError),
}

#[derive(Clone)]
pub struct Router {
    coordinator: CoordinatorHandle,
    users: Arc<dyn UserProvider>,
}

impl Router {
    pub fn new(coordinator: CoordinatorHandle, users: Arc<dyn UserProvider>) -> Self {
        Self { coordinator, users }
    }

    /// Consumes `inbound` until it ends or the coordinator stops.
    pub fn spawn(self, mut inbound: mpsc::Receiver<String>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(raw) = inbound.recv().await {
                match self.route(&raw).await {
                    Ok(outcome) => trace!(?outcome, "Routed frame"),
                    Err(CoordinatorError::ChannelClosed) => {
                        info!("Router stopping: coordinator closed");
                        return;
                    }
                }
            }
            debug!("Router stopping: inbound stream ended");
        })
    }

    /// Dispatches and routes one raw frame.
    pub async fn route(&self, raw: &str) -> Result<RouteOutcome, CoordinatorError> {
        let event = match talkpush_protocol::dispatch(raw) {
            Ok(event) => Arc::new(event),
            Err(e) => {
                warn!(error = %e, len = raw.len(), "Dropping malformed frame");
                return Ok(RouteOutcome::Malformed(e));
            }
        };

        match event.kind() {
            EventKind::Ping => {
                trace!("Ping");
                Ok(RouteOutcome::Ping)
            }
            EventKind::ChatMessage => self.route_chat(event).await,
            EventKind::Room | EventKind::SystemEvent { .. } => self.route_broadcast(&event).await,
        }
    }

    async fn route_chat(&self, event: Arc<Event>) -> Result<RouteOutcome, CoordinatorError> {
        if self.is_own(&event) {
            debug!(channel = ?event.channel(), "Skipping own message");
            return Ok(RouteOutcome::SkippedOwn);
        }

        let outcome = self.coordinator.publish(event).await?;
        Ok(RouteOutcome::Published(outcome))
    }

    async fn route_broadcast(&self, event: &Arc<Event>) -> Result<RouteOutcome, CoordinatorError> {
        let Some(delivery) = Delivery::for_event(event, true) else {
            debug!(kind = %event.kind(), "Event has no delivery form");
            return Ok(RouteOutcome::Undeliverable);
        };

        let delivered = self.coordinator.broadcast(delivery).await?;
        debug!(kind = %event.kind(), channel = ?event.channel(), delivered, "Broadcast event");
        Ok(RouteOutcome::Broadcast(delivered))
    }

    fn is_own(&self, event: &Event) -> bool {
        match (self.users.current_user(), event.sender_id()) {
            (Some(user), Some(sender)) => user.is_own(sender),
            _ => false,
        }
    }
}
