//! Reconnection supervisor - owns the live transport session.
//!
//! ```text
//!            start                 opened
//!   Idle ─────────────▶ Connecting ───────▶ Connected
//!                          ▲   │ failed          │ closed / failed
//!                          │   ▼                 ▼
//!                          └── retry delay ◀── Closed | Failed
//!
//!   stop (from any state) ──▶ Stopped ── start ──▶ Connecting
//! ```
//!
//! The Nth consecutive retry waits `min(max, N * unit)`. A successful open
//! resets the counter. While stopped, lifecycle events are ignored and no
//! retry is ever scheduled.
//!
//! The supervisor is an actor: the session handle, retry timer and pending
//! connect future live in one task, so there is never more than one
//! connection attempt in flight.

use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use talkpush_core::{ConnectError, NotConnected};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tracing::{debug, info, warn};

use crate::config::ReconnectConfig;
use crate::transport::{ConnectTarget, SessionHandle, Transport, TransportEvent, CLOSE_NORMAL};

const COMMAND_BUFFER: usize = 32;
/// Inbound frames queued for the router before new ones are dropped.
pub const INBOUND_BUFFER: usize = 256;

// ============================================================================
// Backoff
// ============================================================================

/// Linear backoff capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearBackoff {
    unit: Duration,
    max: Duration,
}

impl LinearBackoff {
    pub fn new(unit: Duration, max: Duration) -> Self {
        Self { unit, max }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.unit.saturating_mul(attempt).min(self.max)
    }
}

impl Default for LinearBackoff {
    fn default() -> Self {
        Self::from(&ReconnectConfig::default())
    }
}

impl From<&ReconnectConfig> for LinearBackoff {
    fn from(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_secs(config.unit_delay_secs),
            Duration::from_secs(config.max_delay_secs),
        )
    }
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Closed,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// True between `start` and `stop`
    pub desired: bool,
    /// Consecutive failed attempts since the last successful open
    pub attempt: u32,
    pub last_opened_at: Option<DateTime<Utc>>,
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            desired: false,
            attempt: 0,
            last_opened_at: None,
        }
    }
}

// ============================================================================
// Commands / Errors
// ============================================================================

#[derive(Debug)]
enum SupervisorCommand {
    Start {
        target: ConnectTarget,
        respond_to: oneshot::Sender<()>,
    },
    Stop {
        respond_to: oneshot::Sender<()>,
    },
    Send {
        frame: String,
        respond_to: oneshot::Sender<Result<(), NotConnected>>,
    },
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorError {
    #[error("supervisor channel closed")]
    ChannelClosed,

    #[error(transparent)]
    NotConnected(#[from] NotConnected),
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to the supervisor. Dropping every clone stops it and closes the
/// live connection.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorCommand>,
    status: watch::Receiver<ConnectionStatus>,
}

impl SupervisorHandle {
    /// Sets the desired state to connected and begins connecting to `target`.
    /// Any existing connection is closed first and the attempt counter resets.
    pub async fn start(&self, target: ConnectTarget) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::Start {
                target,
                respond_to: tx,
            })
            .await
            .map_err(|_| SupervisorError::ChannelClosed)?;
        rx.await.map_err(|_| SupervisorError::ChannelClosed)
    }

    /// Closes the live connection and cancels any pending retry.
    pub async fn stop(&self) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::Stop { respond_to: tx })
            .await
            .map_err(|_| SupervisorError::ChannelClosed)?;
        rx.await.map_err(|_| SupervisorError::ChannelClosed)
    }

    /// Sends a frame on the live connection.
    pub async fn send(&self, frame: impl Into<String>) -> Result<(), SupervisorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SupervisorCommand::Send {
                frame: frame.into(),
                respond_to: tx,
            })
            .await
            .map_err(|_| SupervisorError::ChannelClosed)?;
        rx.await.map_err(|_| SupervisorError::ChannelClosed)??;
        Ok(())
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }
}

/// Spawns a supervisor over `transport`.
///
/// Returns the handle and the stream of inbound frames, in wire order.
/// Frames that arrive while [`INBOUND_BUFFER`] frames are unread are dropped.
pub fn spawn_supervisor(
    transport: Arc<dyn Transport>,
    backoff: LinearBackoff,
) -> (SupervisorHandle, mpsc::Receiver<String>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::default());

    let actor = Supervisor {
        receiver: cmd_rx,
        transport,
        backoff,
        inbound: inbound_tx,
        status: status_tx,
        target: None,
        desired: false,
        attempt: 0,
        state: ConnectionState::Idle,
        last_opened_at: None,
        connecting: None,
        live: None,
        retry: None,
    };
    tokio::spawn(actor.run());

    let handle = SupervisorHandle {
        sender: cmd_tx,
        status: status_rx,
    };
    (handle, inbound_rx)
}

// ============================================================================
// Actor
// ============================================================================

type OpenFuture = Pin<Box<dyn Future<Output = Result<SessionHandle, ConnectError>> + Send>>;

struct Supervisor {
    receiver: mpsc::Receiver<SupervisorCommand>,
    transport: Arc<dyn Transport>,
    backoff: LinearBackoff,
    inbound: mpsc::Sender<String>,
    status: watch::Sender<ConnectionStatus>,

    target: Option<ConnectTarget>,
    desired: bool,
    attempt: u32,
    state: ConnectionState,
    last_opened_at: Option<DateTime<Utc>>,

    connecting: Option<OpenFuture>,
    live: Option<SessionHandle>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl Supervisor {
    async fn run(mut self) {
        debug!("Supervisor starting");

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },

                result = open_result(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_open(result);
                }

                event = next_event(&mut self.live) => {
                    self.on_transport_event(event);
                }

                _ = retry_elapsed(&mut self.retry) => {
                    self.retry = None;
                    self.begin_attempt();
                }
            }
        }

        self.teardown("Service stopped");
        debug!("Supervisor stopped: all handles dropped");
    }

    fn handle_command(&mut self, cmd: SupervisorCommand) {
        match cmd {
            SupervisorCommand::Start { target, respond_to } => {
                self.teardown("Reconnecting");
                info!(endpoint = %target.endpoint, "Starting push connection");
                self.target = Some(target);
                self.desired = true;
                self.attempt = 0;
                self.begin_attempt();
                let _ = respond_to.send(());
            }
            SupervisorCommand::Stop { respond_to } => {
                self.desired = false;
                self.teardown("Service stopped");
                self.set_state(ConnectionState::Stopped);
                info!("Push connection stopped");
                let _ = respond_to.send(());
            }
            SupervisorCommand::Send { frame, respond_to } => {
                let result = match &self.live {
                    Some(live) => live.sender.send(frame),
                    None => Err(NotConnected),
                };
                let _ = respond_to.send(result);
            }
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    fn begin_attempt(&mut self) {
        let Some(target) = self.target.clone() else {
            return;
        };

        self.set_state(ConnectionState::Connecting);
        debug!(attempt = self.attempt, endpoint = %target.endpoint, "Connecting");

        let transport = Arc::clone(&self.transport);
        self.connecting = Some(Box::pin(async move { transport.open(&target).await }));
    }

    fn on_open(&mut self, result: Result<SessionHandle, ConnectError>) {
        match result {
            Ok(session) => {
                info!(after_attempts = self.attempt, "Push connection opened");
                self.attempt = 0;
                self.last_opened_at = Some(Utc::now());
                self.live = Some(session);
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!(error = %e, attempt = self.attempt, "Push connection failed");
                self.set_state(ConnectionState::Failed);
                self.schedule_retry();
            }
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            // dropped rather than stalling the command loop
            Some(TransportEvent::Frame(text)) => match self.inbound.try_send(text) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Inbound queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Inbound receiver dropped, frame discarded");
                }
            },
            Some(TransportEvent::Closed { code, reason }) => {
                info!(code, reason = %reason, "Push connection closed");
                self.live = None;
                self.set_state(ConnectionState::Closed);
                self.schedule_retry();
            }
            Some(TransportEvent::Failed(error)) => {
                warn!(error = %error, "Push connection lost");
                self.live = None;
                self.set_state(ConnectionState::Failed);
                self.schedule_retry();
            }
            None => {
                warn!("Push session ended without a terminal event");
                self.live = None;
                self.set_state(ConnectionState::Failed);
                self.schedule_retry();
            }
        }
    }

    fn schedule_retry(&mut self) {
        if !self.desired {
            return;
        }

        self.attempt = self.attempt.saturating_add(1);
        let delay = self.backoff.delay_for(self.attempt);
        info!(
            attempt = self.attempt,
            delay_secs = delay.as_secs(),
            "Scheduling reconnect"
        );
        self.retry = Some(Box::pin(sleep(delay)));
        self.publish();
    }

    /// Drops any pending attempt or retry and closes the live session.
    fn teardown(&mut self, reason: &str) {
        self.connecting = None;
        self.retry = None;
        if let Some(live) = self.live.take() {
            live.sender.close(CLOSE_NORMAL, reason);
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&self) {
        self.status.send_replace(ConnectionStatus {
            state: self.state,
            desired: self.desired,
            attempt: self.attempt,
            last_opened_at: self.last_opened_at,
        });
    }
}

async fn open_result(connecting: &mut Option<OpenFuture>) -> Result<SessionHandle, ConnectError> {
    match connecting {
        Some(fut) => fut.as_mut().await,
        None => pending().await,
    }
}

async fn next_event(live: &mut Option<SessionHandle>) -> Option<TransportEvent> {
    match live {
        Some(session) => session.events.recv().await,
        None => pending().await,
    }
}

async fn retry_elapsed(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}
