//! Transport sessions: one physical push connection each.
//!
//! A session is opened by a [`Transport`], authenticates by sending the hello
//! frame first, and from then on exposes:
//! - a [`SessionSender`] for outbound frames and close
//! - an ordered stream of [`TransportEvent`]s: any number of `Frame`s, then
//!   exactly one terminal `Closed` or `Failed`
//!
//! There is no retry at this layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use talkpush_core::{ConnectError, NotConnected};
use talkpush_protocol::{AuthParams, ClientFrame};
use tokio::sync::mpsc;

pub mod websocket;

pub use websocket::WebSocketTransport;

/// Normal closure.
pub const CLOSE_NORMAL: u16 = 1000;
/// Peer closed without a status code.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

const EVENT_BUFFER: usize = 256;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub endpoint: String,
    pub auth: AuthParams,
    pub connect_timeout: Duration,
    /// How long to wait for the peer to answer our close frame.
    pub close_timeout: Duration,
}

impl ConnectTarget {
    pub fn new(endpoint: impl Into<String>, auth: AuthParams) -> Self {
        Self {
            endpoint: endpoint.into(),
            auth,
            connect_timeout: Duration::from_secs(15),
            close_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// The serialized hello frame.
    pub fn hello_frame(&self) -> Result<String, ConnectError> {
        ClientFrame::hello(self.auth.clone())
            .to_json()
            .map_err(|e| ConnectError::Hello(e.to_string()))
    }
}

/// Opens transport sessions.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Connects and sends the hello frame. Success is the `opened` lifecycle
    /// event; an error is `failed`.
    async fn open(&self, target: &ConnectTarget) -> Result<SessionHandle, ConnectError>;
}

// ============================================================================
// Session
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { code: u16, reason: String },
    Failed(String),
}

impl TransportEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Frame(_))
    }
}

/// Outbound side of a live session. Clones share the same connection.
#[derive(Debug, Clone)]
pub struct SessionSender {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: Arc<AtomicBool>,
}

impl SessionSender {
    pub fn send(&self, frame: impl Into<String>) -> Result<(), NotConnected> {
        if self.is_closed() {
            return Err(NotConnected);
        }
        self.outbound
            .send(Outbound::Text(frame.into()))
            .map_err(|_| NotConnected)
    }

    /// Starts a close handshake. Safe to call repeatedly and after the peer
    /// has already closed.
    pub fn close(&self, code: u16, reason: impl Into<String>) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.into(),
        });
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.outbound.is_closed()
    }
}

/// An open session as seen by its owner.
#[derive(Debug)]
pub struct SessionHandle {
    pub sender: SessionSender,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// The connection side of a session: receives outbound frames and reports
/// inbound ones. Used by transport implementations.
#[derive(Debug)]
pub struct SessionDriver {
    pub outbound: mpsc::UnboundedReceiver<Outbound>,
    pub events: mpsc::Sender<TransportEvent>,
    closed: Arc<AtomicBool>,
}

impl SessionDriver {
    /// Makes further sends fail with `NotConnected`.
    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Reports the terminal event and marks the session closed.
    pub async fn finish(self, terminal: TransportEvent) {
        self.mark_closed();
        let _ = self.events.send(terminal).await;
    }
}

/// Creates the two connected halves of a session.
pub fn session_pair() -> (SessionHandle, SessionDriver) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let closed = Arc::new(AtomicBool::new(false));

    let handle = SessionHandle {
        sender: SessionSender {
            outbound: out_tx,
            closed: Arc::clone(&closed),
        },
        events: event_rx,
    };
    let driver = SessionDriver {
        outbound: out_rx,
        events: event_tx,
        closed,
    };
    (handle, driver)
}
