//! Shared test doubles for the integration tests.
//!
//! Tests CAN use `.unwrap()` and `.expect()`.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use talkpush_core::{
    ChannelKey, ConnectError, Conversation, ConversationStore, MemoryStore, Notification,
    NotificationSink, StorageError, StoredMessage, User,
};
use talkpushd::transport::{session_pair, ConnectTarget, SessionDriver, SessionHandle, Transport};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

// ============================================================================
// Users / Frames
// ============================================================================

pub fn alice() -> User {
    User::new(1, "alice").with_display_name("Alice")
}

pub fn chat_frame(room: &str, actor: &str, timestamp: i64) -> String {
    serde_json::json!({
        "type": "message",
        "message": {
            "roomId": room,
            "message": format!("hello from {actor}"),
            "actorId": actor,
            "timestamp": timestamp,
        }
    })
    .to_string()
}

// ============================================================================
// Scripted Transport
// ============================================================================

/// What the next `open` call does.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    Fail,
    Accept,
}

/// Transport that follows a script and records when each open happened.
/// Once the script runs out every open fails.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    opens: Mutex<Vec<Instant>>,
    drivers: mpsc::UnboundedSender<SessionDriver>,
}

impl ScriptedTransport {
    pub fn new(steps: &[Step]) -> (Arc<Self>, mpsc::UnboundedReceiver<SessionDriver>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            steps: Mutex::new(steps.iter().copied().collect()),
            opens: Mutex::new(Vec::new()),
            drivers: tx,
        });
        (transport, rx)
    }

    pub fn always_failing() -> Arc<Self> {
        Self::new(&[]).0
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().unwrap().len()
    }

    /// Whole seconds between consecutive opens.
    pub fn gaps_secs(&self) -> Vec<u64> {
        self.open_times()
            .windows(2)
            .map(|w| (w[1] - w[0]).as_secs())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, _target: &ConnectTarget) -> Result<SessionHandle, ConnectError> {
        self.opens.lock().unwrap().push(Instant::now());
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(Step::Accept) => {
                let (handle, driver) = session_pair();
                self.drivers.send(driver).unwrap();
                Ok(handle)
            }
            Some(Step::Fail) | None => Err(ConnectError::Handshake("scripted failure".into())),
        }
    }
}

pub fn target() -> ConnectTarget {
    ConnectTarget::new("ws://test.invalid/ws", Default::default())
}

// ============================================================================
// Storage
// ============================================================================

/// In-memory store where selected channels fail to read.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<ChannelKey>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user: &User, room: &str, message: Option<StoredMessage>) {
        let key = ChannelKey::new(room);
        self.inner.add_conversation(user, Conversation::new(key.clone())).await;
        if let Some(message) = message {
            self.inner.push_message(user, &key, message).await;
        }
    }

    pub fn fail_channel(&self, room: &str) {
        self.failing.lock().unwrap().insert(ChannelKey::new(room));
    }
}

#[async_trait]
impl ConversationStore for FlakyStore {
    async fn conversations(&self, user: &User) -> Result<Vec<Conversation>, StorageError> {
        self.inner.conversations(user).await
    }

    async fn latest_message(
        &self,
        user: &User,
        channel: &ChannelKey,
    ) -> Result<Option<StoredMessage>, StorageError> {
        if self.failing.lock().unwrap().contains(channel) {
            return Err(StorageError::Read(format!("disk error on {channel}")));
        }
        self.inner.latest_message(user, channel).await
    }
}

// ============================================================================
// Notification Sink
// ============================================================================

#[derive(Default)]
pub struct RecordingSink {
    presented: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn presented(&self) -> Vec<Notification> {
        self.presented.lock().unwrap().clone()
    }

    /// Polls until at least `n` notifications were presented.
    pub async fn wait_for(&self, n: usize, limit: Duration) -> Vec<Notification> {
        let deadline = Instant::now() + limit;
        loop {
            let presented = self.presented();
            if presented.len() >= n || Instant::now() >= deadline {
                return presented;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn present(&self, notification: Notification) {
        self.presented.lock().unwrap().push(notification);
    }
}

// ============================================================================
// WebSocket Server
// ============================================================================

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Binds a local listener and returns it with its `ws://` URL.
pub async fn ws_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    (listener, url)
}

pub async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .expect("no client connected")
        .unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

/// Next text frame from the client, skipping control frames.
pub async fn next_text(ws: &mut ServerSocket) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame from client")
            .expect("client disconnected")
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return text.as_str().to_owned();
        }
    }
}
