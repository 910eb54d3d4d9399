//! Inbound events - the typed form of a push frame or a polled message.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ChannelKey;

/// Name of the system event that announces an incoming call.
pub const CALL_EVENT: &str = "call";

/// Returns the current time as whole seconds since the Unix epoch.
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

// ============================================================================
// Event Kind
// ============================================================================

/// Kind of an inbound event.
///
/// Unknown server frame types are never dropped: they become `SystemEvent`
/// carrying the original type string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// A chat message posted to a room.
    ChatMessage,
    /// Room membership / state change.
    Room,
    /// Any other server event, including incoming calls.
    SystemEvent {
        /// Event name (`"call"`, or the unrecognised frame type)
        name: String,
    },
    /// Keep-alive frame.
    Ping,
}

impl EventKind {
    /// Creates a system event kind with the given name.
    pub fn system(name: impl Into<String>) -> Self {
        Self::SystemEvent { name: name.into() }
    }

    /// Short label for logs.
    pub fn label(&self) -> &str {
        match self {
            Self::ChatMessage => "chat-message",
            Self::Room => "room",
            Self::SystemEvent { name } => name,
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SystemEvent { name } => write!(f, "system-event({name})"),
            other => write!(f, "{}", other.label()),
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// An immutable inbound event.
///
/// Built once through [`EventBuilder`]; all accessors borrow. Events are
/// shared between consumers behind an `Arc` after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    kind: EventKind,
    channel: Option<ChannelKey>,
    sender_id: Option<String>,
    sender_name: Option<String>,
    channel_name: Option<String>,
    payload: serde_json::Value,
    timestamp: i64,
    raw: String,
}

impl Event {
    /// Starts building an event of the given kind observed at `timestamp`
    /// (seconds since epoch).
    pub fn builder(kind: EventKind, timestamp: i64) -> EventBuilder {
        EventBuilder {
            event: Event {
                kind,
                channel: None,
                sender_id: None,
                sender_name: None,
                channel_name: None,
                payload: serde_json::Value::Null,
                timestamp,
                raw: String::new(),
            },
        }
    }

    pub fn kind(&self) -> &EventKind {
        &self.kind
    }

    /// Routing destination, if the event targets one.
    pub fn channel(&self) -> Option<&ChannelKey> {
        self.channel.as_ref()
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.sender_id.as_deref()
    }

    pub fn sender_name(&self) -> Option<&str> {
        self.sender_name.as_deref()
    }

    pub fn channel_name(&self) -> Option<&str> {
        self.channel_name.as_deref()
    }

    /// Kind-specific body (the inner object of the frame).
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Seconds since epoch.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// The frame exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Returns true for the incoming-call system event.
    pub fn is_call(&self) -> bool {
        matches!(&self.kind, EventKind::SystemEvent { name } if name == CALL_EVENT)
    }

    /// Text of a chat message, if the payload carries one.
    pub fn message_text(&self) -> Option<&str> {
        self.payload.get("message").and_then(|v| v.as_str())
    }
}

/// Builder for [`Event`].
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    pub fn channel(mut self, channel: impl Into<ChannelKey>) -> Self {
        self.event.channel = Some(channel.into());
        self
    }

    pub fn sender_id(mut self, sender_id: impl Into<String>) -> Self {
        self.event.sender_id = Some(sender_id.into());
        self
    }

    pub fn sender_name(mut self, name: impl Into<String>) -> Self {
        self.event.sender_name = Some(name.into());
        self
    }

    pub fn channel_name(mut self, name: impl Into<String>) -> Self {
        self.event.channel_name = Some(name.into());
        self
    }

    pub fn payload(mut self, payload: serde_json::Value) -> Self {
        self.event.payload = payload;
        self
    }

    pub fn raw(mut self, raw: impl Into<String>) -> Self {
        self.event.raw = raw.into();
        self
    }

    pub fn build(self) -> Event {
        self.event
    }
}
