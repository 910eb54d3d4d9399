//! Typed fan-out payloads and the consumer registration messages.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{ChannelKey, ConsumerId, Event, EventKind};

/// Room name used when the conversation's display name is unknown.
pub const DEFAULT_ROOM_NAME: &str = "Chat";

/// Sender name used when the author's display name is unknown.
pub const DEFAULT_SENDER_NAME: &str = "Someone";

/// Body used when a chat payload has no message text.
pub const DEFAULT_MESSAGE_TEXT: &str = "New message";

// ============================================================================
// Chat Message
// ============================================================================

/// The `CHAT_MESSAGE` fan-out payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub room_token: ChannelKey,
    pub room_name: String,
    /// The message object as sent by the server
    pub message: serde_json::Value,
    pub sender_id: String,
    pub sender_name: String,
    /// Seconds since epoch
    pub timestamp: i64,
}

impl ChatMessage {
    /// Builds the payload from a chat event.
    ///
    /// Returns `None` if the event has no channel.
    pub fn from_event(event: &Event) -> Option<Self> {
        let room_token = event.channel()?.clone();
        Some(Self {
            room_token,
            room_name: event.channel_name().unwrap_or(DEFAULT_ROOM_NAME).to_string(),
            message: event.payload().clone(),
            sender_id: event.sender_id().unwrap_or_default().to_string(),
            sender_name: event.sender_name().unwrap_or(DEFAULT_SENDER_NAME).to_string(),
            timestamp: event.timestamp(),
        })
    }

    /// Message text, or a generic placeholder.
    pub fn text(&self) -> &str {
        self.message
            .get("message")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_MESSAGE_TEXT)
    }
}

// ============================================================================
// Delivery
// ============================================================================

/// One fan-out delivery, typed by event kind.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// An accepted chat message.
    ///
    /// `notify` is false for the baseline event of a channel, which updates
    /// consumers without surfacing a user-visible notification.
    Chat { message: ChatMessage, notify: bool },

    /// Incoming call in a room.
    Call {
        channel: ChannelKey,
        channel_name: String,
    },

    /// Room state change (forwarded without dedup).
    Room(Arc<Event>),

    /// Any other server event (forwarded without dedup).
    System(Arc<Event>),
}

impl Delivery {
    /// Maps a dispatched event onto its delivery shape.
    ///
    /// Returns `None` for pings and for chat / call events without a channel.
    pub fn for_event(event: &Arc<Event>, notify: bool) -> Option<Self> {
        if event.is_call() {
            return Some(Self::Call {
                channel: event.channel()?.clone(),
                channel_name: event
                    .channel_name()
                    .unwrap_or(DEFAULT_ROOM_NAME)
                    .to_string(),
            });
        }

        match event.kind() {
            EventKind::ChatMessage => ChatMessage::from_event(event)
                .map(|message| Self::Chat { message, notify }),
            EventKind::Room => Some(Self::Room(Arc::clone(event))),
            EventKind::SystemEvent { .. } => Some(Self::System(Arc::clone(event))),
            EventKind::Ping => None,
        }
    }

    /// Routing destination of this delivery, if any.
    pub fn channel(&self) -> Option<&ChannelKey> {
        match self {
            Self::Chat { message, .. } => Some(&message.room_token),
            Self::Call { channel, .. } => Some(channel),
            Self::Room(event) | Self::System(event) => event.channel(),
        }
    }

    /// Returns true if this delivery should surface a notification.
    pub fn is_notify_worthy(&self) -> bool {
        match self {
            Self::Chat { notify, .. } => *notify,
            Self::Call { .. } => true,
            Self::Room(_) | Self::System(_) => false,
        }
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Consumer membership messages of the local registration protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Registration {
    #[serde(rename = "REGISTER_MESSAGE_LISTENER", rename_all = "camelCase")]
    Register { service_id: ConsumerId },

    #[serde(rename = "UNREGISTER_MESSAGE_LISTENER", rename_all = "camelCase")]
    Unregister { service_id: ConsumerId },
}

impl Registration {
    pub fn register(service_id: impl Into<ConsumerId>) -> Self {
        Self::Register {
            service_id: service_id.into(),
        }
    }

    pub fn unregister(service_id: impl Into<ConsumerId>) -> Self {
        Self::Unregister {
            service_id: service_id.into(),
        }
    }

    pub fn service_id(&self) -> &ConsumerId {
        match self {
            Self::Register { service_id } | Self::Unregister { service_id } => service_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CALL_EVENT;
    use serde_json::json;

    fn chat_event() -> Arc<Event> {
        Arc::new(
            Event::builder(EventKind::ChatMessage, 140)
                .channel("r1")
                .sender_id("bob")
                .payload(json!({"roomId": "r1", "message": "hello", "actorId": "bob"}))
                .build(),
        )
    }

    #[test]
    fn test_chat_message_defaults_names() {
        let message = ChatMessage::from_event(&chat_event()).unwrap();
        assert_eq!(message.room_token, ChannelKey::new("r1"));
        assert_eq!(message.room_name, DEFAULT_ROOM_NAME);
        assert_eq!(message.sender_name, DEFAULT_SENDER_NAME);
        assert_eq!(message.sender_id, "bob");
        assert_eq!(message.timestamp, 140);
        assert_eq!(message.text(), "hello");
    }

    #[test]
    fn test_chat_message_text_placeholder() {
        let event = Event::builder(EventKind::ChatMessage, 1)
            .channel("r1")
            .payload(json!({"message": ""}))
            .build();
        let message = ChatMessage::from_event(&event).unwrap();
        assert_eq!(message.text(), DEFAULT_MESSAGE_TEXT);
    }

    #[test]
    fn test_chat_message_serializes_camel_case() {
        let message = ChatMessage::from_event(&chat_event()).unwrap();
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["roomToken"], "r1");
        assert_eq!(json["roomName"], "Chat");
        assert_eq!(json["senderId"], "bob");
        assert_eq!(json["senderName"], "Someone");
        assert_eq!(json["message"]["message"], "hello");
    }

    #[test]
    fn test_delivery_for_chat_carries_notify_flag() {
        let delivery = Delivery::for_event(&chat_event(), false).unwrap();
        assert!(matches!(delivery, Delivery::Chat { notify: false, .. }));
        assert!(!delivery.is_notify_worthy());

        let delivery = Delivery::for_event(&chat_event(), true).unwrap();
        assert!(delivery.is_notify_worthy());
        assert_eq!(delivery.channel(), Some(&ChannelKey::new("r1")));
    }

    #[test]
    fn test_delivery_for_call() {
        let event = Arc::new(
            Event::builder(EventKind::system(CALL_EVENT), 1)
                .channel("r9")
                .build(),
        );
        match Delivery::for_event(&event, false).unwrap() {
            Delivery::Call {
                channel,
                channel_name,
            } => {
                assert_eq!(channel.as_str(), "r9");
                assert_eq!(channel_name, DEFAULT_ROOM_NAME);
            }
            other => panic!("expected Call delivery, got {other:?}"),
        }
    }

    #[test]
    fn test_delivery_for_ping_and_channelless_chat() {
        let ping = Arc::new(Event::builder(EventKind::Ping, 1).build());
        assert!(Delivery::for_event(&ping, true).is_none());

        let chat = Arc::new(Event::builder(EventKind::ChatMessage, 1).build());
        assert!(Delivery::for_event(&chat, true).is_none());
    }

    #[test]
    fn test_delivery_for_unknown_system_event() {
        let event = Arc::new(Event::builder(EventKind::system("bye"), 1).build());
        let delivery = Delivery::for_event(&event, true).unwrap();
        assert!(matches!(delivery, Delivery::System(_)));
        assert!(!delivery.is_notify_worthy());
        assert!(delivery.channel().is_none());
    }

    #[test]
    fn test_registration_wire_names() {
        let json = serde_json::to_value(Registration::register("svc")).unwrap();
        assert_eq!(json["action"], "REGISTER_MESSAGE_LISTENER");
        assert_eq!(json["serviceId"], "svc");

        let json = serde_json::to_value(Registration::unregister("svc")).unwrap();
        assert_eq!(json["action"], "UNREGISTER_MESSAGE_LISTENER");

        let parsed: Registration = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.service_id().as_str(), "svc");
    }
}
