//! Local conversation storage collaborator and an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::{ChannelKey, Event, EventKind, StorageError, User};

/// A conversation the local user takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub token: ChannelKey,
    pub display_name: Option<String>,
}

impl Conversation {
    pub fn new(token: impl Into<ChannelKey>) -> Self {
        Self {
            token: token.into(),
            display_name: None,
        }
    }

    pub fn named(token: impl Into<ChannelKey>, name: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            display_name: Some(name.into()),
        }
    }
}

/// A persisted chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Seconds since epoch
    pub timestamp: i64,
    pub actor_id: String,
    pub actor_display_name: Option<String>,
    pub message: String,
}

impl StoredMessage {
    pub fn new(timestamp: i64, actor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            actor_id: actor_id.into(),
            actor_display_name: None,
            message: message.into(),
        }
    }

    /// Converts into the same chat event the push path would produce.
    pub fn to_event(&self, conversation: &Conversation) -> Event {
        let payload = serde_json::json!({
            "roomId": conversation.token.as_str(),
            "message": self.message,
            "actorId": self.actor_id,
            "timestamp": self.timestamp,
        });

        let mut builder = Event::builder(EventKind::ChatMessage, self.timestamp)
            .channel(conversation.token.clone())
            .sender_id(self.actor_id.clone())
            .payload(payload);
        if let Some(name) = &self.actor_display_name {
            builder = builder.sender_name(name.clone());
        }
        if let Some(name) = &conversation.display_name {
            builder = builder.channel_name(name.clone());
        }
        builder.build()
    }
}

/// Read access to the on-device message store.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// All conversations known for `user`.
    async fn conversations(&self, user: &User) -> Result<Vec<Conversation>, StorageError>;

    /// Most recent stored message in `channel`, or `None` if it has none.
    async fn latest_message(
        &self,
        user: &User,
        channel: &ChannelKey,
    ) -> Result<Option<StoredMessage>, StorageError>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct Room {
    conversation: Option<Conversation>,
    messages: Vec<StoredMessage>,
}

/// In-memory [`ConversationStore`], keyed by local user id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<i64, BTreeMap<ChannelKey, Room>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or renames) a conversation for `user`.
    pub async fn add_conversation(&self, user: &User, conversation: Conversation) {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(user.id)
            .or_default()
            .entry(conversation.token.clone())
            .or_default();
        room.conversation = Some(conversation);
    }

    /// Appends a message, creating the conversation if needed.
    pub async fn push_message(&self, user: &User, channel: &ChannelKey, message: StoredMessage) {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(user.id)
            .or_default()
            .entry(channel.clone())
            .or_default();
        if room.conversation.is_none() {
            room.conversation = Some(Conversation::new(channel.clone()));
        }
        room.messages.push(message);
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn conversations(&self, user: &User) -> Result<Vec<Conversation>, StorageError> {
        let rooms = self.rooms.read().await;
        Ok(rooms
            .get(&user.id)
            .map(|by_channel| {
                by_channel
                    .values()
                    .filter_map(|room| room.conversation.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_message(
        &self,
        user: &User,
        channel: &ChannelKey,
    ) -> Result<Option<StoredMessage>, StorageError> {
        let rooms = self.rooms.read().await;
        let room = rooms
            .get(&user.id)
            .and_then(|by_channel| by_channel.get(channel))
            .ok_or_else(|| StorageError::ChannelNotFound(channel.clone()))?;

        Ok(room.messages.iter().max_by_key(|m| m.timestamp).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_latest_message_picks_newest() {
        let store = MemoryStore::new();
        let user = User::new(1, "alice");
        let r1 = ChannelKey::new("r1");

        store.push_message(&user, &r1, StoredMessage::new(200, "bob", "second")).await;
        store.push_message(&user, &r1, StoredMessage::new(100, "bob", "first")).await;

        let latest = store.latest_message(&user, &r1).await.unwrap().unwrap();
        assert_eq!(latest.timestamp, 200);
        assert_eq!(latest.message, "second");
    }

    #[tokio::test]
    async fn test_empty_conversation_has_no_latest() {
        let store = MemoryStore::new();
        let user = User::new(1, "alice");
        store.add_conversation(&user, Conversation::named("r1", "Team")).await;

        let convs = store.conversations(&user).await.unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0].display_name.as_deref(), Some("Team"));

        let latest = store.latest_message(&user, &ChannelKey::new("r1")).await.unwrap();
        assert!(latest.is_none());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_an_error() {
        let store = MemoryStore::new();
        let user = User::new(1, "alice");
        let err = store
            .latest_message(&user, &ChannelKey::new("missing"))
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::ChannelNotFound(ChannelKey::new("missing")));
    }

    #[tokio::test]
    async fn test_conversations_are_per_user() {
        let store = MemoryStore::new();
        let alice = User::new(1, "alice");
        let carol = User::new(2, "carol");
        store.add_conversation(&alice, Conversation::new("r1")).await;

        assert_eq!(store.conversations(&alice).await.unwrap().len(), 1);
        assert!(store.conversations(&carol).await.unwrap().is_empty());
    }

    #[test]
    fn test_stored_message_to_event() {
        let mut message = StoredMessage::new(100, "bob", "hi");
        message.actor_display_name = Some("Bob".to_string());
        let event = message.to_event(&Conversation::named("r1", "Team"));

        assert_eq!(event.kind(), &EventKind::ChatMessage);
        assert_eq!(event.channel(), Some(&ChannelKey::new("r1")));
        assert_eq!(event.sender_id(), Some("bob"));
        assert_eq!(event.sender_name(), Some("Bob"));
        assert_eq!(event.channel_name(), Some("Team"));
        assert_eq!(event.timestamp(), 100);
        assert_eq!(event.message_text(), Some("hi"));
    }
}
