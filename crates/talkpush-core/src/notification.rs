//! User-visible notifications and the presentation sink collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ChannelKey, ChatMessage};

/// What a notification announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Message,
    Call,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message => write!(f, "message"),
            Self::Call => write!(f, "call"),
        }
    }
}

/// A rendered notification, ready for the platform layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub channel: ChannelKey,
    pub title: String,
    pub body: String,
    pub subtitle: Option<String>,
    pub kind: NotificationKind,
}

impl Notification {
    /// Sender as title, text as body, room name as subtitle.
    pub fn for_chat(message: &ChatMessage) -> Self {
        Self {
            channel: message.room_token.clone(),
            title: message.sender_name.clone(),
            body: message.text().to_string(),
            subtitle: Some(message.room_name.clone()),
            kind: NotificationKind::Message,
        }
    }

    pub fn for_call(channel: &ChannelKey, channel_name: &str) -> Self {
        Self {
            channel: channel.clone(),
            title: "Incoming call".to_string(),
            body: format!("Incoming call in {channel_name}"),
            subtitle: None,
            kind: NotificationKind::Call,
        }
    }
}

/// Presents notifications to the user.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn present(&self, notification: Notification);
}

/// Sink that writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl NotificationSink for TracingSink {
    async fn present(&self, notification: Notification) {
        tracing::info!(
            channel = %notification.channel,
            kind = %notification.kind,
            title = %notification.title,
            subtitle = notification.subtitle.as_deref().unwrap_or(""),
            "{}",
            notification.body
        );
    }
}
