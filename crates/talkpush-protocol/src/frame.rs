//! Outbound frames.

use serde::{Deserialize, Serialize};

use crate::version::ProtocolVersion;

/// Credentials sent in the hello frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    pub hash_key: String,
    pub block_key: String,
    pub backend: String,
    pub secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    pub version: ProtocolVersion,
    pub auth: AuthParams,
}

/// Body of a `message` frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub room_id: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Frames the client sends to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Authentication, always the first frame of a connection
    Hello { hello: Hello },

    /// Chat message posted to a room
    Message { message: MessageBody },
}

impl ClientFrame {
    /// Hello frame at the current protocol version.
    pub fn hello(auth: AuthParams) -> Self {
        Self::Hello {
            hello: Hello {
                version: ProtocolVersion::CURRENT,
                auth,
            },
        }
    }

    pub fn message(room_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            message: MessageBody {
                room_id: room_id.into(),
                message: text.into(),
                actor_id: None,
                timestamp: None,
            },
        }
    }

    /// Sets the author and timestamp of a message frame; no-op for hello.
    pub fn from_actor(mut self, actor_id: impl Into<String>, timestamp: i64) -> Self {
        if let Self::Message { message } = &mut self {
            message.actor_id = Some(actor_id.into());
            message.timestamp = Some(timestamp);
        }
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
