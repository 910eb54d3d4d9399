//! Error taxonomy shared across the push, poll and fan-out paths.
//!
//! None of these are fatal: connect failures feed the backoff loop, parse
//! failures drop a single frame, storage failures skip a single channel.

use std::time::Duration;
use thiserror::Error;

use crate::ChannelKey;

/// Opening a transport session failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Endpoint string could not be used
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// Network or websocket handshake failure
    #[error("connect failed: {0}")]
    Handshake(String),

    /// No connection within the connect timeout
    #[error("connect timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connected, but the hello frame could not be sent
    #[error("hello failed: {0}")]
    Hello(String),
}

/// An inbound frame could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid json: {0}")]
    InvalidJson(String),

    #[error("frame is not a json object")]
    NotAnObject,

    #[error("frame has no string type")]
    MissingType,

    /// A required field of a known frame type is absent or mistyped
    #[error("{frame} frame missing {field}")]
    MissingField {
        frame: &'static str,
        field: &'static str,
    },
}

/// Send attempted with no live connection.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("not connected")]
pub struct NotConnected;

/// Reading conversations or messages from local storage failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(ChannelKey),

    #[error("storage read failed: {0}")]
    Read(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_lowercase() {
        assert_eq!(
            ConnectError::Timeout(Duration::from_secs(15)).to_string(),
            "connect timed out after 15s"
        );
        assert_eq!(
            ParseError::MissingField {
                frame: "message",
                field: "roomId"
            }
            .to_string(),
            "message frame missing roomId"
        );
        assert_eq!(NotConnected.to_string(), "not connected");
        assert_eq!(
            StorageError::ChannelNotFound(ChannelKey::new("r1")).to_string(),
            "channel not found: r1"
        );
    }
}
