//! talkpush protocol - JSON frames for the push channel
//!
//! Outbound frames (`hello`, `message`) are typed serde structs. Inbound
//! frames are decoded by [`dispatch`] into a [`talkpush_core::Event`];
//! unknown frame types are kept as system events rather than dropped.

pub mod dispatch;
pub mod frame;
pub mod version;

pub use dispatch::{dispatch, dispatch_at};
pub use frame::{AuthParams, ClientFrame, Hello, MessageBody};
pub use version::{ProtocolVersion, VersionError};
