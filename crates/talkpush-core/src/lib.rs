//! talkpush core - shared domain types
//!
//! Channel keys, inbound events, fan-out deliveries and the error taxonomy,
//! plus the traits for the collaborators the notification service consumes
//! (current user, conversation storage, notification presentation).
//!
//! Non-test code is panic-free: no `.unwrap()`, `.expect()` or direct
//! indexing.

pub mod channel;
pub mod delivery;
pub mod error;
pub mod event;
pub mod notification;
pub mod store;
pub mod user;

pub use channel::{ChannelKey, ConsumerId};
pub use delivery::{
    ChatMessage, Delivery, Registration, DEFAULT_MESSAGE_TEXT, DEFAULT_ROOM_NAME,
    DEFAULT_SENDER_NAME,
};
pub use error::{ConnectError, NotConnected, ParseError, StorageError};
pub use event::{unix_now, Event, EventBuilder, EventKind, CALL_EVENT};
pub use notification::{Notification, NotificationKind, NotificationSink, TracingSink};
pub use store::{Conversation, ConversationStore, MemoryStore, StoredMessage};
pub use user::{StaticUserProvider, User, UserProvider};
