//! talkpushd - push-channel notification service
//!
//! Keeps an authenticated push connection alive and turns inbound events into
//! de-duplicated notifications for any number of local consumers:
//! - `transport` - one websocket session: hello on open, frames in and out
//! - `supervisor` - reconnection with linear-capped backoff
//! - `router` - frames to typed events to the coordinator
//! - `coordinator` - per-channel dedup and fan-out actor
//! - `poller` - storage polling fallback feeding the same coordinator
//! - `notifier` - consumer presenting notifications
//! - `service` - wiring for one user
//!
//! # Panic-Free Guarantees
//!
//! Production code has no `.unwrap()`, `.expect()`, `panic!()` or
//! `unreachable!()`. Channel closure is reported as an error, never a panic.

pub mod config;
pub mod coordinator;
pub mod notifier;
pub mod poller;
pub mod router;
pub mod service;
pub mod supervisor;
pub mod transport;

pub use config::{Config, ConfigError};
pub use coordinator::{spawn_coordinator, CoordinatorHandle, SubmitOutcome};
pub use service::{NotificationService, ServiceDeps, ServiceError};
pub use supervisor::{spawn_supervisor, ConnectionState, ConnectionStatus, SupervisorHandle};
