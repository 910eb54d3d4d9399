//! Polling fallback.
//!
//! On a fixed interval, re-reads the latest stored message of every known
//! conversation and publishes it through the coordinator exactly as the push
//! path would. The coordinator's dedup decides whether anything is new, so a
//! message seen on both paths notifies once.
//!
//! The first poll runs immediately on start. A failing channel is logged and
//! skipped; the loop only ends on stop or when the coordinator is gone.

use std::sync::Arc;
use std::time::Duration;

use talkpush_core::{ConversationStore, StorageError, User, UserProvider};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordinatorError, CoordinatorHandle, RejectReason, SubmitOutcome};

/// Per-iteration counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub channels: usize,
    pub submitted: usize,
    pub accepted: usize,
    /// Accepted as a channel's first (baseline) event
    pub suppressed: usize,
    pub duplicates: usize,
    pub skipped_own: usize,
    /// Conversations with no stored message
    pub empty: usize,
    pub failed: usize,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    #[error("poll failed: {0}")]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
}

pub struct Poller {
    coordinator: CoordinatorHandle,
    users: Arc<dyn UserProvider>,
    store: Arc<dyn ConversationStore>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        coordinator: CoordinatorHandle,
        users: Arc<dyn UserProvider>,
        store: Arc<dyn ConversationStore>,
        interval: Duration,
    ) -> Self {
        Self {
            coordinator,
            users,
            store,
            interval,
        }
    }

    /// One pass over every conversation of `user`.
    pub async fn poll_once(&self, user: &User) -> Result<PollReport, PollError> {
        let conversations = self.store.conversations(user).await?;
        let mut report = PollReport {
            channels: conversations.len(),
            ..PollReport::default()
        };

        for conversation in &conversations {
            let latest = match self.store.latest_message(user, &conversation.token).await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    report.empty += 1;
                    continue;
                }
                Err(e) => {
                    warn!(channel = %conversation.token, error = %e, "Channel poll failed");
                    report.failed += 1;
                    continue;
                }
            };

            if user.is_own(&latest.actor_id) {
                report.skipped_own += 1;
                continue;
            }

            let event = Arc::new(latest.to_event(conversation));
            report.submitted += 1;
            match self.coordinator.publish(event).await? {
                SubmitOutcome::Accepted { suppress_notify } => {
                    report.accepted += 1;
                    if suppress_notify {
                        report.suppressed += 1;
                    }
                }
                SubmitOutcome::Rejected(RejectReason::Duplicate) => report.duplicates += 1,
                SubmitOutcome::Rejected(RejectReason::Unroutable) => report.failed += 1,
            }
        }

        Ok(report)
    }

    /// Starts polling until `cancel` fires or [`PollerHandle::stop`].
    pub fn spawn(self, cancel: CancellationToken) -> PollerHandle {
        let token = cancel.child_token();
        let task = tokio::spawn(self.run(token.clone()));
        PollerHandle { cancel: token, task }
    }

    async fn run(self, cancel: CancellationToken) {
        info!(interval_secs = self.interval.as_secs(), "Poller starting");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(user) = self.users.current_user() else {
                debug!("No current user, skipping poll");
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.poll_once(&user) => match result {
                    Ok(report) => debug!(?report, "Poll complete"),
                    Err(PollError::Storage(e)) => warn!(error = %e, "Poll failed"),
                    Err(PollError::Coordinator(_)) => {
                        info!("Poller stopping: coordinator closed");
                        break;
                    }
                },
            }
        }

        info!("Poller stopped");
    }
}

/// Running poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Cancels the interval sleep or in-flight fetch and waits for the loop
    /// to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        let _ = self.task.await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
