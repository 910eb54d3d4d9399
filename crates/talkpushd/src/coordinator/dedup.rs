//! Per-channel last-accepted timestamps.

use std::collections::HashMap;
use std::time::Duration;

use talkpush_core::ChannelKey;

use super::commands::{RejectReason, SubmitOutcome};

/// Dedup state: channel key to the newest accepted timestamp.
///
/// Pure: the caller supplies `now`, so decisions are deterministic.
#[derive(Debug)]
pub struct DedupTable {
    entries: HashMap<ChannelKey, i64>,
    recent_window: i64,
}

impl DedupTable {
    pub fn new(recent_window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            recent_window: secs(recent_window),
        }
    }

    /// Accepts if strictly newer than the last accepted timestamp or younger
    /// than the recent window. The stored timestamp never decreases.
    pub fn submit(&mut self, channel: &ChannelKey, timestamp: i64, now: i64) -> SubmitOutcome {
        let last = self.entries.get(channel).copied().unwrap_or(0);
        let is_recent = now.saturating_sub(timestamp) < self.recent_window;

        if timestamp > last || is_recent {
            self.entries.insert(channel.clone(), last.max(timestamp));
            SubmitOutcome::Accepted {
                suppress_notify: last == 0,
            }
        } else {
            SubmitOutcome::Rejected(RejectReason::Duplicate)
        }
    }

    pub fn last_accepted(&self, channel: &ChannelKey) -> Option<i64> {
        self.entries.get(channel).copied()
    }

    /// Removes entries whose last accepted timestamp is older than `max_age`.
    /// Returns the number removed.
    pub fn cleanup(&mut self, max_age: Duration, now: i64) -> usize {
        let max_age = secs(max_age);
        let before = self.entries.len();
        self.entries
            .retain(|_, last| now.saturating_sub(*last) <= max_age);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}
