//! The local user and the provider collaborator that supplies it.

use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};

/// The signed-in local user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Local account id
    pub id: i64,
    /// Server-side user id, compared against event sender ids
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: i64, user_id: impl Into<String>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Returns true if `sender_id` is this user.
    ///
    /// Server ids are case-insensitive.
    pub fn is_own(&self, sender_id: &str) -> bool {
        !sender_id.is_empty() && self.user_id.eq_ignore_ascii_case(sender_id)
    }
}

/// Supplies the current user, if one is signed in.
pub trait UserProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;
}

/// A provider backed by a settable slot.
#[derive(Debug, Default)]
pub struct StaticUserProvider {
    user: RwLock<Option<User>>,
}

impl StaticUserProvider {
    pub fn new(user: Option<User>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    /// Replaces the current user (`None` signs out).
    ///
    /// A poisoned slot is recovered; the stored value is always replaced.
    pub fn set(&self, user: Option<User>) {
        *self.user.write().unwrap_or_else(PoisonError::into_inner) = user;
    }
}

impl UserProvider for StaticUserProvider {
    fn current_user(&self) -> Option<User> {
        self.user
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
