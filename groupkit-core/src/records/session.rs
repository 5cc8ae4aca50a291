//! Session tracking shared between the app and its extensions.
//!
//! A session continues while activity keeps arriving within the timeout,
//! whichever process records it. Timestamps are milliseconds since the Unix
//! epoch and are supplied by the caller.

use std::sync::Arc;

use crate::storage::{Storage, StorageExt, StorageKey};

/// Lower bound on the session timeout.
pub const MIN_SESSION_TIMEOUT_MS: u64 = 5_000;

/// Result of [`SessionTracker::resume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Last activity was within the timeout.
    Continued,
    /// No recent activity; a new session begins.
    Started,
}

/// Tracks the last foreground activity to split usage into sessions.
///
/// The timestamp lives in group storage, so the app and its extensions agree
/// on session boundaries.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    storage: Arc<dyn Storage>,
    timeout_ms: u64,
}

impl SessionTracker {
    /// Creates a tracker. `timeout_ms` is raised to
    /// [`MIN_SESSION_TIMEOUT_MS`] if lower.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, timeout_ms: u64) -> Self {
        Self {
            storage,
            timeout_ms: timeout_ms.max(MIN_SESSION_TIMEOUT_MS),
        }
    }

    /// Effective timeout.
    #[must_use]
    pub const fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    /// Epoch milliseconds of the last recorded activity.
    #[must_use]
    pub fn last_activity(&self) -> Option<u64> {
        self.storage.get(StorageKey::SessionLastActivity.as_str())
    }

    /// Records activity at `now_ms`.
    pub fn touch(&self, now_ms: u64) {
        self.storage
            .set(StorageKey::SessionLastActivity.as_str(), Some(&now_ms));
    }

    /// Continues the current session if the last activity is recent enough,
    /// otherwise starts a new one. Records `now_ms` either way.
    pub fn resume(&self, now_ms: u64) -> SessionState {
        let state = match self.last_activity() {
            Some(last) if now_ms.saturating_sub(last) <= self.timeout_ms => {
                SessionState::Continued
            }
            _ => SessionState::Started,
        };
        self.touch(now_ms);
        log::debug!("session {state:?} at {now_ms}");
        state
    }
}
