//! Push token cache.
//!
//! Keeps the current token plus a short, de-duplicated history so a rotated
//! token can still be unregistered server-side.

use std::sync::Arc;

use crate::storage::{Storage, StorageExt, StorageKey};

/// Number of push tokens kept in the history.
pub const MAX_TOKEN_HISTORY: usize = 5;

/// Current push token plus a short history of previous ones.
#[derive(Debug, Clone)]
pub struct TokenCache {
    storage: Arc<dyn Storage>,
}

impl TokenCache {
    /// Creates a cache over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Most recently saved token.
    #[must_use]
    pub fn current_token(&self) -> Option<String> {
        self.storage.get(StorageKey::CurrentPushToken.as_str())
    }

    /// Token history, oldest first. The current token is last.
    #[must_use]
    pub fn previous_tokens(&self) -> Vec<String> {
        self.storage
            .get(StorageKey::PreviousPushTokens.as_str())
            .unwrap_or_default()
    }

    /// Makes `token` current and moves it to the end of the history, which is
    /// capped at [`MAX_TOKEN_HISTORY`] entries.
    pub fn save_token(&self, token: &str) {
        self.storage
            .set(StorageKey::CurrentPushToken.as_str(), Some(token));

        let mut tokens = self.previous_tokens();
        tokens.retain(|existing| existing != token);
        tokens.push(token.to_string());
        if tokens.len() > MAX_TOKEN_HISTORY {
            tokens.drain(..tokens.len() - MAX_TOKEN_HISTORY);
        }
        self.storage
            .set(StorageKey::PreviousPushTokens.as_str(), Some(&tokens));
    }

    /// Forgets the current token and the history.
    pub fn clear(&self) {
        self.storage.remove(StorageKey::PreviousPushTokens.as_str());
        self.storage.remove(StorageKey::CurrentPushToken.as_str());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests_utils::MemoryStorage;

    #[test]
    fn test_history_is_deduplicated_and_capped() {
        let cache = TokenCache::new(MemoryStorage::new("tokens"));
        assert_eq!(cache.current_token(), None);
        assert!(cache.previous_tokens().is_empty());

        for token in ["t1", "t2", "t3", "t4", "t5", "t6", "t3"] {
            cache.save_token(token);
        }

        assert_eq!(cache.current_token().as_deref(), Some("t3"));
        assert_eq!(cache.previous_tokens(), vec!["t2", "t4", "t5", "t6", "t3"]);
    }

    #[test]
    fn test_clear() {
        let cache = TokenCache::new(MemoryStorage::new("tokens"));
        cache.save_token("t1");
        cache.clear();
        assert_eq!(cache.current_token(), None);
        assert!(cache.previous_tokens().is_empty());
    }
}
