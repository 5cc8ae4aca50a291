//! Registry of every key the storage layer persists.
//!
//! Migration only moves keys listed here. A value written under any other key
//! stays behind when data is relocated to a new namespace or backend, so new
//! persisted values must be added to [`StorageKey`] first.

use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Keys known to the storage layer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumIter,
    EnumString,
    IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum StorageKey {
    /// Cached SDK configuration record.
    Config,
    /// Stable device identifier.
    DeviceId,
    /// Most recently registered push token.
    CurrentPushToken,
    /// Bounded history of push tokens.
    PreviousPushTokens,
    /// Notification permission/settings snapshot.
    NotificationSettings,
    /// Identifier of the last message handled by the notification extension.
    LastReceivedMessageId,
    /// Epoch milliseconds of the last foreground activity.
    SessionLastActivity,
    /// Namespace migration completion flag. Never migrated itself.
    StorageMigrated,
}

impl StorageKey {
    /// Returns the persisted key string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Returns every key that migrations must carry across backends and
    /// namespaces, in declaration order.
    #[must_use]
    pub fn migratable() -> Vec<Self> {
        Self::iter()
            .filter(|key| *key != Self::StorageMigrated)
            .collect()
    }
}
