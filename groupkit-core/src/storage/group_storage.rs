//! Foreign-facing storage handle.

use std::sync::Arc;
use std::time::Duration;

use super::config::StorageConfig;
use super::contract::{Storage, StorageExt};
use super::error::StorageResult;
use super::facade::StorageFacade;
use super::traits::GroupContainerProvider;

/// Group storage exposed over FFI.
///
/// String values are stored JSON-encoded, matching what the typed Rust API
/// writes, so both sides can read each other's values.
#[derive(Debug, uniffi::Object)]
pub struct GroupStorage {
    storage: Arc<dyn Storage>,
    retry_delay: Duration,
}

impl GroupStorage {
    /// Wraps an already opened storage.
    #[must_use]
    pub fn from_storage(storage: Arc<dyn Storage>, retry_delay: Duration) -> Self {
        Self {
            storage,
            retry_delay,
        }
    }

    /// Underlying storage, for the record helpers.
    #[must_use]
    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.storage)
    }
}

#[uniffi::export]
impl GroupStorage {
    /// Opens storage for the current process, migrating legacy data first.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or no backend can be opened.
    #[uniffi::constructor]
    pub fn open(
        provider: Arc<dyn GroupContainerProvider>,
        legacy_project_id: String,
        config: StorageConfig,
    ) -> StorageResult<Arc<Self>> {
        let retry_delay = config.retry_delay();
        let storage =
            StorageFacade::new(provider, config)?.open_for_current_process(&legacy_project_id)?;
        Ok(Arc::new(Self::from_storage(storage, retry_delay)))
    }

    /// Raw bytes under `key`.
    #[must_use]
    pub fn get_bytes(&self, key: String) -> Option<Vec<u8>> {
        self.storage.get_raw(&key)
    }

    /// Stores raw bytes under `key`.
    pub fn set_bytes(&self, key: String, bytes: Vec<u8>) {
        self.storage.set_raw(&key, &bytes);
    }

    /// String under `key`; `None` when missing or not a string.
    #[must_use]
    pub fn get_string(&self, key: String) -> Option<String> {
        self.storage.get(&key)
    }

    /// Stores `value` under `key`, or removes the key when `value` is `None`.
    pub fn set_string(&self, key: String, value: Option<String>) {
        self.storage.set(&key, value.as_deref());
    }

    /// Removes `key`.
    pub fn remove(&self, key: String) {
        self.storage.remove(&key);
    }

    /// Flushes writes and pulls in writes from other processes.
    pub fn synchronize(&self) {
        self.storage.synchronize();
    }

    /// Like [`GroupStorage::get_string`], retrying once after the configured
    /// delay before returning `fallback`.
    #[must_use]
    pub fn get_string_with_retry(&self, key: String, fallback: String) -> String {
        self.storage
            .get_with_retry(&key, fallback, self.retry_delay)
    }
}
