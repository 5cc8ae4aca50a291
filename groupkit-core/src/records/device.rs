//! Stable per-install device identifier.

use std::sync::Arc;

use uuid::Uuid;

use crate::storage::{Storage, StorageExt, StorageKey};

/// Stable identifier of this install.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    storage: Arc<dyn Storage>,
}

impl DeviceIdentity {
    /// Creates the helper over `storage`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Returns the stored device id, generating and persisting a new one on
    /// first use.
    #[must_use]
    pub fn current_device_id(&self) -> String {
        let key = StorageKey::DeviceId.as_str();
        if let Some(id) = self.storage.get::<String>(key) {
            return id;
        }
        let id = Uuid::new_v4().to_string();
        self.storage.set(key, Some(id.as_str()));
        self.storage.synchronize();
        log::info!("generated new device id");
        id
    }
}
