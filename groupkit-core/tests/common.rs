//! Common test utilities shared across integration tests.

#![allow(missing_docs)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use groupkit_core::storage::mapped::{MappedOptions, MappedStore};
use groupkit_core::storage::paths::StoragePaths;
use groupkit_core::storage::{
    AtomicBlobStore, FsContainerProvider, GroupContainerProvider, Storage, StorageConfig,
    StorageFacade, StorageKey,
};
use uuid::Uuid;

#[allow(dead_code, reason = "used in tests")]
pub const APP_ID: &str = "com.example.app";
#[allow(dead_code, reason = "used in tests")]
pub const PROJECT_ID: &str = "proj";

#[allow(dead_code, reason = "used in tests")]
pub fn temp_root() -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("groupkit-test-{}", Uuid::new_v4()));
    path
}

/// A fake device: a directory of group containers plus a private directory.
#[allow(dead_code, reason = "used in tests")]
pub struct TestDevice {
    pub root: PathBuf,
    pub provider: Arc<FsContainerProvider>,
}

impl TestDevice {
    #[allow(dead_code, reason = "used in tests")]
    pub fn new() -> Self {
        let root = temp_root();
        let provider = Arc::new(FsContainerProvider::new(
            root.join("groups"),
            root.join("local"),
        ));
        Self { root, provider }
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn with_provider(root: PathBuf, provider: FsContainerProvider) -> Self {
        Self {
            root,
            provider: Arc::new(provider),
        }
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn local_dir(&self) -> PathBuf {
        self.root.join("local")
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn group_id(seed: &str) -> String {
        StorageConfig::default().group_id(seed)
    }

    /// Creates the container for the group derived from `seed`.
    #[allow(dead_code, reason = "used in tests")]
    pub fn entitle(&self, seed: &str) -> PathBuf {
        self.provider
            .create_group(&Self::group_id(seed))
            .expect("create group")
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn facade(&self) -> StorageFacade {
        StorageFacade::new(self.provider.clone(), StorageConfig::default()).expect("facade")
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn open(&self) -> Arc<dyn Storage> {
        self.facade().open(APP_ID, PROJECT_ID).expect("open storage")
    }

    /// Preferences suite of the group derived from `seed`.
    #[allow(dead_code, reason = "used in tests")]
    pub fn preferences(&self, seed: &str) -> Arc<dyn AtomicBlobStore> {
        self.provider.preferences(Some(Self::group_id(seed)))
    }

    #[allow(dead_code, reason = "used in tests")]
    pub fn standard_preferences(&self) -> Arc<dyn AtomicBlobStore> {
        self.provider.preferences(None)
    }

    /// Mapped store the given container would hold for [`PROJECT_ID`].
    #[allow(dead_code, reason = "used in tests")]
    pub fn mapped_in(&self, container: &Path) -> MappedStore {
        MappedStore::open(
            &StoragePaths::new(container).kvlog_dir(),
            &StorageConfig::default().store_id(PROJECT_ID),
            MappedOptions::default(),
        )
        .expect("open mapped store")
    }
}

impl Drop for TestDevice {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// Writes a JSON-encoded value straight into a preferences suite.
#[allow(dead_code, reason = "used in tests")]
pub fn seed(blobs: &dyn AtomicBlobStore, key: StorageKey, json: &str) {
    blobs
        .write_atomic(key.as_str().to_string(), json.as_bytes().to_vec())
        .expect("seed preferences");
}

/// Raw contents of every registry key, including the flag.
#[allow(dead_code, reason = "used in tests")]
pub fn snapshot(storage: &dyn Storage) -> Vec<(String, Option<Vec<u8>>)> {
    use strum::IntoEnumIterator;
    StorageKey::iter()
        .map(|key| (key.as_str().to_string(), storage.get_raw(key.as_str())))
        .collect()
}
