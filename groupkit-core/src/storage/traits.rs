//! Platform interfaces for group storage.

use std::sync::Arc;

use super::error::StorageResult;

/// Atomic blob store backing the simple preferences backend.
///
/// Each blob holds the serialized value of one key. Hosts can hand in their
/// platform preferences mechanism here; [`FsBlobStore`](super::FsBlobStore) is
/// the native filesystem implementation.
#[uniffi::export(with_foreign)]
pub trait AtomicBlobStore: Send + Sync {
    /// Reads the blob at `name`, if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>>;

    /// Writes bytes atomically to `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> StorageResult<()>;

    /// Deletes the blob at `name`. Deleting a missing blob succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    fn delete(&self, name: String) -> StorageResult<()>;
}

/// Provider of the shared containers and bundle metadata of the host.
#[uniffi::export(with_foreign)]
pub trait GroupContainerProvider: Send + Sync {
    /// Returns the directory of the shared container for `group_id`, or
    /// `None` when the host is not entitled to that group.
    fn container_path(&self, group_id: String) -> Option<String>;

    /// Returns the private, per-install directory of this process.
    fn local_path(&self) -> String;

    /// Returns the preferences store for `suite`, or the process-local default
    /// suite when `suite` is `None`.
    fn preferences(&self, suite: Option<String>) -> Arc<dyn AtomicBlobStore>;

    /// Returns the path of the bundle running this process.
    fn main_bundle_path(&self) -> String;

    /// Reads the identifier of the bundle at `bundle_path`.
    fn bundle_identifier(&self, bundle_path: String) -> Option<String>;
}
