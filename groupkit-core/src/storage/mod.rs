//! Group-shared key-value storage.
//!
//! [`StorageFacade`] resolves the shared container for the process, migrates
//! data left by older releases, and returns a [`Storage`] handle backed by the
//! mapped log. [`SimpleStore`] is the per-value preferences backend older
//! releases wrote to; it is still read during migration.

pub mod app_identity;
pub mod config;
pub mod contract;
pub mod error;
pub mod facade;
pub mod fs;
pub mod group_storage;
pub mod keys;
pub mod lock;
pub mod mapped;
pub mod migration;
pub mod namespace;
pub mod paths;
pub mod simple;
pub mod traits;

#[cfg(test)]
pub(crate) mod tests_utils;

pub use config::StorageConfig;
pub use contract::{Backend, Storage, StorageExt};
pub use error::{StorageError, StorageResult};
pub use facade::StorageFacade;
pub use fs::{FsBlobStore, FsContainerProvider};
pub use group_storage::GroupStorage;
pub use keys::StorageKey;
pub use mapped::MappedStore;
pub use namespace::{Generation, ResolvedNamespace};
pub use simple::SimpleStore;
pub use traits::{AtomicBlobStore, GroupContainerProvider};
