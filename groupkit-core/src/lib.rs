#![deny(clippy::all, clippy::pedantic, clippy::nursery)]

//! Durable key-value storage shared between an app and its extensions.
//!
//! The host app and its extension processes open the same storage through
//! [`storage::StorageFacade`]; data written under older storage layouts is
//! moved into the current one on first open.

pub mod logger;
pub mod records;
pub mod storage;

pub use storage::{GroupStorage, Storage, StorageConfig, StorageError, StorageExt, StorageFacade};

uniffi::setup_scaffolding!("groupkit_core");
