//! The storage contract shared by every backend.
//!
//! Backends implement the fallible primitives of [`Storage`]. Everything the
//! rest of the SDK calls (`get_raw`, `set_raw`, `remove`, `synchronize` and the
//! typed helpers on [`StorageExt`]) is infallible: failures are logged and
//! degrade to absence or a dropped write, so persistence problems never take
//! the host application down.

use std::fmt;
use std::time::Duration;

use backon::{BlockingRetryable, ConstantBuilder};
use serde::{de::DeserializeOwned, Serialize};

use super::error::StorageResult;

/// Physical storage engine behind a [`Storage`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Per-value preferences store.
    Simple,
    /// Memory-mapped, multi-process append log.
    Mapped,
}

/// Byte-level key-value storage inside one namespace.
pub trait Storage: Send + Sync + fmt::Debug {
    /// Which engine this handle writes to.
    fn backend(&self) -> Backend;

    /// Identifies the physical location of the data. Two handles with the
    /// same location read and write the same bytes.
    fn location(&self) -> String;

    /// Reads the bytes stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn store(&self, key: &str, bytes: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn erase(&self, key: &str) -> StorageResult<()>;

    /// Makes previous writes durable and pulls in writes made by other
    /// handles over the same files.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;

    /// Returns the raw bytes under `key`, or `None` when absent or unreadable.
    fn get_raw(&self, key: &str) -> Option<Vec<u8>> {
        match self.load(key) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::warn!("read of '{key}' from {} failed: {err}", self.location());
                None
            }
        }
    }

    /// Writes raw bytes under `key`. Failures are logged and dropped.
    fn set_raw(&self, key: &str, bytes: &[u8]) {
        if let Err(err) = self.store(key, bytes) {
            log::warn!("write of '{key}' to {} dropped: {err}", self.location());
        }
    }

    /// Removes `key`; a no-op when it is absent.
    fn remove(&self, key: &str) {
        if let Err(err) = self.erase(key) {
            log::warn!("removal of '{key}' from {} failed: {err}", self.location());
        }
    }

    /// Forces a durable flush of this handle.
    fn synchronize(&self) {
        if let Err(err) = self.flush() {
            log::warn!("synchronize of {} failed: {err}", self.location());
        }
    }
}

/// Marker for a value that was not visible on the first read.
#[derive(Debug)]
struct NotYetVisible;

/// Typed access on top of [`Storage`]. Values are stored as JSON.
pub trait StorageExt: Storage {
    /// Serializes `value` under `key`, or removes `key` when `value` is `None`.
    ///
    /// A value that cannot be serialized is dropped and logged.
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: Option<&T>) {
        let Some(value) = value else {
            self.remove(key);
            return;
        };
        match serde_json::to_vec(value) {
            Ok(bytes) => self.set_raw(key, &bytes),
            Err(err) => log::debug!("dropping write of '{key}': {err}"),
        }
    }

    /// Deserializes the value under `key`.
    ///
    /// Returns `None` when the key is missing or the stored bytes do not decode
    /// as `T`; schema drift reads as absence.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.get_raw(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                log::debug!("value under '{key}' does not decode: {err}");
                None
            }
        }
    }

    /// Reads `key`, and on a miss synchronizes, waits `retry_delay` and reads
    /// once more before returning `fallback`.
    ///
    /// Covers a write another process synchronized moments before this handle
    /// was opened. This is a single retry; do not call it in a loop.
    fn get_with_retry<T: DeserializeOwned>(
        &self,
        key: &str,
        fallback: T,
        retry_delay: Duration,
    ) -> T {
        let backoff = ConstantBuilder::default()
            .with_delay(retry_delay)
            .with_max_times(1);

        let found = (|| self.get::<T>(key).ok_or(NotYetVisible))
            .retry(backoff)
            .sleep(std::thread::sleep)
            .notify(|_: &NotYetVisible, _: Duration| {
                log::debug!("'{key}' not visible yet, synchronizing before retry");
                self.synchronize();
            })
            .call();

        match found {
            Ok(value) => {
                log::info!("retrieved '{key}' from storage");
                value
            }
            Err(NotYetVisible) => {
                log::info!("'{key}' missing after retry, using fallback");
                fallback
            }
        }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
