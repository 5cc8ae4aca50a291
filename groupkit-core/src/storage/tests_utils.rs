//! Test helpers for group storage.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::contract::{Backend, Storage};
use super::error::{StorageError, StorageResult};
use super::traits::AtomicBlobStore;

/// Blob store kept in memory.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AtomicBlobStore for InMemoryBlobStore {
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>> {
        let guard = self
            .blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?;
        Ok(guard.get(&name).cloned())
    }

    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> StorageResult<()> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?
            .insert(name, bytes);
        Ok(())
    }

    fn delete(&self, name: String) -> StorageResult<()> {
        self.blobs
            .lock()
            .map_err(|_| StorageError::BlobStore("mutex poisoned".to_string()))?
            .remove(&name);
        Ok(())
    }
}

/// Ordered record of erases and flushes across several [`MemoryStorage`]s.
pub type Journal = Arc<Mutex<Vec<String>>>;

/// In-memory [`Storage`] that records flushes and can be told to fail.
#[derive(Debug)]
pub struct MemoryStorage {
    location: String,
    entries: Mutex<HashMap<String, Vec<u8>>>,
    flushes: Mutex<usize>,
    failing: bool,
    journal: Option<Journal>,
}

impl MemoryStorage {
    pub fn new(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: location.to_string(),
            entries: Mutex::new(HashMap::new()),
            flushes: Mutex::new(0),
            failing: false,
            journal: None,
        })
    }

    pub fn failing(location: &str) -> Arc<Self> {
        Arc::new(Self {
            location: location.to_string(),
            entries: Mutex::new(HashMap::new()),
            flushes: Mutex::new(0),
            failing: true,
            journal: None,
        })
    }

    pub fn with(location: &str, entries: &[(&str, &str)]) -> Arc<Self> {
        let storage = Self::new(location);
        for (key, value) in entries {
            storage.set_raw(key, value.as_bytes());
        }
        storage
    }

    /// Like [`MemoryStorage::with`], appending `erase <location> <key>` and
    /// `flush <location>` to `journal`.
    pub fn journaled(location: &str, entries: &[(&str, &str)], journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            location: location.to_string(),
            entries: Mutex::new(
                entries
                    .iter()
                    .map(|(key, value)| ((*key).to_string(), value.as_bytes().to_vec()))
                    .collect(),
            ),
            flushes: Mutex::new(0),
            failing: false,
            journal: Some(Arc::clone(journal)),
        })
    }

    pub fn flush_count(&self) -> usize {
        *self.flushes.lock().expect("flush counter")
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("entries").len()
    }

    fn note(&self, event: String) {
        if let Some(journal) = &self.journal {
            journal.lock().expect("journal").push(event);
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing {
            Err(StorageError::Io {
                context: self.location.clone(),
                message: "injected failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl Storage for MemoryStorage {
    fn backend(&self) -> Backend {
        Backend::Mapped
    }

    fn location(&self) -> String {
        self.location.clone()
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check()?;
        Ok(self.entries.lock().expect("entries").get(key).cloned())
    }

    fn store(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.check()?;
        self.entries
            .lock()
            .expect("entries")
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn erase(&self, key: &str) -> StorageResult<()> {
        self.check()?;
        self.note(format!("erase {} {key}", self.location));
        self.entries.lock().expect("entries").remove(key);
        Ok(())
    }

    fn flush(&self) -> StorageResult<()> {
        *self.flushes.lock().expect("flush counter") += 1;
        self.note(format!("flush {}", self.location));
        self.check()
    }
}
