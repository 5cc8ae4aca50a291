//! Preferences-backed storage.
//!
//! One blob per key in an [`AtomicBlobStore`]. There is nothing to flush:
//! every write is already durable when `write_atomic` returns.

use std::fmt;
use std::sync::Arc;

use super::contract::{Backend, Storage};
use super::error::StorageResult;
use super::traits::AtomicBlobStore;

const ENCODED_PREFIX: &str = "x-";

/// Simple backend over a preferences blob store.
#[derive(Clone)]
pub struct SimpleStore {
    suite: String,
    blobs: Arc<dyn AtomicBlobStore>,
}

impl SimpleStore {
    /// Wraps `blobs`, labelled with the preferences `suite` it belongs to.
    #[must_use]
    pub fn new(suite: impl Into<String>, blobs: Arc<dyn AtomicBlobStore>) -> Self {
        Self {
            suite: suite.into(),
            blobs,
        }
    }

    /// Preferences suite label.
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }
}

/// Maps a key to a blob name that is safe on every filesystem.
fn blob_name(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with('.')
        && !key.starts_with(ENCODED_PREFIX)
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if plain {
        key.to_string()
    } else {
        format!("{ENCODED_PREFIX}{}", hex::encode(key))
    }
}

impl Storage for SimpleStore {
    fn backend(&self) -> Backend {
        Backend::Simple
    }

    fn location(&self) -> String {
        format!("simple:{}", self.suite)
    }

    fn load(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.blobs.read(blob_name(key))
    }

    fn store(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        self.blobs.write_atomic(blob_name(key), bytes.to_vec())
    }

    fn erase(&self, key: &str) -> StorageResult<()> {
        self.blobs.delete(blob_name(key))
    }

    fn flush(&self) -> StorageResult<()> {
        Ok(())
    }
}

impl fmt::Debug for SimpleStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleStore")
            .field("suite", &self.suite)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::storage::tests_utils::InMemoryBlobStore;
    use crate::storage::StorageExt;

    #[test_case("device_id", "device_id" ; "registry key")]
    #[test_case("a/b", "x-612f62" ; "slash")]
    #[test_case(".hidden", "x-2e68696464656e" ; "leading dot")]
    #[test_case("x-1", "x-782d31" ; "encoded prefix")]
    #[test_case("", "x-" ; "empty")]
    fn test_blob_name(key: &str, expected: &str) {
        assert_eq!(blob_name(key), expected);
    }

    #[test]
    fn test_round_trip_through_blobs() {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let store = SimpleStore::new("group.groupkit.app", blobs.clone());

        store.set("previous_push_tokens", Some(&vec!["a", "b"]));
        assert_eq!(
            store.get::<Vec<String>>("previous_push_tokens"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            blobs.read("previous_push_tokens".to_string()).expect("read"),
            Some(br#"["a","b"]"#.to_vec())
        );

        store.set::<String>("previous_push_tokens", None);
        assert_eq!(store.get_raw("previous_push_tokens"), None);
        assert_eq!(store.location(), "simple:group.groupkit.app");
    }

    #[test]
    fn test_decode_failure_reads_as_absent() {
        let store = SimpleStore::new("s", Arc::new(InMemoryBlobStore::new()));
        store.set_raw("session_last_activity", b"not json");
        assert_eq!(store.get::<i64>("session_last_activity"), None);
        assert!(store.get_raw("session_last_activity").is_some());
    }
}
