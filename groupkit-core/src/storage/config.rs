//! Storage configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{StorageError, StorageResult};
use super::mapped::{AccessMode, MappedOptions, DEFAULT_COMPACTION_THRESHOLD};

const DEFAULT_RETRY_DELAY_MS: u64 = 50;
const DEFAULT_GROUP_PREFIX: &str = "group.groupkit";
const DEFAULT_STORE_PREFIX: &str = "groupkit";

/// Tunables for opening group storage.
///
/// Every field has a default, so `{}` is a valid JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Delay before the single retry of `get_with_retry`, in milliseconds.
    pub retry_delay_ms: u64,
    /// Whether the mapped backend takes the cross-process file lock.
    pub multi_process: bool,
    /// Log size after which the mapped backend attempts compaction.
    pub compaction_threshold_bytes: u64,
    /// Whether namespace migration also drains the process-local default
    /// preferences suite.
    pub migrate_process_local: bool,
    /// Prefix of shared group identifiers.
    pub group_prefix: String,
    /// Prefix of mapped store identifiers.
    pub store_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            multi_process: true,
            compaction_threshold_bytes: DEFAULT_COMPACTION_THRESHOLD,
            migrate_process_local: true,
            group_prefix: DEFAULT_GROUP_PREFIX.to_string(),
            store_prefix: DEFAULT_STORE_PREFIX.to_string(),
        }
    }
}

impl StorageConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`] for malformed JSON or unknown
    /// fields and [`StorageError::InvalidConfig`] for empty prefixes.
    pub fn from_json(json: &str) -> StorageResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] when a prefix is empty.
    pub fn validate(&self) -> StorageResult<()> {
        if self.group_prefix.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "group_prefix must not be empty".to_string(),
            ));
        }
        if self.store_prefix.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "store_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Retry delay as a [`Duration`].
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Options for mapped stores opened with this config.
    #[must_use]
    pub const fn mapped_options(&self) -> MappedOptions {
        MappedOptions {
            mode: if self.multi_process {
                AccessMode::MultiProcess
            } else {
                AccessMode::SingleProcess
            },
            compaction_threshold: self.compaction_threshold_bytes,
        }
    }

    /// Shared group identifier for `seed`.
    #[must_use]
    pub fn group_id(&self, seed: &str) -> String {
        format!("{}.{}", self.group_prefix, sanitize(seed))
    }

    /// Mapped store identifier scoped to the legacy project.
    #[must_use]
    pub fn store_id(&self, legacy_project_id: &str) -> String {
        format!("{}.{}", self.store_prefix, sanitize(legacy_project_id))
    }

    /// Mapped store identifier of the private fallback tier.
    #[must_use]
    pub fn fallback_store_id(&self, legacy_project_id: &str) -> String {
        format!(
            "{}.fallback.{}",
            self.store_prefix,
            sanitize(legacy_project_id)
        )
    }
}

/// Replaces every character outside `[A-Za-z0-9.-]` with `-`.
#[must_use]
pub fn sanitize(seed: &str) -> String {
    seed.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
