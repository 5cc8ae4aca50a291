//! One-time consolidation of every legacy namespace into the current one.

use std::fmt;
use std::sync::Arc;

use super::{purge, transfer};
use crate::storage::contract::{Storage, StorageExt};
use crate::storage::error::StorageResult;
use crate::storage::keys::StorageKey;

/// Key of the namespace migration completion flag.
pub const MIGRATION_FLAG: StorageKey = StorageKey::StorageMigrated;

type SourceFactory = Box<dyn FnOnce() -> Option<Arc<dyn Storage>>>;

struct Source {
    label: &'static str,
    open: SourceFactory,
}

/// Result of [`NamespaceMigrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The destination already carried the completion flag.
    AlreadyMigrated,
    /// Every source was drained and the flag is set.
    Completed {
        /// Values written to the destination.
        copied: usize,
    },
    /// Values were copied but the flag could not be persisted; sources were
    /// left untouched so the next open retries.
    FlagNotPersisted {
        /// Values written to the destination.
        copied: usize,
    },
}

/// Consolidates legacy namespaces into one destination store.
///
/// Sources are consulted in the order they were added and opened lazily, only
/// when the migration actually runs. A key present in several sources ends up
/// with the value from the last of them.
///
/// Migration is two-phase: all sources are copied and the destination is
/// synchronized, then the completion flag is written and synchronized, and
/// only then are the copied keys purged from the sources. A crash at any point
/// leaves either the sources intact or the flag set.
pub struct NamespaceMigrator {
    keys: Vec<StorageKey>,
    sources: Vec<Source>,
}

impl NamespaceMigrator {
    /// Creates a migrator moving `keys`.
    #[must_use]
    pub const fn new(keys: Vec<StorageKey>) -> Self {
        Self {
            keys,
            sources: Vec::new(),
        }
    }

    /// Appends a source. `open` returns `None` when the source is unreachable,
    /// in which case it is skipped.
    #[must_use]
    pub fn source(
        mut self,
        label: &'static str,
        open: impl FnOnce() -> Option<Arc<dyn Storage>> + 'static,
    ) -> Self {
        self.sources.push(Source {
            label,
            open: Box::new(open),
        });
        self
    }

    /// Whether `destination` already carries the completion flag.
    #[must_use]
    pub fn is_complete(destination: &dyn Storage) -> bool {
        destination.get::<bool>(MIGRATION_FLAG.as_str()) == Some(true)
    }

    /// Runs the migration into `destination` unless it is already complete.
    pub fn run(self, destination: &dyn Storage) -> MigrationOutcome {
        if Self::is_complete(destination) {
            log::debug!("{} already migrated", destination.location());
            return MigrationOutcome::AlreadyMigrated;
        }

        let target = destination.location();
        log::info!("starting namespace migration into {target}");

        let mut drained = Vec::new();
        let mut copied = 0;
        for source in self.sources {
            let Some(store) = (source.open)() else {
                log::debug!("{} unreachable, skipping", source.label);
                continue;
            };
            if store.location() == target {
                log::debug!("{} is the destination, skipping", source.label);
                continue;
            }
            let keys = transfer(store.as_ref(), destination, &self.keys);
            if !keys.is_empty() {
                log::info!("copied {} keys from {}", keys.len(), source.label);
            }
            copied += keys.len();
            drained.push((store, keys));
        }

        destination.synchronize();
        if let Err(err) = mark_complete(destination) {
            log::warn!("could not persist migration flag in {target}: {err}");
            return MigrationOutcome::FlagNotPersisted { copied };
        }

        for (store, keys) in &drained {
            purge(store.as_ref(), keys);
        }
        log::info!("namespace migration into {target} completed, {copied} values copied");
        MigrationOutcome::Completed { copied }
    }
}

fn mark_complete(destination: &dyn Storage) -> StorageResult<()> {
    let flag = serde_json::to_vec(&true)?;
    destination.store(MIGRATION_FLAG.as_str(), &flag)?;
    destination.flush()
}

impl fmt::Debug for NamespaceMigrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<_> = self.sources.iter().map(|source| source.label).collect();
        f.debug_struct("NamespaceMigrator")
            .field("keys", &self.keys)
            .field("sources", &labels)
            .finish()
    }
}
