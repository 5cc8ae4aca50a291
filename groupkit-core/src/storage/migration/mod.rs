//! Moving registry keys between stores.
//!
//! Every migration path is built from the same primitive: read raw bytes from
//! a source, write them to a destination, optionally drop them from the
//! source. Values are moved as opaque bytes, so migrations never need to know
//! the record types behind a key.

mod namespace;
mod scheme;


pub use namespace::{MigrationOutcome, NamespaceMigrator, MIGRATION_FLAG};
pub use scheme::migrate_scheme;

use super::contract::Storage;
use super::keys::StorageKey;

/// Copies every key in `keys` present in `source` to `destination`, removing
/// it from `source` when `delete_from_source` is set.
///
/// The destination is synchronized before anything is removed from the
/// source, so a crash in between leaves the value in both stores. Each store
/// is synchronized once.
///
/// Returns the number of keys copied. A key whose destination write fails is
/// left in the source.
pub fn copy_keys(
    source: &dyn Storage,
    destination: &dyn Storage,
    keys: &[StorageKey],
    delete_from_source: bool,
) -> usize {
    let copied = transfer(source, destination, keys);
    destination.synchronize();
    if delete_from_source {
        for key in &copied {
            source.remove(key.as_str());
        }
    }
    source.synchronize();
    copied.len()
}

/// Copies present keys without syncing or deleting; returns the keys written.
fn transfer(
    source: &dyn Storage,
    destination: &dyn Storage,
    keys: &[StorageKey],
) -> Vec<StorageKey> {
    let mut copied = Vec::new();
    for key in keys {
        let Some(bytes) = source.get_raw(key.as_str()) else {
            continue;
        };
        match destination.store(key.as_str(), &bytes) {
            Ok(()) => {
                log::debug!(
                    "copied '{key}' ({} bytes) from {} to {}",
                    bytes.len(),
                    source.location(),
                    destination.location()
                );
                copied.push(*key);
            }
            Err(err) => log::warn!(
                "copy of '{key}' to {} failed, leaving it in {}: {err}",
                destination.location(),
                source.location()
            ),
        }
    }
    copied
}

/// Removes `keys` from `source` and synchronizes it.
fn purge(source: &dyn Storage, keys: &[StorageKey]) {
    if keys.is_empty() {
        return;
    }
    for key in keys {
        source.remove(key.as_str());
    }
    source.synchronize();
}
