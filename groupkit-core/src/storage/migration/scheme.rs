//! Moving legacy preferences into the mapped store of the same namespace.

use super::copy_keys;
use crate::storage::contract::{Storage, StorageExt};
use crate::storage::keys::StorageKey;

/// Whether `simple` still holds any of `keys`, under any of the encodings
/// older releases used.
fn has_legacy_data(simple: &dyn Storage, keys: &[StorageKey]) -> bool {
    keys.iter().any(|key| {
        let key = key.as_str();
        let found = simple.get::<String>(key).is_some()
            || simple.get::<Vec<String>>(key).is_some()
            || simple.get_raw(key).is_some();
        if found {
            log::debug!("found legacy value for '{key}' in {}", simple.location());
        }
        found
    })
}

/// Moves registry keys from the simple backend to the mapped backend of the
/// same namespace.
///
/// Values are copied and the destination synchronized before anything is
/// deleted from `simple`. Running it again after success finds nothing and
/// returns 0, so no completion flag is needed.
pub fn migrate_scheme(simple: &dyn Storage, mapped: &dyn Storage, keys: &[StorageKey]) -> usize {
    if !has_legacy_data(simple, keys) {
        log::debug!("no legacy data in {}, skipping scheme migration", simple.location());
        return 0;
    }

    log::info!(
        "migrating {} to {}",
        simple.location(),
        mapped.location()
    );
    let copied = copy_keys(simple, mapped, keys, true);
    log::info!("migrated {copied} keys to {}", mapped.location());
    copied
}
