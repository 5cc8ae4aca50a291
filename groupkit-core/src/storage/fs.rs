//! Filesystem implementations of the platform seams.
//!
//! Hosts with real app-group entitlements provide their own
//! [`GroupContainerProvider`]; these are used on desktop targets and in tests.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use super::config::sanitize;
use super::error::{StorageError, StorageResult};
use super::paths::{StoragePaths, STANDARD_SUITE};
use super::traits::{AtomicBlobStore, GroupContainerProvider};

const BUNDLE_MANIFEST: &str = "bundle.json";

/// Directory-backed [`AtomicBlobStore`].
///
/// Writes go to a temporary file which is synced and renamed over the target,
/// followed by a sync of the directory, so readers see either the old or the
/// new blob. The directory is created on first write.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    directory: PathBuf,
}

impl FsBlobStore {
    /// Creates a blob store rooted at `directory`.
    #[must_use]
    pub fn new(directory: impl AsRef<Path>) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
        }
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn blob_path(&self, name: &str) -> StorageResult<PathBuf> {
        if name.is_empty() || name.starts_with('.') || name.contains(['/', '\\']) {
            return Err(StorageError::BlobStore(format!("invalid blob name '{name}'")));
        }
        Ok(self.directory.join(name))
    }

    fn sync_directory(&self) -> StorageResult<()> {
        #[cfg(unix)]
        {
            fs::File::open(&self.directory)
                .and_then(|dir| dir.sync_all())
                .map_err(|err| {
                    StorageError::io(format!("syncing {}", self.directory.display()), &err)
                })?;
        }
        Ok(())
    }
}

impl AtomicBlobStore for FsBlobStore {
    fn read(&self, name: String) -> StorageResult<Option<Vec<u8>>> {
        let path = self.blob_path(&name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(format!("reading {}", path.display()), &err)),
        }
    }

    fn write_atomic(&self, name: String, bytes: Vec<u8>) -> StorageResult<()> {
        let path = self.blob_path(&name)?;
        let tmp_path = self.directory.join(format!(".{name}.tmp"));

        fs::create_dir_all(&self.directory).map_err(|err| {
            StorageError::io(format!("creating {}", self.directory.display()), &err)
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(|err| StorageError::io(format!("creating {}", tmp_path.display()), &err))?;
        file.write_all(&bytes)
            .and_then(|()| file.sync_all())
            .map_err(|err| StorageError::io(format!("writing {}", tmp_path.display()), &err))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|err| {
            let _ = fs::remove_file(&tmp_path);
            StorageError::io(format!("renaming onto {}", path.display()), &err)
        })?;
        self.sync_directory()
    }

    fn delete(&self, name: String) -> StorageResult<()> {
        let path = self.blob_path(&name)?;
        match fs::remove_file(&path) {
            Ok(()) => self.sync_directory(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io(format!("deleting {}", path.display()), &err)),
        }
    }
}

#[derive(Deserialize)]
struct BundleManifest {
    identifier: String,
}

/// [`GroupContainerProvider`] over plain directories.
///
/// A group is reachable when `<groups_root>/<group_id>` exists. Bundles are
/// directories carrying a `bundle.json` manifest with an `identifier` field.
#[derive(Debug, Clone)]
pub struct FsContainerProvider {
    groups_root: PathBuf,
    local_root: PathBuf,
    main_bundle: PathBuf,
    identifiers: HashMap<PathBuf, String>,
}

impl FsContainerProvider {
    /// Creates a provider. The main bundle defaults to `<local_root>/Main.app`.
    #[must_use]
    pub fn new(groups_root: impl AsRef<Path>, local_root: impl AsRef<Path>) -> Self {
        let local_root = local_root.as_ref().to_path_buf();
        Self {
            groups_root: groups_root.as_ref().to_path_buf(),
            main_bundle: local_root.join("Main.app"),
            local_root,
            identifiers: HashMap::new(),
        }
    }

    /// Sets the bundle this process runs from.
    #[must_use]
    pub fn with_main_bundle(mut self, bundle_path: impl AsRef<Path>) -> Self {
        self.main_bundle = bundle_path.as_ref().to_path_buf();
        self
    }

    /// Registers a bundle identifier without a manifest on disk.
    #[must_use]
    pub fn with_bundle_identifier(
        mut self,
        bundle_path: impl AsRef<Path>,
        identifier: impl Into<String>,
    ) -> Self {
        self.identifiers
            .insert(bundle_path.as_ref().to_path_buf(), identifier.into());
        self
    }

    /// Creates the shared container for `group_id`, making it reachable.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn create_group(&self, group_id: &str) -> StorageResult<PathBuf> {
        let path = self.groups_root.join(group_id);
        fs::create_dir_all(&path)
            .map_err(|err| StorageError::io(format!("creating {}", path.display()), &err))?;
        Ok(path)
    }

    fn reachable_container(&self, group_id: &str) -> Option<PathBuf> {
        if group_id.is_empty() || group_id.contains(['/', '\\']) {
            return None;
        }
        let path = self.groups_root.join(group_id);
        path.is_dir().then_some(path)
    }
}

impl GroupContainerProvider for FsContainerProvider {
    fn container_path(&self, group_id: String) -> Option<String> {
        self.reachable_container(&group_id)
            .map(|path| path.to_string_lossy().to_string())
    }

    fn local_path(&self) -> String {
        self.local_root.to_string_lossy().to_string()
    }

    fn preferences(&self, suite: Option<String>) -> Arc<dyn AtomicBlobStore> {
        let dir = match suite {
            Some(suite) => match self.reachable_container(&suite) {
                Some(container) => StoragePaths::new(container).preferences_dir(&suite),
                None => StoragePaths::new(&self.local_root)
                    .preferences_dir(&sanitize(&suite)),
            },
            None => StoragePaths::new(&self.local_root).preferences_dir(STANDARD_SUITE),
        };
        Arc::new(FsBlobStore::new(dir))
    }

    fn main_bundle_path(&self) -> String {
        self.main_bundle.to_string_lossy().to_string()
    }

    fn bundle_identifier(&self, bundle_path: String) -> Option<String> {
        let bundle_path = PathBuf::from(bundle_path);
        if let Some(identifier) = self.identifiers.get(&bundle_path) {
            return Some(identifier.clone());
        }
        let manifest = fs::read(bundle_path.join(BUNDLE_MANIFEST)).ok()?;
        match serde_json::from_slice::<BundleManifest>(&manifest) {
            Ok(manifest) if !manifest.identifier.is_empty() => Some(manifest.identifier),
            Ok(_) => None,
            Err(err) => {
                log::debug!("unreadable manifest in {}: {err}", bundle_path.display());
                None
            }
        }
    }
}
