//! Entry point that hands out the active [`Storage`].
//!
//! Opening resolves the namespace, runs whichever migration applies and
//! returns the mapped store the rest of the SDK should use. Construct one
//! facade at SDK initialization and pass the returned handle to consumers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::app_identity::{host_app_id, DEFAULT_APP_ID};
use super::config::StorageConfig;
use super::contract::Storage;
use super::error::{StorageError, StorageResult};
use super::keys::StorageKey;
use super::mapped::{AccessMode, MappedOptions, MappedStore};
use super::migration::{migrate_scheme, MigrationOutcome, NamespaceMigrator};
use super::namespace::{resolve, Generation, ResolvedNamespace};
use super::paths::{StoragePaths, STANDARD_SUITE};
use super::simple::SimpleStore;
use super::traits::GroupContainerProvider;

/// Opens group storage for a process.
pub struct StorageFacade {
    provider: Arc<dyn GroupContainerProvider>,
    config: StorageConfig,
}

impl StorageFacade {
    /// Creates a facade over `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if `config` is invalid.
    pub fn new(
        provider: Arc<dyn GroupContainerProvider>,
        config: StorageConfig,
    ) -> StorageResult<Self> {
        config.validate()?;
        Ok(Self { provider, config })
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Opens storage for the current process, deriving the application id
    /// from the host bundle.
    ///
    /// # Errors
    ///
    /// See [`StorageFacade::open`].
    pub fn open_for_current_process(
        &self,
        legacy_project_id: &str,
    ) -> StorageResult<Arc<dyn Storage>> {
        let app_id = host_app_id(self.provider.as_ref(), DEFAULT_APP_ID);
        self.open(&app_id, legacy_project_id)
    }

    /// Resolves the namespace for `app_id`, migrates legacy data if needed
    /// and returns the storage to use.
    ///
    /// Opening twice with the same inputs is safe; migrations already done
    /// are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Unavailable`] only when no mapped store could
    /// be opened in the namespace, the private fallback directory, or the
    /// default location.
    pub fn open(&self, app_id: &str, legacy_project_id: &str) -> StorageResult<Arc<dyn Storage>> {
        let resolved = resolve(
            app_id,
            legacy_project_id,
            self.provider.as_ref(),
            &self.config,
        );
        log::debug!(
            "resolved {} ({:?}) for app '{app_id}'",
            resolved.group_id,
            resolved.generation
        );

        match resolved.generation {
            Generation::Bundle => self.open_bundle(&resolved, legacy_project_id),
            Generation::Project | Generation::Unreachable => {
                self.open_in_place(&resolved, legacy_project_id)
            }
        }
    }

    fn open_bundle(
        &self,
        resolved: &ResolvedNamespace,
        legacy_project_id: &str,
    ) -> StorageResult<Arc<dyn Storage>> {
        let root = resolved.root(self.provider.as_ref());
        let destination = self.open_mapped(&root, legacy_project_id)?;

        let outcome = self
            .namespace_migrator(&resolved.group_id, legacy_project_id)
            .run(destination.as_ref());
        if let MigrationOutcome::FlagNotPersisted { copied } = outcome {
            log::warn!("migration copied {copied} values but will run again on next open");
        }
        Ok(destination)
    }

    fn open_in_place(
        &self,
        resolved: &ResolvedNamespace,
        legacy_project_id: &str,
    ) -> StorageResult<Arc<dyn Storage>> {
        let root = resolved.root(self.provider.as_ref());
        let mapped = self.open_mapped(&root, legacy_project_id)?;

        let suite = match resolved.generation {
            Generation::Unreachable => None,
            Generation::Bundle | Generation::Project => Some(resolved.group_id.clone()),
        };
        let simple = SimpleStore::new(
            suite.clone().unwrap_or_else(|| STANDARD_SUITE.to_string()),
            self.provider.preferences(suite),
        );
        migrate_scheme(&simple, mapped.as_ref(), &StorageKey::migratable());
        Ok(mapped)
    }

    /// Opens the mapped store for `legacy_project_id` under `root`, falling
    /// back to the private directory and then to the default instance.
    fn open_mapped(&self, root: &Path, legacy_project_id: &str) -> StorageResult<Arc<dyn Storage>> {
        let local = PathBuf::from(self.provider.local_path());

        let primary_dir = StoragePaths::new(root).kvlog_dir();
        let primary_err = match MappedStore::open(
            &primary_dir,
            &self.config.store_id(legacy_project_id),
            self.config.mapped_options(),
        ) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(err) => err,
        };
        log::warn!(
            "mapped store in {} unavailable, using private fallback: {primary_err}",
            primary_dir.display()
        );

        let fallback_dir = StoragePaths::new(&local).fallback_kvlog_dir();
        let fallback_err = match MappedStore::open(
            &fallback_dir,
            &self.config.fallback_store_id(legacy_project_id),
            MappedOptions {
                mode: AccessMode::SingleProcess,
                ..self.config.mapped_options()
            },
        ) {
            Ok(store) => return Ok(Arc::new(store)),
            Err(err) => err,
        };
        log::error!(
            "fallback mapped store in {} unavailable, using default store: {fallback_err}",
            fallback_dir.display()
        );

        match MappedStore::default_instance(&local, self.config.mapped_options()) {
            Ok(store) => Ok(store),
            Err(default_err) => {
                log::error!("no storage backend available: {default_err}");
                Err(StorageError::Unavailable(format!(
                    "primary: {primary_err}; fallback: {fallback_err}; default: {default_err}"
                )))
            }
        }
    }

    /// Builds the ordered list of legacy sources for the bundle-scoped
    /// `bundle_group`. Nothing is opened until the migrator runs.
    fn namespace_migrator(&self, bundle_group: &str, legacy_project_id: &str) -> NamespaceMigrator {
        let project_group = self.config.group_id(legacy_project_id);
        let store_id = self.config.store_id(legacy_project_id);
        let options = self.config.mapped_options();

        let mut migrator = NamespaceMigrator::new(StorageKey::migratable())
            .source("project mapped store", {
                let provider = Arc::clone(&self.provider);
                let group = project_group.clone();
                move || {
                    let container = provider.container_path(group)?;
                    let dir = StoragePaths::new(container).kvlog_dir();
                    if !MappedStore::exists(&dir, &store_id) {
                        return None;
                    }
                    match MappedStore::open(&dir, &store_id, options) {
                        Ok(store) => Some(Arc::new(store) as Arc<dyn Storage>),
                        Err(err) => {
                            log::warn!(
                                "legacy mapped store in {} unreadable: {err}",
                                dir.display()
                            );
                            None
                        }
                    }
                }
            })
            .source("project preferences", {
                let provider = Arc::clone(&self.provider);
                move || {
                    provider.container_path(project_group.clone())?;
                    let blobs = provider.preferences(Some(project_group.clone()));
                    Some(Arc::new(SimpleStore::new(project_group, blobs)) as Arc<dyn Storage>)
                }
            })
            .source("bundle preferences", {
                let provider = Arc::clone(&self.provider);
                let group = bundle_group.to_string();
                move || {
                    let blobs = provider.preferences(Some(group.clone()));
                    Some(Arc::new(SimpleStore::new(group, blobs)) as Arc<dyn Storage>)
                }
            });

        if self.config.migrate_process_local {
            let provider = Arc::clone(&self.provider);
            migrator = migrator.source("process-local preferences", move || {
                let blobs = provider.preferences(None);
                Some(Arc::new(SimpleStore::new(STANDARD_SUITE, blobs)) as Arc<dyn Storage>)
            });
        }
        migrator
    }
}

impl std::fmt::Debug for StorageFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageFacade")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
