//! Resolution of the shared container a process should store data in.

use std::path::PathBuf;

use super::config::StorageConfig;
use super::traits::GroupContainerProvider;

/// Which namespace generation the resolved container belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Generation {
    /// Group derived from the application identifier. Current once its
    /// completion flag is set, legacy-bundle before that.
    Bundle,
    /// Group derived from the legacy project identifier.
    Project,
    /// No shared group is reachable; storage lives in the local directory.
    Unreachable,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNamespace {
    /// Group identifier selected. For [`Generation::Unreachable`] this is the
    /// bundle-scoped identifier even though no container exists for it.
    pub group_id: String,
    /// Directory of the shared container, if reachable.
    pub container: Option<PathBuf>,
    /// Namespace generation of `group_id`.
    pub generation: Generation,
}

impl ResolvedNamespace {
    /// Directory storage should live under: the shared container, or the
    /// process-local directory when no group is reachable.
    #[must_use]
    pub fn root(&self, provider: &dyn GroupContainerProvider) -> PathBuf {
        self.container
            .clone()
            .unwrap_or_else(|| PathBuf::from(provider.local_path()))
    }
}

/// Picks the best reachable shared container for `app_id`, falling back to
/// the one for `legacy_project_id`.
///
/// Never fails: when neither group is reachable the bundle-scoped id is
/// returned with [`Generation::Unreachable`].
pub fn resolve(
    app_id: &str,
    legacy_project_id: &str,
    provider: &dyn GroupContainerProvider,
    config: &StorageConfig,
) -> ResolvedNamespace {
    let bundle_group = config.group_id(app_id);
    if let Some(path) = provider.container_path(bundle_group.clone()) {
        return ResolvedNamespace {
            group_id: bundle_group,
            container: Some(PathBuf::from(path)),
            generation: Generation::Bundle,
        };
    }

    let project_group = config.group_id(legacy_project_id);
    if let Some(path) = provider.container_path(project_group.clone()) {
        log::debug!("bundle group {bundle_group} unreachable, using {project_group}");
        return ResolvedNamespace {
            group_id: project_group,
            container: Some(PathBuf::from(path)),
            generation: Generation::Project,
        };
    }

    log::info!("no shared group reachable, storage is process-local");
    ResolvedNamespace {
        group_id: bundle_group,
        container: None,
        generation: Generation::Unreachable,
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::storage::FsContainerProvider;

    fn provider() -> (PathBuf, FsContainerProvider) {
        let root = std::env::temp_dir().join(format!("groupkit-ns-{}", Uuid::new_v4()));
        let provider = FsContainerProvider::new(root.join("groups"), root.join("local"));
        (root, provider)
    }

    #[test]
    fn test_bundle_group_wins() {
        let (root, provider) = provider();
        let config = StorageConfig::default();
        provider.create_group("group.groupkit.com.example.app").expect("group");
        provider.create_group("group.groupkit.proj").expect("group");

        let resolved = resolve("com.example.app", "proj", &provider, &config);
        assert_eq!(resolved.generation, Generation::Bundle);
        assert_eq!(resolved.group_id, "group.groupkit.com.example.app");
        assert_eq!(
            resolved.root(&provider),
            root.join("groups").join("group.groupkit.com.example.app")
        );

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_project_group_when_bundle_missing() {
        let (root, provider) = provider();
        let config = StorageConfig::default();
        provider.create_group("group.groupkit.proj-1").expect("group");

        let resolved = resolve("com.example.app", "proj_1", &provider, &config);
        assert_eq!(resolved.generation, Generation::Project);
        assert_eq!(resolved.group_id, "group.groupkit.proj-1");

        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn test_unreachable_degrades_to_local() {
        let (root, provider) = provider();
        let resolved = resolve("com.example.app", "proj", &provider, &StorageConfig::default());
        assert_eq!(resolved.generation, Generation::Unreachable);
        assert_eq!(resolved.group_id, "group.groupkit.com.example.app");
        assert_eq!(resolved.container, None);
        assert_eq!(resolved.root(&provider), root.join("local"));
    }
}
