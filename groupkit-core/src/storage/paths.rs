//! Storage path helpers.

use std::path::{Path, PathBuf};

const KVLOG_DIRNAME: &str = "kvlog";
const FALLBACK_KVLOG_DIRNAME: &str = "kvlog-fallback";
const DEFAULT_KVLOG_DIRNAME: &str = "kvlog-default";
const PREFERENCES_DIRNAME: &str = "preferences";

/// Name of the process-local preferences suite.
pub const STANDARD_SUITE: &str = "standard";

/// Layout of storage artifacts under a container or local root.
#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl StoragePaths {
    /// Builds storage paths rooted at `root`.
    #[must_use]
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding mapped logs and their lock files.
    #[must_use]
    pub fn kvlog_dir(&self) -> PathBuf {
        self.root.join(KVLOG_DIRNAME)
    }

    /// Directory of the private fallback tier.
    #[must_use]
    pub fn fallback_kvlog_dir(&self) -> PathBuf {
        self.root.join(FALLBACK_KVLOG_DIRNAME)
    }

    /// Directory of the default singleton tier.
    #[must_use]
    pub fn default_kvlog_dir(&self) -> PathBuf {
        self.root.join(DEFAULT_KVLOG_DIRNAME)
    }

    /// Directory of the preferences suite `suite`.
    #[must_use]
    pub fn preferences_dir(&self, suite: &str) -> PathBuf {
        self.root.join(PREFERENCES_DIRNAME).join(suite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let paths = StoragePaths::new("/tmp/group");
        assert_eq!(paths.root(), Path::new("/tmp/group"));
        assert_eq!(paths.kvlog_dir(), PathBuf::from("/tmp/group/kvlog"));
        assert_eq!(
            paths.fallback_kvlog_dir(),
            PathBuf::from("/tmp/group/kvlog-fallback")
        );
        assert_eq!(
            paths.default_kvlog_dir(),
            PathBuf::from("/tmp/group/kvlog-default")
        );
        assert_eq!(
            paths.preferences_dir(STANDARD_SUITE),
            PathBuf::from("/tmp/group/preferences/standard")
        );
    }
}
