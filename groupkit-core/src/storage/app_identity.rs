//! Identifier of the host application.
//!
//! Extensions are bundled inside their host (`Host.app/PlugIns/Ext.appex`),
//! so the host identifier is read two directory levels up from an extension
//! bundle. The host identifier seeds the bundle-scoped group id, which keeps
//! the app and all of its extensions on the same container.

use std::path::Path;

use super::traits::GroupContainerProvider;

/// Identifier used when the host bundle cannot be identified.
pub const DEFAULT_APP_ID: &str = "com.groupkit.default";

const EXTENSION_SUFFIX: &str = "appex";

/// Returns the host application identifier, or `fallback` when it cannot be
/// determined.
pub fn host_app_id(provider: &dyn GroupContainerProvider, fallback: &str) -> String {
    let bundle_path = provider.main_bundle_path();
    let bundle = Path::new(&bundle_path);

    let host_bundle = if bundle.extension().is_some_and(|ext| ext == EXTENSION_SUFFIX) {
        match bundle.parent().and_then(Path::parent) {
            Some(host) => host.to_path_buf(),
            None => {
                log::warn!("extension bundle {bundle_path} has no host, using {fallback}");
                return fallback.to_string();
            }
        }
    } else {
        bundle.to_path_buf()
    };

    match provider.bundle_identifier(host_bundle.to_string_lossy().to_string()) {
        Some(identifier) if !identifier.is_empty() => identifier,
        _ => {
            log::warn!(
                "no bundle identifier at {}, using {fallback}",
                host_bundle.display()
            );
            fallback.to_string()
        }
    }
}
