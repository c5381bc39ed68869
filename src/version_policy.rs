//! Version Policy: decides native vs sandboxed vs reject for a
//! (manager, versions) pair, normalising both the wire vocabulary
//! (`node`, `npm`, `yarn`, `php`) and the internal one (`runtime`,
//! `package_manager`) before comparing against the configured table.

use std::collections::BTreeMap;

use crate::config::{Config, SupportedVersion};
use crate::error::{CacheError, Result};
use crate::installer::sandbox::SandboxInstaller;
use crate::installer::Manager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallerChoice {
    Native,
    Sandboxed,
}

/// Fold a request's version map into the same shape the config table uses.
pub(crate) fn effective_versions(
    manager: Manager,
    versions: &BTreeMap<String, String>,
) -> SupportedVersion {
    match manager {
        Manager::Npm => SupportedVersion {
            runtime: versions
                .get("node")
                .or_else(|| versions.get("runtime"))
                .cloned()
                .unwrap_or_default(),
            package_manager: versions
                .get("npm")
                .or_else(|| versions.get("yarn"))
                .or_else(|| versions.get("package_manager"))
                .cloned(),
        },
        Manager::Composer => SupportedVersion {
            runtime: versions
                .get("php")
                .or_else(|| versions.get("runtime"))
                .cloned()
                .unwrap_or_default(),
            package_manager: None,
        },
    }
}

pub async fn decide(
    config: &Config,
    sandbox: &SandboxInstaller,
    manager_name: &str,
    versions: &BTreeMap<String, String>,
) -> Result<InstallerChoice> {
    let Some(manager) = Manager::parse(manager_name) else {
        return Err(CacheError::InvalidRequest(format!(
            "unsupported manager: {manager_name}"
        )));
    };

    let requested = effective_versions(manager, versions);
    let supported = config
        .supported_versions
        .get(manager.as_str())
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    if supported.iter().any(|candidate| *candidate == requested) {
        return Ok(InstallerChoice::Native);
    }

    if config.sandbox_enabled && sandbox.is_available().await {
        return Ok(InstallerChoice::Sandboxed);
    }

    Err(CacheError::UnsupportedVersion {
        manager: manager.as_str().to_string(),
        versions: versions.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn versions(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn unknown_manager_is_rejected() {
        let config = Config::default();
        let sandbox = SandboxInstaller::new(Duration::from_secs(5), Duration::from_secs(300));
        let err = decide(&config, &sandbox, "pip", &versions(&[])).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn matching_versions_select_native() {
        let config = Config::default();
        let sandbox = SandboxInstaller::new(Duration::from_secs(5), Duration::from_secs(300));
        let choice = decide(
            &config,
            &sandbox,
            "npm",
            &versions(&[("node", "18.0.0"), ("npm", "9.0.0")]),
        )
        .await
        .unwrap();
        assert_eq!(choice, InstallerChoice::Native);
    }

    #[tokio::test]
    async fn mismatched_versions_without_sandbox_are_rejected() {
        let config = Config::default();
        let sandbox = SandboxInstaller::new(Duration::from_secs(5), Duration::from_secs(300));
        let err = decide(
            &config,
            &sandbox,
            "npm",
            &versions(&[("node", "14.0.0"), ("npm", "6.0.0")]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedVersion { .. }));
    }

    #[test]
    fn yarn_satisfies_the_package_manager_field() {
        let requested = effective_versions(
            Manager::Npm,
            &versions(&[("node", "18.0.0"), ("yarn", "1.22.0")]),
        );
        assert_eq!(requested.package_manager.as_deref(), Some("1.22.0"));
    }
}
