//! Layered configuration: compiled-in defaults → optional `cache.toml` →
//! `DEPCACHE_*` environment variables. The resolved value is immutable for
//! the process lifetime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CacheError, Result};

/// A single supported (runtime, package-manager) tuple for a manager.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SupportedVersion {
    pub runtime: String,
    #[serde(default)]
    pub package_manager: Option<String>,
}

/// Fully resolved, read-only configuration for one process.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_root: PathBuf,
    pub supported_versions: BTreeMap<String, Vec<SupportedVersion>>,
    pub sandbox_enabled: bool,
    pub bundle_max_age: Duration,
    pub sandbox_probe_timeout: Duration,
    pub sandbox_wall_clock_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let mut supported_versions = BTreeMap::new();
        supported_versions.insert(
            "npm".to_string(),
            vec![SupportedVersion {
                runtime: "18.0.0".to_string(),
                package_manager: Some("9.0.0".to_string()),
            }],
        );
        supported_versions.insert(
            "composer".to_string(),
            vec![SupportedVersion {
                runtime: "8.3.0".to_string(),
                package_manager: None,
            }],
        );

        Self {
            cache_root: default_cache_root(),
            supported_versions,
            sandbox_enabled: false,
            bundle_max_age: Duration::from_secs(7 * 24 * 60 * 60),
            sandbox_probe_timeout: Duration::from_secs(5),
            sandbox_wall_clock_timeout: Duration::from_secs(300),
        }
    }
}

fn default_cache_root() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("depcache")
}

/// On-disk shape of `cache.toml`. Every field is optional: a file that sets
/// only one knob is valid, the rest fall through to defaults.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigToml {
    cache_root: Option<PathBuf>,
    sandbox_enabled: Option<bool>,
    bundle_max_age_secs: Option<u64>,
    sandbox_probe_timeout_secs: Option<u64>,
    sandbox_wall_clock_timeout_secs: Option<u64>,
    #[serde(default)]
    supported_versions: BTreeMap<String, Vec<SupportedVersion>>,
}

impl Config {
    /// Resolve configuration from defaults, an optional file, then the
    /// process environment. `config_path` is checked for existence; a
    /// missing file is not an error, only a parse failure is.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(path) = config_path {
            if path.exists() {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| CacheError::Config(format!("reading {}: {e}", path.display())))?;
                let parsed: ConfigToml = toml::from_str(&raw)
                    .map_err(|e| CacheError::Config(format!("parsing {}: {e}", path.display())))?;
                apply_file(&mut config, parsed);
            }
        }

        apply_env(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bundle_max_age.is_zero() {
            return Err(CacheError::Config(
                "bundle_max_age_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn apply_file(config: &mut Config, file: ConfigToml) {
    if let Some(root) = file.cache_root {
        config.cache_root = root;
    }
    if let Some(enabled) = file.sandbox_enabled {
        config.sandbox_enabled = enabled;
    }
    if let Some(secs) = file.bundle_max_age_secs {
        config.bundle_max_age = Duration::from_secs(secs);
    }
    if let Some(secs) = file.sandbox_probe_timeout_secs {
        config.sandbox_probe_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = file.sandbox_wall_clock_timeout_secs {
        config.sandbox_wall_clock_timeout = Duration::from_secs(secs);
    }
    if !file.supported_versions.is_empty() {
        config.supported_versions = file.supported_versions;
    }
}

fn apply_env(config: &mut Config) -> Result<()> {
    if let Ok(root) = std::env::var("DEPCACHE_CACHE_ROOT") {
        config.cache_root = PathBuf::from(root);
    }
    if let Ok(raw) = std::env::var("DEPCACHE_SANDBOX_ENABLED") {
        config.sandbox_enabled = parse_bool(&raw)
            .ok_or_else(|| CacheError::Config(format!("invalid DEPCACHE_SANDBOX_ENABLED: {raw}")))?;
    }
    if let Ok(raw) = std::env::var("DEPCACHE_BUNDLE_MAX_AGE_SECS") {
        let secs: u64 = raw
            .parse()
            .map_err(|_| CacheError::Config(format!("invalid DEPCACHE_BUNDLE_MAX_AGE_SECS: {raw}")))?;
        config.bundle_max_age = Duration::from_secs(secs);
    }
    Ok(())
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
