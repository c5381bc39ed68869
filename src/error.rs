//! Typed error taxonomy shared by every component.
//!
//! Lower-level errors (I/O, JSON, TOML) convert into [`CacheError`] via `From`
//! so callers at the request boundary can match on the variant instead of
//! inspecting message text.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the cache engine.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unsupported version for {manager}: {versions:?}")]
    UnsupportedVersion {
        manager: String,
        versions: std::collections::BTreeMap<String, String>,
    },

    #[error("install failed: {stderr}")]
    InstallFailure { stderr: String },

    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(String),

    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no bundle found for fingerprint {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CacheError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Wrap a fallible filesystem operation, attaching the path it touched.
pub(crate) trait StorageContext<T> {
    fn storage_ctx(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> StorageContext<T> for std::result::Result<T, std::io::Error> {
    fn storage_ctx(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| CacheError::storage(path, e))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(e: serde_json::Error) -> Self {
        CacheError::Storage {
            path: PathBuf::new(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        }
    }
}
