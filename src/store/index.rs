//! Per-bundle index: `relative_path → blob_hash`, persisted at
//! `indexes/<aa>/<bb>/<hash>.<manager>.<version-tag>.index`.
//!
//! The manager/version-tag suffix is purely informational: `load`
//! matches on the fingerprint prefix alone and ignores the rest of the name.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result, StorageContext};

/// Index store rooted at `<cache_root>/indexes`.
#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn open(cache_root: &Path) -> Result<Self> {
        let root = cache_root.join("indexes");
        std::fs::create_dir_all(&root).storage_ctx(&root)?;
        Ok(Self { root })
    }

    fn shard_dir(&self, fingerprint: &str) -> PathBuf {
        self.root.join(&fingerprint[0..2]).join(&fingerprint[2..4])
    }

    fn file_name(fingerprint: &str, manager: &str, version_tag: &str) -> String {
        format!("{fingerprint}.{manager}.{version_tag}.index")
    }

    /// Write the index atomically (temp file + rename). The caller must have
    /// already ensured every referenced blob hash exists in the blob store.
    pub fn save(
        &self,
        fingerprint: &str,
        manager: &str,
        version_tag: &str,
        mapping: &BTreeMap<String, String>,
    ) -> Result<()> {
        let dir = self.shard_dir(fingerprint);
        std::fs::create_dir_all(&dir).storage_ctx(&dir)?;

        let dest = dir.join(Self::file_name(fingerprint, manager, version_tag));
        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        let json = serde_json::to_string_pretty(mapping)?;
        std::fs::write(&tmp, json).storage_ctx(&tmp)?;
        std::fs::rename(&tmp, &dest).storage_ctx(&dest)?;
        Ok(())
    }

    /// Locate the unique index file whose name starts with `fingerprint` and
    /// parse it. Returns `None` if no such file exists.
    pub fn load(&self, fingerprint: &str) -> Result<Option<BTreeMap<String, String>>> {
        let dir = self.shard_dir(fingerprint);
        if !dir.exists() {
            return Ok(None);
        }

        let prefix = format!("{fingerprint}.");
        let entries = std::fs::read_dir(&dir).storage_ctx(&dir)?;
        for entry in entries {
            let entry = entry.storage_ctx(&dir)?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(&prefix) && name.ends_with(".index") {
                let path = entry.path();
                let raw = std::fs::read_to_string(&path).storage_ctx(&path)?;
                let mapping: BTreeMap<String, String> = serde_json::from_str(&raw)
                    .map_err(|e| CacheError::storage(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
                return Ok(Some(mapping));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> BTreeMap<String, String> {
        let mut m = BTreeMap::new();
        m.insert("a.txt".to_string(), "a".repeat(64));
        m.insert("b.txt".to_string(), "b".repeat(64));
        m
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        let fp = "f".repeat(64);

        store.save(&fp, "npm", "18.0.0_9.0.0", &mapping()).unwrap();
        let loaded = store.load(&fp).unwrap().unwrap();
        assert_eq!(loaded, mapping());
    }

    #[test]
    fn load_ignores_manager_and_version_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        let fp = "e".repeat(64);
        store.save(&fp, "composer", "8.3.0", &mapping()).unwrap();
        assert!(store.load(&fp).unwrap().is_some());
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = IndexStore::open(dir.path()).unwrap();
        assert!(store.load(&"0".repeat(64)).unwrap().is_none());
    }
}
