//! Content-addressed blob store: `objects/<aa>/<bb>/<hash>`.
//!
//! Grounded on the same sharded-directory, temp-file-then-rename discipline
//! used for build artifacts elsewhere in this codebase: the path is a pure
//! function of content, and a write is atomic or it doesn't happen.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{CacheError, Result, StorageContext};
use crate::hash::hash_bytes;

/// Blob store rooted at `<cache_root>/objects`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn open(cache_root: &Path) -> Result<Self> {
        let root = cache_root.join("objects");
        std::fs::create_dir_all(&root).storage_ctx(&root)?;
        Ok(Self { root })
    }

    /// Path a blob with the given hash would live at, regardless of existence.
    pub fn path(&self, hash: &str) -> PathBuf {
        self.root.join(&hash[0..2]).join(&hash[2..4]).join(hash)
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.path(hash).exists()
    }

    /// Write `bytes` under its content hash, returning the hash. A no-op if
    /// the blob is already present (idempotent, safe under concurrent
    /// identical writers).
    pub fn put(&self, bytes: &[u8]) -> Result<String> {
        let hash = hash_bytes(bytes);
        let dest = self.path(&hash);
        if dest.exists() {
            return Ok(hash);
        }

        let dir = dest.parent().expect("blob path always has a parent");
        std::fs::create_dir_all(dir).storage_ctx(dir)?;

        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        {
            let mut file = std::fs::File::create(&tmp).storage_ctx(&tmp)?;
            file.write_all(bytes).storage_ctx(&tmp)?;
            file.sync_all().storage_ctx(&tmp)?;
        }

        match std::fs::rename(&tmp, &dest) {
            Ok(()) => Ok(hash),
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                // Another writer may have won the race with identical bytes;
                // that is not a failure.
                if dest.exists() {
                    Ok(hash)
                } else {
                    Err(CacheError::storage(dest, e))
                }
            }
        }
    }

    pub fn get(&self, hash: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(hash);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(&path).storage_ctx(&path)?))
    }
}
