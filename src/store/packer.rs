//! Materialises a published index into a packed, DEFLATE-compressed ZIP at
//! `bundles/<aa>/<bb>/<hash>.zip`, atomically.

use std::io::Write;
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::ZipWriter;

use crate::error::{CacheError, Result, StorageContext};
use crate::store::blob::BlobStore;
use crate::store::index::IndexStore;

#[derive(Debug, Clone)]
pub struct BundlePacker {
    root: PathBuf,
    blobs: BlobStore,
    indexes: IndexStore,
}

impl BundlePacker {
    pub fn open(cache_root: &Path, blobs: BlobStore, indexes: IndexStore) -> Result<Self> {
        let root = cache_root.join("bundles");
        std::fs::create_dir_all(&root).storage_ctx(&root)?;
        Ok(Self {
            root,
            blobs,
            indexes,
        })
    }

    pub fn bundle_path(&self, fingerprint: &str) -> PathBuf {
        self.root
            .join(&fingerprint[0..2])
            .join(&fingerprint[2..4])
            .join(format!("{fingerprint}.zip"))
    }

    /// Produce (or reuse) the ZIP for `fingerprint`. Returns `Ok(None)` if no
    /// index has been published for it yet.
    pub fn pack(&self, fingerprint: &str) -> Result<Option<PathBuf>> {
        let Some(mapping) = self.indexes.load(fingerprint)? else {
            return Ok(None);
        };

        let target = self.bundle_path(fingerprint);
        if target.exists() {
            return Ok(Some(target));
        }

        let dir = target.parent().expect("bundle path always has a parent");
        std::fs::create_dir_all(dir).storage_ctx(dir)?;
        let tmp = dir.join(format!(".tmp-{}", uuid::Uuid::new_v4()));

        let result = self.write_zip(&tmp, &mapping);
        match result {
            Ok(()) => {
                std::fs::rename(&tmp, &target).storage_ctx(&target)?;
                Ok(Some(target))
            }
            Err(e) => {
                let _ = std::fs::remove_file(&tmp);
                Err(e)
            }
        }
    }

    fn write_zip(
        &self,
        tmp: &Path,
        mapping: &std::collections::BTreeMap<String, String>,
    ) -> Result<()> {
        let file = std::fs::File::create(tmp).storage_ctx(tmp)?;
        let mut writer = ZipWriter::new(file);
        let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

        for (path, hash) in mapping {
            let bytes = self
                .blobs
                .get(hash)?
                .ok_or_else(|| CacheError::NotFound(format!("blob {hash} missing for {path}")))?;

            writer
                .start_file(path, options)
                .map_err(zip_err(tmp))?;
            writer.write_all(&bytes).storage_ctx(tmp)?;
        }

        let mut file = writer.finish().map_err(zip_err(tmp))?;
        file.sync_all().storage_ctx(tmp)?;
        Ok(())
    }
}

fn zip_err(path: &Path) -> impl Fn(zip::result::ZipError) -> CacheError + '_ {
    move |e| CacheError::storage(path, std::io::Error::new(std::io::ErrorKind::Other, e))
}
