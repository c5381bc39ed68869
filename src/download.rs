//! Download Service: stream a packed bundle by fingerprint. No
//! authentication or range-request logic — that belongs to the HTTP layer.

use tokio::fs::File;

use crate::error::{CacheError, Result};
use crate::store::BundlePacker;

#[derive(Debug, Clone)]
pub struct DownloadService {
    packer: BundlePacker,
}

impl DownloadService {
    pub fn new(packer: BundlePacker) -> Self {
        Self { packer }
    }

    pub async fn open(&self, fingerprint: &str) -> Result<(File, u64)> {
        let path = self.packer.bundle_path(fingerprint);
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|_| CacheError::NotFound(fingerprint.to_string()))?;
        let file = File::open(&path)
            .await
            .map_err(|e| CacheError::storage(path, e))?;
        Ok((file, metadata.len()))
    }
}
