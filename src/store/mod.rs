//! Content-addressed storage: blobs, their indexes, and packed bundles.
//! Three independent directories under the cache root, each
//! append-only and keyed by content hash or fingerprint.

pub mod blob;
pub mod index;
pub mod packer;

pub use blob::BlobStore;
pub use index::IndexStore;
pub use packer::BundlePacker;

use std::path::Path;

use crate::error::Result;

/// Open all three store components rooted at the same cache directory.
#[derive(Debug, Clone)]
pub struct Store {
    pub blobs: BlobStore,
    pub indexes: IndexStore,
    pub packer: BundlePacker,
}

impl Store {
    pub fn open(cache_root: &Path) -> Result<Self> {
        let blobs = BlobStore::open(cache_root)?;
        let indexes = IndexStore::open(cache_root)?;
        let packer = BundlePacker::open(cache_root, blobs.clone(), indexes.clone())?;
        Ok(Self {
            blobs,
            indexes,
            packer,
        })
    }
}
