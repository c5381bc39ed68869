//! Request/response DTOs for the coordinator's external boundary. These are the
//! values an HTTP layer would marshal; this crate stops at the façade.

use std::collections::BTreeMap;

/// Manifest may be empty only when the manager permits; lockfile may be
/// empty only for npm (triggers `install` rather than `ci`).
#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub manager: String,
    pub versions: BTreeMap<String, String>,
    pub manifest: Vec<u8>,
    pub lockfile: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheResponse {
    pub fingerprint: String,
    pub download_url: String,
    pub cache_hit: bool,
}
