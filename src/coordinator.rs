//! Request Coordinator: fingerprint → lookup → single-flight →
//! version policy → install → store → pack → respond.

use std::collections::{BTreeMap, HashMap};

use tokio::sync::{watch, Mutex};
use tracing::{info, info_span, warn, Instrument};

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::fingerprint::{FingerprintFile, FingerprintInput};
use crate::installer::sandbox::SandboxInstaller;
use crate::installer::{self, composer, npm, InstallOutcome, InstalledFile, Manager};
use crate::request::{CacheRequest, CacheResponse};
use crate::store::Store;
use crate::version_policy::{self, InstallerChoice};

/// Collapses concurrent identical requests into a single holder per
/// fingerprint. The only process-wide mutable state in the system.
#[derive(Default)]
struct SingleFlight {
    slots: Mutex<HashMap<String, watch::Sender<()>>>,
}

impl SingleFlight {
    /// `None` means the caller became the holder; `Some(rx)` means another
    /// request holds the slot and the caller must wait then re-enter LOOKUP.
    async fn acquire(&self, fingerprint: &str) -> Option<watch::Receiver<()>> {
        let mut slots = self.slots.lock().await;
        if let Some(sender) = slots.get(fingerprint) {
            Some(sender.subscribe())
        } else {
            let (tx, _rx) = watch::channel(());
            slots.insert(fingerprint.to_string(), tx);
            None
        }
    }

    async fn release(&self, fingerprint: &str) {
        let mut slots = self.slots.lock().await;
        if let Some(sender) = slots.remove(fingerprint) {
            let _ = sender.send(());
        }
    }
}

pub struct Coordinator {
    config: Config,
    store: Store,
    sandbox: SandboxInstaller,
    single_flight: SingleFlight,
}

impl Coordinator {
    pub fn new(config: Config) -> Result<Self> {
        let store = Store::open(&config.cache_root)?;
        let sandbox = SandboxInstaller::new(config.sandbox_probe_timeout, config.sandbox_wall_clock_timeout);
        Ok(Self {
            config,
            store,
            sandbox,
            single_flight: SingleFlight::default(),
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The system's single public operation.
    pub async fn handle(&self, request: CacheRequest) -> Result<CacheResponse> {
        let manager = Manager::parse(&request.manager).ok_or_else(|| {
            CacheError::InvalidRequest(format!("unsupported manager: {}", request.manager))
        })?;
        validate_required_files(manager, &request)?;

        let fingerprint = fingerprint_of(manager, &request);
        let span = info_span!("cache_request", fingerprint = %fingerprint, manager = %manager.as_str());

        async {
            loop {
                if self.store.packer.bundle_path(&fingerprint).exists() {
                    info!("cache hit");
                    return Ok(self.respond(&fingerprint, true));
                }

                match self.single_flight.acquire(&fingerprint).await {
                    None => break,
                    Some(mut rx) => {
                        let _ = rx.changed().await;
                        continue;
                    }
                }
            }

            let result = self.install_and_store(manager, &request, &fingerprint).await;
            self.single_flight.release(&fingerprint).await;
            result.map(|()| self.respond(&fingerprint, false))
        }
        .instrument(span)
        .await
    }

    async fn install_and_store(
        &self,
        manager: Manager,
        request: &CacheRequest,
        fingerprint: &str,
    ) -> Result<()> {
        let choice = version_policy::decide(&self.config, &self.sandbox, &request.manager, &request.versions).await?;
        if choice == InstallerChoice::Sandboxed {
            warn!("falling back to sandboxed install");
        }

        let scratch = tempfile::Builder::new()
            .prefix("depcache-")
            .tempdir()
            .map_err(|e| CacheError::storage(std::env::temp_dir(), e))?;
        let scratch_path = scratch.path().to_path_buf();

        seed_scratch_dir(&scratch_path, manager, request).await?;

        let version_tag = version_tag(manager, &request.versions);
        let start = std::time::Instant::now();
        let outcome = match choice {
            InstallerChoice::Native => match manager {
                Manager::Npm => npm::install(&scratch_path).await,
                Manager::Composer => composer::install(&scratch_path).await,
            },
            InstallerChoice::Sandboxed => {
                let runtime_version = version_policy::effective_versions(manager, &request.versions).runtime;
                self.sandbox.install(manager, &runtime_version, &scratch_path).await
            }
        }?;
        info!(elapsed_ms = start.elapsed().as_millis() as u64, "install finished");

        let files = match outcome {
            InstallOutcome::Success { files } => files,
            InstallOutcome::Failure { stderr } => return Err(CacheError::InstallFailure { stderr }),
        };

        let store = self.store.clone();
        let manager_name = manager.as_str().to_string();
        let fingerprint = fingerprint.to_string();
        tokio::task::spawn_blocking(move || store_files(&store, &fingerprint, &manager_name, &version_tag, files))
            .await
            .map_err(|e| CacheError::storage(".", std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        Ok(())
    }

    fn respond(&self, fingerprint: &str, cache_hit: bool) -> CacheResponse {
        CacheResponse {
            fingerprint: fingerprint.to_string(),
            download_url: format!("/bundles/{fingerprint}.zip"),
            cache_hit,
        }
    }
}

/// Scratch-directory seeding is I/O but small and fixed-size; left on the
/// async runtime rather than the blocking pool, which is reserved for the
/// installer's own heavier file operations.
async fn seed_scratch_dir(dir: &std::path::Path, manager: Manager, request: &CacheRequest) -> Result<()> {
    if !request.manifest.is_empty() {
        tokio::fs::write(dir.join(manager.manifest_name()), &request.manifest)
            .await
            .map_err(|e| CacheError::storage(dir, e))?;
    }
    if !request.lockfile.is_empty() {
        tokio::fs::write(dir.join(manager.lockfile_name()), &request.lockfile)
            .await
            .map_err(|e| CacheError::storage(dir, e))?;
    }
    Ok(())
}

/// Blob writes, index publication, and packing all touch the filesystem
/// synchronously; run on the blocking pool so a slow install never starves
/// the async runtime's worker threads.
fn store_files(
    store: &Store,
    fingerprint: &str,
    manager: &str,
    version_tag: &str,
    files: Vec<InstalledFile>,
) -> Result<()> {
    let mut mapping = BTreeMap::new();
    for file in files {
        installer::sanitize_relative_path(&file.relative_path)?;
        let hash = store.blobs.put(&file.content)?;
        mapping.insert(file.relative_path, hash);
    }
    store.indexes.save(fingerprint, manager, version_tag, &mapping)?;
    store.packer.pack(fingerprint)?;
    Ok(())
}

/// Manifest may be empty only when the manager permits; lockfile may be
/// empty only for npm, where it triggers `install` rather than `ci`.
/// Composer always needs both files present.
fn validate_required_files(manager: Manager, request: &CacheRequest) -> Result<()> {
    if request.manifest.is_empty() {
        return Err(CacheError::InvalidRequest(format!(
            "{} requires a non-empty manifest",
            manager.as_str()
        )));
    }
    if manager == Manager::Composer && request.lockfile.is_empty() {
        return Err(CacheError::InvalidRequest(
            "composer requires a non-empty lockfile".to_string(),
        ));
    }
    Ok(())
}

fn fingerprint_of(manager: Manager, request: &CacheRequest) -> String {
    let files = vec![
        FingerprintFile {
            relative_path: manager.manifest_name().to_string(),
            content: request.manifest.clone(),
        },
        FingerprintFile {
            relative_path: manager.lockfile_name().to_string(),
            content: request.lockfile.clone(),
        },
    ];
    FingerprintInput::new(manager.as_str(), request.versions.clone(), files).fingerprint()
}

/// The manager-specific serialisation used only for index-filename
/// readability; the fingerprint already binds versions.
fn version_tag(manager: Manager, versions: &BTreeMap<String, String>) -> String {
    let effective = version_policy::effective_versions(manager, versions);
    match manager {
        Manager::Npm => format!(
            "{}_{}",
            effective.runtime,
            effective.package_manager.unwrap_or_default()
        ),
        Manager::Composer => effective.runtime,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> CacheRequest {
        let mut versions = BTreeMap::new();
        versions.insert("node".to_string(), "18.0.0".to_string());
        versions.insert("npm".to_string(), "9.0.0".to_string());
        CacheRequest {
            manager: "npm".to_string(),
            versions,
            manifest: br#"{"name":"t"}"#.to_vec(),
            lockfile: br#"{"lockfileVersion":2}"#.to_vec(),
        }
    }

    #[tokio::test]
    async fn unknown_manager_rejected_without_touching_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache_root = dir.path().to_path_buf();
        let coordinator = Coordinator::new(config).unwrap();

        let mut req = request();
        req.manager = "pip".to_string();
        let err = coordinator.handle(req).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn composer_with_empty_manifest_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache_root = dir.path().to_path_buf();
        let coordinator = Coordinator::new(config).unwrap();

        let mut req = request();
        req.manager = "composer".to_string();
        req.manifest = Vec::new();
        req.lockfile = br#"{"content-hash":"abc"}"#.to_vec();
        let err = coordinator.handle(req).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn composer_with_empty_lockfile_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache_root = dir.path().to_path_buf();
        let coordinator = Coordinator::new(config).unwrap();

        let mut req = request();
        req.manager = "composer".to_string();
        req.manifest = br#"{"require":{}}"#.to_vec();
        req.lockfile = Vec::new();
        let err = coordinator.handle(req).await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidRequest(_)));
    }

    #[test]
    fn sandboxed_install_uses_runtime_version_not_combined_tag() {
        let mut versions = BTreeMap::new();
        versions.insert("node".to_string(), "18.0.0".to_string());
        versions.insert("npm".to_string(), "9.0.0".to_string());

        let combined = version_tag(Manager::Npm, &versions);
        assert_eq!(combined, "18.0.0_9.0.0");

        let runtime = version_policy::effective_versions(Manager::Npm, &versions).runtime;
        assert_eq!(runtime, "18.0.0");
        assert_ne!(runtime, combined);
    }

    #[tokio::test]
    async fn unsupported_version_rejected_without_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.cache_root = dir.path().to_path_buf();
        let coordinator = Coordinator::new(config).unwrap();

        let mut req = request();
        req.versions.insert("node".to_string(), "14.0.0".to_string());
        let err = coordinator.handle(req).await.unwrap_err();
        assert!(matches!(err, CacheError::UnsupportedVersion { .. }));
    }

    #[tokio::test]
    async fn single_flight_serializes_same_fingerprint() {
        static ENTER_COUNT: AtomicUsize = AtomicUsize::new(0);
        ENTER_COUNT.store(0, Ordering::SeqCst);

        let sf = SingleFlight::default();
        let fp = "a".repeat(64);

        let first = sf.acquire(&fp).await;
        assert!(first.is_none(), "first caller becomes the holder");

        let second = sf.acquire(&fp).await;
        assert!(second.is_some(), "second caller must wait");

        sf.release(&fp).await;

        let mut rx = second.unwrap();
        rx.changed().await.unwrap();
    }
}
