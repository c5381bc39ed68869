//! Sandboxed installer: same contract, executed inside a pinned
//! container image when the host lacks the requested tool versions.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{CacheError, Result};

use super::{collect_output_tree, shell_install_command, InstallOutcome, Manager};

const CONTAINER_RUNTIME: &str = "docker";
const BIND_PATH: &str = "/app";

/// Cached per-process until explicitly invalidated.
static RUNTIME_AVAILABLE: OnceLock<bool> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct SandboxInstaller {
    probe_timeout: Duration,
    wall_clock_timeout: Duration,
}

impl SandboxInstaller {
    pub fn new(probe_timeout: Duration, wall_clock_timeout: Duration) -> Self {
        Self {
            probe_timeout,
            wall_clock_timeout,
        }
    }

    pub async fn is_available(&self) -> bool {
        if let Some(available) = RUNTIME_AVAILABLE.get() {
            return *available;
        }

        let probe = Command::new(CONTAINER_RUNTIME)
            .arg("info")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        let available = match tokio::time::timeout(self.probe_timeout, probe).await {
            Ok(Ok(status)) => status.success(),
            _ => false,
        };

        // Two concurrent probes may both run this branch; they agree on the
        // same outcome for the same host, so the lost race is harmless.
        let _ = RUNTIME_AVAILABLE.set(available);
        available
    }

    pub async fn install(
        &self,
        manager: Manager,
        version_tag: &str,
        scratch_dir: &Path,
    ) -> Result<InstallOutcome> {
        if !self.is_available().await {
            return Err(CacheError::SandboxUnavailable(
                "container runtime unreachable".to_string(),
            ));
        }

        let tag = validate_image_tag(version_tag)?;
        let image = match manager {
            Manager::Npm => format!("node:{tag}-alpine"),
            Manager::Composer => format!("composer:{tag}"),
        };

        let lockfile = scratch_dir.join(manager.lockfile_name());
        let had_lockfile = std::fs::metadata(&lockfile)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        let install_cmd = shell_install_command(manager, had_lockfile);

        let mount = format!("{}:{BIND_PATH}", scratch_dir.display());
        let mut cmd = Command::new(CONTAINER_RUNTIME);
        cmd.args([
            "run",
            "--rm",
            "-v",
            &mount,
            "-w",
            BIND_PATH,
            &image,
            "sh",
            "-c",
            &install_cmd,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

        let output = match tokio::time::timeout(self.wall_clock_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CacheError::InstallFailure {
                    stderr: format!("failed to spawn {CONTAINER_RUNTIME}: {e}"),
                })
            }
            Err(_) => {
                return Err(CacheError::InstallFailure {
                    stderr: format!(
                        "sandboxed install exceeded {}s wall clock",
                        self.wall_clock_timeout.as_secs()
                    ),
                })
            }
        };

        if !output.status.success() {
            return Ok(InstallOutcome::Failure {
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let files = collect_output_tree(&scratch_dir.join(manager.output_root()))?;
        Ok(InstallOutcome::Success { files })
    }
}

/// Version strings are interpolated into an image tag; reject anything that
/// could act as a shell metacharacter once that tag reaches `sh -c`.
fn validate_image_tag(tag: &str) -> Result<&str> {
    let safe = !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if safe {
        Ok(tag)
    } else {
        Err(CacheError::InvalidRequest(format!(
            "unsafe version tag: {tag}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_tags_with_shell_metacharacters() {
        assert!(validate_image_tag("18.0.0; rm -rf /").is_err());
        assert!(validate_image_tag("$(whoami)").is_err());
        assert!(validate_image_tag("").is_err());
    }

    #[test]
    fn accepts_ordinary_version_tags() {
        assert!(validate_image_tag("18.0.0").is_ok());
        assert!(validate_image_tag("8.3.0-alpine").is_ok());
    }
}
