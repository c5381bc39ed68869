//! npm installer. Scripts are always disabled; the generated lockfile
//! is folded into the result when the request omitted one.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{CacheError, Result};

use super::{collect_output_tree, InstallOutcome, InstalledFile, Manager};

pub async fn install(scratch_dir: &Path) -> Result<InstallOutcome> {
    let lockfile_path = scratch_dir.join(Manager::Npm.lockfile_name());
    let had_lockfile = std::fs::metadata(&lockfile_path)
        .map(|m| m.len() > 0)
        .unwrap_or(false);

    let mut cmd = Command::new("npm");
    cmd.arg(if had_lockfile { "ci" } else { "install" })
        .args(["--ignore-scripts", "--no-audit", "--no-fund"])
        .current_dir(scratch_dir)
        .env("NODE_ENV", "production")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| CacheError::InstallFailure {
            stderr: format!("failed to spawn npm: {e}"),
        })?;

    if !output.status.success() {
        return Ok(InstallOutcome::Failure {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let mut files = collect_output_tree(&scratch_dir.join(Manager::Npm.output_root()))?;

    if !had_lockfile {
        if let Ok(generated) = std::fs::read(&lockfile_path) {
            files.push(InstalledFile {
                relative_path: Manager::Npm.lockfile_name().to_string(),
                content: generated,
            });
        }
    }

    Ok(InstallOutcome::Success { files })
}
