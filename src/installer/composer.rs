//! Composer installer. Fixed flag set, scripts always disabled.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{CacheError, Result};

use super::{collect_output_tree, InstallOutcome, Manager};

pub async fn install(scratch_dir: &Path) -> Result<InstallOutcome> {
    let mut cmd = Command::new("composer");
    cmd.args([
        "install",
        "--prefer-dist",
        "--no-scripts",
        "--no-interaction",
        "--optimize-autoloader",
    ])
    .current_dir(scratch_dir)
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let output = cmd
        .output()
        .await
        .map_err(|e| CacheError::InstallFailure {
            stderr: format!("failed to spawn composer: {e}"),
        })?;

    if !output.status.success() {
        return Ok(InstallOutcome::Failure {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let files = collect_output_tree(&scratch_dir.join(Manager::Composer.output_root()))?;
    Ok(InstallOutcome::Success { files })
}
