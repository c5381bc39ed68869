//! Host tool checks, informational only: a missing `npm`/`composer`/`docker`
//! binary does not stop the server from starting, since a request for the
//! other manager (or one the sandbox handles) may still succeed.

use tracing::warn;

pub const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("npm", "npm"),
    ("composer", "composer"),
    ("docker", "container runtime"),
];

pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Log a warning for each known tool missing from `PATH`. Never fails.
pub fn warn_missing_tools() {
    for (cmd, label) in KNOWN_TOOLS {
        if !command_exists(cmd) {
            warn!(tool = *cmd, label = *label, "host tool not found on PATH; requests needing it will fail at install time");
        }
    }
}
