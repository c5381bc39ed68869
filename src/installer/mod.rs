//! Installer contract: a tagged variant over `{npm, composer}` rather
//! than the abstract-class polymorphism of the source. The Coordinator never
//! introspects a variant beyond its filenames, output root, and install fn.

pub mod composer;
pub mod npm;
pub mod sandbox;

use std::path::Path;

use crate::error::{CacheError, Result};

/// The two package managers this cache understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Manager {
    Npm,
    Composer,
}

impl Manager {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "npm" => Some(Self::Npm),
            "composer" => Some(Self::Composer),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Composer => "composer",
        }
    }

    pub fn manifest_name(self) -> &'static str {
        match self {
            Self::Npm => "package.json",
            Self::Composer => "composer.json",
        }
    }

    pub fn lockfile_name(self) -> &'static str {
        match self {
            Self::Npm => "package-lock.json",
            Self::Composer => "composer.lock",
        }
    }

    pub fn output_root(self) -> &'static str {
        match self {
            Self::Npm => "node_modules",
            Self::Composer => "vendor",
        }
    }
}

/// A single output file produced by an install, relative to `output_root`.
#[derive(Debug, Clone)]
pub struct InstalledFile {
    pub relative_path: String,
    pub content: Vec<u8>,
}

/// Result of running an installer to completion.
#[derive(Debug)]
pub enum InstallOutcome {
    Success { files: Vec<InstalledFile> },
    Failure { stderr: String },
}

/// Reject any path that is absolute, empty, or escapes its logical root via
/// `..`. An installer's output tree is not trusted by default; this check
/// runs on every file before it reaches the store.
pub fn sanitize_relative_path(path: &str) -> Result<()> {
    if path.is_empty() || path.starts_with('/') {
        return Err(CacheError::InvalidRequest(format!(
            "installer produced an unsafe path: {path}"
        )));
    }
    if path.split('/').any(|component| component == "..") {
        return Err(CacheError::InvalidRequest(format!(
            "installer produced a path escaping its root: {path}"
        )));
    }
    Ok(())
}

/// Walk `output_root` and collect every regular file as
/// `(path-relative-to-output_root, bytes)`, with forward-slash separators.
///
/// Symlinks are followed only when their target resolves inside
/// `output_root` (follow-inside-only); a symlink pointing outside
/// the tree is recorded using the literal bytes of its target path so no
/// external file's content ever enters a bundle.
pub(crate) fn collect_output_tree(output_root: &Path) -> Result<Vec<InstalledFile>> {
    if !output_root.exists() {
        return Ok(Vec::new());
    }

    let canonical_root = output_root
        .canonicalize()
        .map_err(|e| CacheError::storage(output_root, e))?;

    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(output_root).follow_links(false) {
        let entry = entry.map_err(|e| {
            CacheError::storage(
                output_root,
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;

        let relative = entry
            .path()
            .strip_prefix(output_root)
            .expect("walkdir yields paths under its root")
            .to_string_lossy()
            .replace('\\', "/");
        if relative.is_empty() {
            continue;
        }

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = std::fs::read_link(entry.path()).map_err(|e| CacheError::storage(entry.path(), e))?;
            let absolute_target = if target.is_absolute() {
                target
            } else {
                entry
                    .path()
                    .parent()
                    .expect("walkdir entries always have a parent")
                    .join(&target)
            };

            match absolute_target.canonicalize() {
                Ok(resolved) if resolved.starts_with(&canonical_root) && resolved.is_file() => {
                    let content = std::fs::read(&resolved).map_err(|e| CacheError::storage(&resolved, e))?;
                    files.push(InstalledFile {
                        relative_path: relative,
                        content,
                    });
                }
                _ => {
                    files.push(InstalledFile {
                        relative_path: relative,
                        content: target.to_string_lossy().into_owned().into_bytes(),
                    });
                }
            }
        } else if file_type.is_file() {
            let content = std::fs::read(entry.path()).map_err(|e| CacheError::storage(entry.path(), e))?;
            files.push(InstalledFile {
                relative_path: relative,
                content,
            });
        }
    }

    Ok(files)
}

/// The fixed flag set an installer runs under, named here once so the
/// native and sandboxed paths stay in lockstep.
pub(crate) fn shell_install_command(manager: Manager, has_lockfile: bool) -> String {
    match manager {
        Manager::Npm if has_lockfile => {
            "npm ci --ignore-scripts --no-audit --no-fund".to_string()
        }
        Manager::Npm => "npm install --ignore-scripts --no-audit --no-fund".to_string(),
        Manager::Composer => {
            "composer install --prefer-dist --no-scripts --no-interaction --optimize-autoloader"
                .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_absolute_and_dotdot_paths() {
        assert!(sanitize_relative_path("/etc/passwd").is_err());
        assert!(sanitize_relative_path("../outside").is_err());
        assert!(sanitize_relative_path("a/../../b").is_err());
        assert!(sanitize_relative_path("").is_err());
    }

    #[test]
    fn accepts_normal_relative_paths() {
        assert!(sanitize_relative_path("lodash/index.js").is_ok());
        assert!(sanitize_relative_path("a.b-c_d/e.txt").is_ok());
    }

    #[test]
    fn collects_regular_files_with_forward_slash_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules");
        std::fs::create_dir_all(root.join("lodash")).unwrap();
        std::fs::write(root.join("lodash/index.js"), b"module.exports = {};").unwrap();

        let files = collect_output_tree(&root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "lodash/index.js");
    }

    #[test]
    fn missing_output_root_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = collect_output_tree(&dir.path().join("node_modules")).unwrap();
        assert!(files.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_outside_root_records_literal_target() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules");
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink("/etc/passwd", root.join("escape")).unwrap();

        let files = collect_output_tree(&root).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].content, b"/etc/passwd");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_is_followed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("node_modules");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("real.js"), b"content").unwrap();
        std::os::unix::fs::symlink(root.join("real.js"), root.join("alias.js")).unwrap();

        let files = collect_output_tree(&root).unwrap();
        let alias = files.iter().find(|f| f.relative_path == "alias.js").unwrap();
        assert_eq!(alias.content, b"content");
    }
}
