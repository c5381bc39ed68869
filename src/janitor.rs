//! Janitor: age-based sweep of `bundles/`. Never touches `objects/`
//! or `indexes/`; safe to run concurrently with serving.

use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing::warn;

/// Remove every `.zip` under `bundles/` whose mtime is older than `max_age`.
/// Returns the number removed. Deletion errors are logged and skipped.
pub fn sweep(cache_root: &Path, max_age: Duration) -> usize {
    let bundles_root = cache_root.join("bundles");
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in walkdir::WalkDir::new(&bundles_root)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("zip") {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = match metadata.modified() {
            Ok(m) => m,
            Err(_) => continue,
        };
        let age = match now.duration_since(modified) {
            Ok(age) => age,
            Err(_) => continue,
        };

        if age > max_age {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => removed += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "failed to remove expired bundle"),
            }
        }
    }

    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backdate(path: &Path, age: Duration) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let times = std::fs::FileTimes::new().set_modified(SystemTime::now() - age);
        file.set_times(times).unwrap();
    }

    #[test]
    fn sweep_removes_only_expired_zips_and_leaves_objects_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        let bundles = dir.path().join("bundles");
        let objects = dir.path().join("objects");
        std::fs::create_dir_all(&bundles).unwrap();
        std::fs::create_dir_all(&objects).unwrap();

        let stale = bundles.join("stale.zip");
        let fresh = bundles.join("fresh.zip");
        std::fs::write(&stale, b"old").unwrap();
        std::fs::write(&fresh, b"new").unwrap();
        std::fs::write(objects.join("kept"), b"blob").unwrap();

        backdate(&stale, Duration::from_secs(3600));

        let removed = sweep(dir.path(), Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(objects.join("kept").exists());
    }

    #[test]
    fn sweep_on_missing_bundles_dir_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(sweep(dir.path(), Duration::from_secs(60)), 0);
    }
}
