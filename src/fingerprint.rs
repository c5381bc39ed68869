//! Bundle fingerprint: the canonical, byte-for-byte identity of a request.
//!
//! The encoding is part of the protocol: manager name,
//! then declared version fields in a fixed order, then files sorted by
//! relative path, each fed through the hasher in blocks. NUL bytes separate
//! fields; there is no JSON or length-prefixing anywhere in this path.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::hash::BLOCK_SIZE;

/// Version fields considered, in the exact order the fingerprint requires.
const VERSION_FIELD_ORDER: &[&str] = &["node", "npm", "php"];

/// A single input file to be folded into the fingerprint.
#[derive(Debug, Clone)]
pub struct FingerprintFile {
    pub relative_path: String,
    pub content: Vec<u8>,
}

/// Everything the fingerprint is a function of.
#[derive(Debug, Clone)]
pub struct FingerprintInput {
    pub manager: String,
    pub versions: BTreeMap<String, String>,
    pub files: Vec<FingerprintFile>,
}

impl FingerprintInput {
    pub fn new(
        manager: impl Into<String>,
        versions: BTreeMap<String, String>,
        files: Vec<FingerprintFile>,
    ) -> Self {
        Self {
            manager: manager.into(),
            versions,
            files,
        }
    }

    /// Compute the 64-hex SHA-256 bundle fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(self.manager.as_bytes());
        hasher.update([0u8]);

        for field in VERSION_FIELD_ORDER {
            if let Some(value) = self.versions.get(*field) {
                hasher.update(format!("{field}:{value}").as_bytes());
                hasher.update([0u8]);
            }
        }

        let mut sorted_files: Vec<&FingerprintFile> = self.files.iter().collect();
        sorted_files.sort_by(|a, b| a.relative_path.as_bytes().cmp(b.relative_path.as_bytes()));

        for file in sorted_files {
            hasher.update(file.relative_path.as_bytes());
            hasher.update([0u8]);
            for chunk in file.content.chunks(BLOCK_SIZE) {
                hasher.update(chunk);
            }
            hasher.update([0u8]);
        }

        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(files: Vec<FingerprintFile>) -> FingerprintInput {
        let mut versions = BTreeMap::new();
        versions.insert("node".to_string(), "18.0.0".to_string());
        versions.insert("npm".to_string(), "9.0.0".to_string());
        FingerprintInput::new("npm", versions, files)
    }

    fn manifest_and_lock() -> Vec<FingerprintFile> {
        vec![
            FingerprintFile {
                relative_path: "package.json".to_string(),
                content: br#"{"name":"t"}"#.to_vec(),
            },
            FingerprintFile {
                relative_path: "package-lock.json".to_string(),
                content: br#"{"lockfileVersion":2}"#.to_vec(),
            },
        ]
    }

    #[test]
    fn deterministic_across_runs() {
        let a = sample(manifest_and_lock()).fingerprint();
        let b = sample(manifest_and_lock()).fingerprint();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn sort_invariant_to_insertion_order() {
        let mut files = manifest_and_lock();
        let forward = sample(files.clone()).fingerprint();
        files.reverse();
        let reversed = sample(files).fingerprint();
        assert_eq!(forward, reversed);
    }

    #[test]
    fn differs_on_manager() {
        let npm = sample(manifest_and_lock()).fingerprint();
        let mut composer = sample(manifest_and_lock());
        composer.manager = "composer".to_string();
        assert_ne!(npm, composer.fingerprint());
    }

    #[test]
    fn differs_on_version_field() {
        let a = sample(manifest_and_lock()).fingerprint();
        let mut input = sample(manifest_and_lock());
        input.versions.insert("node".to_string(), "20.0.0".to_string());
        assert_ne!(a, input.fingerprint());
    }

    #[test]
    fn differs_on_file_path() {
        let a = sample(manifest_and_lock()).fingerprint();
        let mut files = manifest_and_lock();
        files[0].relative_path = "package2.json".to_string();
        assert_ne!(a, sample(files).fingerprint());
    }

    #[test]
    fn differs_on_file_byte() {
        let a = sample(manifest_and_lock()).fingerprint();
        let mut files = manifest_and_lock();
        files[0].content.push(b'!');
        assert_ne!(a, sample(files).fingerprint());
    }

    #[test]
    fn absent_version_field_contributes_nothing() {
        let mut versions = BTreeMap::new();
        versions.insert("php".to_string(), "8.3.0".to_string());
        let input = FingerprintInput::new("composer", versions, manifest_and_lock());
        // composer.lock/composer.json would normally be the files; this test only
        // checks that an absent `npm`/`node` field does not change the digest
        // relative to an identical input with those keys simply missing.
        let clone = input.clone();
        assert_eq!(input.fingerprint(), clone.fingerprint());
    }
}
