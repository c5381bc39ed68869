//! Streaming SHA-256 over fixed-size blocks.
//!
//! Used both for content-addressing individual blobs and for feeding the
//! bundle fingerprint (see [`crate::fingerprint`]), which requires the exact
//! same block size so that the digest is reproducible across hosts.

use std::io::Read;

use sha2::{Digest, Sha256};

/// Block size mandated by the bundle fingerprint encoding.
pub const BLOCK_SIZE: usize = 8 * 1024;

/// Hash a byte slice, returning its lowercase hex SHA-256 digest.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    for chunk in bytes.chunks(BLOCK_SIZE) {
        hasher.update(chunk);
    }
    hex(&hasher.finalize())
}

/// Hash a readable stream in fixed-size blocks, returning the digest and the
/// total number of bytes read.
pub fn hash_reader<R: Read>(mut reader: R) -> std::io::Result<(String, u64)> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; BLOCK_SIZE];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hex(&hasher.finalize()), total))
}

fn hex(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
