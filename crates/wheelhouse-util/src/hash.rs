//! SHA-256 digests of distribution files, as published by package indexes.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::errors::WheelhouseError;

/// Lowercase hex SHA-256 of the file at `path`.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_bytes(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn check_digest(actual: String, expected: &str, what: &str) -> Result<(), WheelhouseError> {
    if actual.eq_ignore_ascii_case(expected.trim()) {
        return Ok(());
    }
    Err(WheelhouseError::Network {
        message: format!("SHA-256 mismatch for {what}: expected {expected}, got {actual}"),
    })
}

/// Check `data` against an index-advertised hex digest (case-insensitive).
/// `what` names the file in the error message.
pub fn verify_sha256(data: &[u8], expected: &str, what: &str) -> Result<(), WheelhouseError> {
    check_digest(sha256_bytes(data), expected, what)
}

/// Like [`verify_sha256`] for a file already on disk.
pub fn verify_file_sha256(path: &Path, expected: &str) -> Result<(), WheelhouseError> {
    check_digest(sha256_file(path)?, expected, &path.display().to_string())
}
