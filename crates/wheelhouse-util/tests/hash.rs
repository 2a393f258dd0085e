use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use wheelhouse_util::hash::{sha256_bytes, sha256_file, verify_file_sha256, verify_sha256};

#[test]
fn test_sha256_bytes_empty() {
    assert_eq!(
        sha256_bytes(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn test_sha256_file_matches_bytes() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(b"hello").unwrap();
    tmp.flush().unwrap();
    assert_eq!(sha256_file(tmp.path()).unwrap(), sha256_bytes(b"hello"));
}

#[test]
fn test_sha256_file_not_found() {
    assert!(sha256_file(Path::new("/nonexistent/path/file.whl")).is_err());
}

#[test]
fn test_verify_sha256_accepts_uppercase_digest() {
    let digest = sha256_bytes(b"wheel").to_uppercase();
    assert!(verify_sha256(b"wheel", &digest, "pkg-1.0-py3-none-any.whl").is_ok());
}

#[test]
fn test_verify_sha256_mismatch() {
    let err = verify_sha256(b"wheel", "00", "pkg-1.0-py3-none-any.whl").unwrap_err();
    assert!(err.to_string().contains("SHA-256 mismatch"));
}


#[test]
fn test_verify_file_sha256_names_the_file() {
    let mut tmp = NamedTempFile::new().unwrap();
    tmp.write_all(b"wheel").unwrap();
    tmp.flush().unwrap();
    assert!(verify_file_sha256(tmp.path(), &sha256_bytes(b"wheel")).is_ok());

    let err = verify_file_sha256(tmp.path(), "00").unwrap_err();
    assert!(err.to_string().contains(&tmp.path().display().to_string()));
}
