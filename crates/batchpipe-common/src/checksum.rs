//! Checksum utilities for artifact verification
//!
//! Uses SHA-256. A [`ContentDigest`] pairs the hash with the byte size so a
//! truncated file is rejected before hashing.

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;

/// Compute the SHA-256 checksum of bytes as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the SHA-256 checksum of a file as lowercase hex
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Size and SHA-256 of a piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDigest {
    pub size: u64,
    pub sha256: String,
}

impl ContentDigest {
    /// Digest of in-memory bytes
    pub fn of(data: &[u8]) -> Self {
        Self {
            size: data.len() as u64,
            sha256: sha256_hex(data),
        }
    }

    /// Digest of a file on disk
    pub fn of_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        Ok(Self {
            size,
            sha256: sha256_file(path)?,
        })
    }

    /// Verify that the file at `path` matches this digest
    pub fn verify_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        if size != self.size {
            return Err(CommonError::SizeMismatch {
                path: path.display().to_string(),
                expected: self.size,
                actual: size,
            });
        }

        let actual = sha256_file(path)?;
        if actual != self.sha256 {
            return Err(CommonError::ChecksumMismatch {
                path: path.display().to_string(),
                expected: self.sha256.clone(),
                actual,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_sha256_hex_empty() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_file_digest_matches_bytes() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"test data").unwrap();
        temp_file.flush().unwrap();

        let from_file = ContentDigest::of_file(temp_file.path()).unwrap();
        assert_eq!(from_file, ContentDigest::of(b"test data"));
        assert_eq!(from_file.size, 9);
        assert!(from_file.verify_file(temp_file.path()).is_ok());
    }

    #[test]
    fn test_verify_rejects_truncated_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"test").unwrap();
        temp_file.flush().unwrap();

        let expected = ContentDigest::of(b"test data");
        let err = expected.verify_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, CommonError::SizeMismatch { expected: 9, actual: 4, .. }));
    }

    #[test]
    fn test_verify_rejects_same_size_different_content() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"test dat4").unwrap();
        temp_file.flush().unwrap();

        let expected = ContentDigest::of(b"test data");
        let err = expected.verify_file(temp_file.path()).unwrap_err();
        assert!(matches!(err, CommonError::ChecksumMismatch { .. }));
    }
}
