//! SHA-256 checksum utilities
//!
//! Two spellings are used across the workspace: bare hex (HTTP `sha256`
//! fields) and the prefixed `sha256:<hex>` digest form used by OCI.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::{Error, Result};

/// Prefix for digests in OCI form
pub const PREFIX: &str = "sha256:";

/// Compute the bare hex SHA-256 of a byte slice.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compute the `sha256:<hex>` digest of a byte slice.
pub fn digest_of(content: &[u8]) -> String {
    format!("{}{}", PREFIX, sha256_hex(content))
}

/// Compute the bare hex SHA-256 of a file, streaming its contents.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn file_sha256_hex(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file hashes to `expected` (bare hex or `sha256:` form).
///
/// # Errors
///
/// Returns [`Error::ChecksumMismatch`] when the digests differ.
pub fn verify_file(path: &Path, expected: &str) -> Result<()> {
    let expected = expected.trim().trim_start_matches(PREFIX).to_lowercase();
    let actual = file_sha256_hex(path)?;
    if actual != expected {
        return Err(Error::ChecksumMismatch {
            subject: path.display().to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}
