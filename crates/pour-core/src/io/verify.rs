//! SHA-256 verification of downloaded archives.

use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

use pour_schema::Sha256Digest;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        expected: Sha256Digest,
        actual: Sha256Digest,
    },
}

/// Compute the SHA-256 digest of a file (streaming).
pub fn sha256_file(path: &Path) -> std::io::Result<Sha256Digest> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 65536];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(Sha256Digest::from_bytes(hasher.finalize()))
}

/// Check that `path` hashes to `expected`.
pub fn verify_file(path: &Path, expected: &Sha256Digest) -> Result<Sha256Digest, VerifyError> {
    let actual = sha256_file(path)?;
    if &actual != expected {
        return Err(VerifyError::HashMismatch {
            expected: expected.clone(),
            actual,
        });
    }
    Ok(actual)
}
