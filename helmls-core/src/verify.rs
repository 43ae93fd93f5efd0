//! Checksum verification for downloaded release binaries.
//!
//! The manifest published next to each binary is a single line of the form
//! `<64 hex digits>  <file name>`; only the digest token is consumed.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{ProvisionError, Result};

/// Extracts the expected digest from a checksum manifest.
///
/// Returns `None` when the first whitespace-delimited token is not a
/// 64-character hex string.
pub fn parse_manifest_digest(manifest: &str) -> Option<String> {
    let token = manifest.split_whitespace().next()?;
    if token.len() == 64 && token.chars().all(|c| c.is_ascii_hexdigit()) {
        Some(token.to_ascii_lowercase())
    } else {
        None
    }
}

/// Computes the SHA256 of a file as lowercase hex.
pub async fn compute_sha256(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path).await.map_err(|e| {
        ProvisionError::io(
            format!("Failed to open file for checksum: {}", path.display()),
            e,
        )
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await.map_err(|e| {
            ProvisionError::io(
                format!("Failed to read file for checksum: {}", path.display()),
                e,
            )
        })?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format_sha256_hex(&hasher.finalize()))
}

/// Verifies `file` against the digest in the manifest at `manifest_path`.
///
/// # Errors
///
/// - [`ProvisionError::MalformedChecksum`] if the manifest has no digest.
/// - [`ProvisionError::ChecksumMismatch`] if the digests differ.
pub async fn verify_against_manifest(file: &Path, manifest_path: &Path) -> Result<()> {
    let manifest = tokio::fs::read_to_string(manifest_path).await.map_err(|e| {
        ProvisionError::io(
            format!("Failed to read checksum manifest: {}", manifest_path.display()),
            e,
        )
    })?;

    let expected =
        parse_manifest_digest(&manifest).ok_or_else(|| ProvisionError::MalformedChecksum {
            path: manifest_path.to_path_buf(),
        })?;

    verify_checksum(file, &expected).await
}

/// Verifies that a file hashes to `expected` (hex, any case).
pub async fn verify_checksum(file: &Path, expected: &str) -> Result<()> {
    let actual = compute_sha256(file).await?;
    let expected = expected.to_ascii_lowercase();

    if actual != expected {
        return Err(ProvisionError::ChecksumMismatch {
            path: file.to_path_buf(),
            expected,
            actual,
        });
    }

    debug!("SHA256 verified: {}", actual);
    Ok(())
}

fn format_sha256_hex(hash: &[u8]) -> String {
    hash.iter().map(|b| format!("{:02x}", b)).collect()
}
