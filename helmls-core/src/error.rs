//! Error taxonomy for provisioning and configuration.
//!
//! Every variant is fatal for the operation that produced it. Filesystem
//! errors while probing the cache never surface here; they are treated as a
//! cache miss by the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while locating, fetching or configuring the language servers.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The host OS/CPU pair has no release asset.
    #[error("Unsupported platform: {platform} on {arch}")]
    UnsupportedPlatform { platform: String, arch: String },

    /// A final (non-redirect) response was not a success.
    #[error("Download of {url} failed with status {status}")]
    Download { url: String, status: u16 },

    /// The redirect chain exceeded the configured bound.
    #[error("Too many redirects (more than {max}) while fetching {url}")]
    TooManyRedirects { url: String, max: u32 },

    /// The downloaded file does not hash to the published digest.
    #[error(
        "Checksum mismatch for {}\nExpected: {expected}\nActual:   {actual}\nThe download may be corrupted or tampered with.",
        path.display()
    )]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// The checksum manifest did not contain a usable digest.
    #[error("Malformed checksum manifest at {}", path.display())]
    MalformedChecksum { path: PathBuf },

    /// The user configured an executable path that is not a regular file.
    #[error("Configured helm-ls path does not point to a file: {}", path.display())]
    ExplicitPathInvalid { path: PathBuf },

    /// A URL failed validation (scheme, host or syntax).
    #[error("Invalid download URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport-level failure (connect, TLS, timeout, body stream).
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Filesystem failure outside of cache probing.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading or writing layered configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[source] anyhow::Error),

    /// Reading or writing persisted state failed.
    #[error("State store error: {0}")]
    State(#[source] anyhow::Error),
}

impl ProvisionError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = ProvisionError> = std::result::Result<T, E>;
