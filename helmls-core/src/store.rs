//! On-disk cache for the downloaded helm-ls binary.
//!
//! Layout under the storage root:
//!
//! - `<root>/helm_ls[.exe]` - the verified binary
//! - `<root>/version` - plain-text version the binary was fetched for
//! - `<root>/.lock` - advisory lock serialising acquisitions
//!
//! Entries are overwritten by newer acquisitions and never deleted here.

use anyhow::Context;
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::probe::is_regular_file;

/// File holding the cached version string.
pub const VERSION_MARKER: &str = "version";

const LOCK_FILE: &str = ".lock";

/// Subdirectory of the user data directory used when no root is given.
const STORAGE_DIR: &str = "helm-ls";

/// Snapshot of what the cache currently holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    pub binary_path: PathBuf,
    pub version_marker_path: PathBuf,
    pub stored_version: Option<String>,
}

/// Owns the per-install cache directory.
#[derive(Debug, Clone)]
pub struct BinaryStore {
    root: PathBuf,
}

impl BinaryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns `<data dir>/helm-ls` (or the platform equivalent).
    pub fn default_root() -> anyhow::Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".local/share")))
            .context("Could not determine data directory")?;
        Ok(data_dir.join(STORAGE_DIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cached binary: `<root>/<tool><suffix>`.
    pub fn binary_path(&self, tool: &str, suffix: &str) -> PathBuf {
        self.root.join(format!("{tool}{suffix}"))
    }

    pub fn version_marker_path(&self) -> PathBuf {
        self.root.join(VERSION_MARKER)
    }

    /// Reads the version marker. Missing or unreadable markers yield `None`.
    pub async fn stored_version(&self) -> Option<String> {
        match tokio::fs::read_to_string(self.version_marker_path()).await {
            Ok(content) => Some(content.trim_end().to_string()),
            Err(e) => {
                debug!(error = %e, "No readable version marker");
                None
            }
        }
    }

    pub async fn record(&self, tool: &str, suffix: &str) -> CacheRecord {
        CacheRecord {
            binary_path: self.binary_path(tool, suffix),
            version_marker_path: self.version_marker_path(),
            stored_version: self.stored_version().await,
        }
    }

    /// Returns the cached binary if it exists and was fetched for `version`.
    pub async fn lookup(&self, tool: &str, suffix: &str, version: &str) -> Option<PathBuf> {
        let record = self.record(tool, suffix).await;

        if !is_regular_file(&record.binary_path).await {
            debug!(path = %record.binary_path.display(), "Cache miss: binary missing");
            return None;
        }

        match record.stored_version.as_deref() {
            Some(stored) if stored == version => Some(record.binary_path),
            other => {
                debug!(stored = ?other, wanted = version, "Cache miss: version mismatch");
                None
            }
        }
    }

    /// Writes the version marker. Called only after verification.
    pub async fn write_version_marker(&self, version: &str) -> Result<()> {
        let path = self.version_marker_path();
        tokio::fs::write(&path, version).await.map_err(|e| {
            ProvisionError::io(format!("Failed to write version marker {}", path.display()), e)
        })
    }

    /// Removes the version marker so a half-replaced binary never looks valid.
    pub async fn clear_version_marker(&self) -> Result<()> {
        let path = self.version_marker_path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionError::io(
                format!("Failed to remove version marker {}", path.display()),
                e,
            )),
        }
    }

    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            ProvisionError::io(format!("Failed to create directory: {}", self.root.display()), e)
        })
    }

    /// Takes the exclusive cache lock, waiting for other holders.
    ///
    /// The lock is released when the returned guard is dropped.
    pub async fn lock(&self) -> Result<CacheLock> {
        self.ensure_root().await?;
        let path = self.root.join(LOCK_FILE);

        let locked = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| ProvisionError::io("Cache lock task failed", std::io::Error::other(e)))?;

        let file = locked.map_err(|e| ProvisionError::io("Failed to lock cache directory", e))?;
        Ok(CacheLock { file })
    }
}

/// Guard for the cache directory lock.
#[derive(Debug)]
pub struct CacheLock {
    file: File,
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Marks a file executable for its owner (0o755 on Unix, no-op elsewhere).
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).map_err(|e| {
            ProvisionError::io(format!("Failed to get metadata for {}", path.display()), e)
        })?;

        let mut permissions = metadata.permissions();
        permissions.set_mode(permissions.mode() | 0o755);

        std::fs::set_permissions(path, permissions).map_err(|e| {
            ProvisionError::io(
                format!("Failed to set executable permission on {}", path.display()),
                e,
            )
        })?;

        debug!("Set executable permission on {}", path.display());
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let store = BinaryStore::new("/data/helm-ls");
        assert_eq!(
            store.binary_path("helm_ls", ""),
            PathBuf::from("/data/helm-ls/helm_ls")
        );
        assert_eq!(
            store.binary_path("helm_ls", ".exe"),
            PathBuf::from("/data/helm-ls/helm_ls.exe")
        );
        assert_eq!(
            store.version_marker_path(),
            PathBuf::from("/data/helm-ls/version")
        );
    }

    #[test]
    fn test_default_root_ends_with_storage_dir() {
        if let Ok(root) = BinaryStore::default_root() {
            assert!(root.ends_with("helm-ls"));
        }
    }

    #[tokio::test]
    async fn test_lookup_hit_requires_binary_and_matching_marker() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path());

        assert_eq!(store.lookup("helm_ls", "", "v0.5.0").await, None);

        std::fs::write(store.binary_path("helm_ls", ""), b"bin").unwrap();
        assert_eq!(store.lookup("helm_ls", "", "v0.5.0").await, None);

        store.write_version_marker("v0.4.0").await.unwrap();
        assert_eq!(store.lookup("helm_ls", "", "v0.5.0").await, None);

        store.write_version_marker("v0.5.0").await.unwrap();
        assert_eq!(
            store.lookup("helm_ls", "", "v0.5.0").await,
            Some(store.binary_path("helm_ls", ""))
        );
    }

    #[tokio::test]
    async fn test_marker_without_binary_is_miss() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path());
        store.write_version_marker("v0.5.0").await.unwrap();
        assert_eq!(store.lookup("helm_ls", "", "v0.5.0").await, None);
    }

    #[tokio::test]
    async fn test_unreadable_marker_is_miss_not_error() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path());
        std::fs::write(store.binary_path("helm_ls", ""), b"bin").unwrap();
        // A directory where the marker file should be cannot be read as text.
        std::fs::create_dir(store.version_marker_path()).unwrap();

        assert_eq!(store.stored_version().await, None);
        assert_eq!(store.lookup("helm_ls", "", "v0.5.0").await, None);
    }

    #[tokio::test]
    async fn test_marker_trailing_newline_is_tolerated() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path());
        std::fs::write(store.version_marker_path(), "v0.5.0\n").unwrap();
        assert_eq!(store.stored_version().await.as_deref(), Some("v0.5.0"));
    }

    #[tokio::test]
    async fn test_clear_version_marker_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path());
        store.clear_version_marker().await.unwrap();
        store.write_version_marker("v1").await.unwrap();
        store.clear_version_marker().await.unwrap();
        assert!(!store.version_marker_path().exists());
    }

    #[tokio::test]
    async fn test_lock_creates_root_and_can_be_retaken() {
        let tmp = TempDir::new().unwrap();
        let store = BinaryStore::new(tmp.path().join("cache"));
        {
            let _guard = store.lock().await.unwrap();
            assert!(store.root().exists());
        }
        let _again = store.lock().await.unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_make_executable() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let file_path = tmp.path().join("helm_ls");
        std::fs::write(&file_path, b"#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&file_path, std::fs::Permissions::from_mode(0o644)).unwrap();

        make_executable(&file_path).unwrap();

        let mode = std::fs::metadata(&file_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }
}
