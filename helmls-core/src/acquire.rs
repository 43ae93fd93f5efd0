//! Acquisition pipeline for the helm-ls binary.
//!
//! ```text
//! CHECK_CACHE -> hit ------------------------------------------> DONE
//!             -> miss -> DOWNLOAD_BINARY -> DOWNLOAD_CHECKSUM -> VERIFY
//! VERIFY -> match -> SET_PERMISSIONS -> install -> WRITE_VERSION_MARKER -> DONE
//!        -> mismatch -> FAIL
//! ```
//!
//! The binary is staged next to its final location and only renamed into
//! place after verification, so a failed attempt leaves the previous cache
//! entry untouched. The whole pipeline runs under the cache lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ProvisionSettings;
use crate::downloader::{Downloader, Fetch};
use crate::error::{ProvisionError, Result};
use crate::platform::PlatformInfo;
use crate::release::{ReleaseAsset, ReleaseSource};
use crate::store::{make_executable, BinaryStore};
use crate::verify::verify_against_manifest;

/// Suffix for the staged, not yet verified binary.
const STAGING_SUFFIX: &str = ".download";

/// Fetches, verifies and caches a versioned release binary.
#[derive(Clone)]
pub struct Acquirer {
    store: BinaryStore,
    fetcher: Arc<dyn Fetch>,
    source: ReleaseSource,
}

impl Acquirer {
    pub fn new(store: BinaryStore, fetcher: Arc<dyn Fetch>, source: ReleaseSource) -> Self {
        Self {
            store,
            fetcher,
            source,
        }
    }

    /// Builds an acquirer that downloads over HTTPS per `settings`.
    pub fn from_settings(settings: &ProvisionSettings, store: BinaryStore) -> Result<Self> {
        let downloader = Downloader::new(settings.download_policy())?;
        Ok(Self::new(
            store,
            Arc::new(downloader),
            settings.release_source(),
        ))
    }

    pub fn store(&self) -> &BinaryStore {
        &self.store
    }

    pub fn source(&self) -> &ReleaseSource {
        &self.source
    }

    /// Returns a verified binary for `version`, downloading it if needed.
    pub async fn acquire(&self, version: &str, platform: &PlatformInfo) -> Result<PathBuf> {
        let tool = self.source.tool.as_str();
        let suffix = platform.executable_suffix;

        if let Some(path) = self.store.lookup(tool, suffix, version).await {
            info!(path = %path.display(), version, "Using cached helm-ls");
            return Ok(path);
        }

        let _lock = self.store.lock().await?;

        // Another activation may have finished while we waited.
        if let Some(path) = self.store.lookup(tool, suffix, version).await {
            info!(path = %path.display(), version, "Using helm-ls cached by a concurrent activation");
            return Ok(path);
        }

        let asset = self.source.asset(version, platform);
        let staging = self
            .store
            .root()
            .join(format!("{}{}", asset.binary_name, STAGING_SUFFIX));
        let checksum = self.store.root().join(&asset.checksum_name);
        let binary = self.store.binary_path(tool, suffix);

        info!(version, %platform, "Downloading helm-ls");
        let outcome = self.install(&asset, &staging, &checksum, &binary).await;

        remove_quietly(&staging).await;
        remove_quietly(&checksum).await;

        match &outcome {
            Ok(path) => info!(path = %path.display(), version, "helm-ls installed"),
            Err(e) => warn!(error = %e, version, "helm-ls acquisition failed"),
        }
        outcome
    }

    async fn install(
        &self,
        asset: &ReleaseAsset,
        staging: &Path,
        checksum: &Path,
        binary: &Path,
    ) -> Result<PathBuf> {
        let binary_url = self.source.download_url(&asset.version, &asset.binary_name)?;
        let checksum_url = self
            .source
            .download_url(&asset.version, &asset.checksum_name)?;

        // Binary first so its errors are reported ahead of the manifest's.
        self.fetcher.fetch(&binary_url, staging).await?;
        self.fetcher.fetch(&checksum_url, checksum).await?;

        verify_against_manifest(staging, checksum).await?;
        make_executable(staging)?;

        self.store.clear_version_marker().await?;
        tokio::fs::rename(staging, binary).await.map_err(|e| {
            ProvisionError::io(
                format!("Failed to move {} to {}", staging.display(), binary.display()),
                e,
            )
        })?;
        self.store.write_version_marker(&asset.version).await?;

        Ok(binary.to_path_buf())
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Failed to clean up");
        }
    }
}
