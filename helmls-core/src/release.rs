//! Release asset naming.
//!
//! helm-ls publishes one raw binary per platform plus a sibling checksum
//! manifest:
//!
//! ```text
//! https://github.com/mrjosh/helm-ls/releases/download/v0.5.0/helm_ls_linux_amd64
//! https://github.com/mrjosh/helm-ls/releases/download/v0.5.0/helm_ls_linux_amd64.sha256sum
//! ```

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProvisionError, Result};
use crate::platform::PlatformInfo;

/// Base name of the helm-ls executable, without suffix.
pub const TOOL_NAME: &str = "helm_ls";

/// Version pinned by this release of the integration.
pub const DEFAULT_VERSION: &str = "v0.5.0";

/// Suffix appended to the binary name for the checksum manifest.
pub const CHECKSUM_SUFFIX: &str = ".sha256sum";

/// Where releases are published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSource {
    pub host: String,
    pub owner: String,
    pub repo: String,
    pub tool: String,
}

impl Default for ReleaseSource {
    fn default() -> Self {
        Self {
            host: "github.com".to_string(),
            owner: "mrjosh".to_string(),
            repo: "helm-ls".to_string(),
            tool: TOOL_NAME.to_string(),
        }
    }
}

impl ReleaseSource {
    /// Derives the asset pair for a version and platform.
    pub fn asset(&self, version: &str, platform: &PlatformInfo) -> ReleaseAsset {
        let binary_name = format!(
            "{}_{}_{}{}",
            self.tool,
            platform.platform.as_str(),
            platform.arch.as_str(),
            platform.executable_suffix
        );
        let checksum_name = format!("{binary_name}{CHECKSUM_SUFFIX}");
        ReleaseAsset {
            version: version.to_string(),
            binary_name,
            checksum_name,
        }
    }

    /// Builds the download URL for a file attached to a release.
    pub fn download_url(&self, version: &str, file_name: &str) -> Result<Url> {
        let raw = format!(
            "https://{}/{}/{}/releases/download/{}/{}",
            self.host, self.owner, self.repo, version, file_name
        );
        Url::parse(&raw).map_err(|e| ProvisionError::InvalidUrl {
            url: raw,
            reason: e.to_string(),
        })
    }
}

/// A platform-specific binary and its checksum manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub version: String,
    pub binary_name: String,
    pub checksum_name: String,
}
