//! Provisioning settings.
//!
//! Settings are persisted to the SQLite database as JSON.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::downloader::{DownloadPolicy, DEFAULT_ALLOWED_HOSTS, DEFAULT_MAX_REDIRECTS};
use crate::release::{ReleaseSource, DEFAULT_VERSION, TOOL_NAME};

/// Database key the settings are stored under.
pub const SETTINGS_KEY: &str = "provision_settings";

// =============================================================================
// Provision Settings
// =============================================================================

/// Where and how helm-ls is fetched - persisted to database as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionSettings {
    /// Release host (e.g., "github.com").
    pub host: String,

    pub owner: String,

    pub repo: String,

    /// Executable base name, also the release asset prefix.
    pub tool: String,

    /// Pinned release tag (e.g., "v0.5.0").
    pub version: String,

    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Whole-request timeout in seconds, body included.
    pub request_timeout_secs: u64,

    /// Maximum redirect hops per download.
    pub max_redirects: u32,

    /// Hosts (and subdomains) downloads may be served from.
    pub allowed_hosts: Vec<String>,
}

impl Default for ProvisionSettings {
    fn default() -> Self {
        let source = ReleaseSource::default();
        Self {
            host: source.host,
            owner: source.owner,
            repo: source.repo,
            tool: TOOL_NAME.to_string(),
            version: DEFAULT_VERSION.to_string(),
            connect_timeout_secs: 15,
            request_timeout_secs: 300,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            allowed_hosts: DEFAULT_ALLOWED_HOSTS.iter().map(|h| h.to_string()).collect(),
        }
    }
}

impl ProvisionSettings {
    /// Load settings from database, using defaults for missing values.
    ///
    /// If settings don't exist or can't be parsed, returns defaults.
    pub fn load(db: &crate::db::Database) -> Self {
        let mut settings = Self::default();

        if let Ok(Some(json)) = db.get_setting(SETTINGS_KEY) {
            match serde_json::from_str::<ProvisionSettings>(&json) {
                Ok(loaded) => settings = loaded,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse provision settings, using defaults");
                }
            }
        }

        settings.validate();
        settings
    }

    /// Save settings to database.
    pub fn save(&self, db: &crate::db::Database) -> anyhow::Result<()> {
        let json = serde_json::to_string(self)?;
        db.set_setting(SETTINGS_KEY, &json)?;
        Ok(())
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.max_redirects = self.max_redirects.clamp(1, 20);
        self.connect_timeout_secs = self.connect_timeout_secs.clamp(1, 300);
        self.request_timeout_secs = self.request_timeout_secs.clamp(5, 3600);

        let defaults = Self::default();
        if self.host.trim().is_empty() {
            self.host = defaults.host;
        }
        if self.tool.trim().is_empty() {
            self.tool = defaults.tool;
        }
        if self.version.trim().is_empty() {
            self.version = defaults.version;
        }
        if self.allowed_hosts.is_empty() {
            self.allowed_hosts = defaults.allowed_hosts;
        }
    }

    pub fn release_source(&self) -> ReleaseSource {
        ReleaseSource {
            host: self.host.clone(),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            tool: self.tool.clone(),
        }
    }

    pub fn download_policy(&self) -> DownloadPolicy {
        DownloadPolicy {
            allowed_hosts: self.allowed_hosts.clone(),
            allow_plain_http: false,
            max_redirects: self.max_redirects,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }
}
