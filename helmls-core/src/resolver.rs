//! Top-level policy for locating the helm-ls executable.
//!
//! Precedence, first success wins:
//!
//! 1. `helm-ls.path` from any configuration scope. An invalid explicit path
//!    is a hard error; nothing else is tried.
//! 2. `helm_ls` on the search path.
//! 3. A verified copy from the release cache, downloaded if needed.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::acquire::Acquirer;
use crate::config::{ConfigurationStore, EXECUTABLE_PATH_KEY};
use crate::error::{ProvisionError, Result};
use crate::platform::PlatformInfo;
use crate::probe::{is_regular_file, SearchPath};

/// How the executable was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutableSource {
    Configured,
    SearchPath,
    Cache,
}

impl fmt::Display for ExecutableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => write!(f, "configuration"),
            Self::SearchPath => write!(f, "search path"),
            Self::Cache => write!(f, "release cache"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedExecutable {
    pub path: PathBuf,
    pub source: ExecutableSource,
}

/// Resolves the helm-ls executable once per activation.
pub struct ExecutableResolver {
    config: Arc<dyn ConfigurationStore>,
    search_path: SearchPath,
    acquirer: Acquirer,
    version: String,
    platform: Option<PlatformInfo>,
}

impl ExecutableResolver {
    pub fn new(
        config: Arc<dyn ConfigurationStore>,
        acquirer: Acquirer,
        version: impl Into<String>,
    ) -> Self {
        Self {
            config,
            search_path: SearchPath::from_env(),
            acquirer,
            version: version.into(),
            platform: None,
        }
    }

    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Overrides host detection for the download step.
    pub fn with_platform(mut self, platform: PlatformInfo) -> Self {
        self.platform = Some(platform);
        self
    }

    pub async fn resolve(&self) -> Result<ResolvedExecutable> {
        if let Some(path) = self.configured_path().await? {
            if !is_regular_file(&path).await {
                return Err(ProvisionError::ExplicitPathInvalid { path });
            }
            info!(path = %path.display(), "Using helm-ls from {}", EXECUTABLE_PATH_KEY);
            return Ok(ResolvedExecutable {
                path,
                source: ExecutableSource::Configured,
            });
        }

        let tool = self.acquirer.source().tool.as_str();
        if let Some(path) = self.search_path.find(tool).await {
            info!(path = %path.display(), "Using helm-ls from search path");
            return Ok(ResolvedExecutable {
                path,
                source: ExecutableSource::SearchPath,
            });
        }

        let platform = match self.platform {
            Some(platform) => platform,
            None => PlatformInfo::detect()?,
        };
        let path = self.acquirer.acquire(&self.version, &platform).await?;
        Ok(ResolvedExecutable {
            path,
            source: ExecutableSource::Cache,
        })
    }

    /// Reads `helm-ls.path`. Any scope counts; an empty string is unset.
    async fn configured_path(&self) -> Result<Option<PathBuf>> {
        let inspection = self.config.inspect(EXECUTABLE_PATH_KEY).await?;
        match inspection.effective() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => Ok(Some(PathBuf::from(s))),
            Some(other) => Err(ProvisionError::Config(anyhow::anyhow!(
                "{} must be a string, got {}",
                EXECUTABLE_PATH_KEY,
                other
            ))),
        }
    }
}
