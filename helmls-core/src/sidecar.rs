//! yaml-language-server command resolution and write-back.
//!
//! helm-ls delegates plain YAML features to yaml-language-server. This
//! module finds a launch command for it and, when safe, stores that command
//! in the global `helm-ls.yamlls.path` setting so helm-ls picks it up.
//!
//! A value is only ever written when the persisted [`ManagedConfigState`]
//! says this crate owns the key. Workspace and folder scopes are never
//! touched, and a global value that no longer looks like one of ours is
//! left alone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{ConfigurationStore, SIDECAR_PATH_KEY};
use crate::db::StateStore;
use crate::error::{ProvisionError, Result};
use crate::probe::{is_regular_file, SearchPath};

/// Executable name probed on the search path.
pub const SIDECAR_EXECUTABLE: &str = "yaml-language-server";

/// Extension shipping a bundled yaml-language-server.
pub const YAML_EXTENSION_ID: &str = "redhat.vscode-yaml";

/// Bundle location inside the YAML extension.
pub const BUNDLE_RELATIVE_PATH: &str = "dist/languageserver.js";

/// Interpreter used for the bundled server.
pub const LAUNCHER: &str = "node";

/// State key holding [`ManagedConfigState`].
pub const MANAGED_STATE_KEY: &str = "helm-ls.yamlls.path.managed";

// ============================================================================
// Command
// ============================================================================

/// Launch command for yaml-language-server as stored in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SidecarCommand {
    /// A single executable path or name.
    Single(String),
    /// A program followed by its arguments.
    Argv(Vec<String>),
}

impl SidecarCommand {
    /// Single-element argv written before a real location was known.
    pub fn placeholder() -> Self {
        Self::Argv(vec![SIDECAR_EXECUTABLE.to_string()])
    }

    /// Decodes a configuration value.
    ///
    /// Returns `None` for anything other than a non-empty string or a
    /// non-empty array of strings.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self::Single(s.clone())),
            Value::Array(items) if !items.is_empty() => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .map(Self::Argv),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Self::Single(s) => Value::String(s.clone()),
            Self::Argv(argv) => Value::Array(argv.iter().cloned().map(Value::String).collect()),
        }
    }

    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Single(s) => vec![s.clone()],
            Self::Argv(argv) => argv.clone(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self == Self::placeholder()
    }

    /// True for values this crate writes: the placeholder, or
    /// `["node", <path inside a redhat.vscode-yaml-<version> folder>]`.
    pub fn matches_own_pattern(&self) -> bool {
        if self.is_placeholder() {
            return true;
        }
        match self {
            Self::Argv(argv) => matches!(
                argv.as_slice(),
                [launcher, bundle]
                    if launcher == LAUNCHER && is_inside_extension_dir(Path::new(bundle))
            ),
            Self::Single(_) => false,
        }
    }
}

impl fmt::Display for SidecarCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

fn is_inside_extension_dir(path: &Path) -> bool {
    let prefix = format!("{YAML_EXTENSION_ID}-");
    path.ancestors()
        .filter_map(|p| p.file_name())
        .any(|name| name.to_string_lossy().starts_with(&prefix))
}

// ============================================================================
// Managed state
// ============================================================================

/// Records whether the global sidecar setting was written by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManagedConfigState {
    pub managed: bool,
    #[serde(rename = "lastKnownPath")]
    pub last_known: Option<SidecarCommand>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ManagedConfigState {
    pub fn load(state: &dyn StateStore) -> Result<Self> {
        match state.get(MANAGED_STATE_KEY).map_err(ProvisionError::State)? {
            Some(value) => Ok(serde_json::from_value(value).unwrap_or_else(|e| {
                warn!(error = %e, "Unreadable managed state, treating value as user-authored");
                Self::default()
            })),
            None => Ok(Self::default()),
        }
    }

    fn mark_managed(state: &dyn StateStore, command: &SidecarCommand) -> Result<Self> {
        let record = Self {
            managed: true,
            last_known: Some(command.clone()),
            updated_at: Some(Utc::now()),
        };
        let value = serde_json::to_value(&record)
            .map_err(|e| ProvisionError::State(anyhow::Error::new(e)))?;
        state
            .update(MANAGED_STATE_KEY, Some(value))
            .map_err(ProvisionError::State)?;
        Ok(record)
    }
}

// ============================================================================
// Sibling extensions
// ============================================================================

/// Looks up installed editor extensions.
#[async_trait]
pub trait ExtensionRegistry: Send + Sync {
    /// Install directory of extension `id` (`publisher.name`), if present.
    async fn extension_path(&self, id: &str) -> Option<PathBuf>;
}

/// Extensions installed as `<root>/<publisher.name>-<version>` folders.
#[derive(Debug, Clone)]
pub struct ExtensionsDir {
    root: PathBuf,
}

impl ExtensionsDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `~/.vscode/extensions`, if a home directory is known.
    pub fn default_root() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".vscode").join("extensions"))
    }
}

#[async_trait]
impl ExtensionRegistry for ExtensionsDir {
    async fn extension_path(&self, id: &str) -> Option<PathBuf> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %self.root.display(), error = %e, "No extensions directory");
                return None;
            }
        };

        let prefix = format!("{id}-");
        let mut best: Option<(semver::Version, PathBuf)> = None;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(raw_version) = name.strip_prefix(&prefix) else {
                continue;
            };
            let Ok(version) = semver::Version::parse(raw_version) else {
                debug!(folder = %name, "Skipping extension folder with unparsable version");
                continue;
            };
            if best.as_ref().map_or(true, |(v, _)| version > *v) {
                best = Some((version, entry.path()));
            }
        }

        best.map(|(_, path)| path)
    }
}

// ============================================================================
// Configurator
// ============================================================================

/// What [`SidecarConfigurator::configure`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SidecarOutcome {
    /// A workspace or folder scope sets the key.
    UserScoped(Option<SidecarCommand>),
    /// No value existed; one was found and written.
    Written(SidecarCommand),
    /// Our earlier value was replaced by a newer location.
    Refreshed(SidecarCommand),
    /// Our earlier value is still current.
    Unchanged(SidecarCommand),
    /// The global value belongs to the user.
    UserAuthored(Option<SidecarCommand>),
    /// Nothing is configured and nothing could be found.
    NotFound,
}

impl SidecarOutcome {
    /// The command in effect after configuration.
    pub fn command(&self) -> Option<&SidecarCommand> {
        match self {
            Self::UserScoped(command) | Self::UserAuthored(command) => command.as_ref(),
            Self::Written(command) | Self::Refreshed(command) | Self::Unchanged(command) => {
                Some(command)
            }
            Self::NotFound => None,
        }
    }
}

/// Resolves and persists the yaml-language-server launch command.
pub struct SidecarConfigurator {
    config: Arc<dyn ConfigurationStore>,
    state: Arc<dyn StateStore>,
    extensions: Arc<dyn ExtensionRegistry>,
    search_path: SearchPath,
}

impl SidecarConfigurator {
    pub fn new(
        config: Arc<dyn ConfigurationStore>,
        state: Arc<dyn StateStore>,
        extensions: Arc<dyn ExtensionRegistry>,
    ) -> Self {
        Self {
            config,
            state,
            extensions,
            search_path: SearchPath::from_env(),
        }
    }

    pub fn with_search_path(mut self, search_path: SearchPath) -> Self {
        self.search_path = search_path;
        self
    }

    /// Finds yaml-language-server: search path first, then the bundle
    /// shipped with the YAML extension.
    pub async fn locate(&self) -> Option<SidecarCommand> {
        if let Some(path) = self.search_path.find(SIDECAR_EXECUTABLE).await {
            return Some(SidecarCommand::Single(path.to_string_lossy().into_owned()));
        }

        let extension = self.extensions.extension_path(YAML_EXTENSION_ID).await?;
        let bundle = extension.join(BUNDLE_RELATIVE_PATH);
        if is_regular_file(&bundle).await {
            return Some(SidecarCommand::Argv(vec![
                LAUNCHER.to_string(),
                bundle.to_string_lossy().into_owned(),
            ]));
        }

        debug!(bundle = %bundle.display(), "YAML extension has no bundled server");
        None
    }

    /// Applies the write-back rules for `helm-ls.yamlls.path`.
    pub async fn configure(&self) -> Result<SidecarOutcome> {
        let inspection = self.config.inspect(SIDECAR_PATH_KEY).await?;

        if inspection.has_user_scope() {
            let command = inspection.effective().and_then(SidecarCommand::from_value);
            info!(key = SIDECAR_PATH_KEY, "Using workspace-scoped sidecar setting");
            return Ok(SidecarOutcome::UserScoped(command));
        }

        // A null or empty global value counts as unset.
        let global = inspection
            .global_value
            .as_ref()
            .filter(|value| !matches!(value, Value::Null) && value.as_str() != Some(""));
        let Some(global) = global else {
            return self.write_initial().await;
        };

        let stored = SidecarCommand::from_value(global);
        let managed = ManagedConfigState::load(self.state.as_ref())?;

        let owned = match &stored {
            Some(command) if managed.managed => {
                managed.last_known.as_ref() == Some(command) || command.matches_own_pattern()
            }
            _ => false,
        };

        let Some(stored) = stored.filter(|_| owned) else {
            info!(
                key = SIDECAR_PATH_KEY,
                managed = managed.managed,
                "Global sidecar setting is user-authored, leaving it untouched"
            );
            return Ok(SidecarOutcome::UserAuthored(SidecarCommand::from_value(global)));
        };

        match self.locate().await {
            Some(found) if found != stored || stored.is_placeholder() => {
                self.write(&found).await?;
                info!(from = %stored, to = %found, "Refreshed managed sidecar setting");
                Ok(SidecarOutcome::Refreshed(found))
            }
            Some(_) => {
                debug!(command = %stored, "Managed sidecar setting is current");
                Ok(SidecarOutcome::Unchanged(stored))
            }
            None => {
                warn!(command = %stored, "yaml-language-server no longer found, keeping managed setting");
                Ok(SidecarOutcome::Unchanged(stored))
            }
        }
    }

    async fn write_initial(&self) -> Result<SidecarOutcome> {
        match self.locate().await {
            Some(found) => {
                self.write(&found).await?;
                info!(command = %found, "Wrote sidecar setting");
                Ok(SidecarOutcome::Written(found))
            }
            None => {
                info!("yaml-language-server not found, sidecar setting left unset");
                Ok(SidecarOutcome::NotFound)
            }
        }
    }

    async fn write(&self, command: &SidecarCommand) -> Result<()> {
        self.config
            .update_global(SIDECAR_PATH_KEY, command.to_value())
            .await?;
        ManagedConfigState::mark_managed(self.state.as_ref(), command)?;
        Ok(())
    }
}
