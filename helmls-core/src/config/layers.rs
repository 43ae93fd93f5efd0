//! Layered editor configuration.
//!
//! Three scopes are stacked: workspace folder over workspace over global.
//! [`ConfigurationStore::inspect`] reports each scope independently so the
//! caller can tell a user-authored override from a value it wrote itself.
//! Only the global scope is ever written.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{ProvisionError, Result};

/// Explicit helm-ls executable path. Read-only to this crate.
pub const EXECUTABLE_PATH_KEY: &str = "helm-ls.path";

/// Command used to launch yaml-language-server. Read/write.
pub const SIDECAR_PATH_KEY: &str = "helm-ls.yamlls.path";

/// Directory holding workspace and folder settings files.
const SETTINGS_DIR: &str = ".helm-ls";
const SETTINGS_FILE: &str = "settings.json";

// ============================================================================
// Inspection
// ============================================================================

/// Per-scope values of one configuration key, not merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inspection {
    pub global_value: Option<Value>,
    pub workspace_value: Option<Value>,
    pub workspace_folder_value: Option<Value>,
}

impl Inspection {
    /// True when a workspace or folder scope sets the key.
    pub fn has_user_scope(&self) -> bool {
        self.workspace_value.is_some() || self.workspace_folder_value.is_some()
    }

    /// The value in effect: folder, then workspace, then global.
    pub fn effective(&self) -> Option<&Value> {
        self.workspace_folder_value
            .as_ref()
            .or(self.workspace_value.as_ref())
            .or(self.global_value.as_ref())
    }
}

/// Access to layered configuration.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Returns the value of `key` in each scope.
    async fn inspect(&self, key: &str) -> Result<Inspection>;

    /// Sets `key` in the global scope.
    async fn update_global(&self, key: &str, value: Value) -> Result<()>;
}

// ============================================================================
// JSON files
// ============================================================================

/// Configuration backed by flat JSON objects on disk.
///
/// Keys are stored dotted (`"helm-ls.path"`), not nested.
#[derive(Debug, Clone)]
pub struct LayeredJsonConfig {
    global: PathBuf,
    workspace: Option<PathBuf>,
    folder: Option<PathBuf>,
}

impl LayeredJsonConfig {
    pub fn new(global: impl Into<PathBuf>) -> Self {
        Self {
            global: global.into(),
            workspace: None,
            folder: None,
        }
    }

    /// Uses `<dir>/.helm-ls/settings.json` as the workspace scope.
    pub fn with_workspace(mut self, dir: &Path) -> Self {
        self.workspace = Some(scoped_file(dir));
        self
    }

    /// Uses `<dir>/.helm-ls/settings.json` as the workspace-folder scope.
    pub fn with_folder(mut self, dir: &Path) -> Self {
        self.folder = Some(scoped_file(dir));
        self
    }

    /// Returns `<config dir>/helm-ls/settings.json`.
    pub fn default_global_path() -> anyhow::Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
            .context("Could not determine config directory")?;
        Ok(config_dir.join("helm-ls").join(SETTINGS_FILE))
    }

    pub fn global_path(&self) -> &Path {
        &self.global
    }
}

fn scoped_file(dir: &Path) -> PathBuf {
    dir.join(SETTINGS_DIR).join(SETTINGS_FILE)
}

/// Reads a settings file. A missing file is an empty scope.
async fn read_layer(path: &Path) -> anyhow::Result<Map<String, Value>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read {}", path.display()));
        }
    };

    if content.trim().is_empty() {
        return Ok(Map::new());
    }

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn read_key(path: Option<&PathBuf>, key: &str) -> anyhow::Result<Option<Value>> {
    match path {
        Some(path) => Ok(read_layer(path).await?.remove(key)),
        None => Ok(None),
    }
}

#[async_trait]
impl ConfigurationStore for LayeredJsonConfig {
    async fn inspect(&self, key: &str) -> Result<Inspection> {
        let inspection = async {
            Ok::<_, anyhow::Error>(Inspection {
                global_value: read_key(Some(&self.global), key).await?,
                workspace_value: read_key(self.workspace.as_ref(), key).await?,
                workspace_folder_value: read_key(self.folder.as_ref(), key).await?,
            })
        }
        .await
        .map_err(ProvisionError::Config)?;

        debug!(key, ?inspection, "Inspected configuration");
        Ok(inspection)
    }

    async fn update_global(&self, key: &str, value: Value) -> Result<()> {
        let path = &self.global;
        async {
            let mut layer = read_layer(path).await?;
            layer.insert(key.to_string(), value);

            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }

            let json = serde_json::to_string_pretty(&layer)?;
            tokio::fs::write(path, json)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok::<_, anyhow::Error>(())
        }
        .await
        .map_err(ProvisionError::Config)?;

        debug!(key, path = %path.display(), "Updated global configuration");
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Debug, Default)]
struct MemoryLayers {
    global: HashMap<String, Value>,
    workspace: HashMap<String, Value>,
    folder: HashMap<String, Value>,
    global_writes: usize,
}

/// In-memory configuration for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    layers: Mutex<MemoryLayers>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the global scope without counting as a write.
    pub fn set_global(&self, key: &str, value: Value) {
        self.with_layers(|l| {
            l.global.insert(key.to_string(), value);
        });
    }

    pub fn set_workspace(&self, key: &str, value: Value) {
        self.with_layers(|l| {
            l.workspace.insert(key.to_string(), value);
        });
    }

    pub fn set_folder(&self, key: &str, value: Value) {
        self.with_layers(|l| {
            l.folder.insert(key.to_string(), value);
        });
    }

    pub fn global(&self, key: &str) -> Option<Value> {
        self.with_layers(|l| l.global.get(key).cloned())
    }

    /// Number of `update_global` calls so far.
    pub fn global_writes(&self) -> usize {
        self.with_layers(|l| l.global_writes)
    }

    fn with_layers<T>(&self, f: impl FnOnce(&mut MemoryLayers) -> T) -> T {
        let mut guard = match self.layers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }
}

#[async_trait]
impl ConfigurationStore for MemoryConfig {
    async fn inspect(&self, key: &str) -> Result<Inspection> {
        Ok(self.with_layers(|l| Inspection {
            global_value: l.global.get(key).cloned(),
            workspace_value: l.workspace.get(key).cloned(),
            workspace_folder_value: l.folder.get(key).cloned(),
        }))
    }

    async fn update_global(&self, key: &str, value: Value) -> Result<()> {
        self.with_layers(|l| {
            l.global.insert(key.to_string(), value);
            l.global_writes += 1;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_effective_prefers_narrowest_scope() {
        let mut inspection = Inspection {
            global_value: Some(json!("global")),
            ..Default::default()
        };
        assert_eq!(inspection.effective(), Some(&json!("global")));
        assert!(!inspection.has_user_scope());

        inspection.workspace_value = Some(json!("workspace"));
        assert_eq!(inspection.effective(), Some(&json!("workspace")));
        assert!(inspection.has_user_scope());

        inspection.workspace_folder_value = Some(json!("folder"));
        assert_eq!(inspection.effective(), Some(&json!("folder")));
    }

    #[tokio::test]
    async fn test_json_layers_are_inspected_independently() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("global.json");
        let workspace = tmp.path().join("ws");
        std::fs::write(&global, r#"{"helm-ls.path": "/usr/bin/helm_ls"}"#).unwrap();
        std::fs::create_dir_all(workspace.join(".helm-ls")).unwrap();
        std::fs::write(
            workspace.join(".helm-ls/settings.json"),
            r#"{"helm-ls.yamlls.path": "yaml-language-server"}"#,
        )
        .unwrap();

        let config = LayeredJsonConfig::new(&global).with_workspace(&workspace);

        let path = config.inspect(EXECUTABLE_PATH_KEY).await.unwrap();
        assert_eq!(path.global_value, Some(json!("/usr/bin/helm_ls")));
        assert_eq!(path.workspace_value, None);

        let sidecar = config.inspect(SIDECAR_PATH_KEY).await.unwrap();
        assert_eq!(sidecar.global_value, None);
        assert_eq!(sidecar.workspace_value, Some(json!("yaml-language-server")));
        assert_eq!(sidecar.workspace_folder_value, None);
    }

    #[tokio::test]
    async fn test_missing_files_are_empty_scopes() {
        let tmp = TempDir::new().unwrap();
        let config = LayeredJsonConfig::new(tmp.path().join("nope.json"))
            .with_workspace(&tmp.path().join("ws"))
            .with_folder(&tmp.path().join("folder"));

        assert_eq!(
            config.inspect(SIDECAR_PATH_KEY).await.unwrap(),
            Inspection::default()
        );
    }

    #[tokio::test]
    async fn test_update_global_preserves_other_keys() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("cfg").join("settings.json");
        std::fs::create_dir_all(global.parent().unwrap()).unwrap();
        std::fs::write(&global, r#"{"editor.tabSize": 2}"#).unwrap();

        let config = LayeredJsonConfig::new(&global);
        config
            .update_global(SIDECAR_PATH_KEY, json!(["node", "/x/server.js"]))
            .await
            .unwrap();

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&global).unwrap()).unwrap();
        assert_eq!(written["editor.tabSize"], json!(2));
        assert_eq!(written[SIDECAR_PATH_KEY], json!(["node", "/x/server.js"]));
    }

    #[tokio::test]
    async fn test_update_global_creates_file() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("new").join("settings.json");
        let config = LayeredJsonConfig::new(&global);

        config
            .update_global(SIDECAR_PATH_KEY, json!("yaml-language-server"))
            .await
            .unwrap();

        let inspection = config.inspect(SIDECAR_PATH_KEY).await.unwrap();
        assert_eq!(inspection.global_value, Some(json!("yaml-language-server")));
    }

    #[tokio::test]
    async fn test_malformed_file_is_config_error() {
        let tmp = TempDir::new().unwrap();
        let global = tmp.path().join("settings.json");
        std::fs::write(&global, "{ not json").unwrap();

        let err = LayeredJsonConfig::new(&global)
            .inspect(EXECUTABLE_PATH_KEY)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn test_default_global_path() {
        if let Ok(path) = LayeredJsonConfig::default_global_path() {
            assert!(path.ends_with("helm-ls/settings.json"));
        }
    }

    #[tokio::test]
    async fn test_memory_config_counts_writes() {
        let config = MemoryConfig::new();
        config.set_global(SIDECAR_PATH_KEY, json!("seed"));
        assert_eq!(config.global_writes(), 0);

        config
            .update_global(SIDECAR_PATH_KEY, json!("new"))
            .await
            .unwrap();
        assert_eq!(config.global_writes(), 1);
        assert_eq!(config.global(SIDECAR_PATH_KEY), Some(json!("new")));
    }
}
