//! Activation lifecycle.
//!
//! One [`Activation`] owns everything needed to bring helm-ls up for a
//! workspace: executable resolution, sidecar configuration and the
//! language client that runs the process. `activate` and `deactivate`
//! bracket the client's lifetime.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::probe::is_regular_file;
use crate::resolver::{ExecutableResolver, ExecutableSource, ResolvedExecutable};
use crate::sidecar::{SidecarCommand, SidecarConfigurator};

/// Marker file identifying a Helm chart directory.
pub const CHART_FILE: &str = "Chart.yaml";

/// Subcommand that starts the language server on stdio.
pub const SERVE_ARG: &str = "serve";

// ============================================================================
// Collaborators
// ============================================================================

/// User-visible messages.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn error(&self, message: &str) {
        error!("{}", message);
    }
}

/// Runs the language server process and its transport.
#[async_trait]
pub trait LanguageClient: Send + Sync {
    async fn start(&self, spec: &LaunchSpec) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;
}

// ============================================================================
// Launch specification
// ============================================================================

/// Everything the client needs to start helm-ls.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LaunchSpec {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    /// Variables overlaid on the inherited environment.
    pub env: BTreeMap<String, String>,
    pub initialization_options: Value,
}

impl LaunchSpec {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: vec![SERVE_ARG.to_string()],
            cwd: None,
            env: BTreeMap::new(),
            initialization_options: Value::Null,
        }
    }

    /// Folds the yaml-language-server command into the initialization options.
    pub fn with_sidecar(mut self, command: &SidecarCommand) -> Self {
        self.initialization_options = json!({
            "helm-ls": { "yamlls": { "path": command.to_value() } }
        });
        self
    }

    /// Puts `dir` in front of `PATH` for the launched process.
    pub fn with_path_prefix(mut self, dir: &Path, inherited: Option<&str>) -> Self {
        let mut dirs = vec![dir.to_path_buf()];
        if let Some(existing) = inherited {
            dirs.extend(std::env::split_paths(existing));
        }
        match std::env::join_paths(dirs) {
            Ok(joined) => {
                self.env
                    .insert("PATH".to_string(), joined.to_string_lossy().into_owned());
            }
            Err(e) => warn!(dir = %dir.display(), error = %e, "Cannot prepend to PATH"),
        }
        self
    }
}

// ============================================================================
// Working directory
// ============================================================================

/// Editor context the working directory is derived from.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub folder: Option<PathBuf>,
    pub active_document: Option<PathBuf>,
}

/// Nearest directory at or above `start` containing `Chart.yaml`.
pub async fn find_chart_root(start: &Path) -> Option<PathBuf> {
    for dir in start.ancestors() {
        if is_regular_file(&dir.join(CHART_FILE)).await {
            return Some(dir.to_path_buf());
        }
    }
    None
}

/// Chooses the server's working directory.
///
/// The workspace folder wins when it is a chart. Otherwise the chart
/// enclosing the active document is used; with no active document the
/// workspace folder is used as is.
pub async fn working_directory(workspace: &Workspace) -> Option<PathBuf> {
    if let Some(folder) = &workspace.folder {
        if is_regular_file(&folder.join(CHART_FILE)).await {
            return Some(folder.clone());
        }
    }

    match &workspace.active_document {
        Some(document) => find_chart_root(document).await,
        None => workspace.folder.clone(),
    }
}

// ============================================================================
// Activation
// ============================================================================

/// Activation context owning the language client's lifetime.
pub struct Activation {
    resolver: ExecutableResolver,
    sidecar: Option<SidecarConfigurator>,
    notifier: Arc<dyn Notifier>,
    client: Arc<dyn LanguageClient>,
    workspace: Workspace,
    started: AtomicBool,
}

impl Activation {
    pub fn new(
        resolver: ExecutableResolver,
        notifier: Arc<dyn Notifier>,
        client: Arc<dyn LanguageClient>,
    ) -> Self {
        Self {
            resolver,
            sidecar: None,
            notifier,
            client,
            workspace: Workspace::default(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_sidecar(mut self, sidecar: SidecarConfigurator) -> Self {
        self.sidecar = Some(sidecar);
        self
    }

    pub fn with_workspace(mut self, workspace: Workspace) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn is_active(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Resolves, configures and starts helm-ls.
    ///
    /// Failures are reported through the notifier; `None` means nothing was
    /// launched. Sidecar problems never prevent the launch.
    pub async fn activate(&self) -> Option<LaunchSpec> {
        let resolved = match self.resolver.resolve().await {
            Ok(resolved) => resolved,
            Err(e) => {
                self.notifier
                    .error(&format!("helm-ls executable not found: {e}"));
                return None;
            }
        };

        let sidecar = self.configure_sidecar().await;
        let spec = self.launch_spec(&resolved, sidecar.as_ref()).await;
        info!(command = %spec.command.display(), cwd = ?spec.cwd, "Launching helm-ls");

        if let Err(e) = self.client.start(&spec).await {
            self.notifier
                .error(&format!("Failed to start helm-ls: {e:#}"));
            return None;
        }

        self.started.store(true, Ordering::SeqCst);
        Some(spec)
    }

    /// Stops the client if it was started. Safe to call repeatedly.
    pub async fn deactivate(&self) -> anyhow::Result<()> {
        if !self.started.swap(false, Ordering::SeqCst) {
            debug!("Deactivate called with no running client");
            return Ok(());
        }
        info!("Stopping helm-ls");
        self.client.stop().await
    }

    async fn configure_sidecar(&self) -> Option<SidecarCommand> {
        let sidecar = self.sidecar.as_ref()?;
        match sidecar.configure().await {
            Ok(outcome) => outcome.command().cloned(),
            Err(e) => {
                warn!(error = %e, "Sidecar configuration failed");
                self.notifier
                    .error(&format!("Failed to configure yaml-language-server: {e}"));
                None
            }
        }
    }

    async fn launch_spec(
        &self,
        resolved: &ResolvedExecutable,
        sidecar: Option<&SidecarCommand>,
    ) -> LaunchSpec {
        let mut spec = LaunchSpec::new(&resolved.path);
        spec.cwd = working_directory(&self.workspace).await;

        if let Some(command) = sidecar {
            spec = spec.with_sidecar(command);
        }

        if resolved.source == ExecutableSource::Cache {
            if let Some(dir) = resolved.path.parent() {
                let inherited = std::env::var("PATH").ok();
                spec = spec.with_path_prefix(dir, inherited.as_deref());
            }
        }

        spec
    }
}
