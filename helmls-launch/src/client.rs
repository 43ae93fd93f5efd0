//! Language clients for the launcher.

use anyhow::Context;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info};

use helmls_core::{LanguageClient, LaunchSpec};

/// Runs helm-ls as a child process sharing this process's stdio.
#[derive(Default)]
pub struct ProcessClient {
    child: Mutex<Option<Child>>,
}

impl ProcessClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the child to exit.
    pub async fn wait(&self) -> anyhow::Result<ExitStatus> {
        let mut guard = self.child.lock().await;
        let child = guard.as_mut().context("helm-ls is not running")?;
        let status = child.wait().await.context("Failed to wait for helm-ls")?;
        guard.take();
        Ok(status)
    }
}

#[async_trait]
impl LanguageClient for ProcessClient {
    async fn start(&self, spec: &LaunchSpec) -> anyhow::Result<()> {
        let mut command = Command::new(&spec.command);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        // Stdio is passed through untouched, so initialization options stay
        // with the editor that sends `initialize`.
        debug!(options = %spec.initialization_options, "Initialization options");

        let child = command
            .spawn()
            .with_context(|| format!("Failed to spawn {}", spec.command.display()))?;
        info!(pid = ?child.id(), "helm-ls started");

        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(mut child) = self.child.lock().await.take() {
            child.kill().await.context("Failed to stop helm-ls")?;
            info!("helm-ls stopped");
        }
        Ok(())
    }
}

/// Client that starts nothing, for `--dry-run`.
#[derive(Debug, Default)]
pub struct DryRunClient;

#[async_trait]
impl LanguageClient for DryRunClient {
    async fn start(&self, _spec: &LaunchSpec) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
