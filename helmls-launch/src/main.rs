//! helm-ls launcher
//!
//! Resolves the helm-ls executable (explicit setting, search path or a
//! verified download), wires up yaml-language-server, then runs
//! `helm_ls serve` on this process's stdio until it exits or Ctrl-C.
//!
//! Logs go to stderr; stdout belongs to the language server.
//!
//! The editor on the other end of stdio sends `initialize` itself, so the
//! resolved yaml-language-server command is not forwarded as initialization
//! options. helm-ls picks it up from the `helm-ls.yamlls.path` global setting
//! written during activation.

mod client;

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use client::{DryRunClient, ProcessClient};
use helmls_core::{
    Acquirer, Activation, BinaryStore, ConfigurationStore, Database, ExecutableResolver,
    ExtensionsDir, LanguageClient, LayeredJsonConfig, LogNotifier, ProvisionSettings,
    SidecarConfigurator, StateStore, Workspace,
};

/// Resolve and launch the helm-ls language server.
#[derive(Parser, Debug)]
#[command(name = "helmls-launch", version, about)]
struct Cli {
    /// Workspace folder; its `.helm-ls/settings.json` is the workspace scope.
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Workspace folder; its `.helm-ls/settings.json` is the folder scope.
    #[arg(long)]
    folder: Option<PathBuf>,

    /// Active document; its enclosing chart becomes the working directory.
    #[arg(long)]
    document: Option<PathBuf>,

    /// Global settings file (default: user config dir).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Download cache directory (default: user data dir).
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Editor extensions directory searched for the bundled YAML server.
    #[arg(long)]
    extensions_dir: Option<PathBuf>,

    /// Resolve everything and print the launch spec instead of running it.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("helmls=debug".parse()?)
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!("Starting helmls-launch v{}", helmls_core::VERSION);

    let db = Arc::new(Database::open()?);
    db.migrate()?;
    let settings = ProvisionSettings::load(&db);

    let settings_path = match cli.settings {
        Some(path) => path,
        None => LayeredJsonConfig::default_global_path()?,
    };
    let mut layered = LayeredJsonConfig::new(settings_path);
    if let Some(workspace) = &cli.workspace {
        layered = layered.with_workspace(workspace);
    }
    if let Some(folder) = &cli.folder {
        layered = layered.with_folder(folder);
    }
    let config: Arc<dyn ConfigurationStore> = Arc::new(layered);

    let store = BinaryStore::new(match cli.cache_dir {
        Some(dir) => dir,
        None => BinaryStore::default_root()?,
    });
    let acquirer = Acquirer::from_settings(&settings, store)?;
    let resolver = ExecutableResolver::new(config.clone(), acquirer, settings.version.clone());

    let process = Arc::new(ProcessClient::new());
    let client: Arc<dyn LanguageClient> = if cli.dry_run {
        Arc::new(DryRunClient)
    } else {
        process.clone()
    };

    let mut activation = Activation::new(resolver, Arc::new(LogNotifier), client).with_workspace(
        Workspace {
            folder: cli.workspace.clone(),
            active_document: cli.document.clone(),
        },
    );
    match cli.extensions_dir.or_else(ExtensionsDir::default_root) {
        Some(root) => {
            let state: Arc<dyn StateStore> = db.clone();
            activation = activation.with_sidecar(SidecarConfigurator::new(
                config.clone(),
                state,
                Arc::new(ExtensionsDir::new(root)),
            ));
        }
        None => tracing::warn!("No extensions directory, skipping yaml-language-server setup"),
    }

    let Some(spec) = activation.activate().await else {
        std::process::exit(1);
    };

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&spec)?);
        return Ok(());
    }

    let code = tokio::select! {
        status = process.wait() => {
            let status = status?;
            tracing::info!(%status, "helm-ls exited");
            status.code().unwrap_or(1)
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted");
            130
        }
    };

    activation.deactivate().await?;
    std::process::exit(code);
}
