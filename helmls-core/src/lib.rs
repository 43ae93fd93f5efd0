//! helm-ls Core Library
//!
//! This crate locates, fetches and configures the language servers behind
//! the helm-ls editor integration. It includes:
//!
//! - Platform detection and release asset naming
//! - Search-path probing for installed executables
//! - A verified, version-gated download cache for the helm-ls binary
//! - Layered configuration with non-destructive write-back for the
//!   yaml-language-server command
//! - Database layer for settings and activation state
//! - The activation context that hands a launch spec to a language client

pub mod acquire;
pub mod activation;
pub mod config;
pub mod db;
pub mod downloader;
pub mod error;
pub mod platform;
pub mod probe;
pub mod release;
pub mod resolver;
pub mod sidecar;
pub mod store;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use acquire::Acquirer;
pub use activation::{
    find_chart_root, working_directory, Activation, LanguageClient, LaunchSpec, LogNotifier,
    Notifier, Workspace,
};
pub use config::{
    ConfigurationStore, Inspection, LayeredJsonConfig, MemoryConfig, ProvisionSettings,
    EXECUTABLE_PATH_KEY, SIDECAR_PATH_KEY,
};
pub use db::{Database, MemoryState, StateStore};
pub use downloader::{DownloadPolicy, Downloader, Fetch};
pub use error::{ProvisionError, Result};
pub use platform::{HostPlatform, PlatformInfo};
pub use probe::SearchPath;
pub use release::{ReleaseAsset, ReleaseSource, DEFAULT_VERSION, TOOL_NAME};
pub use resolver::{ExecutableResolver, ExecutableSource, ResolvedExecutable};
pub use sidecar::{
    ExtensionRegistry, ExtensionsDir, ManagedConfigState, SidecarCommand, SidecarConfigurator,
    SidecarOutcome,
};
pub use store::{BinaryStore, CacheRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
