//! Platform resolution for release assets.
//!
//! Maps the host's raw OS/CPU pair onto the naming used by helm-ls release
//! assets (`helm_ls_<platform>_<arch>[.exe]`). The raw strings follow the
//! editor host convention (`win32`, `darwin`, `linux` / `x64`, `arm64`,
//! `arm`); [`HostPlatform::current`] translates the Rust target constants
//! into that convention.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ProvisionError, Result};

// ============================================================================
// Release Platform
// ============================================================================

/// Operating system component of a release asset name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsKind {
    Darwin,
    Linux,
    Windows,
}

impl OsKind {
    /// Returns the asset-name token for this OS.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Darwin => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
        }
    }

    fn from_host(raw: &str) -> Option<Self> {
        match raw {
            "win32" => Some(Self::Windows),
            "darwin" => Some(Self::Darwin),
            "linux" => Some(Self::Linux),
            _ => None,
        }
    }
}

/// CPU architecture component of a release asset name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchKind {
    Amd64,
    Arm64,
    Arm,
}

impl ArchKind {
    /// Returns the asset-name token for this architecture.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
            Self::Arm => "arm",
        }
    }

    fn from_host(raw: &str) -> Option<Self> {
        match raw {
            "x64" => Some(Self::Amd64),
            "arm64" => Some(Self::Arm64),
            "arm" => Some(Self::Arm),
            _ => None,
        }
    }
}

/// Resolved platform information for a release asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformInfo {
    pub platform: OsKind,
    pub arch: ArchKind,
    /// `.exe` on Windows, empty elsewhere.
    pub executable_suffix: &'static str,
}

impl PlatformInfo {
    /// Builds a platform from already-typed components.
    pub fn new(platform: OsKind, arch: ArchKind) -> Self {
        let executable_suffix = match platform {
            OsKind::Windows => ".exe",
            OsKind::Darwin | OsKind::Linux => "",
        };
        Self {
            platform,
            arch,
            executable_suffix,
        }
    }

    /// Resolves the host-reported platform and architecture strings.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::UnsupportedPlatform`] carrying the raw pair
    /// when either side is missing from the lookup table.
    pub fn resolve(raw_platform: &str, raw_arch: &str) -> Result<Self> {
        match (OsKind::from_host(raw_platform), ArchKind::from_host(raw_arch)) {
            (Some(os), Some(arch)) => Ok(Self::new(os, arch)),
            _ => Err(ProvisionError::UnsupportedPlatform {
                platform: raw_platform.to_string(),
                arch: raw_arch.to_string(),
            }),
        }
    }

    /// Resolves the platform this process is running on.
    pub fn detect() -> Result<Self> {
        let host = HostPlatform::current();
        Self::resolve(&host.platform, &host.arch)
    }

    pub fn is_windows(&self) -> bool {
        matches!(self.platform, OsKind::Windows)
    }
}

impl fmt::Display for PlatformInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.platform.as_str(), self.arch.as_str())
    }
}

// ============================================================================
// Host Detection
// ============================================================================

/// Raw platform strings in editor host convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub platform: String,
    pub arch: String,
}

impl HostPlatform {
    /// Reads the compile-time target and translates it to host naming.
    ///
    /// Unknown values pass through unchanged so the resolver can report them.
    pub fn current() -> Self {
        let platform = match std::env::consts::OS {
            "windows" => "win32",
            "macos" => "darwin",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            platform: platform.to_string(),
            arch: arch.to_string(),
        }
    }
}
