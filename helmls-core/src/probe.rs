//! Search-path probing for executables.
//!
//! Mirrors shell resolution: directories are tried in `PATH` order and, for
//! each directory, suffixes in `PATHEXT` order. A candidate matches when it
//! exists and is a regular file; whether it is executable is left to the
//! caller.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns the PATH list separator for the given platform family.
#[inline]
fn path_separator(windows: bool) -> char {
    if windows {
        ';'
    } else {
        ':'
    }
}

/// An ordered set of directories and executable suffixes to search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    dirs: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl SearchPath {
    /// Builds a search path from the process environment.
    pub fn from_env() -> Self {
        let path_var = std::env::var("PATH").unwrap_or_default();
        let pathext = std::env::var("PATHEXT").ok();
        Self::parse(&path_var, pathext.as_deref(), cfg!(windows))
    }

    /// Parses raw `PATH` and `PATHEXT` values.
    ///
    /// Quotes are stripped from `PATH` and empty entries dropped. On Windows
    /// `PATHEXT` is split on `;` (an unset variable yields the bare name
    /// only); elsewhere the suffix list is always the single empty suffix.
    pub fn parse(path_var: &str, pathext: Option<&str>, windows: bool) -> Self {
        let dirs = path_var
            .replace('"', "")
            .split(path_separator(windows))
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect();

        let extensions = match pathext {
            Some(ext) if windows => ext.split(';').map(str::to_string).collect(),
            _ => vec![String::new()],
        };

        Self { dirs, extensions }
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Candidate paths in resolution order.
    pub fn candidates(&self, exe: &str) -> impl Iterator<Item = PathBuf> + '_ {
        let exe = exe.to_string();
        self.dirs.iter().flat_map(move |dir| {
            let exe = exe.clone();
            self.extensions
                .iter()
                .map(move |ext| dir.join(format!("{exe}{ext}")))
        })
    }

    /// Returns the first candidate that is an existing regular file.
    ///
    /// `None` is the expected outcome when the executable is not installed.
    pub async fn find(&self, exe: &str) -> Option<PathBuf> {
        for candidate in self.candidates(exe) {
            if is_regular_file(&candidate).await {
                debug!(path = %candidate.display(), "Found {} on search path", exe);
                return Some(candidate);
            }
        }
        debug!("{} not found on search path", exe);
        None
    }
}

/// Returns true when `path` exists and is a regular file.
pub(crate) async fn is_regular_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
