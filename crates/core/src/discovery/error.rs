//! Error types for the discovery module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that stop discovery before it yields anything.
///
/// Problems with individual entries further down the tree are logged and
/// skipped instead.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Target does not exist.
    #[error("Target not found: {path}")]
    TargetNotFound { path: PathBuf },

    /// Single-file mode on something that is not a file.
    #[error("Target is not a file: {path}")]
    NotAFile { path: PathBuf },

    /// Directory mode on something that is not a directory.
    #[error("Target is not a directory (use --single-file for one file): {path}")]
    NotADirectory { path: PathBuf },

    /// I/O error while inspecting the target.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
