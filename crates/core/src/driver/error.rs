//! Error types for the driver module.

use thiserror::Error;

use crate::index::IndexError;

/// Errors that stop a run. Per-file failures are recorded in the index instead.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Progress could not be read or saved.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}
