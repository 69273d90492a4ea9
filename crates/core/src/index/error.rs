//! Error types for the index module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the conversion index.
///
/// `IndexCorrupt` and `IoWrite` are fatal for the run: the first means prior
/// progress cannot be read back, the second that progress cannot be saved.
#[derive(Debug, Error)]
pub enum IndexError {
    /// An index file exists for this job but cannot be used.
    #[error("Index at {path} is unreadable: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// A chunk or status update could not be persisted; nothing was recorded.
    #[error("Failed to persist index update: {0}")]
    IoWrite(String),

    /// Reading entries back failed.
    #[error("Failed to read index: {0}")]
    Read(String),

    /// Batch exceeds the configured chunk size.
    #[error("Batch of {len} entries exceeds chunk size {max}")]
    ChunkTooLarge { len: usize, max: usize },

    /// No entry with this id.
    #[error("Index entry not found: {0}")]
    EntryNotFound(i64),

    /// Done and skipped entries are final.
    #[error("Cannot move entry {id} from {from} to {to}")]
    InvalidTransition { id: i64, from: String, to: String },
}

impl IndexError {
    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::IndexCorrupt {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn write(err: impl ToString) -> Self {
        Self::IoWrite(err.to_string())
    }

    pub(crate) fn read(err: impl ToString) -> Self {
        Self::Read(err.to_string())
    }
}
