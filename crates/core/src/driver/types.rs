//! Types for the driver module.

use serde::Serialize;
use std::path::PathBuf;

use crate::index::EntryStatus;

/// What one driver run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DriveSummary {
    pub converted: usize,
    pub copied: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The shutdown flag stopped the run before the queue was empty.
    pub interrupted: bool,
}

impl DriveSummary {
    /// Entries that changed status during the run.
    pub fn processed(&self) -> usize {
        self.converted + self.copied + self.skipped + self.failed
    }
}

/// Per-entry events sent while a run is in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriveProgress {
    /// Work on an entry begins.
    EntryStarted { id: i64, source: PathBuf },
    /// An entry was marked with its final status for this run.
    EntryFinished { id: i64, status: EntryStatus },
}
