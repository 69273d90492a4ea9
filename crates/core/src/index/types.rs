//! Types for the index module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::config::JobOptions;
use crate::discovery::EntryKind;

/// Where an entry stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    /// Not attempted yet, or interrupted mid-conversion.
    Pending,
    /// Output written.
    Done,
    /// Conversion or copy failed, see `last_error`.
    Failed,
    /// Output already existed and skip-existing was set.
    Skipped,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Done and skipped entries are never revisited.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped)
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown entry status '{}'", other)),
        }
    }
}

/// One recorded input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Insertion order, unique within the index.
    pub id: i64,
    /// Absolute input path, unique within the index.
    pub source_path: PathBuf,
    /// Path below the target root.
    pub relative_path: PathBuf,
    pub kind: EntryKind,
    /// Assigned output path. `None` only when no collision-free name was left.
    pub output_path: Option<PathBuf>,
    pub status: EntryStatus,
    /// Number of failed attempts so far.
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Identity of a job, derived from its options.
///
/// Two invocations with the same target, output, format and traversal flags
/// get the same key and therefore resume the same index. `skip_existing` is
/// not part of the key: it changes what the driver does, not what is indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey(String);

impl JobKey {
    /// Hashes the job. Paths are taken as given, absolutize them first.
    pub fn for_job(job: &JobOptions) -> Self {
        let mut hasher = Sha256::new();
        for path in [&job.target, &job.output] {
            hasher.update(path.as_os_str().as_encoded_bytes());
            hasher.update([0u8]);
        }
        hasher.update(job.format.extension().as_bytes());
        hasher.update([0u8]);
        hasher.update([
            job.single_file as u8,
            job.recursive as u8,
            job.flatten as u8,
            job.copy_all as u8,
        ]);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub(crate) fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex digits, used in the index file name.
    pub fn short(&self) -> &str {
        &self.0[..16.min(self.0.len())]
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of appending one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    /// New entries recorded.
    pub inserted: usize,
    /// Sources already in the index, left untouched.
    pub already_present: usize,
    /// Entries that got a `name (N).ext` output.
    pub renamed: usize,
    /// Entries recorded as failed because every suffix was taken.
    pub unresolvable: usize,
}

impl AppendOutcome {
    pub(crate) fn absorb(&mut self, other: AppendOutcome) {
        self.inserted += other.inserted;
        self.already_present += other.already_present;
        self.renamed += other.renamed;
        self.unresolvable += other.unresolvable;
    }
}

/// Entries per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub total: u64,
    pub pending: u64,
    pub done: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Final consistency check over an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub total: u64,
    pub pending: u64,
    pub done: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Failed and pending entries, oldest first. Capped, see `straggler_count`.
    pub stragglers: Vec<IndexEntry>,
    pub straggler_count: u64,
    /// Done entries whose output file is gone. Capped, see `missing_output_count`.
    pub missing_outputs: Vec<IndexEntry>,
    pub missing_output_count: u64,
}

impl VerifyReport {
    /// Every entry is done or skipped and every done output exists.
    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.failed == 0 && self.missing_output_count == 0
    }
}
