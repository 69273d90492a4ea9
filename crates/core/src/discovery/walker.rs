//! Directory walker producing candidate batches.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::error::DiscoveryError;
use super::types::{is_media_extension, Candidate, EntryKind};
use crate::config::JobOptions;

/// Infix of the temporary files the driver writes before renaming.
pub const PART_FILE_MARKER: &str = ".rekonv-part";

/// Walks a job's target and classifies what it finds.
pub struct FileDiscoverer {
    job: JobOptions,
    chunk_size: usize,
    excluded: Vec<PathBuf>,
}

impl FileDiscoverer {
    /// `job` paths should be absolute, see [`JobOptions::absolutized`].
    pub fn new(job: JobOptions, chunk_size: usize) -> Self {
        Self {
            job,
            chunk_size: chunk_size.max(1),
            excluded: Vec::new(),
        }
    }

    /// Never descend into `dir`, e.g. the index directory.
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    /// Starts the walk.
    ///
    /// Fails only if the target itself is missing or of the wrong kind.
    pub fn batches(self) -> Result<CandidateBatches, DiscoveryError> {
        let target = self.job.target.clone();
        let meta = std::fs::metadata(&target).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DiscoveryError::TargetNotFound {
                    path: target.clone(),
                }
            } else {
                DiscoveryError::Io(e)
            }
        })?;

        if self.job.single_file {
            if !meta.is_file() {
                return Err(DiscoveryError::NotAFile { path: target });
            }
        } else if !meta.is_dir() {
            return Err(DiscoveryError::NotADirectory { path: target });
        }

        let max_depth = if self.job.single_file {
            0
        } else if self.job.descends() {
            usize::MAX
        } else {
            1
        };

        // The output tree is skipped when it lives inside the target, unless
        // they are the same directory.
        let mut excluded = self.excluded;
        if self.job.output != self.job.target && self.job.output.starts_with(&self.job.target) {
            excluded.push(self.job.output.clone());
        }

        let walker = WalkDir::new(&target)
            .follow_links(true)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter();

        Ok(CandidateBatches {
            walker: Box::new(walker.filter_entry(move |entry| {
                !(entry.file_type().is_dir() && excluded.iter().any(|dir| entry.path() == dir))
            })),
            root: if self.job.single_file {
                target
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| target.clone())
            } else {
                target
            },
            copy_all: self.job.copy_all,
            chunk_size: self.chunk_size,
            finished: false,
        })
    }
}

/// Lazy sequence of candidate batches, each at most `chunk_size` long.
pub struct CandidateBatches {
    walker: Box<dyn Iterator<Item = walkdir::Result<walkdir::DirEntry>>>,
    root: PathBuf,
    copy_all: bool,
    chunk_size: usize,
    finished: bool,
}

impl CandidateBatches {
    fn classify(&self, entry: &walkdir::DirEntry) -> Option<Candidate> {
        if !entry.file_type().is_file() {
            return None;
        }

        let path = entry.path();
        let file_name = path.file_name()?.to_string_lossy();
        if file_name.contains(PART_FILE_MARKER) {
            return None;
        }

        let kind = if is_media_extension(path) {
            EntryKind::Convert
        } else if self.copy_all {
            EntryKind::Copy
        } else {
            debug!(path = %path.display(), "ignoring non-media file");
            return None;
        };

        let relative_path = path
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));

        Some(Candidate::new(path, relative_path, kind))
    }
}

impl Iterator for CandidateBatches {
    type Item = Vec<Candidate>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut batch = Vec::with_capacity(self.chunk_size);
        while batch.len() < self.chunk_size {
            match self.walker.next() {
                Some(Ok(entry)) => {
                    if let Some(candidate) = self.classify(&entry) {
                        batch.push(candidate);
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "skipping unreadable entry");
                }
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if batch.is_empty() {
            None
        } else {
            Some(batch)
        }
    }
}

/// Shorthand for `FileDiscoverer::new(job, chunk_size).batches()`.
pub fn discover(job: &JobOptions, chunk_size: usize) -> Result<CandidateBatches, DiscoveryError> {
    FileDiscoverer::new(job.clone(), chunk_size).batches()
}
