use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::transcoder::{OutputFormat, TranscoderConfig};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub transcoder: TranscoderConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Conversion index configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// Directory holding index files, one per job.
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Entries per persisted chunk, also the page size when reading back.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Highest `name (N).ext` suffix tried before giving up on a name.
    #[serde(default = "default_max_collision_suffix")]
    pub max_collision_suffix: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            chunk_size: default_chunk_size(),
            max_collision_suffix: default_max_collision_suffix(),
        }
    }
}

fn default_index_dir() -> PathBuf {
    PathBuf::from(".rekonv")
}

fn default_chunk_size() -> usize {
    1000
}

fn default_max_collision_suffix() -> u32 {
    999
}

/// Retry policy for failed entries on resume
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Requeue failed entries when a job is resumed.
    #[serde(default)]
    pub retry_failed: bool,
    /// Entries that failed this many times stay failed.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_failed: false,
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// What to convert and where. Built from the command line.
///
/// Two runs with the same options share an index, see [`crate::JobKey`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct JobOptions {
    /// Input file or directory.
    pub target: PathBuf,
    /// Output directory root.
    pub output: PathBuf,
    pub format: OutputFormat,
    /// Treat `target` as a single file.
    #[serde(default)]
    pub single_file: bool,
    /// Descend into subdirectories, mirroring them in the output.
    #[serde(default)]
    pub recursive: bool,
    /// Descend into subdirectories but write every output into the root.
    #[serde(default)]
    pub flatten: bool,
    /// Skip entries whose output file already exists.
    #[serde(default)]
    pub skip_existing: bool,
    /// Copy non-media files instead of ignoring them.
    #[serde(default)]
    pub copy_all: bool,
}

impl JobOptions {
    pub fn new(target: impl Into<PathBuf>, output: impl Into<PathBuf>, format: OutputFormat) -> Self {
        Self {
            target: target.into(),
            output: output.into(),
            format,
            single_file: false,
            recursive: false,
            flatten: false,
            skip_existing: false,
            copy_all: false,
        }
    }

    pub fn single_file(mut self, enabled: bool) -> Self {
        self.single_file = enabled;
        self
    }

    pub fn recursive(mut self, enabled: bool) -> Self {
        self.recursive = enabled;
        self
    }

    pub fn flatten(mut self, enabled: bool) -> Self {
        self.flatten = enabled;
        self
    }

    pub fn skip_existing(mut self, enabled: bool) -> Self {
        self.skip_existing = enabled;
        self
    }

    pub fn copy_all(mut self, enabled: bool) -> Self {
        self.copy_all = enabled;
        self
    }

    /// Whether discovery walks below the top level.
    pub fn descends(&self) -> bool {
        !self.single_file && (self.recursive || self.flatten)
    }

    /// Returns a copy with `target` and `output` made absolute.
    pub fn absolutized(&self) -> std::io::Result<Self> {
        let mut job = self.clone();
        job.target = std::path::absolute(&self.target)?;
        job.output = std::path::absolute(&self.output)?;
        Ok(job)
    }
}
