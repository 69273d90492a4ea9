//! Types for the discovery module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Audio container extensions handed to the transcoder.
pub const AUDIO_EXTENSIONS: &[&str] = &[
    "aiff", "aif", "au", "flac", "m4a", "mp3", "ogg", "wav", "webm", "aac",
];

/// Video container extensions handed to the transcoder (audio track only).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "flv", "ogv", "mov", "mp4", "m4v", "mpg", "mpeg", "mp2", "mpe", "m2v",
];

/// Whether `path` has an extension the transcoder accepts. Case-insensitive.
pub fn is_media_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let ext = e.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// What the driver does with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Audio/video file, goes through the transcoder.
    Convert,
    /// Any other file, copied byte for byte.
    Copy,
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convert => "convert",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "convert" => Ok(Self::Convert),
            "copy" => Ok(Self::Copy),
            other => Err(format!("unknown entry kind '{}'", other)),
        }
    }
}

/// A discovered file, not yet recorded in the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Absolute path of the input file.
    pub source: PathBuf,
    /// Path relative to the target root, file name included.
    pub relative_path: PathBuf,
    pub kind: EntryKind,
}

impl Candidate {
    pub fn new(source: impl Into<PathBuf>, relative_path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            source: source.into(),
            relative_path: relative_path.into(),
            kind,
        }
    }
}
