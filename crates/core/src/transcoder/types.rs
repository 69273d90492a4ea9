//! Types for the transcoder module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Target format of a conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Audio Interchange File Format (uncompressed)
    Aiff,
    /// MPEG Audio Layer III
    Mp3,
    /// Advanced Audio Coding (ADTS stream)
    #[default]
    Aac,
    /// Free Lossless Audio Codec
    Flac,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 4] = [Self::Aiff, Self::Mp3, Self::Aac, Self::Flac];

    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Aiff => "aiff",
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    /// Returns the ffmpeg codec name for this format.
    pub fn ffmpeg_codec(&self) -> &'static str {
        match self {
            Self::Aiff => "pcm_s16be",
            Self::Mp3 => "libmp3lame",
            Self::Aac => "aac",
            Self::Flac => "flac",
        }
    }

    /// Whether this format is lossless.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Aiff | Self::Flac)
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aiff" => Ok(Self::Aiff),
            "mp3" => Ok(Self::Mp3),
            "aac" => Ok(Self::Aac),
            "flac" => Ok(Self::Flac),
            other => Err(format!(
                "unknown output format '{}', expected one of: aiff, mp3, aac, flac",
                other
            )),
        }
    }
}

/// A single conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscodeJob {
    /// Identifier used in logs (the index entry id).
    pub job_id: String,
    /// Input file path.
    pub source: PathBuf,
    /// Where the engine writes its output.
    pub destination: PathBuf,
    /// Target format.
    pub format: OutputFormat,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeResult {
    /// Job ID.
    pub job_id: String,
    /// Output file path.
    pub output_path: PathBuf,
    /// Output file size in bytes.
    pub output_size_bytes: u64,
    /// Conversion duration in milliseconds.
    pub duration_ms: u64,
}
