//! Resumable batch media conversion.
//!
//! Discovery feeds a durable [`ConversionIndex`], the [`ConversionDriver`]
//! works through its pending entries with a [`Transcoder`], and a final
//! [`VerifyReport`] tells whether the job is complete.

pub mod config;
pub mod discovery;
pub mod driver;
pub mod index;
pub mod metrics;
pub mod testing;
pub mod transcoder;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, validate_job,
    Config, ConfigError, IndexConfig, JobOptions, OutputFormat, RetryConfig, TranscoderConfig,
};
pub use discovery::{discover, Candidate, DiscoveryError, EntryKind, FileDiscoverer};
pub use driver::{ConversionDriver, DriveProgress, DriveSummary, DriverError};
pub use index::{
    AppendOutcome, ConversionIndex, EntryStatus, IndexEntry, IndexError, JobKey, StatusCounts,
    VerifyReport,
};
pub use transcoder::{FfmpegTranscoder, TranscodeJob, TranscodeResult, Transcoder, TranscoderError};
