//! Transcoder module: the external engine that does the actual conversion.
//!
//! The driver only sees the [`Transcoder`] trait, one conversion per call.
//! [`FfmpegTranscoder`] shells out to ffmpeg; tests use
//! [`crate::testing::MockTranscoder`].
//!
//! # Example
//!
//! ```ignore
//! use rekonv_core::transcoder::{FfmpegTranscoder, OutputFormat, TranscodeJob, Transcoder};
//!
//! let transcoder = FfmpegTranscoder::with_defaults();
//! transcoder.validate().await?;
//!
//! let job = TranscodeJob {
//!     job_id: "42".to_string(),
//!     source: PathBuf::from("/music/a.wav"),
//!     destination: PathBuf::from("/out/a.mp3"),
//!     format: OutputFormat::Mp3,
//! };
//! let result = transcoder.convert(job).await?;
//! println!("Converted in {} ms", result.duration_ms);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::TranscoderConfig;
pub use error::TranscoderError;
pub use ffmpeg::FfmpegTranscoder;
pub use traits::Transcoder;
pub use types::{OutputFormat, TranscodeJob, TranscodeResult};
