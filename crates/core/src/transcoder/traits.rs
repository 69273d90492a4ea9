//! Trait definitions for the transcoder module.

use async_trait::async_trait;

use super::error::TranscoderError;
use super::types::{TranscodeJob, TranscodeResult};

/// An external engine that converts one file at a time.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Returns the name of this transcoder implementation.
    fn name(&self) -> &str;

    /// Converts `job.source` into `job.destination`.
    ///
    /// Returns once the engine has exited. On success the destination exists.
    async fn convert(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError>;

    /// Validates that the engine is installed and runnable.
    async fn validate(&self) -> Result<(), TranscoderError>;
}
