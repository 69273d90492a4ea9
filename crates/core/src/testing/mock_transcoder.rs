//! Mock transcoder for testing.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::transcoder::{TranscodeJob, TranscodeResult, Transcoder, TranscoderError};

/// A recorded transcode job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedTranscode {
    /// The job that was submitted.
    pub job: TranscodeJob,
    /// Whether the conversion succeeded.
    pub success: bool,
}

/// Mock implementation of the Transcoder trait.
///
/// Writes a small marker file at the job destination instead of running an
/// engine, and records every job. Failures can be injected per call or per
/// source, and a shutdown flag can be raised after a number of successful
/// conversions to simulate an interrupted run.
///
/// # Example
///
/// ```rust,ignore
/// use rekonv_core::testing::MockTranscoder;
///
/// let transcoder = MockTranscoder::new();
/// transcoder.fail_source("/music/broken.wav").await;
///
/// let driver = ConversionDriver::new(transcoder.clone(), shutdown);
/// driver.run(&index).await?;
///
/// assert_eq!(transcoder.conversion_count().await, 3);
/// ```
#[derive(Debug, Clone)]
pub struct MockTranscoder {
    /// Recorded jobs.
    jobs: Arc<RwLock<Vec<RecordedTranscode>>>,
    /// If set, the next conversion will fail with this error.
    next_error: Arc<RwLock<Option<TranscoderError>>>,
    /// Sources that always fail.
    failing_sources: Arc<RwLock<HashSet<PathBuf>>>,
    /// Raise `shutdown` after this many successful conversions.
    interrupt_after: Arc<RwLock<Option<(usize, Arc<AtomicBool>)>>>,
}

impl Default for MockTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTranscoder {
    /// Create a new mock transcoder.
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            failing_sources: Arc::new(RwLock::new(HashSet::new())),
            interrupt_after: Arc::new(RwLock::new(None)),
        }
    }

    /// Get all recorded jobs.
    pub async fn recorded_jobs(&self) -> Vec<RecordedTranscode> {
        self.jobs.read().await.clone()
    }

    /// Number of successful conversions.
    pub async fn conversion_count(&self) -> usize {
        self.jobs.read().await.iter().filter(|r| r.success).count()
    }

    /// Sources of all submitted jobs, in order.
    pub async fn converted_sources(&self) -> Vec<PathBuf> {
        self.jobs
            .read()
            .await
            .iter()
            .map(|r| r.job.source.clone())
            .collect()
    }

    /// Configure the next conversion to fail with the given error.
    pub async fn set_next_error(&self, error: TranscoderError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make every conversion of `source` fail.
    pub async fn fail_source(&self, source: impl AsRef<Path>) {
        self.failing_sources
            .write()
            .await
            .insert(source.as_ref().to_path_buf());
    }

    /// Raise `flag` once `count` conversions have succeeded.
    pub async fn interrupt_after(&self, count: usize, flag: Arc<AtomicBool>) {
        *self.interrupt_after.write().await = Some((count, flag));
    }

    async fn take_error(&self, job: &TranscodeJob) -> Option<TranscoderError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Some(error);
        }
        if self.failing_sources.read().await.contains(&job.source) {
            return Some(TranscoderError::conversion_failed(
                "Invalid data found when processing input",
                None,
            ));
        }
        None
    }

    async fn record(&self, job: TranscodeJob, success: bool) {
        let mut jobs = self.jobs.write().await;
        jobs.push(RecordedTranscode { job, success });

        if let Some((count, flag)) = self.interrupt_after.read().await.as_ref() {
            if jobs.iter().filter(|r| r.success).count() >= *count {
                flag.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    fn name(&self) -> &str {
        "mock"
    }

    async fn convert(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError> {
        if let Some(error) = self.take_error(&job).await {
            self.record(job, false).await;
            return Err(error);
        }

        if !job.source.exists() {
            self.record(job.clone(), false).await;
            return Err(TranscoderError::InputNotFound { path: job.source });
        }

        if let Some(parent) = job.destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = format!("{} <- {}", job.format, job.source.display());
        tokio::fs::write(&job.destination, content.as_bytes()).await?;

        let result = TranscodeResult {
            job_id: job.job_id.clone(),
            output_path: job.destination.clone(),
            output_size_bytes: content.len() as u64,
            duration_ms: 0,
        };
        self.record(job, true).await;
        Ok(result)
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        Ok(())
    }
}
