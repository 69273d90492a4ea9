//! The driver loop.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::copy::copy_file;
use super::error::DriverError;
use super::types::{DriveProgress, DriveSummary};
use crate::config::{JobOptions, OutputFormat};
use crate::discovery::{EntryKind, PART_FILE_MARKER};
use crate::index::{ConversionIndex, EntryStatus, IndexEntry};
use crate::metrics;
use crate::transcoder::{TranscodeJob, Transcoder};

/// How a single entry ended.
#[derive(Debug)]
enum EntryOutcome {
    Converted,
    Copied,
    Skipped,
    Failed(String),
}

impl EntryOutcome {
    fn status(&self) -> EntryStatus {
        match self {
            Self::Converted | Self::Copied => EntryStatus::Done,
            Self::Skipped => EntryStatus::Skipped,
            Self::Failed(_) => EntryStatus::Failed,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Copied => "copied",
            Self::Skipped => "skipped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Hidden sibling a conversion writes to before it is renamed onto `output`.
///
/// `out/song.mp3` becomes `out/.song.rekonv-part.mp3`.
pub fn part_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_stem().unwrap_or_default());
    name.push(PART_FILE_MARKER);
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

/// Processes pending index entries one at a time.
pub struct ConversionDriver<T: Transcoder> {
    transcoder: T,
    shutdown: Arc<AtomicBool>,
    progress_tx: Option<mpsc::Sender<DriveProgress>>,
}

impl<T: Transcoder> ConversionDriver<T> {
    /// `shutdown` is polled between entries; setting it ends the run early.
    pub fn new(transcoder: T, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            transcoder,
            shutdown,
            progress_tx: None,
        }
    }

    /// Reports each entry as it starts and finishes.
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<DriveProgress>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    async fn send_progress(&self, progress: DriveProgress) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(progress).await;
        }
    }

    pub fn transcoder(&self) -> &T {
        &self.transcoder
    }

    /// Runs every pending entry of `index` to a final status.
    ///
    /// Per-file failures are recorded and counted. An index error aborts the
    /// run; the entry being handled then stays pending. So does an entry that
    /// fails after shutdown was requested, since the failure is most likely
    /// the interrupt itself.
    pub async fn run(&self, index: &ConversionIndex) -> Result<DriveSummary, DriverError> {
        let job = index.job().clone();
        let mut summary = DriveSummary::default();

        info!(
            transcoder = self.transcoder.name(),
            format = %job.format,
            skip_existing = job.skip_existing,
            "processing pending entries"
        );

        for entry in index.iterate_pending() {
            if self.shutdown.load(Ordering::SeqCst) {
                info!("shutdown requested, stopping before next entry");
                summary.interrupted = true;
                break;
            }

            let entry = entry?;
            self.send_progress(DriveProgress::EntryStarted {
                id: entry.id,
                source: entry.source_path.clone(),
            })
            .await;

            let outcome = self.process_entry(&job, &entry).await;

            if matches!(outcome, EntryOutcome::Failed(_)) && self.shutdown.load(Ordering::SeqCst) {
                info!(
                    source = %entry.source_path.display(),
                    "interrupted mid-entry, leaving it pending"
                );
                summary.interrupted = true;
                break;
            }

            let error = match &outcome {
                EntryOutcome::Failed(reason) => Some(reason.as_str()),
                _ => None,
            };
            index.mark(entry.id, outcome.status(), error)?;
            metrics::ENTRIES_PROCESSED
                .with_label_values(&[outcome.label()])
                .inc();
            self.send_progress(DriveProgress::EntryFinished {
                id: entry.id,
                status: outcome.status(),
            })
            .await;

            match outcome {
                EntryOutcome::Converted => summary.converted += 1,
                EntryOutcome::Copied => summary.copied += 1,
                EntryOutcome::Skipped => summary.skipped += 1,
                EntryOutcome::Failed(_) => summary.failed += 1,
            }
        }

        info!(
            converted = summary.converted,
            copied = summary.copied,
            skipped = summary.skipped,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "driver run finished"
        );
        Ok(summary)
    }

    async fn process_entry(&self, job: &JobOptions, entry: &IndexEntry) -> EntryOutcome {
        let Some(output) = entry.output_path.as_deref() else {
            return EntryOutcome::Failed("no output path assigned".to_string());
        };

        if job.skip_existing && output.exists() {
            info!(
                source = %entry.source_path.display(),
                output = %output.display(),
                "output exists, skipping"
            );
            return EntryOutcome::Skipped;
        }

        if let Some(parent) = output.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(
                    output = %output.display(),
                    error = %e,
                    "cannot create output directory"
                );
                return EntryOutcome::Failed(format!(
                    "Failed to create output directory {}: {}",
                    parent.display(),
                    e
                ));
            }
        }

        let part = part_path(output);
        let result = match entry.kind {
            EntryKind::Convert => self.convert(entry, job.format, &part).await,
            EntryKind::Copy => copy_file(&entry.source_path, &part)
                .await
                .map(|bytes| {
                    debug!(source = %entry.source_path.display(), bytes, "copied");
                })
                .map_err(|e| format!("Copy failed: {}", e)),
        };

        let result = match result {
            Ok(()) => tokio::fs::rename(&part, output)
                .await
                .map_err(|e| format!("Failed to move {} into place: {}", part.display(), e)),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                info!(
                    source = %entry.source_path.display(),
                    output = %output.display(),
                    kind = %entry.kind,
                    "entry done"
                );
                match entry.kind {
                    EntryKind::Convert => EntryOutcome::Converted,
                    EntryKind::Copy => EntryOutcome::Copied,
                }
            }
            Err(reason) => {
                if tokio::fs::metadata(&part).await.is_ok() {
                    let _ = tokio::fs::remove_file(&part).await;
                }
                warn!(
                    source = %entry.source_path.display(),
                    error = %reason,
                    "entry failed"
                );
                EntryOutcome::Failed(reason)
            }
        }
    }

    async fn convert(
        &self,
        entry: &IndexEntry,
        format: OutputFormat,
        part: &Path,
    ) -> Result<(), String> {
        let job = TranscodeJob {
            job_id: entry.id.to_string(),
            source: entry.source_path.clone(),
            destination: part.to_path_buf(),
            format,
        };

        let start = Instant::now();
        let result = self.transcoder.convert(job).await;
        metrics::TRANSCODE_DURATION.observe(start.elapsed().as_secs_f64());

        match result {
            Ok(done) => {
                debug!(
                    source = %entry.source_path.display(),
                    bytes = done.output_size_bytes,
                    duration_ms = done.duration_ms,
                    "transcoded"
                );
                Ok(())
            }
            Err(e) => Err(e.detail()),
        }
    }
}
