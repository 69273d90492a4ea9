//! Conversion lifecycle integration tests.
//!
//! These tests drive discovery, the index and the driver together with the
//! mock transcoder on temporary directory trees:
//! - Output layout (mirrored, flattened, collisions)
//! - Resuming after an interrupted run
//! - Skip-existing and retry behavior
//! - Chunk atomicity across reopen

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tempfile::TempDir;

use rekonv_core::{
    discover,
    testing::{fixtures, MockTranscoder},
    Candidate, ConversionDriver, ConversionIndex, DriveSummary, EntryKind, EntryStatus,
    IndexConfig, IndexError, JobOptions, OutputFormat,
};

/// Test helper owning the directory layout and the mock transcoder.
struct TestHarness {
    root: TempDir,
    transcoder: MockTranscoder,
    config: IndexConfig,
}

impl TestHarness {
    fn new(files: &[&str]) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        fixtures::media_tree(&root.path().join("in"), files);
        Self {
            root,
            transcoder: MockTranscoder::new(),
            config: IndexConfig {
                dir: PathBuf::new(),
                chunk_size: 2,
                ..IndexConfig::default()
            },
        }
    }

    fn target(&self) -> PathBuf {
        self.root.path().join("in")
    }

    fn output(&self) -> PathBuf {
        self.root.path().join("out")
    }

    fn index_dir(&self) -> PathBuf {
        self.root.path().join(".rekonv")
    }

    fn job(&self, format: OutputFormat) -> JobOptions {
        JobOptions::new(self.target(), self.output(), format)
    }

    fn open(&self, job: &JobOptions) -> ConversionIndex {
        ConversionIndex::open_or_create(&self.index_dir(), job, &self.config)
            .expect("Failed to open index")
    }

    /// Opens the job's index, discovers unless a previous run finished
    /// discovery, and drives until done or interrupted.
    async fn run_with_shutdown(
        &self,
        job: &JobOptions,
        shutdown: Arc<AtomicBool>,
    ) -> (ConversionIndex, DriveSummary) {
        let index = self.open(job);
        if !index.is_discovery_complete().unwrap() {
            let batches = discover(job, self.config.chunk_size).expect("Discovery failed");
            index.append_all(batches).unwrap();
        }

        let driver = ConversionDriver::new(self.transcoder.clone(), shutdown);
        let summary = driver.run(&index).await.expect("Driver failed");
        (index, summary)
    }

    async fn run(&self, job: &JobOptions) -> (ConversionIndex, DriveSummary) {
        self.run_with_shutdown(job, Arc::new(AtomicBool::new(false)))
            .await
    }
}

#[tokio::test]
async fn test_three_file_directory() {
    let harness = TestHarness::new(&["a.wav", "b.flac", "notes.txt"]);
    let job = harness.job(OutputFormat::Mp3);

    let (index, summary) = harness.run(&job).await;

    assert_eq!(summary.converted, 2);
    assert_eq!(summary.copied, 0);
    assert_eq!(fixtures::list_tree(&harness.output()), vec!["a.mp3", "b.mp3"]);
    assert_eq!(index.len().unwrap(), 2);

    let report = index.verify_complete().unwrap();
    assert_eq!(report.done, 2);
    assert_eq!(report.pending, 0);
    assert!(report.is_complete());
}

#[tokio::test]
async fn test_recursive_mirrors_tree_and_copies_all() {
    let harness = TestHarness::new(&[
        "album/01.wav",
        "album/02.wav",
        "album/cover.jpg",
        "live/2019/set.mov",
    ]);
    let job = harness
        .job(OutputFormat::Flac)
        .recursive(true)
        .copy_all(true);

    let (index, summary) = harness.run(&job).await;

    assert_eq!(summary.converted, 3);
    assert_eq!(summary.copied, 1);
    assert_eq!(
        fixtures::list_tree(&harness.output()),
        vec![
            "album/01.flac",
            "album/02.flac",
            "album/cover.jpg",
            "live/2019/set.flac"
        ]
    );
    assert_eq!(
        std::fs::read(harness.output().join("album/cover.jpg")).unwrap(),
        b"album/cover.jpg"
    );

    let cover = index
        .entry_by_source(&harness.target().join("album/cover.jpg"))
        .unwrap()
        .unwrap();
    assert_eq!(cover.kind, EntryKind::Copy);
    assert!(index.verify_complete().unwrap().is_complete());
}

#[tokio::test]
async fn test_flatten_suffixes_collisions() {
    let harness = TestHarness::new(&["x/track.wav", "y/track.wav"]);
    let job = harness.job(OutputFormat::Mp3).flatten(true);

    let (index, _) = harness.run(&job).await;

    assert_eq!(
        fixtures::list_tree(&harness.output()),
        vec!["track (1).mp3", "track.mp3"]
    );
    let second = index
        .entry_by_source(&harness.target().join("y/track.wav"))
        .unwrap()
        .unwrap();
    assert_eq!(
        second.output_path,
        Some(harness.output().join("track (1).mp3"))
    );
}

#[tokio::test]
async fn test_resume_after_interruption() {
    let harness = TestHarness::new(&["1.wav", "2.wav", "3.wav", "4.wav", "5.wav"]);
    let job = harness.job(OutputFormat::Aac);

    let shutdown = Arc::new(AtomicBool::new(false));
    harness.transcoder.interrupt_after(2, shutdown.clone()).await;
    let (index, summary) = harness.run_with_shutdown(&job, shutdown).await;
    assert!(summary.interrupted);
    assert_eq!(summary.converted, 2);
    let report = index.verify_complete().unwrap();
    assert_eq!((report.done, report.pending), (2, 3));
    drop(index);

    // Second invocation, same options
    let resumed = TestHarness {
        root: harness.root,
        transcoder: MockTranscoder::new(),
        config: harness.config.clone(),
    };
    let (index, summary) = resumed.run(&job).await;

    assert!(!summary.interrupted);
    assert_eq!(summary.converted, 3);
    assert_eq!(
        resumed.transcoder.converted_sources().await,
        vec![
            resumed.target().join("3.wav"),
            resumed.target().join("4.wav"),
            resumed.target().join("5.wav"),
        ]
    );
    assert_eq!(index.len().unwrap(), 5);
    assert!(index.verify_complete().unwrap().is_complete());
    assert_eq!(fixtures::list_tree(&resumed.output()).len(), 5);
}

#[tokio::test]
async fn test_completed_job_is_not_reprocessed() {
    let harness = TestHarness::new(&["a.wav", "b.wav"]);
    let job = harness.job(OutputFormat::Mp3);

    harness.run(&job).await;
    let (_, summary) = harness.run(&job).await;

    assert_eq!(summary.processed(), 0);
    assert_eq!(harness.transcoder.conversion_count().await, 2);
}

#[tokio::test]
async fn test_interrupted_discovery_rescans_without_duplicates() {
    let harness = TestHarness::new(&["a.wav", "b.wav", "c.wav"]);
    let job = harness.job(OutputFormat::Mp3);

    {
        // Only the first chunk made it before the process died
        let index = harness.open(&job);
        let first = discover(&job, harness.config.chunk_size)
            .unwrap()
            .next()
            .unwrap();
        index.append_entries(first).unwrap();
        assert!(!index.is_discovery_complete().unwrap());
    }

    let (index, summary) = harness.run(&job).await;
    assert_eq!(index.len().unwrap(), 3);
    assert_eq!(summary.converted, 3);
    assert!(index.is_discovery_complete().unwrap());
}

#[tokio::test]
async fn test_rejected_chunk_is_invisible_after_reopen() {
    let harness = TestHarness::new(&[]);
    let job = harness.job(OutputFormat::Mp3);
    let candidate = |name: &str| {
        Candidate::new(harness.target().join(name), name, EntryKind::Convert)
    };

    {
        let index = harness.open(&job);
        index.append_entries(vec![candidate("a.wav")]).unwrap();
        let err = index
            .append_entries(vec![candidate("b.wav"), candidate("c.wav"), candidate("d.wav")])
            .unwrap_err();
        assert!(matches!(err, IndexError::ChunkTooLarge { .. }));
    }

    let index = harness.open(&job);
    assert_eq!(index.len().unwrap(), 1);
    assert!(index
        .entry_by_source(&harness.target().join("b.wav"))
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_skip_existing_leaves_outputs_alone() {
    let harness = TestHarness::new(&["a.wav", "b.wav"]);
    fixtures::media_tree(&harness.output(), &["a.mp3"]);
    let job = harness.job(OutputFormat::Mp3).skip_existing(true);

    let (index, summary) = harness.run(&job).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.converted, 1);
    assert_eq!(
        std::fs::read(harness.output().join("a.mp3")).unwrap(),
        b"a.mp3"
    );
    let a = index
        .entry_by_source(&harness.target().join("a.wav"))
        .unwrap()
        .unwrap();
    assert_eq!(a.status, EntryStatus::Skipped);
    assert!(index.verify_complete().unwrap().is_complete());
}

#[tokio::test]
async fn test_failed_entries_retry_only_when_requeued() {
    let harness = TestHarness::new(&["good.wav", "bad.wav"]);
    let job = harness.job(OutputFormat::Mp3);
    harness
        .transcoder
        .fail_source(harness.target().join("bad.wav"))
        .await;

    let (index, summary) = harness.run(&job).await;
    assert_eq!(summary.failed, 1);
    let report = index.verify_complete().unwrap();
    assert!(!report.is_complete());
    assert_eq!(report.stragglers.len(), 1);
    assert_eq!(report.stragglers[0].source_path, harness.target().join("bad.wav"));
    drop(index);

    // Plain resume leaves the failure alone
    let (index, summary) = harness.run(&job).await;
    assert_eq!(summary.processed(), 0);

    // Requeued, it is attempted again (and fails again)
    assert_eq!(index.requeue_failed(3).unwrap(), 1);
    drop(index);
    let (index, summary) = harness.run(&job).await;
    assert_eq!(summary.failed, 1);

    let bad = index
        .entry_by_source(&harness.target().join("bad.wav"))
        .unwrap()
        .unwrap();
    assert_eq!(bad.attempt_count, 2);
    assert_eq!(index.requeue_failed(2).unwrap(), 0);
}
