mod args;
mod metrics;
mod progress;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use indicatif::MultiProgress;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rekonv_core::{
    load_config_or_default, validate_config, validate_job, ConversionDriver, ConversionIndex,
    FfmpegTranscoder, FileDiscoverer, Transcoder, VerifyReport,
};

use args::Args;
use progress::{LogWriter, RunProgress};

/// Exit code when the run ended with failed or pending entries.
const EXIT_INCOMPLETE: u8 = 2;

/// Exit code after a second Ctrl-C.
const EXIT_ABORTED: u8 = 130;

/// Buffered progress events between the driver and the bars.
const PROGRESS_CHANNEL_SIZE: usize = 64;

/// Stragglers printed in the final report.
const REPORT_STRAGGLERS: usize = 20;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_normalized();
    let bars = MultiProgress::new();

    let log_bars = bars.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_filter().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(move || LogWriter::new(log_bars.clone())))
        .init();

    let metrics_out = args.metrics_out.clone();
    let shutdown = Arc::new(AtomicBool::new(false));

    // Dropping the run future on the second Ctrl-C kills a running ffmpeg.
    let code = tokio::select! {
        result = run(args, &bars, shutdown.clone()) => match result {
            Ok(code) => code,
            Err(e) => {
                error!("Fatal error: {:#}", e);
                ExitCode::FAILURE
            }
        },
        () = wait_for_abort(shutdown) => {
            error!("aborted, progress up to the last finished file is kept");
            ExitCode::from(EXIT_ABORTED)
        }
    };

    if let Some(path) = metrics_out {
        if let Err(e) = metrics::write_metrics(&path) {
            warn!("{:#}", e);
        }
    }

    code
}

async fn run(args: Args, bars: &MultiProgress, shutdown: Arc<AtomicBool>) -> Result<ExitCode> {
    // Configuration: defaults < file < environment < flags
    let mut config = load_config_or_default(args.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;
    args.apply_to(&mut config);
    validate_config(&config).context("Configuration validation failed")?;

    let job = args.job_options();
    validate_job(&job).context("Invalid arguments")?;
    let job = job
        .absolutized()
        .context("Failed to resolve target and output paths")?;
    let index_dir = std::path::absolute(&config.index.dir)
        .with_context(|| format!("Failed to resolve index directory {:?}", config.index.dir))?;

    info!(
        target = %job.target.display(),
        output = %job.output.display(),
        format = %job.format,
        "starting conversion job"
    );

    let transcoder = FfmpegTranscoder::new(config.transcoder.clone());
    transcoder
        .validate()
        .await
        .context("Transcoding engine is not usable")?;

    if args.fresh && ConversionIndex::discard(&index_dir, &job)? {
        info!("previous progress discarded");
    }

    let index = ConversionIndex::open_or_create(&index_dir, &job, &config.index)
        .context("Failed to open conversion index")?;

    if index.is_discovery_complete()? {
        info!(entries = index.len()?, "resuming, discovery already complete");
    } else {
        let batches = FileDiscoverer::new(job.clone(), config.index.chunk_size)
            .exclude(&index_dir)
            .batches()
            .context("Discovery failed")?;
        index
            .append_all(batches)
            .context("Failed to record discovered files")?;
    }

    if config.retry.retry_failed {
        index.requeue_failed(config.retry.max_attempts)?;
    }

    let (progress_tx, progress_rx) = mpsc::channel(PROGRESS_CHANNEL_SIZE);
    let progress = RunProgress::new(bars, &index.status_counts()?).spawn(progress_rx);

    let driver = ConversionDriver::new(transcoder, shutdown).with_progress(progress_tx);
    let result = driver.run(&index).await;
    // Closes the channel so the bars finish before the report is printed.
    drop(driver);
    let _ = progress.await;
    let summary = result?;

    let report = index.verify_complete()?;
    print_report(&report);
    println!(
        "this run: {} converted, {} copied, {} skipped, {} failed{}",
        summary.converted,
        summary.copied,
        summary.skipped,
        summary.failed,
        if summary.interrupted {
            " (interrupted)"
        } else {
            ""
        }
    );

    if report.is_complete() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_INCOMPLETE))
    }
}

/// First Ctrl-C asks the driver to stop after the current entry. Resolves on
/// the second one.
async fn wait_for_abort(shutdown: Arc<AtomicBool>) {
    if signal::ctrl_c().await.is_err() {
        return std::future::pending().await;
    }
    warn!("interrupt received, finishing current file (press Ctrl-C again to abort)");
    shutdown.store(true, Ordering::SeqCst);

    if signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

fn print_report(report: &VerifyReport) {
    println!(
        "{} entries: {} done, {} skipped, {} failed, {} pending",
        report.total, report.done, report.skipped, report.failed, report.pending
    );

    for entry in report.stragglers.iter().take(REPORT_STRAGGLERS) {
        match &entry.last_error {
            Some(reason) => println!(
                "  {} {}: {}",
                entry.status,
                entry.source_path.display(),
                reason
            ),
            None => println!("  {} {}", entry.status, entry.source_path.display()),
        }
    }
    if report.straggler_count > REPORT_STRAGGLERS as u64 {
        println!(
            "  ... and {} more",
            report.straggler_count - REPORT_STRAGGLERS as u64
        );
    }

    if report.missing_output_count > 0 {
        println!(
            "{} finished outputs are missing on disk:",
            report.missing_output_count
        );
        for entry in report.missing_outputs.iter().take(REPORT_STRAGGLERS) {
            if let Some(output) = &entry.output_path {
                println!("  {}", output.display());
            }
        }
    }
}
