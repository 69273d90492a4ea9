//! FFmpeg-based transcoder implementation.

use async_trait::async_trait;
use regex_lite::Regex;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use super::config::TranscoderConfig;
use super::error::TranscoderError;
use super::traits::Transcoder;
use super::types::{OutputFormat, TranscodeJob, TranscodeResult};

/// Lines of ffmpeg diagnostics kept for the failure message.
const STDERR_TAIL_LINES: usize = 8;

/// How often a running conversion reports its position.
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// FFmpeg-based transcoder implementation.
pub struct FfmpegTranscoder {
    config: TranscoderConfig,
}

impl FfmpegTranscoder {
    /// Creates a new FFmpeg transcoder with the given configuration.
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Creates a transcoder with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(TranscoderConfig::default())
    }

    /// Builds ffmpeg arguments for an audio conversion.
    fn build_args(&self, source: &Path, destination: &Path, format: OutputFormat) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(), // Overwrite output
            "-nostdin".to_string(),
            "-i".to_string(),
            source.to_string_lossy().to_string(),
            // Audio only, video inputs lose their picture track
            "-vn".to_string(),
            "-c:a".to_string(),
            format.ffmpeg_codec().to_string(),
        ];

        if !format.is_lossless() {
            args.extend(["-b:a".to_string(), format!("{}k", self.config.bitrate_kbps)]);
        }

        args.extend([
            "-loglevel".to_string(),
            self.config.log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_args.iter().cloned());

        args.push(destination.to_string_lossy().to_string());

        args
    }

    /// Whether a stderr line is part of the `-progress` key=value stream.
    fn is_progress_line(line: &str) -> bool {
        match line.split_once('=') {
            Some((key, _)) => !key.is_empty() && !key.contains(' '),
            None => false,
        }
    }

    async fn run_conversion(&self, job: &TranscodeJob) -> Result<TranscodeResult, TranscoderError> {
        let start = Instant::now();

        if !job.source.exists() {
            return Err(TranscoderError::InputNotFound {
                path: job.source.clone(),
            });
        }

        if let Some(parent) = job.destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|_| {
                TranscoderError::OutputDirectoryFailed {
                    path: parent.to_path_buf(),
                }
            })?;
        }

        let args = self.build_args(&job.source, &job.destination, job.format);
        debug!(job_id = %job.job_id, ?args, "spawning ffmpeg");

        let mut command = Command::new(&self.config.ffmpeg_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches rekonv only, which
        // lets the running conversion finish.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscoderError::EngineNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscoderError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscoderError::conversion_failed("ffmpeg stderr not captured", None))?;
        let mut reader = BufReader::new(stderr);

        let time_regex = Regex::new(r"^out_time_ms=(\d+)").ok();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut last_progress_log = Instant::now();
            let mut diagnostics: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

            let mut buf = Vec::new();

            // Drained to EOF whatever the encoding, or ffmpeg blocks on a
            // full pipe.
            loop {
                buf.clear();
                if reader.read_until(b'\n', &mut buf).await? == 0 {
                    break;
                }
                let text = String::from_utf8_lossy(&buf);
                let line = text.trim_end();

                if !Self::is_progress_line(line) {
                    if diagnostics.len() == STDERR_TAIL_LINES {
                        diagnostics.pop_front();
                    }
                    diagnostics.push_back(line.to_string());
                    continue;
                }

                if last_progress_log.elapsed() < PROGRESS_LOG_INTERVAL {
                    continue;
                }

                let position = time_regex
                    .as_ref()
                    .and_then(|re| re.captures(line))
                    .and_then(|caps| caps.get(1))
                    .and_then(|m| m.as_str().parse::<f64>().ok());

                if let Some(micros) = position {
                    debug!(
                        job_id = %job.job_id,
                        position_secs = micros / 1_000_000.0,
                        "conversion progress"
                    );
                    last_progress_log = Instant::now();
                }
            }

            let status = child.wait().await?;
            let diagnostics: Vec<String> = diagnostics.into_iter().collect();
            Ok::<(std::process::ExitStatus, String), std::io::Error>((
                status,
                diagnostics.join("\n"),
            ))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(TranscoderError::conversion_failed(
                        format!("ffmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Ok(Err(e)) => return Err(TranscoderError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(TranscoderError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        let output_meta = tokio::fs::metadata(&job.destination)
            .await
            .map_err(|_| TranscoderError::conversion_failed("Output file not created", None))?;

        Ok(TranscodeResult {
            job_id: job.job_id.clone(),
            output_path: job.destination.clone(),
            output_size_bytes: output_meta.len(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn convert(&self, job: TranscodeJob) -> Result<TranscodeResult, TranscoderError> {
        self.run_conversion(&job).await
    }

    async fn validate(&self) -> Result<(), TranscoderError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    TranscoderError::EngineNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    TranscoderError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(TranscoderError::conversion_failed(
                "ffmpeg -version failed",
                Some(String::from_utf8_lossy(&output.stderr).to_string()),
            ));
        }

        Ok(())
    }
}
