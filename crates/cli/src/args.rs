//! Command line arguments.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgAction, Parser, ValueEnum};
use rekonv_core::{Config, JobOptions, OutputFormat};

/// Multi-letter short flags and the long flags they stand for.
const SHORT_ALIASES: &[(&str, &str)] = &[
    ("-of", "--output-format"),
    ("-sf", "--single-file"),
    ("-skf", "--skip-existing-files"),
    ("-cp", "--copy-all-files"),
];

/// Output format as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FormatArg {
    Aiff,
    Mp3,
    Aac,
    Flac,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Aiff => OutputFormat::Aiff,
            FormatArg::Mp3 => OutputFormat::Mp3,
            FormatArg::Aac => OutputFormat::Aac,
            FormatArg::Flac => OutputFormat::Flac,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "rekonv",
    version,
    about = "Batch convert audio and video files to one audio format, resumably"
)]
pub struct Args {
    /// Output format (short form: -of)
    #[arg(short = 'f', long = "output-format", value_enum, default_value_t = FormatArg::Aac)]
    pub output_format: FormatArg,

    /// Output directory root
    #[arg(short = 'o', long, value_name = "DIR", default_value = "./")]
    pub output: PathBuf,

    /// Treat the target as a single file (short form: -sf)
    #[arg(long)]
    pub single_file: bool,

    /// Input file or directory
    #[arg(short = 't', long, value_name = "PATH", default_value = "./")]
    pub target: PathBuf,

    /// Descend into subdirectories, mirroring them in the output
    #[arg(short = 'r', long)]
    pub recursive: bool,

    /// Skip files whose output already exists (short form: -skf)
    #[arg(long)]
    pub skip_existing_files: bool,

    /// Copy non-media files to the output as well (short form: -cp)
    #[arg(long)]
    pub copy_all_files: bool,

    /// Descend into subdirectories but write all outputs into the output root
    #[arg(long)]
    pub flatten: bool,

    /// Discard the index of a previous run of this job and start over
    #[arg(long)]
    pub fresh: bool,

    /// Retry failed files, up to the configured attempt limit
    #[arg(long)]
    pub retry_failed: bool,

    /// Directory holding index files
    #[arg(long, value_name = "DIR")]
    pub index_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE", env = "REKONV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Write Prometheus text metrics to this file on exit
    #[arg(long, value_name = "FILE")]
    pub metrics_out: Option<PathBuf>,

    /// More logging, repeat for more
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Parses the process arguments, accepting the multi-letter short flags.
    pub fn parse_normalized() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    pub fn job_options(&self) -> JobOptions {
        JobOptions::new(&self.target, &self.output, self.output_format.into())
            .single_file(self.single_file)
            .recursive(self.recursive)
            .flatten(self.flatten)
            .skip_existing(self.skip_existing_files)
            .copy_all(self.copy_all_files)
    }

    /// Flags take precedence over the file and environment.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(dir) = &self.index_dir {
            config.index.dir = dir.clone();
        }
        if self.retry_failed {
            config.retry.retry_failed = true;
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "rekonv=debug,rekonv_core=debug,info",
            _ => "trace",
        }
    }
}

/// Rewrites `-of`, `-sf`, `-skf` and `-cp` to their long forms.
///
/// Arguments after `--` are left alone. `-of=mp3` becomes
/// `--output-format=mp3`.
pub fn normalize_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let mut passthrough = false;
    args.into_iter()
        .map(|arg| {
            if passthrough {
                return arg;
            }
            let Some(text) = arg.to_str() else {
                return arg;
            };
            if text == "--" {
                passthrough = true;
                return arg;
            }

            for (short, long) in SHORT_ALIASES {
                if text == *short {
                    return OsString::from(*long);
                }
                if let Some(value) = text
                    .strip_prefix(short)
                    .and_then(|rest| rest.strip_prefix('='))
                {
                    return OsString::from(format!("{}={}", long, value));
                }
            }
            arg
        })
        .collect()
}
