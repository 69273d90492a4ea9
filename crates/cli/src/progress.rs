//! Live progress bars for a conversion run.

use std::io::{self, Write};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use rekonv_core::{DriveProgress, StatusCounts};

const BAR_TEMPLATE: &str = "{prefix:>16} [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}";

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏ ")
}

/// "All files" counts every indexed entry, "Files to convert" only those
/// pending when the run started.
pub struct RunProgress {
    all: ProgressBar,
    convert: ProgressBar,
}

impl RunProgress {
    pub fn new(multi: &MultiProgress, counts: &StatusCounts) -> Self {
        let all = multi.add(ProgressBar::new(counts.total));
        all.set_style(bar_style());
        all.set_prefix("All files");
        all.set_position(counts.total.saturating_sub(counts.pending));

        let convert = multi.add(ProgressBar::new(counts.pending));
        convert.set_style(bar_style());
        convert.set_prefix("Files to convert");

        Self { all, convert }
    }

    pub fn handle(&self, event: &DriveProgress) {
        match event {
            DriveProgress::EntryStarted { source, .. } => {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                self.convert.set_message(name);
            }
            DriveProgress::EntryFinished { .. } => {
                self.all.inc(1);
                self.convert.inc(1);
            }
        }
    }

    /// Leaves both bars on screen at their final position.
    pub fn finish(&self) {
        self.convert.set_message("");
        self.all.abandon();
        self.convert.abandon();
    }

    /// Applies events until every sender is dropped.
    pub fn spawn(self, mut rx: mpsc::Receiver<DriveProgress>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.handle(&event);
            }
            self.finish();
        })
    }

    #[cfg(test)]
    fn positions(&self) -> (u64, u64) {
        (self.all.position(), self.convert.position())
    }
}

/// Log sink that hides the bars while a line is written to stderr.
#[derive(Clone)]
pub struct LogWriter {
    multi: MultiProgress,
}

impl LogWriter {
    pub fn new(multi: MultiProgress) -> Self {
        Self { multi }
    }
}

impl Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.multi.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.multi.suspend(|| io::stderr().flush())
    }
}
