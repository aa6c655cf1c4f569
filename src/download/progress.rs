//! 进度上报与 CLI 进度行。

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::models::{BatchSummary, ProgressSnapshot};

/// Receiver of everything a batch wants to show the user.
pub trait ProgressSink: Send + Sync {
    fn progress(&self, snapshot: ProgressSnapshot);
    fn notice(&self, message: &str);
    fn summary(&self, summary: &BatchSummary);
    fn finish(&self) {}
}

/// 单行覆盖式进度输出（stderr）；提示与汇总暂停进度行后写到 stdout。
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::with_draw_target(None, ProgressDrawTarget::stderr());
        let style = ProgressStyle::with_template("{msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        Self { bar }
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for ConsoleProgress {
    fn progress(&self, snapshot: ProgressSnapshot) {
        if let Some(line) = snapshot.progress_line() {
            self.bar.set_message(line);
        }
    }

    fn notice(&self, message: &str) {
        self.bar.suspend(|| println!("{message}"));
    }

    fn summary(&self, summary: &BatchSummary) {
        self.bar.suspend(|| {
            for line in summary.lines() {
                println!("{line}");
            }
        });
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}
