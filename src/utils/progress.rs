use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

use super::{spinner_style, CancelToken, SPINNER_TICKS};

/// Terminal display for a run: one summary line plus one line per candidate.
///
/// Once the run is cancelled nothing more is printed.
pub struct Progress {
    multi: MultiProgress,
    overall: ProgressBar,
    cancel: CancelToken,
}

impl Progress {
    pub fn new(cancel: CancelToken) -> Self {
        Self::with_target(ProgressDrawTarget::stderr(), cancel)
    }

    pub fn hidden(cancel: CancelToken) -> Self {
        Self::with_target(ProgressDrawTarget::hidden(), cancel)
    }

    fn with_target(target: ProgressDrawTarget, cancel: CancelToken) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = multi.add(ProgressBar::new_spinner());
        overall.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg} ({pos} done)")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_chars(SPINNER_TICKS),
        );
        overall.set_message("Processing files...");
        overall.enable_steady_tick(Duration::from_millis(100));
        Self {
            multi,
            overall,
            cancel,
        }
    }

    /// Add a line for a candidate that has just been admitted.
    pub fn start(&self, name: &str) -> ProgressBar {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(spinner_style());
        bar.set_message(format!("Processing {name}..."));
        bar.enable_steady_tick(Duration::from_millis(100));
        bar
    }

    /// Replace a candidate's status text unless the run was cancelled.
    pub fn update(&self, bar: &ProgressBar, message: String) {
        if !self.cancel.is_cancelled() {
            bar.set_message(message);
        }
    }

    pub fn finish(&self, bar: &ProgressBar) {
        bar.finish_and_clear();
        self.multi.remove(bar);
        self.overall.inc(1);
    }

    pub fn println(&self, message: impl AsRef<str>) {
        if self.cancel.is_cancelled() {
            return;
        }
        // best effort
        let _ = self.multi.println(message.as_ref());
    }

    pub fn done(&self) {
        self.overall.finish_and_clear();
    }
}
