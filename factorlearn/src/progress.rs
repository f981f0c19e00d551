use std::time::Instant;

use hytra::TrAdder;
use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};

/// Progress of a learning run, counted in variable updates.
///
/// Workers count their updates in `updates`; the bar is refreshed at epoch boundaries. It is only
/// drawn once the run has lasted `progress_min_time`, so short runs stay silent.
pub(crate) struct LearningProgress<'a> {
    config: &'a crate::Config,
    n_epochs: usize,
    n_updates: u64,
    start: Instant,
    bar: Option<ProgressBar>,
    pub(crate) updates: TrAdder<u64>,
}

impl<'a> LearningProgress<'a> {
    pub(crate) fn new(n_epochs: usize, n_var: usize, config: &'a crate::Config) -> Self {
        Self {
            config,
            n_epochs,
            n_updates: (n_epochs * n_var) as u64,
            start: Instant::now(),
            bar: None,
            updates: TrAdder::new(),
        }
    }

    /// Epoch `epoch` (from 0) finished, having been run with step size `stepsize`.
    pub(crate) fn epoch_done(&mut self, epoch: usize, stepsize: f64) {
        if !self.config.show_progress {
            return;
        }
        if self.bar.is_none() && self.start.elapsed() >= self.config.progress_min_time {
            self.bar = Some(self.new_bar());
        }
        if let Some(bar) = &self.bar {
            bar.set_position(self.updates.get());
            bar.set_message(format!(
                "epoch {}/{} (stepsize {:.3e})",
                epoch + 1,
                self.n_epochs,
                stepsize
            ));
        }
    }

    pub(crate) fn finish(self) {
        if let Some(bar) = self.bar {
            bar.finish_and_clear();
        }
    }

    fn new_bar(&self) -> ProgressBar {
        let style = ProgressStyle::with_template(
            "Learning {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} updates",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar());
        ProgressBar::new(self.n_updates)
            .with_style(style)
            .with_finish(ProgressFinish::AndClear)
    }
}
