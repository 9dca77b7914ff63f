//! Fleet progress bar.

use crate::ui;
use cook::FleetProgress;
use cook::run::RunOutcome;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over a fleet run; one status line per finished node.
pub struct FleetBar {
    pb: ProgressBar,
}

impl FleetBar {
    pub fn new(total: usize, quiet: bool) -> Self {
        let pb = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total as u64)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { pb }
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

impl FleetProgress for FleetBar {
    fn started(&self, node: &str) {
        self.pb.set_message(node.to_string());
    }

    fn finished(&self, node: &str, outcome: &RunOutcome) {
        self.pb.suspend(|| ui::outcome(node, outcome));
        self.pb.inc(1);
    }
}
