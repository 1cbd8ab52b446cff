//! Progress display for catalog runs.

use declarative::{ApplyResult, ExecuteSummary, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Progress bar over the resources of one transaction
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    /// Bar drawn to stderr, hidden when `quiet`
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }
}

impl ProgressCallback for RunProgress {
    fn on_transaction_start(&mut self, count: usize) {
        self.bar.set_length(count as u64);
        self.bar.set_position(0);
    }

    fn on_resource_start(&mut self, id: &str) {
        self.bar.set_message(id.to_string());
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        if let ApplyResult::Failed { error } = result {
            self.bar.println(format!("✗ {id}: {error}"));
        }
        self.bar.inc(1);
    }

    fn on_transaction_complete(&mut self, _summary: &ExecuteSummary) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracks_position() {
        let mut progress = RunProgress::new(true);
        progress.on_transaction_start(3);
        progress.on_resource_start("File[/tmp/a]");
        progress.on_resource_complete("File[/tmp/a]", &ApplyResult::Changed);
        progress.on_resource_complete(
            "Exec[false]",
            &ApplyResult::Failed {
                error: "returned 1 instead of 0".into(),
            },
        );
        assert_eq!(progress.bar.position(), 2);
        assert_eq!(progress.bar.length(), Some(3));
        progress.on_transaction_complete(&ExecuteSummary::default());
        assert!(progress.bar.is_finished());
    }
}
