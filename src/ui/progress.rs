use crate::ui::{theme, Icons};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use std::time::Duration;

/// Progress over the records of one ingestion run.
/// Hidden when stdout is not a terminal.
pub struct RecordProgress {
    pb: ProgressBar,
}

impl RecordProgress {
    pub fn new(total: usize) -> Self {
        let pb = if console::Term::stdout().is_term() {
            ProgressBar::new(total as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {wide_msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        Self { pb }
    }

    pub fn record_done(&self, key: &str) {
        self.pb.set_message(key.to_string());
        self.pb.inc(1);
    }

    pub fn finish_with_summary(&self, duration: Duration, books: usize, quotes: usize, failures: usize) {
        self.pb.finish_and_clear();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Complete in {}", HumanDuration(duration)).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}  {} {}",
            Icons::BOOK.style(theme().info.clone()),
            books,
            Icons::QUOTE.style(theme().info.clone()),
            quotes,
            Icons::CROSS.style(theme().info.clone()),
            failures
        );
    }
}
