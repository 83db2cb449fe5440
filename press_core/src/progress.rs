//! Batch progress display
//!
//! One indicatif bar on stderr, fed from the batch runner's progress
//! callback: ████████▓▓░░░░ 40% • 4/10 • ⏱️ 00:00:03 (ETA: 4s) • photo.jpg

use crate::pipeline::CompressionOutcome;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

pub mod progress_style {
    pub const PROGRESS_CHARS: &str = "█▓░";
    pub const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
    pub const BATCH_TEMPLATE: &str = "{spinner:.green} {prefix:.cyan.bold} ▕{bar:35.green/black}▏ {percent:>3}% • {pos}/{len} • ⏱️ {elapsed_precise} (ETA: {eta}) • {msg}";
}

pub fn create_progress_bar(total: u64, prefix: &str, hidden: bool) -> ProgressBar {
    let pb = ProgressBar::new(total);

    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
        return pb;
    }

    let style = ProgressStyle::default_bar()
        .template(progress_style::BATCH_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress_style::PROGRESS_CHARS)
        .tick_chars(progress_style::SPINNER_CHARS);
    pb.set_style(style);
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Progress bar plus running counts for a batch.
pub struct BatchProgress {
    bar: ProgressBar,
    succeeded: u64,
    failed: u64,
    input_bytes: u64,
    output_bytes: u64,
}

impl BatchProgress {
    pub fn new(total: usize, hidden: bool) -> Self {
        Self {
            bar: create_progress_bar(total as u64, "Compressing", hidden),
            succeeded: 0,
            failed: 0,
            input_bytes: 0,
            output_bytes: 0,
        }
    }

    /// Advance by one finished item.
    pub fn record(&mut self, outcome: &CompressionOutcome) {
        let name = outcome
            .request
            .source_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if outcome.is_success() {
            self.succeeded += 1;
            self.input_bytes += outcome.original_size_bytes;
            self.output_bytes += outcome.compressed_size_bytes;
        } else {
            self.failed += 1;
            self.bar.println(format!(
                "✗ {}: {}",
                name,
                outcome.error_detail.as_deref().unwrap_or(outcome.status.label())
            ));
        }
        self.bar.set_message(truncate_filename(&name, 40));
        self.bar.inc(1);
    }

    pub fn finish(&self) {
        let saved = self.input_bytes.saturating_sub(self.output_bytes);
        self.bar.finish_with_message(format!(
            "{} succeeded, {} failed | Saved: {}",
            self.succeeded,
            self.failed,
            format_bytes(saved)
        ));
    }

    pub fn abandon(&self) {
        self.bar.abandon_with_message("Cancelled");
    }

    pub fn bar(&self) -> &ProgressBar {
        &self.bar
    }
}

fn truncate_filename(filename: &str, max_len: usize) -> String {
    let chars: Vec<char> = filename.chars().collect();
    if chars.len() <= max_len {
        return filename.to_string();
    }
    let half = (max_len.saturating_sub(3)) / 2;
    let head: String = chars[..half].iter().collect();
    let tail: String = chars[chars.len() - half..].iter().collect();
    format!("{}...{}", head, tail)
}

pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 1 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CompressionRequest, OutcomeStatus};
    use chrono::Local;
    use std::path::PathBuf;

    fn outcome(ok: bool) -> CompressionOutcome {
        CompressionOutcome {
            request: CompressionRequest::new("/in/a.png", "jpeg", 80, "/out"),
            output_path: ok.then(|| PathBuf::from("/out/a.jpg")),
            original_size_bytes: 2048,
            compressed_size_bytes: if ok { 1024 } else { 0 },
            duration_millis: 3,
            status: if ok {
                OutcomeStatus::Success
            } else {
                OutcomeStatus::EncodeFailure
            },
            error_detail: (!ok).then(|| "boom".to_string()),
            original_dimensions: None,
            final_dimensions: None,
            completed_at: Local::now(),
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_truncate_filename() {
        assert_eq!(truncate_filename("short.txt", 20), "short.txt");
        let truncated = truncate_filename("very_long_filename_that_needs_truncation.txt", 20);
        assert!(truncated.chars().count() <= 20);
        assert!(truncated.contains("..."));
        // multi-byte names must not split a char
        let unicode = truncate_filename("写真写真写真写真写真写真写真写真.heic", 11);
        assert!(unicode.contains("..."));
    }

    #[test]
    fn test_batch_progress_counts() {
        let mut progress = BatchProgress::new(3, true);
        progress.record(&outcome(true));
        progress.record(&outcome(false));
        progress.record(&outcome(true));
        assert_eq!(progress.bar().position(), 3);
        assert_eq!((progress.succeeded, progress.failed), (2, 1));
        assert_eq!(progress.input_bytes - progress.output_bytes, 2048);
        progress.finish();
    }
}
