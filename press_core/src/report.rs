//! Text summaries for batches and history statistics

use crate::batch::BatchSummary;
use crate::history::HistoryStatistics;
use crate::progress::{format_bytes, format_duration};
use std::fmt::Write;
use std::time::Duration;

const INNER_WIDTH: usize = 52;

fn rule(out: &mut String, left: char, right: char) {
    let _ = writeln!(out, "{}{}{}", left, "═".repeat(INNER_WIDTH), right);
}

fn row(out: &mut String, label: &str, value: impl std::fmt::Display) {
    let text = format!("  {:<22}{:>12}", label, value.to_string());
    let pad = INNER_WIDTH.saturating_sub(text.chars().count());
    let _ = writeln!(out, "║{}{}║", text, " ".repeat(pad));
}

fn title(out: &mut String, text: &str) {
    let len = text.chars().count();
    let left = INNER_WIDTH.saturating_sub(len) / 2;
    let right = INNER_WIDTH.saturating_sub(len + left);
    let _ = writeln!(out, "║{}{}{}║", " ".repeat(left), text, " ".repeat(right));
}

/// Boxed batch summary, followed by the list of failures.
pub fn render_summary(summary: &BatchSummary, duration: Duration, requested: usize) -> String {
    let mut out = String::new();
    rule(&mut out, '╔', '╗');
    title(&mut out, "Compression Summary");
    rule(&mut out, '╠', '╣');
    row(&mut out, "Files processed:", summary.total);
    if requested > summary.total {
        row(&mut out, "Not started:", requested - summary.total);
    }
    row(&mut out, "Succeeded:", summary.succeeded);
    row(&mut out, "Failed:", summary.failed);
    for (label, count) in [
        ("  unsupported format", summary.unsupported),
        ("  dependency missing", summary.dependency_missing),
        ("  I/O failure", summary.io_failures),
        ("  encode failure", summary.encode_failures),
    ] {
        if count > 0 {
            row(&mut out, label, count);
        }
    }
    row(&mut out, "Success rate:", format!("{:.1}%", summary.success_rate()));
    rule(&mut out, '╠', '╣');
    row(&mut out, "Input size:", format_bytes(summary.input_bytes));
    row(&mut out, "Output size:", format_bytes(summary.output_bytes));
    row(&mut out, "Size reduction:", format!("{:.1}%", summary.size_reduction()));
    rule(&mut out, '╠', '╣');
    row(&mut out, "Total time:", format_duration(duration));
    if summary.total > 0 {
        let avg = duration.as_secs_f64() / summary.total as f64;
        row(&mut out, "Avg time/file:", format!("{:.2}s", avg));
    }
    rule(&mut out, '╚', '╝');

    if !summary.errors.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Errors:");
        for (path, error) in &summary.errors {
            let _ = writeln!(out, "   {} → {}", path.display(), error);
        }
    }
    out
}

pub fn print_summary_report(summary: &BatchSummary, duration: Duration, requested: usize) {
    println!();
    print!("{}", render_summary(summary, duration, requested));
}

pub fn render_statistics(stats: &HistoryStatistics) -> String {
    let mut out = String::new();
    rule(&mut out, '╔', '╗');
    title(&mut out, "History Statistics");
    rule(&mut out, '╠', '╣');
    row(&mut out, "Compressions:", stats.total);
    row(&mut out, "Succeeded:", stats.successful);
    row(&mut out, "Failed:", stats.failed);
    row(&mut out, "Success rate:", format!("{:.1}%", stats.success_rate));
    row(
        &mut out,
        "Space saved:",
        format!("{:.2} MB", stats.total_space_saved_mb()),
    );
    row(
        &mut out,
        "Average reduction:",
        format!("{:.1}%", stats.average_compression_ratio),
    );
    row(
        &mut out,
        "Most used format:",
        stats.most_used_format.as_deref().unwrap_or("-"),
    );
    rule(&mut out, '╚', '╝');
    out
}
