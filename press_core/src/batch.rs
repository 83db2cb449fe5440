//! Batch Processing
//!
//! Runs requests one after another through a [`CompressionPipeline`],
//! reporting each outcome to a progress callback as soon as it exists. A
//! failed item never stops the batch; cancellation is checked between items
//! only, so an item that has started always finishes.

use crate::codec::{Codec, DefaultCodec};
use crate::formats::FormatRegistry;
use crate::pipeline::{CompressionOutcome, CompressionPipeline, CompressionRequest, OutcomeStatus};
use crate::resize::ResizePolicy;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use walkdir::WalkDir;

/// Shared cancellation flag, safe to flip from a signal handler thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct BatchRunner<'r, C: Codec = DefaultCodec> {
    pipeline: CompressionPipeline<'r, C>,
    cancel: CancelToken,
}

impl<'r, C: Codec> BatchRunner<'r, C> {
    pub fn new(pipeline: CompressionPipeline<'r, C>) -> Self {
        Self {
            pipeline,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn pipeline(&self) -> &CompressionPipeline<'r, C> {
        &self.pipeline
    }

    /// Process `requests` in order.
    ///
    /// `on_progress(index, total, outcome)` runs synchronously after each
    /// item with a zero-based index. Returns one outcome per processed
    /// request; fewer than `requests.len()` only when cancelled.
    pub fn run<F>(&self, requests: &[CompressionRequest], mut on_progress: F) -> Vec<CompressionOutcome>
    where
        F: FnMut(usize, usize, &CompressionOutcome),
    {
        let total = requests.len();
        let mut outcomes = Vec::with_capacity(total);
        tracing::info!(total, "Batch started");

        for (index, request) in requests.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(processed = index, total, "Batch cancelled");
                break;
            }
            let outcome = self.pipeline.compress(request);
            on_progress(index, total, &outcome);
            outcomes.push(outcome);
        }

        tracing::info!(
            processed = outcomes.len(),
            total,
            succeeded = outcomes.iter().filter(|o| o.is_success()).count(),
            "Batch finished"
        );
        outcomes
    }
}

/// Aggregate counts over a finished (or cancelled) batch.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unsupported: usize,
    pub dependency_missing: usize,
    pub io_failures: usize,
    pub encode_failures: usize,
    /// Original bytes of successful items.
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub total_duration_millis: u64,
    pub errors: Vec<(PathBuf, String)>,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[CompressionOutcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.total += 1;
            summary.total_duration_millis += outcome.duration_millis;
            match outcome.status {
                OutcomeStatus::Success => {
                    summary.succeeded += 1;
                    summary.input_bytes += outcome.original_size_bytes;
                    summary.output_bytes += outcome.compressed_size_bytes;
                    continue;
                }
                OutcomeStatus::UnsupportedFormat => summary.unsupported += 1,
                OutcomeStatus::DependencyMissing => summary.dependency_missing += 1,
                OutcomeStatus::IoFailure => summary.io_failures += 1,
                OutcomeStatus::EncodeFailure => summary.encode_failures += 1,
            }
            summary.failed += 1;
            summary.errors.push((
                outcome.request.source_path().to_path_buf(),
                outcome
                    .error_detail
                    .clone()
                    .unwrap_or_else(|| outcome.status.to_string()),
            ));
        }
        summary
    }

    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            (self.succeeded as f64 / self.total as f64) * 100.0
        }
    }

    /// Percentage saved across successful items.
    pub fn size_reduction(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.output_bytes as f64 / self.input_bytes as f64) * 100.0
    }
}

/// Settings shared by every request of a batch.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub target_format: String,
    pub quality: u8,
    /// `None` writes each output next to its source.
    pub output_directory: Option<PathBuf>,
    pub resize_policy: Option<ResizePolicy>,
}

pub fn build_requests(inputs: &[PathBuf], settings: &BatchSettings) -> Vec<CompressionRequest> {
    inputs
        .iter()
        .map(|input| {
            let output_dir = settings.output_directory.clone().unwrap_or_else(|| {
                input
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."))
            });
            CompressionRequest::new(
                input.clone(),
                settings.target_format.clone(),
                settings.quality,
                output_dir,
            )
            .with_resize(settings.resize_policy)
        })
        .collect()
}

/// Expand `paths` into the list of files to process.
///
/// Files given explicitly are kept as-is so unsupported ones show up as
/// failed outcomes. Directories contribute only files whose extension the
/// registry can currently read, in file-name order.
pub fn collect_inputs(paths: &[PathBuf], registry: &FormatRegistry, recursive: bool) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();

    for path in paths {
        if path.is_dir() {
            for file in collect_dir(path, registry, recursive) {
                if seen.insert(file.clone()) {
                    files.push(file);
                }
            }
        } else if seen.insert(path.clone()) {
            files.push(path.clone());
        }
    }

    tracing::debug!(inputs = paths.len(), files = files.len(), "Collected input files");
    files
}

fn collect_dir(dir: &Path, registry: &FormatRegistry, recursive: bool) -> Vec<PathBuf> {
    let walker = if recursive {
        WalkDir::new(dir).follow_links(true)
    } else {
        WalkDir::new(dir).max_depth(1)
    };

    walker
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| registry.by_extension(ext))
                .is_some_and(|format| format.can_read())
        })
        .map(|e| e.path().to_path_buf())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{write_png, FailNthEncode};
    use std::fs;
    use tempfile::TempDir;

    fn builtin_only() -> FormatRegistry {
        FormatRegistry::with_availability(|_| false)
    }

    fn png_requests(dir: &Path, count: usize) -> Vec<CompressionRequest> {
        (0..count)
            .map(|i| {
                let source = write_png(dir, &format!("img{}.png", i), 6, 6);
                CompressionRequest::new(source, "bmp", 80, dir.join("out"))
            })
            .collect()
    }

    #[test]
    fn test_failure_does_not_halt_batch() {
        let temp = TempDir::new().unwrap();
        let requests = png_requests(temp.path(), 3);
        let registry = builtin_only();
        let runner = BatchRunner::new(CompressionPipeline::with_codec(
            &registry,
            FailNthEncode::new(1),
        ));

        let mut calls = Vec::new();
        let outcomes = runner.run(&requests, |index, total, outcome| {
            calls.push((index, total, outcome.status));
        });

        let statuses: Vec<_> = outcomes.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![
                OutcomeStatus::Success,
                OutcomeStatus::EncodeFailure,
                OutcomeStatus::Success
            ]
        );
        assert_eq!(
            calls,
            vec![
                (0, 3, OutcomeStatus::Success),
                (1, 3, OutcomeStatus::EncodeFailure),
                (2, 3, OutcomeStatus::Success),
            ]
        );
    }

    #[test]
    fn test_outcomes_follow_input_order() {
        let temp = TempDir::new().unwrap();
        let requests = png_requests(temp.path(), 4);
        let registry = builtin_only();
        let runner = BatchRunner::new(CompressionPipeline::new(&registry));

        let outcomes = runner.run(&requests, |_, _, _| {});

        assert_eq!(outcomes.len(), 4);
        for (request, outcome) in requests.iter().zip(&outcomes) {
            assert_eq!(&outcome.request, request);
        }
    }

    #[test]
    fn test_cancel_between_items() {
        let temp = TempDir::new().unwrap();
        let requests = png_requests(temp.path(), 5);
        let registry = builtin_only();
        let runner = BatchRunner::new(CompressionPipeline::new(&registry));
        let token = runner.cancel_token();

        let outcomes = runner.run(&requests, |index, _, _| {
            if index == 0 {
                token.cancel();
            }
        });

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_success());
    }

    #[test]
    fn test_cancelled_before_start() {
        let temp = TempDir::new().unwrap();
        let requests = png_requests(temp.path(), 2);
        let registry = builtin_only();
        let token = CancelToken::new();
        token.cancel();
        let runner =
            BatchRunner::new(CompressionPipeline::new(&registry)).with_cancel_token(token.clone());

        let mut called = false;
        let outcomes = runner.run(&requests, |_, _, _| called = true);

        assert!(outcomes.is_empty());
        assert!(!called);

        token.reset();
        assert_eq!(runner.run(&requests, |_, _, _| {}).len(), 2);
    }

    #[test]
    fn test_empty_batch() {
        let registry = builtin_only();
        let runner = BatchRunner::new(CompressionPipeline::new(&registry));
        assert!(runner.run(&[], |_, _, _| {}).is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let temp = TempDir::new().unwrap();
        let mut requests = png_requests(temp.path(), 2);
        requests.push(CompressionRequest::new(
            temp.path().join("missing.png"),
            "bmp",
            80,
            temp.path(),
        ));
        requests.push(CompressionRequest::new(
            temp.path().join("img0.png"),
            "heic",
            80,
            temp.path(),
        ));
        let registry = builtin_only();
        let runner = BatchRunner::new(CompressionPipeline::new(&registry));

        let summary = BatchSummary::from_outcomes(&runner.run(&requests, |_, _, _| {}));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.io_failures, 1);
        assert_eq!(summary.dependency_missing, 1);
        assert_eq!(summary.errors.len(), 2);
        assert!((summary.success_rate() - 50.0).abs() < 0.01);
        assert!(summary.input_bytes > 0 && summary.output_bytes > 0);
    }

    #[test]
    fn test_empty_summary() {
        let summary = BatchSummary::from_outcomes(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate(), 100.0);
        assert_eq!(summary.size_reduction(), 0.0);
    }

    #[test]
    fn test_collect_inputs_filters_directories() {
        let temp = TempDir::new().unwrap();
        write_png(temp.path(), "b.png", 2, 2);
        write_png(temp.path(), "a.png", 2, 2);
        fs::write(temp.path().join("notes.txt"), b"text").unwrap();
        fs::write(temp.path().join("photo.heic"), b"heic").unwrap();
        let sub = temp.path().join("sub");
        fs::create_dir(&sub).unwrap();
        write_png(&sub, "c.png", 2, 2);
        let registry = builtin_only();

        let flat = collect_inputs(&[temp.path().to_path_buf()], &registry, false);
        assert_eq!(flat, vec![temp.path().join("a.png"), temp.path().join("b.png")]);

        let deep = collect_inputs(&[temp.path().to_path_buf()], &registry, true);
        assert_eq!(deep.len(), 3);
        assert!(deep.contains(&sub.join("c.png")));
    }

    #[test]
    fn test_collect_inputs_keeps_explicit_files_once() {
        let temp = TempDir::new().unwrap();
        let a = write_png(temp.path(), "a.png", 2, 2);
        let txt = temp.path().join("notes.txt");
        fs::write(&txt, b"text").unwrap();
        let registry = builtin_only();

        let files = collect_inputs(
            &[a.clone(), txt.clone(), temp.path().to_path_buf()],
            &registry,
            false,
        );
        assert_eq!(files, vec![a, txt]);
    }

    #[test]
    fn test_build_requests_defaults_to_source_dir() {
        let settings = BatchSettings {
            target_format: "webp".to_string(),
            quality: 250,
            output_directory: None,
            resize_policy: Some(ResizePolicy::new(100, 100, true)),
        };
        let inputs = vec![PathBuf::from("/photos/a.png"), PathBuf::from("/scans/b.tif")];

        let requests = build_requests(&inputs, &settings);

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].output_directory(), Path::new("/photos"));
        assert_eq!(requests[1].output_directory(), Path::new("/scans"));
        assert_eq!(requests[0].quality(), 100);
        assert_eq!(requests[1].target_format(), "webp");
        assert!(requests[1].resize_policy().is_some());
    }

    #[test]
    fn test_build_requests_with_output_dir() {
        let settings = BatchSettings {
            target_format: "jpeg".to_string(),
            quality: 80,
            output_directory: Some(PathBuf::from("/out")),
            resize_policy: None,
        };
        let requests = build_requests(&[PathBuf::from("/photos/a.png")], &settings);
        assert_eq!(requests[0].output_directory(), Path::new("/out"));
    }
}
