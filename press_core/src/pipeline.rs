//! Compression Pipeline
//!
//! One request in, one outcome out: resolve target → detect and decode the
//! source → resize → encode → pick a free output name → write.
//!
//! [`CompressionPipeline::compress`] never returns an error. Every failure is
//! folded into the outcome's [`OutcomeStatus`] so a batch always has one
//! outcome per request.

use crate::codec::{clamp_quality, Codec, DefaultCodec};
use crate::error::{PressError, Result};
use crate::formats::{FormatDescriptor, FormatRegistry};
use crate::naming::{output_path_for, resolve_unique_path};
use crate::resize::{self, ResizePolicy};
use chrono::{DateTime, Local};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    UnsupportedFormat,
    DependencyMissing,
    IoFailure,
    EncodeFailure,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 5] = [
        OutcomeStatus::Success,
        OutcomeStatus::UnsupportedFormat,
        OutcomeStatus::DependencyMissing,
        OutcomeStatus::IoFailure,
        OutcomeStatus::EncodeFailure,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::UnsupportedFormat => "unsupported format",
            OutcomeStatus::DependencyMissing => "dependency missing",
            OutcomeStatus::IoFailure => "I/O failure",
            OutcomeStatus::EncodeFailure => "encode failure",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single unit of work. Quality is clamped to 1..=100 on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionRequest {
    source_path: PathBuf,
    target_format: String,
    quality: u8,
    resize_policy: Option<ResizePolicy>,
    output_directory: PathBuf,
}

impl CompressionRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        target_format: impl Into<String>,
        quality: u8,
        output_directory: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            target_format: target_format.into(),
            quality: clamp_quality(quality),
            resize_policy: None,
            output_directory: output_directory.into(),
        }
    }

    pub fn with_resize(mut self, policy: Option<ResizePolicy>) -> Self {
        self.resize_policy = policy;
        self
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn target_format(&self) -> &str {
        &self.target_format
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn resize_policy(&self) -> Option<&ResizePolicy> {
        self.resize_policy.as_ref()
    }

    pub fn output_directory(&self) -> &Path {
        &self.output_directory
    }
}

/// Result of one request. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOutcome {
    pub request: CompressionRequest,
    pub output_path: Option<PathBuf>,
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub duration_millis: u64,
    pub status: OutcomeStatus,
    pub error_detail: Option<String>,
    pub original_dimensions: Option<(u32, u32)>,
    pub final_dimensions: Option<(u32, u32)>,
    pub completed_at: DateTime<Local>,
}

impl CompressionOutcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Percentage of the original size saved; negative when the output grew.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size_bytes == 0 || !self.is_success() {
            return 0.0;
        }
        (1.0 - self.compressed_size_bytes as f64 / self.original_size_bytes as f64) * 100.0
    }

    pub fn bytes_saved(&self) -> i64 {
        if !self.is_success() {
            return 0;
        }
        self.original_size_bytes as i64 - self.compressed_size_bytes as i64
    }
}

/// Basic facts about an input image, as shown by `img-press info`.
#[derive(Debug, Clone, Serialize)]
pub struct ImageInfo {
    pub path: PathBuf,
    pub format: String,
    pub width: u32,
    pub height: u32,
    pub color_type: String,
    pub has_alpha: bool,
    pub file_size: u64,
}

/// Measurements taken while a request runs, kept even when a later step fails.
#[derive(Debug, Default)]
struct Measurements {
    original_size: u64,
    original_dimensions: Option<(u32, u32)>,
    final_dimensions: Option<(u32, u32)>,
}

pub struct CompressionPipeline<'r, C: Codec = DefaultCodec> {
    registry: &'r FormatRegistry,
    codec: C,
}

impl<'r> CompressionPipeline<'r, DefaultCodec> {
    pub fn new(registry: &'r FormatRegistry) -> Self {
        Self::with_codec(registry, DefaultCodec)
    }
}

impl<'r, C: Codec> CompressionPipeline<'r, C> {
    pub fn with_codec(registry: &'r FormatRegistry, codec: C) -> Self {
        Self { registry, codec }
    }

    pub fn registry(&self) -> &'r FormatRegistry {
        self.registry
    }

    pub fn compress(&self, request: &CompressionRequest) -> CompressionOutcome {
        let start = Instant::now();
        let mut measured = Measurements::default();

        let result = self.run(request, &mut measured);
        let duration_millis = start.elapsed().as_millis() as u64;

        match result {
            Ok((output_path, compressed_size)) => {
                tracing::info!(
                    source = %request.source_path.display(),
                    output = %output_path.display(),
                    original_size = measured.original_size,
                    compressed_size,
                    duration_millis,
                    "Compressed"
                );
                CompressionOutcome {
                    request: request.clone(),
                    output_path: Some(output_path),
                    original_size_bytes: measured.original_size,
                    compressed_size_bytes: compressed_size,
                    duration_millis,
                    status: OutcomeStatus::Success,
                    error_detail: None,
                    original_dimensions: measured.original_dimensions,
                    final_dimensions: measured.final_dimensions,
                    completed_at: Local::now(),
                }
            }
            Err(e) => {
                let status = e.status();
                tracing::warn!(
                    source = %request.source_path.display(),
                    format = %request.target_format,
                    status = %status,
                    error = %e,
                    "Compression failed"
                );
                CompressionOutcome {
                    request: request.clone(),
                    output_path: None,
                    original_size_bytes: measured.original_size,
                    compressed_size_bytes: 0,
                    duration_millis,
                    status,
                    error_detail: Some(e.to_string()),
                    original_dimensions: measured.original_dimensions,
                    final_dimensions: None,
                    completed_at: Local::now(),
                }
            }
        }
    }

    /// Size in bytes the request would produce, without writing anything.
    pub fn estimate(&self, request: &CompressionRequest) -> Result<u64> {
        let target = self.target_for(request.target_format())?;
        let encoded = self.render(request, target, &mut Measurements::default())?;
        Ok(encoded.len() as u64)
    }

    pub fn inspect(&self, path: &Path) -> Result<ImageInfo> {
        let source = self.source_for(path)?;
        let file_size = file_size(path)?;
        let image = self.codec.decode(source, path)?;
        let color = image.color();
        Ok(ImageInfo {
            path: path.to_path_buf(),
            format: source.identifier.to_string(),
            width: image.width(),
            height: image.height(),
            color_type: format!("{:?}", color),
            has_alpha: color.has_alpha(),
            file_size,
        })
    }

    fn run(
        &self,
        request: &CompressionRequest,
        measured: &mut Measurements,
    ) -> Result<(PathBuf, u64)> {
        let target = self.target_for(request.target_format())?;
        tracing::debug!(format = target.identifier, "Target format resolved");

        let encoded = self.render(request, target, measured)?;

        let desired = output_path_for(
            request.source_path(),
            request.output_directory(),
            target.primary_extension(),
        );
        let output_path = write_new_file(&desired, &encoded)?;
        Ok((output_path, encoded.len() as u64))
    }

    /// Decode, resize and encode; everything short of touching the output.
    fn render(
        &self,
        request: &CompressionRequest,
        target: &FormatDescriptor,
        measured: &mut Measurements,
    ) -> Result<Vec<u8>> {
        let image = self.load(request.source_path(), measured)?;
        let image = resize::apply(image, request.resize_policy());
        measured.final_dimensions = Some((image.width(), image.height()));

        if !target.lossy {
            tracing::trace!(format = target.identifier, "Quality ignored for lossless format");
        }
        let encoded = self.codec.encode(target, &image, request.quality())?;
        tracing::debug!(
            format = target.identifier,
            quality = request.quality(),
            bytes = encoded.len(),
            "Encoded"
        );
        Ok(encoded)
    }

    fn load(&self, path: &Path, measured: &mut Measurements) -> Result<DynamicImage> {
        let source = self.source_for(path)?;
        measured.original_size = file_size(path)?;
        let image = self.codec.decode(source, path)?;
        measured.original_dimensions = Some((image.width(), image.height()));
        tracing::debug!(
            path = %path.display(),
            format = source.identifier,
            width = image.width(),
            height = image.height(),
            "Decoded source"
        );
        Ok(image)
    }

    fn target_for(&self, identifier: &str) -> Result<&'r FormatDescriptor> {
        let target = self.registry.resolve(identifier)?;
        if !target.supports_write {
            return Err(PressError::unsupported(target.identifier, "written"));
        }
        usable(target)
    }

    fn source_for(&self, path: &Path) -> Result<&'r FormatDescriptor> {
        let source = self.registry.detect(path).ok_or_else(|| {
            PressError::UnknownFormat(
                path.extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string()),
            )
        })?;
        if !source.supports_read {
            return Err(PressError::unsupported(source.identifier, "read"));
        }
        usable(source)
    }
}

fn usable(format: &FormatDescriptor) -> Result<&FormatDescriptor> {
    match format.required_dependency {
        Some(dependency) if !format.dependency_available => Err(PressError::DependencyMissing {
            format: format.identifier.to_string(),
            dependency,
        }),
        _ => Ok(format),
    }
}

fn file_size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| PressError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `bytes` to the first free name derived from `desired`.
///
/// `create_new` guarantees an existing file is never truncated, even if it
/// appeared after the name was picked.
fn write_new_file(desired: &Path, bytes: &[u8]) -> Result<PathBuf> {
    const MAX_ATTEMPTS: usize = 16;

    let write_err = |path: &Path, source| PressError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = desired.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;
    }

    let mut last_err = None;
    for _ in 0..MAX_ATTEMPTS {
        let path = resolve_unique_path(desired);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
                    drop(file);
                    let _ = fs::remove_file(&path);
                    return Err(write_err(&path, e));
                }
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                last_err = Some(write_err(&path, e));
            }
            Err(e) => return Err(write_err(&path, e)),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        write_err(
            desired,
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "no free output name"),
        )
    }))
}


#[cfg(test)]
mod tests {
    use super::testing::{write_png, FailNthEncode};
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn builtin_only() -> FormatRegistry {
        FormatRegistry::with_availability(|_| false)
    }

    fn dir_entries(dir: &Path) -> usize {
        fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_quality_clamped_on_construction() {
        assert_eq!(CompressionRequest::new("a.png", "jpeg", 0, "out").quality(), 1);
        assert_eq!(CompressionRequest::new("a.png", "jpeg", 150, "out").quality(), 100);
        assert_eq!(CompressionRequest::new("a.png", "jpeg", 85, "out").quality(), 85);
    }

    #[test]
    fn test_unknown_target_is_unsupported_and_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 8, 8);
        let out = temp.path().join("out");
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "jpeg2000", 80, &out));

        assert_eq!(outcome.status, OutcomeStatus::UnsupportedFormat);
        assert!(outcome.output_path.is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_read_only_target_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 8, 8);
        let out = temp.path().join("out");
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "dds", 80, &out));

        assert_eq!(outcome.status, OutcomeStatus::UnsupportedFormat);
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_dependency_target() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 8, 8);
        let out = temp.path().join("out");
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "heic", 80, &out));

        assert_eq!(outcome.status, OutcomeStatus::DependencyMissing);
        assert!(outcome.error_detail.unwrap().contains("libheif"));
        assert!(!out.exists());
    }

    #[test]
    fn test_missing_dependency_source() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("layers.psd");
        fs::write(&source, b"8BPS").unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 80, temp.path()));

        assert_eq!(outcome.status, OutcomeStatus::DependencyMissing);
    }

    #[test]
    fn test_missing_source_is_io_failure() {
        let temp = TempDir::new().unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry).compress(&CompressionRequest::new(
            temp.path().join("ghost.png"),
            "png",
            80,
            temp.path(),
        ));

        assert_eq!(outcome.status, OutcomeStatus::IoFailure);
        assert!(outcome.error_detail.is_some());
        assert_eq!(dir_entries(temp.path()), 0);
    }

    #[test]
    fn test_corrupt_source_is_io_failure() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("bad.png");
        fs::write(&source, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "jpeg", 80, temp.path().join("out")));

        assert_eq!(outcome.status, OutcomeStatus::IoFailure);
    }

    #[test]
    fn test_unknown_source_is_unsupported() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("notes.txt");
        fs::write(&source, b"hello").unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 80, temp.path()));

        assert_eq!(outcome.status, OutcomeStatus::UnsupportedFormat);
    }

    #[test]
    fn test_lossless_round_trip_keeps_dimensions() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "photo.png", 40, 30);
        let out = temp.path().join("out");
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 100, &out));

        assert!(outcome.is_success(), "{:?}", outcome.error_detail);
        let output = outcome.output_path.clone().unwrap();
        assert_eq!(output, out.join("photo.png"));
        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
        assert_eq!(outcome.original_dimensions, Some((40, 30)));
        assert_eq!(outcome.final_dimensions, Some((40, 30)));
        assert_eq!(outcome.compressed_size_bytes, fs::metadata(&output).unwrap().len());
        assert_eq!(outcome.original_size_bytes, fs::metadata(&source).unwrap().len());
    }

    #[test]
    fn test_resize_applied() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "wide.png", 1000, 500);
        let registry = builtin_only();

        let request = CompressionRequest::new(&source, "jpg", 75, temp.path().join("out"))
            .with_resize(Some(ResizePolicy::new(200, 200, true)));
        let outcome = CompressionPipeline::new(&registry).compress(&request);

        assert!(outcome.is_success(), "{:?}", outcome.error_detail);
        assert_eq!(outcome.final_dimensions, Some((200, 100)));
        let output = outcome.output_path.unwrap();
        assert_eq!(output.extension().unwrap(), "jpg");
        let decoded = image::open(&output).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 100));
    }

    #[test]
    fn test_existing_output_is_never_overwritten() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 10, 10);
        let out = temp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("a.bmp"), b"keep me").unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "bmp", 80, &out));

        assert!(outcome.is_success());
        assert_eq!(outcome.output_path.unwrap(), out.join("a_1.bmp"));
        assert_eq!(fs::read(out.join("a.bmp")).unwrap(), b"keep me");
    }

    #[test]
    fn test_encoder_failure_is_reported() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 10, 10);
        let out = temp.path().join("out");
        let registry = builtin_only();

        let pipeline = CompressionPipeline::with_codec(&registry, FailNthEncode::new(0));
        let outcome = pipeline.compress(&CompressionRequest::new(&source, "png", 80, &out));

        assert_eq!(outcome.status, OutcomeStatus::EncodeFailure);
        assert!(outcome.error_detail.unwrap().contains("injected failure"));
        assert_eq!(outcome.original_dimensions, Some((10, 10)));
        assert!(!out.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unwritable_output_is_encode_failure() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 10, 10);
        // a regular file where the output directory should be
        let blocker = temp.path().join("out");
        fs::write(&blocker, b"file").unwrap();
        let registry = builtin_only();

        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 80, blocker.join("nested")));

        assert_eq!(outcome.status, OutcomeStatus::EncodeFailure);
    }

    #[test]
    fn test_estimate_matches_written_size() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 24, 24);
        let out = temp.path().join("out");
        let registry = builtin_only();
        let pipeline = CompressionPipeline::new(&registry);
        let request = CompressionRequest::new(&source, "bmp", 80, &out);

        let estimate = pipeline.estimate(&request).unwrap();
        assert!(!out.exists());

        let outcome = pipeline.compress(&request);
        assert_eq!(outcome.compressed_size_bytes, estimate);
    }

    #[test]
    fn test_estimate_unknown_target() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 4, 4);
        let registry = builtin_only();
        let request = CompressionRequest::new(&source, "nope", 80, temp.path());

        let err = CompressionPipeline::new(&registry).estimate(&request).unwrap_err();
        assert!(matches!(err, PressError::UnknownFormat(_)));
    }

    #[test]
    fn test_inspect() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 12, 7);
        let registry = builtin_only();

        let info = CompressionPipeline::new(&registry).inspect(&source).unwrap();
        assert_eq!(info.format, "png");
        assert_eq!((info.width, info.height), (12, 7));
        assert!(!info.has_alpha);
        assert!(info.file_size > 0);
    }

    #[test]
    fn test_compression_ratio() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 4, 4);
        let registry = builtin_only();
        let mut outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 80, temp.path().join("o")));

        outcome.original_size_bytes = 1000;
        outcome.compressed_size_bytes = 250;
        assert!((outcome.compression_ratio() - 75.0).abs() < f64::EPSILON);
        assert_eq!(outcome.bytes_saved(), 750);

        outcome.status = OutcomeStatus::IoFailure;
        assert_eq!(outcome.compression_ratio(), 0.0);
    }

    #[test]
    fn test_outcome_serializes() {
        let temp = TempDir::new().unwrap();
        let source = write_png(temp.path(), "a.png", 4, 4);
        let registry = builtin_only();
        let outcome = CompressionPipeline::new(&registry)
            .compress(&CompressionRequest::new(&source, "png", 80, temp.path().join("o")));

        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        let back: CompressionOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back.request, outcome.request);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_request_quality_always_in_range(q in any::<u8>()) {
            let request = CompressionRequest::new("a.png", "jpeg", q, "out");
            prop_assert!((1..=100).contains(&request.quality()));
        }
    }
}
