//! Core of the img-press batch image converter
//!
//! - Format capability registry with optional dependency probing
//! - Compression pipeline (decode → resize → encode → unique name → write)
//! - Sequential batch runner with progress callback and cancellation
//! - History and configuration persistence
//! - Logging, progress bars and summary reports shared by the CLI

pub mod batch;
pub mod codec;
pub mod config;
pub mod error;
pub mod formats;
pub mod history;
pub mod logging;
pub mod naming;
pub mod pipeline;
pub mod probe;
pub mod progress;
pub mod report;
pub mod resize;

pub use batch::{build_requests, collect_inputs, BatchRunner, BatchSettings, BatchSummary, CancelToken};
pub use codec::{Codec, DefaultCodec};
pub use config::{AppConfig, Theme};
pub use error::{PressError, Result};
pub use formats::{Dependency, FormatDescriptor, FormatRegistry};
pub use history::{HistoryEntry, HistoryStatistics, HistoryStore};
pub use logging::{init_logging, LogConfig};
pub use naming::{output_path_for, resolve_unique_path};
pub use pipeline::{
    CompressionOutcome, CompressionPipeline, CompressionRequest, ImageInfo, OutcomeStatus,
};
pub use progress::{format_bytes, format_duration, BatchProgress};
pub use report::print_summary_report;
pub use resize::ResizePolicy;
