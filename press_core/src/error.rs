//! Error types for the compression core
//!
//! Every failure a single compression can hit is a `PressError`; the pipeline
//! folds them into an [`OutcomeStatus`] so nothing escapes a batch.

use crate::formats::Dependency;
use crate::pipeline::OutcomeStatus;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PressError {
    #[error("Unknown image format: {0}")]
    UnknownFormat(String),

    #[error("Format {format} cannot be {operation}")]
    Unsupported {
        format: String,
        operation: &'static str,
    },

    #[error("Format {format} requires {dependency} which is not available")]
    DependencyMissing {
        format: String,
        dependency: Dependency,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode {format}: {reason}")]
    Encode { format: String, reason: String },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("External tool {tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("History error: {0}")]
    History(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PressError {
    pub fn unsupported(format: impl Into<String>, operation: &'static str) -> Self {
        PressError::Unsupported {
            format: format.into(),
            operation,
        }
    }

    pub fn encode(format: impl Into<String>, reason: impl ToString) -> Self {
        PressError::Encode {
            format: format.into(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PressError::Decode {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Outcome status a per-item failure is reported with.
    pub fn status(&self) -> OutcomeStatus {
        match self {
            PressError::UnknownFormat(_) | PressError::Unsupported { .. } => {
                OutcomeStatus::UnsupportedFormat
            }
            PressError::DependencyMissing { .. } => OutcomeStatus::DependencyMissing,
            PressError::Encode { .. }
            | PressError::Write { .. }
            | PressError::ExternalTool { .. } => OutcomeStatus::EncodeFailure,
            PressError::Read { .. }
            | PressError::Decode { .. }
            | PressError::Io(_)
            | PressError::Json(_)
            | PressError::Csv(_)
            | PressError::Config(_)
            | PressError::History(_) => OutcomeStatus::IoFailure,
        }
    }

    /// Short remediation hint for users, if one exists.
    pub fn hint(&self) -> Option<String> {
        match self {
            PressError::DependencyMissing { dependency, .. } => {
                Some(dependency.install_hint().to_string())
            }
            PressError::UnknownFormat(_) => {
                Some("Run `img-press formats` to list supported formats".to_string())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PressError>;
