//! Compression history
//!
//! A JSON file holding the newest `max_items` outcomes, oldest first. The
//! store is an explicit object: callers open it, record into it and decide
//! when to save.

use crate::error::{PressError, Result};
use crate::formats::canonical_identifier;
use crate::pipeline::{CompressionOutcome, OutcomeStatus};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MAX_ITEMS: usize = 100;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One recorded compression, flattened for display and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Local>,
    pub input_path: String,
    pub input_filename: String,
    #[serde(default)]
    pub output_path: String,
    #[serde(default)]
    pub output_filename: String,
    #[serde(default)]
    pub original_size: u64,
    #[serde(default)]
    pub compressed_size: u64,
    #[serde(default)]
    pub compression_ratio: f64,
    #[serde(default)]
    pub original_dimensions: (u32, u32),
    #[serde(default)]
    pub final_dimensions: (u32, u32),
    #[serde(default)]
    pub format: String,
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: Option<OutcomeStatus>,
}

impl From<&CompressionOutcome> for HistoryEntry {
    fn from(outcome: &CompressionOutcome) -> Self {
        let input = outcome.request.source_path();
        let output = outcome.output_path.as_deref();
        let message = match (&outcome.error_detail, output) {
            (Some(detail), _) => detail.clone(),
            (None, Some(path)) => format!("Saved to {}", path.display()),
            (None, None) => outcome.status.to_string(),
        };

        Self {
            timestamp: outcome.completed_at,
            input_path: input.display().to_string(),
            input_filename: file_name(input),
            output_path: output.map(|p| p.display().to_string()).unwrap_or_default(),
            output_filename: output.map(file_name).unwrap_or_default(),
            original_size: outcome.original_size_bytes,
            compressed_size: outcome.compressed_size_bytes,
            compression_ratio: outcome.compression_ratio(),
            original_dimensions: outcome.original_dimensions.unwrap_or_default(),
            final_dimensions: outcome.final_dimensions.unwrap_or_default(),
            format: format_label(outcome.request.target_format()),
            success: outcome.is_success(),
            message,
            status: Some(outcome.status),
        }
    }
}

/// `jpg`, `.JPEG` and `image/jpeg` all record as `JPEG`.
fn format_label(target: &str) -> String {
    canonical_identifier(target)
        .unwrap_or_else(|| target.trim())
        .to_uppercase()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStatistics {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Bytes saved over successful entries; negative if outputs grew.
    pub total_space_saved: i64,
    /// Mean ratio over successful entries that actually shrank.
    pub average_compression_ratio: f64,
    pub most_used_format: Option<String>,
    pub success_rate: f64,
}

impl HistoryStatistics {
    pub fn total_space_saved_mb(&self) -> f64 {
        self.total_space_saved as f64 / BYTES_PER_MB
    }
}

#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_items: usize,
    entries: Vec<HistoryEntry>,
}

impl HistoryStore {
    /// Load `path`. A missing or unreadable file yields an empty history.
    pub fn open(path: impl Into<PathBuf>, max_items: usize) -> Self {
        let path = path.into();
        let max_items = max_items.max(1);
        let mut entries = match Self::load(&path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable history file");
                Vec::new()
            }
        };
        trim(&mut entries, max_items);
        tracing::debug!(path = %path.display(), entries = entries.len(), "History loaded");
        Self {
            path,
            max_items,
            entries,
        }
    }

    fn load(path: &Path) -> Result<Vec<HistoryEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let data = fs::read_to_string(path)?;
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&data)?)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    pub fn save(&self) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "History saved");
        Ok(())
    }

    pub fn record(&mut self, outcomes: &[CompressionOutcome]) {
        self.entries.extend(outcomes.iter().map(HistoryEntry::from));
        trim(&mut self.entries, self.max_items);
    }

    /// Oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The newest `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn remove(&mut self, index: usize) -> Result<HistoryEntry> {
        if index >= self.entries.len() {
            return Err(PressError::History(format!(
                "no entry at index {} (history has {})",
                index,
                self.entries.len()
            )));
        }
        Ok(self.entries.remove(index))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Case-insensitive match on file names, format and message.
    pub fn search(&self, query: &str) -> Vec<&HistoryEntry> {
        let query = query.to_lowercase();
        self.entries
            .iter()
            .filter(|e| {
                [&e.input_filename, &e.output_filename, &e.format, &e.message]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&query))
            })
            .collect()
    }

    pub fn statistics(&self) -> HistoryStatistics {
        let successful: Vec<&HistoryEntry> = self.entries.iter().filter(|e| e.success).collect();
        let total = self.entries.len();

        let total_space_saved = successful
            .iter()
            .map(|e| e.original_size as i64 - e.compressed_size as i64)
            .sum();

        let ratios: Vec<f64> = successful
            .iter()
            .map(|e| e.compression_ratio)
            .filter(|r| *r > 0.0)
            .collect();
        let average_compression_ratio = if ratios.is_empty() {
            0.0
        } else {
            ratios.iter().sum::<f64>() / ratios.len() as f64
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &successful {
            *counts.entry(entry.format.as_str()).or_default() += 1;
        }
        // ties go to the alphabetically first format
        let most_used_format = counts
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(format, _)| format.to_string());

        let success_rate = if total == 0 {
            0.0
        } else {
            successful.len() as f64 / total as f64 * 100.0
        };

        HistoryStatistics {
            total,
            successful: successful.len(),
            failed: total - successful.len(),
            total_space_saved,
            average_compression_ratio,
            most_used_format,
            success_rate,
        }
    }

    pub fn export_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record([
            "Timestamp",
            "Original File",
            "Compressed File",
            "Original Size (MB)",
            "Compressed Size (MB)",
            "Reduction (%)",
            "Original Dimensions",
            "Final Dimensions",
            "Format",
            "Status",
            "Message",
        ])?;
        for e in &self.entries {
            writer.write_record([
                e.timestamp.to_rfc3339(),
                e.input_filename.clone(),
                e.output_filename.clone(),
                format!("{:.2}", e.original_size as f64 / BYTES_PER_MB),
                format!("{:.2}", e.compressed_size as f64 / BYTES_PER_MB),
                format!("{:.1}", e.compression_ratio),
                format!("{}x{}", e.original_dimensions.0, e.original_dimensions.1),
                format!("{}x{}", e.final_dimensions.0, e.final_dimensions.1),
                e.format.clone(),
                if e.success { "Success" } else { "Error" }.to_string(),
                e.message.clone(),
            ])?;
        }
        writer.flush()?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "History exported to CSV");
        Ok(())
    }

    pub fn export_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(&self.entries)?)?;
        tracing::info!(path = %path.display(), entries = self.entries.len(), "History exported to JSON");
        Ok(())
    }
}

fn trim(entries: &mut Vec<HistoryEntry>, max_items: usize) {
    if entries.len() > max_items {
        let excess = entries.len() - max_items;
        entries.drain(..excess);
    }
}
