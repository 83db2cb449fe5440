//! User configuration
//!
//! Stored as JSON. Unknown keys are ignored and missing keys take their
//! defaults, so files written by older versions keep loading. Legacy values
//! are rewritten by [`migrate`] before deserialization.

#![cfg_attr(test, allow(clippy::field_reassign_with_default))]

use crate::batch::BatchSettings;
use crate::codec::{MAX_QUALITY, MIN_QUALITY};
use crate::error::{PressError, Result};
use crate::formats::canonical_identifier;
use crate::resize::ResizePolicy;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const MAX_RECENT: usize = 10;
pub const CONFIG_FILE: &str = "config.json";
pub const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => f.write_str("light"),
            Theme::Dark => f.write_str("dark"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = PressError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "light" | "modern_light" => Ok(Theme::Light),
            "dark" | "modern_dark" => Ok(Theme::Dark),
            other => Err(PressError::Config(format!("unknown theme: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: Theme,
    pub default_quality: u8,
    /// Format identifier, e.g. `jpeg`.
    pub preferred_format: String,
    pub keep_aspect_ratio: bool,
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    /// Most recent first.
    pub recent_directories: Vec<PathBuf>,
    /// Most recent first.
    pub recent_formats: Vec<String>,
    pub last_output_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            default_quality: 85,
            preferred_format: "jpeg".to_string(),
            keep_aspect_ratio: true,
            max_width: None,
            max_height: None,
            recent_directories: Vec::new(),
            recent_formats: vec!["jpeg".to_string(), "png".to_string(), "webp".to_string()],
            last_output_dir: None,
        }
    }
}

impl AppConfig {
    /// Load `path`; a missing file gives defaults, a broken one gives
    /// defaults and a warning. Out-of-range values are repaired.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::read(path) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Invalid config file, using defaults");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut value: Value = serde_json::from_str(&data)?;
        migrate(&mut value);
        Ok(serde_json::from_value(value)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        tracing::debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&self.default_quality) {
            return Err(PressError::Config(format!(
                "quality must be between {} and {}, got {}",
                MIN_QUALITY, MAX_QUALITY, self.default_quality
            )));
        }
        if canonical_identifier(&self.preferred_format).is_none() {
            return Err(PressError::Config(format!(
                "unknown preferred format: {}",
                self.preferred_format
            )));
        }
        if self.max_width == Some(0) || self.max_height == Some(0) {
            return Err(PressError::Config(
                "maximum dimensions must be at least 1 pixel".to_string(),
            ));
        }
        Ok(())
    }

    fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.default_quality = self.default_quality.clamp(MIN_QUALITY, MAX_QUALITY);
        match canonical_identifier(&self.preferred_format) {
            Some(id) => self.preferred_format = id.to_string(),
            None => {
                tracing::warn!(format = %self.preferred_format, "Unknown preferred format in config");
                self.preferred_format = defaults.preferred_format;
            }
        }
        self.max_width = self.max_width.filter(|w| *w > 0);
        self.max_height = self.max_height.filter(|h| *h > 0);
        self.recent_directories.truncate(MAX_RECENT);
        self.recent_formats.truncate(MAX_RECENT);
        self
    }

    pub fn set_quality(&mut self, quality: u8) -> Result<()> {
        if !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(PressError::Config(format!(
                "quality must be between {} and {}, got {}",
                MIN_QUALITY, MAX_QUALITY, quality
            )));
        }
        self.default_quality = quality;
        Ok(())
    }

    pub fn set_preferred_format(&mut self, format: &str) -> Result<()> {
        let id = canonical_identifier(format)
            .ok_or_else(|| PressError::Config(format!("unknown format: {}", format)))?;
        self.preferred_format = id.to_string();
        self.add_recent_format(id);
        Ok(())
    }

    pub fn add_recent_directory(&mut self, dir: impl Into<PathBuf>) {
        push_recent(&mut self.recent_directories, dir.into());
    }

    pub fn add_recent_format(&mut self, format: &str) {
        let id = canonical_identifier(format).unwrap_or(format);
        push_recent(&mut self.recent_formats, id.to_string());
    }

    pub fn resize_policy(&self) -> Option<ResizePolicy> {
        ResizePolicy::from_bounds(self.max_width, self.max_height, self.keep_aspect_ratio)
    }

    /// Batch defaults; outputs go next to their sources.
    pub fn compression_settings(&self) -> BatchSettings {
        BatchSettings {
            target_format: self.preferred_format.clone(),
            quality: self.default_quality,
            output_directory: None,
            resize_policy: self.resize_policy(),
        }
    }
}

fn push_recent<T: PartialEq>(list: &mut Vec<T>, item: T) {
    list.retain(|existing| *existing != item);
    list.insert(0, item);
    list.truncate(MAX_RECENT);
}

/// Rewrite keys and values written by older versions in place.
pub fn migrate(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    if let Some(theme) = obj.get("theme").and_then(Value::as_str) {
        let migrated = match theme {
            "modern_light" => Some("light"),
            "modern_dark" => Some("dark"),
            _ => None,
        };
        if let Some(theme) = migrated {
            obj.insert("theme".to_string(), Value::from(theme));
        }
    }

    let renames = [
        ("quality", "default_quality"),
        ("output_format", "preferred_format"),
        ("maintain_aspect", "keep_aspect_ratio"),
    ];
    for (old, new) in renames {
        if let Some(v) = obj.remove(old) {
            obj.entry(new.to_string()).or_insert(v);
        }
    }

    if let Some(format) = obj.get("preferred_format").and_then(Value::as_str) {
        if let Some(id) = canonical_identifier(format) {
            obj.insert("preferred_format".to_string(), Value::from(id));
        }
    }

    if let Some(Value::Array(formats)) = obj.get_mut("recent_formats") {
        for f in formats.iter_mut() {
            if let Some(id) = f.as_str().and_then(canonical_identifier) {
                *f = Value::from(id);
            }
        }
    }

    if let Some(dir) = obj.remove("last_output_dir").and_then(non_empty_string) {
        obj.insert("last_output_dir".to_string(), Value::from(dir));
    }
    if let Some(dir) = obj.remove("last_input_dir").and_then(non_empty_string) {
        let recent = obj
            .entry("recent_directories".to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = recent {
            if !list.iter().any(|d| d.as_str() == Some(dir.as_str())) {
                list.insert(0, Value::from(dir));
            }
        }
    }

    // numeric fields stored as floats by older versions
    if let Some(q) = obj.get("default_quality").and_then(Value::as_f64) {
        let q = q.round().clamp(MIN_QUALITY as f64, MAX_QUALITY as f64) as u64;
        obj.insert("default_quality".to_string(), Value::from(q));
    }
}

fn non_empty_string(v: Value) -> Option<String> {
    v.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

/// Directory holding config and history.
///
/// `IMG_PRESS_HOME` wins, then `~/.img-press`, then the current directory.
pub fn app_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("IMG_PRESS_HOME").filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|d| !d.is_empty())
        .map(|home| PathBuf::from(home).join(".img-press"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

pub fn default_history_path() -> PathBuf {
    app_dir().join(HISTORY_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.theme, Theme::Light);
        assert_eq!(config.default_quality, 85);
        assert_eq!(config.preferred_format, "jpeg");
        assert!(config.keep_aspect_ratio);
        assert!(config.validate().is_ok());
        assert!(config.resize_policy().is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = AppConfig::load(&temp.path().join("config.json"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_invalid_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(&path, "[1, 2").unwrap();
        assert_eq!(AppConfig::load(&path), AppConfig::default());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sub").join("config.json");
        let mut config = AppConfig::default();
        config.theme = Theme::Dark;
        config.set_quality(60).unwrap();
        config.set_preferred_format("WEBP").unwrap();
        config.max_width = Some(1920);
        config.add_recent_directory("/photos");
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path);
        assert_eq!(loaded, config);
        assert_eq!(loaded.preferred_format, "webp");
        assert_eq!(loaded.recent_formats[0], "webp");
    }

    #[test]
    fn test_migrate_legacy_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        let legacy = json!({
            "theme": "modern_dark",
            "quality": 70,
            "output_format": ".jpg",
            "maintain_aspect": false,
            "last_input_dir": "/home/me/pics",
            "last_output_dir": "",
            "window_geometry": "1200x800",
            "recent_formats": [".jpg", ".png", ".webp"]
        });
        fs::write(&path, serde_json::to_string(&legacy).unwrap()).unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.theme, Theme::Dark);
        assert_eq!(config.default_quality, 70);
        assert_eq!(config.preferred_format, "jpeg");
        assert!(!config.keep_aspect_ratio);
        assert_eq!(config.recent_directories, vec![PathBuf::from("/home/me/pics")]);
        assert_eq!(config.recent_formats, vec!["jpeg", "png", "webp"]);
        assert_eq!(config.last_output_dir, None);
    }

    #[test]
    fn test_migrate_light_theme() {
        let mut value = json!({ "theme": "modern_light" });
        migrate(&mut value);
        assert_eq!(value["theme"], "light");
    }

    #[test]
    fn test_new_keys_win_over_legacy() {
        let mut value = json!({ "quality": 40, "default_quality": 90 });
        migrate(&mut value);
        assert_eq!(value["default_quality"], 90);
        assert!(value.get("quality").is_none());
    }

    #[test]
    fn test_load_repairs_out_of_range_values() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        fs::write(
            &path,
            r#"{"default_quality": 0, "preferred_format": "bogus", "max_width": 0}"#,
        )
        .unwrap();

        let config = AppConfig::load(&path);
        assert_eq!(config.default_quality, 1);
        assert_eq!(config.preferred_format, "jpeg");
        assert_eq!(config.max_width, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.default_quality = 0;
        assert!(matches!(config.validate(), Err(PressError::Config(_))));

        let mut config = AppConfig::default();
        config.preferred_format = "xcf".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.max_height = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_setters_reject_bad_values() {
        let mut config = AppConfig::default();
        assert!(config.set_quality(101).is_err());
        assert!(config.set_preferred_format("xcf").is_err());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_recent_directories_bounded_and_deduplicated() {
        let mut config = AppConfig::default();
        for i in 0..15 {
            config.add_recent_directory(format!("/dir{}", i));
        }
        config.add_recent_directory("/dir10");

        assert_eq!(config.recent_directories.len(), MAX_RECENT);
        assert_eq!(config.recent_directories[0], PathBuf::from("/dir10"));
        assert_eq!(config.recent_directories[1], PathBuf::from("/dir14"));
        let unique: std::collections::HashSet<_> = config.recent_directories.iter().collect();
        assert_eq!(unique.len(), MAX_RECENT);
    }

    #[test]
    fn test_theme_parsing() {
        assert_eq!("Dark".parse::<Theme>().unwrap(), Theme::Dark);
        assert_eq!("modern_light".parse::<Theme>().unwrap(), Theme::Light);
        assert!("neon".parse::<Theme>().is_err());
    }

    #[test]
    fn test_compression_settings() {
        let mut config = AppConfig::default();
        config.max_width = Some(800);
        config.max_height = Some(600);
        config.keep_aspect_ratio = false;

        let settings = config.compression_settings();
        assert_eq!(settings.target_format, "jpeg");
        assert_eq!(settings.quality, 85);
        assert!(settings.output_directory.is_none());
        let policy = settings.resize_policy.unwrap();
        assert_eq!((policy.max_width, policy.max_height), (800, 600));
        assert!(!policy.preserve_aspect);
    }
}
