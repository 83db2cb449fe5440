//! Logging setup
//!
//! Installs a `tracing` subscriber with two layers:
//! - a daily-rotating log file (no ANSI colours, thread ids, line numbers)
//! - a compact stderr layer
//!
//! Also hosts the helpers used to log calls into external tools.
//!
//! # Examples
//!
//! ```no_run
//! use press_core::logging::{init_logging, LogConfig};
//!
//! init_logging("img_press", LogConfig::default()).expect("Failed to initialize logging");
//! tracing::info!("Program started");
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Defaults to the system temp directory.
    pub log_dir: PathBuf,
    /// Rotated files kept per program.
    pub max_files: usize,
    pub level: Level,
    /// Level for the stderr layer; the file always gets `level`.
    pub stderr_level: Level,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: std::env::temp_dir().join("img-press-logs"),
            max_files: 5,
            level: Level::INFO,
            stderr_level: Level::WARN,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.log_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_max_files(mut self, count: usize) -> Self {
        self.max_files = count;
        self
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_stderr_level(mut self, level: Level) -> Self {
        self.stderr_level = level;
        self
    }

    /// `-v` count from the command line: 0 = warn, 1 = info, 2+ = debug.
    pub fn with_verbosity(self, verbose: u8) -> Self {
        let level = match verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        };
        let file_level = if level > self.level { level } else { self.level };
        self.with_stderr_level(level).with_level(file_level)
    }
}

/// Install the global subscriber. Can only succeed once per process.
///
/// `RUST_LOG` overrides the file filter when set.
pub fn init_logging(program_name: &str, config: LogConfig) -> Result<()> {
    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", config.log_dir))?;

    let log_file_name = format!("{}.log", program_name);
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &config.log_dir, &log_file_name);

    let file_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{}={level},press_core={level}",
            program_name.replace('-', "_"),
            level = config.level.as_str().to_lowercase()
        ))
    });

    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_filter(file_filter);

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(false)
        .with_line_number(false)
        .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
            config.stderr_level,
        ));

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!(
        program = program_name,
        log_dir = ?config.log_dir,
        log_file = %log_file_name,
        max_files = config.max_files,
        level = ?config.level,
        "Logging system initialized"
    );

    cleanup_old_logs(&config.log_dir, program_name, config.max_files)?;

    Ok(())
}

/// Keep only the `max_files` most recently modified logs of `program_name`.
fn cleanup_old_logs(log_dir: &Path, program_name: &str, max_files: usize) -> Result<()> {
    use std::fs;

    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log directory: {:?}", log_dir))?;

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        // rotated files are named `<program>.log.<date>`
        if name.starts_with(program_name) && name.contains(".log") {
            if let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    if log_files.len() <= max_files {
        return Ok(());
    }

    log_files.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in log_files.iter().skip(max_files) {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = ?path, "Removed old log file"),
            Err(e) => tracing::warn!(path = ?path, error = %e, "Failed to remove old log file"),
        }
    }

    Ok(())
}

/// Record one external tool invocation with its outcome.
pub fn log_external_tool(
    tool_name: &str,
    args: &[&str],
    output: &str,
    exit_code: Option<i32>,
    duration: Duration,
) {
    let command = format!("{} {}", tool_name, args.join(" "));

    match exit_code {
        Some(0) => {
            tracing::debug!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = 0,
                "External tool completed successfully"
            );
            if !output.is_empty() {
                tracing::trace!(tool = tool_name, output = %output, "External tool output");
            }
        }
        Some(code) => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                exit_code = code,
                output = %output,
                "External tool failed"
            );
        }
        None => {
            tracing::warn!(
                tool = tool_name,
                command = %command,
                duration_secs = duration.as_secs_f64(),
                output = %output,
                "External tool terminated without exit code"
            );
        }
    }
}

#[derive(Debug)]
pub struct ExternalCommandResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExternalCommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Run a command to completion, capturing and logging its output.
pub fn execute_external_command(tool: &Path, args: &[&str]) -> Result<ExternalCommandResult> {
    use std::process::Command;

    let tool_name = tool
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| tool.display().to_string());

    let start = Instant::now();
    let output = Command::new(tool)
        .args(args)
        .output()
        .with_context(|| format!("Failed to execute command: {} {}", tool_name, args.join(" ")))?;
    let duration = start.elapsed();

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code();

    let combined = if stderr.is_empty() { &stdout } else { &stderr };
    log_external_tool(&tool_name, args, combined, exit_code, duration);

    Ok(ExternalCommandResult {
        exit_code,
        stdout,
        stderr,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.max_files, 5);
        assert_eq!(config.level, Level::INFO);
        assert_eq!(config.stderr_level, Level::WARN);
    }

    #[test]
    fn test_log_config_builder() {
        let temp_dir = TempDir::new().unwrap();
        let config = LogConfig::new()
            .with_log_dir(temp_dir.path())
            .with_max_files(3)
            .with_level(Level::DEBUG);

        assert_eq!(config.log_dir, temp_dir.path());
        assert_eq!(config.max_files, 3);
        assert_eq!(config.level, Level::DEBUG);
    }

    #[test]
    fn test_verbosity_raises_both_levels() {
        let config = LogConfig::new().with_verbosity(2);
        assert_eq!(config.stderr_level, Level::DEBUG);
        assert_eq!(config.level, Level::DEBUG);

        let quiet = LogConfig::new().with_verbosity(0);
        assert_eq!(quiet.stderr_level, Level::WARN);
        assert_eq!(quiet.level, Level::INFO);
    }

    #[test]
    fn test_cleanup_old_logs() {
        let temp_dir = TempDir::new().unwrap();
        let program_name = "test_program";

        for i in 0..10 {
            let file_path = temp_dir.path().join(format!("{}.log.2024-01-{:02}", program_name, i + 1));
            fs::write(&file_path, format!("log content {}", i)).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        fs::write(temp_dir.path().join("other.log"), "keep").unwrap();

        cleanup_old_logs(temp_dir.path(), program_name, 3).unwrap();

        let remaining: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(program_name))
            .collect();
        assert_eq!(remaining.len(), 3);
        assert!(temp_dir.path().join("other.log").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_external_command_success() {
        let result = execute_external_command(Path::new("echo"), &["hello", "world"]).unwrap();
        assert!(result.success());
        assert!(result.stdout.contains("hello"));
    }

    #[test]
    fn test_execute_external_command_missing_tool() {
        let result = execute_external_command(Path::new("nonexistent_command_xyz"), &["arg1"]);
        assert!(result.is_err());
    }
}
