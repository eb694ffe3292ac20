//! Log-file helpers: default location, rotation and level conversion.
//!
//! The `tracing-subscriber` setup lives in the binary; the console
//! session only emits `tracing` events.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::{DefaultPaths, PlatformPaths};

/// Maximum size of a single log file before rotation (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

const LOG_FILE_NAME: &str = "mdb-bridge.log";

/// `<log_dir>/mdb-bridge.log`, or a file in the temp directory when the
/// home directory cannot be resolved.
pub fn default_log_file_path() -> PathBuf {
    match DefaultPaths::new() {
        Ok(paths) => paths.log_dir().join(LOG_FILE_NAME),
        Err(_) => std::env::temp_dir().join("mdb-bridge").join(LOG_FILE_NAME),
    }
}

/// Ensure the parent directory of a log file exists, creating it if necessary.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Rotate log files when the current file exceeds `max_size` bytes.
///
/// ```text
///   mdb-bridge.log   → mdb-bridge.log.1
///   mdb-bridge.log.1 → mdb-bridge.log.2
///   …
///   mdb-bridge.log.<max_files> is deleted
/// ```
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    if !log_path.exists() {
        return Ok(());
    }
    if fs::metadata(log_path)?.len() < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        if from.exists() {
            fs::rename(&from, rotated_path(log_path, i + 1))?;
        }
    }

    fs::rename(log_path, rotated_path(log_path, 1))
}

/// Convert a log level name (case-insensitive) to a `tracing` filter
/// directive. Returns `"info"` for unrecognised values.
pub fn log_level_to_filter(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{name}.{index}"))
}
