use std::path::PathBuf;
use std::time::Duration;

use mdb_console::{SessionOptions, ToolOption};
use serde::{Deserialize, Serialize};

/// Log verbosity level.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Most verbose; includes raw console output.
    Trace,
    /// Every command sent to the console.
    Debug,
    /// Informational messages (default).
    #[default]
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// The level's name as a `tracing` filter directive.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Where to find the debugger console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    /// Path to the `mdb` launcher script. May be quoted.
    #[serde(default = "default_debugger_path")]
    pub path: String,
}

fn default_debugger_path() -> String {
    if cfg!(windows) {
        "mdb.bat".to_string()
    } else {
        "mdb.sh".to_string()
    }
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            path: default_debugger_path(),
        }
    }
}

/// Reply waits, in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Wait for ordinary replies.
    #[serde(default = "default_timeout_ms")]
    pub default_ms: u64,
    /// Wait for tool attach and programming.
    #[serde(default = "default_extended_ms")]
    pub extended_ms: u64,
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_extended_ms() -> u64 {
    60_000
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_ms: default_timeout_ms(),
            extended_ms: default_extended_ms(),
        }
    }
}

/// One `set <key> <value>` tool option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionEntry {
    /// Option key, e.g. `poweroptions.powerenable`.
    pub key: String,
    /// Option value.
    pub value: String,
}

/// The device, tool and firmware to debug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Device name, e.g. `PIC32MX795F512L`.
    #[serde(default)]
    pub device: Option<String>,
    /// Hardware tool, or `Sim` for the simulator.
    #[serde(default = "default_tool")]
    pub tool: String,
    /// Attach the tool in programmer mode (`-p`).
    #[serde(default)]
    pub program_mode: bool,
    /// Firmware image to program before debugging.
    #[serde(default)]
    pub elf: Option<PathBuf>,
    /// Report a stop after programming instead of running.
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Tool options, applied in order.
    #[serde(default)]
    pub options: Vec<OptionEntry>,
}

fn default_tool() -> String {
    "Sim".to_string()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            device: None,
            tool: default_tool(),
            program_mode: false,
            elf: None,
            stop_on_entry: false,
            options: Vec::new(),
        }
    }
}

impl TargetConfig {
    /// The options as the session takes them.
    pub fn tool_options(&self) -> Vec<ToolOption> {
        self.options
            .iter()
            .map(|entry| ToolOption::new(&entry.key, &entry.value))
            .collect()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub level: LogLevel,
    /// Optional path to a log file.
    pub file: Option<PathBuf>,
}

/// Top-level mdb-bridge configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    /// Debugger executable.
    #[serde(default)]
    pub debugger: DebuggerConfig,
    /// Reply waits.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// What to connect to.
    #[serde(default)]
    pub target: TargetConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Session tunables derived from `[timeouts]`.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            default_timeout: Duration::from_millis(self.timeouts.default_ms),
            extended_timeout: Duration::from_millis(self.timeouts.extended_ms),
        }
    }
}
