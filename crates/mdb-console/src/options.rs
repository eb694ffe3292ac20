//! Session tunables and tool options.

use std::time::Duration;

/// Default wait for a reply terminator.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait used for tool attach and programming.
pub const EXTENDED_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied by a [`ConsoleSession`](crate::ConsoleSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Wait for ordinary command replies.
    pub default_timeout: Duration,
    /// Wait for long-running commands (attach, program).
    pub extended_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_TIMEOUT,
            extended_timeout: EXTENDED_TIMEOUT,
        }
    }
}

/// A `set <key> <value>` option applied while connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOption {
    /// Option key, e.g. `programoptions.eraseb4program`.
    pub key: String,
    /// Option value.
    pub value: String,
}

impl ToolOption {
    /// Create an option.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the console will accept this option. Keys containing upper
    /// case are rejected by the console, and values with an unresolved
    /// `${...}` substitution would be sent literally.
    pub fn is_applicable(&self) -> bool {
        !self.key.is_empty()
            && !self.key.chars().any(char::is_uppercase)
            && !self.value.contains("${")
    }

    /// The console command applying this option.
    pub fn command(&self) -> String {
        format!("set {} {}", self.key, self.value)
    }
}
