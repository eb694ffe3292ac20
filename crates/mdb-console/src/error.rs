//! Console bridge error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from console bridge operations.
///
/// Reply parse failures and reply timeouts are deliberately absent: they
/// degrade to "unverified" sentinel values or partial reply text instead.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Debugger process failed to start.
    #[error("debugger failed to start: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// The debugger process has no usable pipe, or has exited.
    #[error("debugger process unavailable: {0}")]
    ProcessUnavailable(String),

    /// The session was used after `dispose()`.
    #[error("attempted to use the debugger session after it was disposed")]
    UseAfterDispose,

    /// The device or hardware tool was not acknowledged.
    #[error("failed to connect to {device}: {reply}")]
    ConnectionFailure {
        /// The device that was requested.
        device: String,
        /// The console reply that failed to acknowledge it.
        reply: String,
    },

    /// The program command did not report success.
    #[error("programming failed: {reply}")]
    ProgrammingFailure {
        /// The console reply to the program command.
        reply: String,
    },

    /// The firmware image to program does not exist.
    #[error("firmware image not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// Command text would reach the console as more than one line.
    #[error("command contains a line break: {0:?}")]
    InvalidCommand(String),
}

/// Convenience alias for bridge results.
pub type BridgeResult<T> = Result<T, BridgeError>;
