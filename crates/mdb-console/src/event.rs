//! Events pushed from a console session to its owner.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::level::ConnectionLevel;

/// Sending half of a session's event stream.
pub type EventSender = mpsc::UnboundedSender<BridgeEvent>;

/// Receiving half of a session's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<BridgeEvent>;

/// Which console stream a piece of output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputLevel {
    /// Ordinary console output.
    Stdout,
    /// Console diagnostics. Never part of a command reply.
    Stderr,
    /// Commands echoed by the bridge itself.
    Command,
}

/// An event emitted by a [`ConsoleSession`](crate::ConsoleSession).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    /// Raw console text.
    Output {
        /// The text as received.
        text: String,
        /// The stream it arrived on.
        level: OutputLevel,
    },
    /// Programming finished and the caller asked to stop on entry.
    StopOnEntry,
    /// The target stopped on a registered breakpoint.
    StopOnBreakpoint,
    /// The target stopped somewhere no breakpoint accounts for.
    StopOnException,
    /// A `step`, `stepi` or `next` completed.
    StopOnStep,
    /// A deliberate `halt` completed.
    StopOnPause,
    /// The session reached a new readiness level.
    LevelReached {
        /// The level now held.
        level: ConnectionLevel,
    },
    /// The debugger process exited.
    Exited {
        /// Exit code, if the platform reported one.
        code: Option<i32>,
    },
}

impl BridgeEvent {
    /// Whether this event reports the target stopping.
    pub fn is_stop(&self) -> bool {
        matches!(
            self,
            Self::StopOnEntry
                | Self::StopOnBreakpoint
                | Self::StopOnException
                | Self::StopOnStep
                | Self::StopOnPause
        )
    }
}
