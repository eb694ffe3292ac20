//! Connection readiness levels and the gate that defers commands until a
//! level is reached.
//!
//! The gate is a single `watch` channel carrying the current [`Readiness`].
//! Every waiter holds its own receiver and a predicate for the level it
//! needs, so there is one barrier per requested level rather than a global
//! queue. When a level is raised, every waiter whose requirement is now met
//! is released at once; their relative order from then on is decided by the
//! command channel's exchange lock, which is first-come first-served.

use serde::Serialize;
use tokio::sync::watch;

use crate::error::BridgeError;

/// How far the session has progressed towards a debuggable target.
///
/// Ordered: `None < DeviceSet < Connected < Programmed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionLevel {
    /// Nothing selected yet.
    #[default]
    None,
    /// A device has been selected with `Device`.
    DeviceSet,
    /// A hardware tool or the simulator is attached.
    Connected,
    /// Firmware has been programmed.
    Programmed,
}

/// What the session is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionType {
    /// The instruction set simulator.
    Simulator,
    /// A physical programmer/debugger.
    Hardware,
}

impl ConnectionType {
    /// Derive the connection type from the tool name used to attach.
    pub fn from_tool(tool: &str) -> Self {
        if tool.trim().eq_ignore_ascii_case("sim") {
            Self::Simulator
        } else {
            Self::Hardware
        }
    }

    /// Whether attaching must be acknowledged with a "device found" reply.
    pub fn requires_device_ack(self) -> bool {
        matches!(self, Self::Hardware)
    }
}

/// The caller-declared reason for the next stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HaltReason {
    /// No deliberate stop pending; the next stop is classified by location.
    #[default]
    None,
    /// A `halt` was issued.
    Halt,
    /// A `step` or `stepi` was issued.
    Step,
    /// A `next` was issued.
    Next,
}

/// Why the gate stopped admitting commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateClosed {
    /// The session was disposed.
    Disposed,
    /// The debugger process exited.
    Exited(Option<i32>),
}

impl From<GateClosed> for BridgeError {
    fn from(closed: GateClosed) -> Self {
        match closed {
            GateClosed::Disposed => BridgeError::UseAfterDispose,
            GateClosed::Exited(code) => BridgeError::ProcessUnavailable(match code {
                Some(code) => format!("debugger exited with code {code}"),
                None => "debugger exited".to_string(),
            }),
        }
    }
}

/// Snapshot of the gate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Current level.
    pub level: ConnectionLevel,
    /// Set once the session can no longer run commands.
    pub closed: Option<GateClosed>,
}

/// Defers callers until the session reaches the level they need.
#[derive(Debug)]
pub struct LevelGate {
    tx: watch::Sender<Readiness>,
}

impl LevelGate {
    /// Create a gate at [`ConnectionLevel::None`].
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Readiness::default());
        Self { tx }
    }

    /// The current readiness.
    pub fn readiness(&self) -> Readiness {
        *self.tx.borrow()
    }

    /// The current level.
    pub fn level(&self) -> ConnectionLevel {
        self.tx.borrow().level
    }

    /// Fail fast if the gate is closed.
    pub fn check_open(&self) -> Result<(), GateClosed> {
        match self.tx.borrow().closed {
            Some(closed) => Err(closed),
            None => Ok(()),
        }
    }

    /// Raise the level. Levels never decrease; returns `true` only when the
    /// level actually went up.
    pub fn raise(&self, level: ConnectionLevel) -> bool {
        self.tx.send_if_modified(|readiness| {
            if readiness.closed.is_none() && level > readiness.level {
                readiness.level = level;
                true
            } else {
                false
            }
        })
    }

    /// Close the gate, releasing every waiter with an error. The first
    /// reason wins.
    pub fn close(&self, reason: GateClosed) {
        self.tx.send_if_modified(|readiness| {
            if readiness.closed.is_some() {
                return false;
            }
            readiness.closed = Some(reason);
            readiness.level = ConnectionLevel::None;
            true
        });
    }

    /// Wait until the level is at least `required`.
    pub async fn wait_for(&self, required: ConnectionLevel) -> Result<(), GateClosed> {
        let mut rx = self.tx.subscribe();
        let readiness = match rx
            .wait_for(|r| r.closed.is_some() || r.level >= required)
            .await
        {
            Ok(state) => *state,
            Err(_) => return Err(GateClosed::Disposed),
        };
        match readiness.closed {
            Some(closed) => Err(closed),
            None => Ok(()),
        }
    }
}

impl Default for LevelGate {
    fn default() -> Self {
        Self::new()
    }
}
