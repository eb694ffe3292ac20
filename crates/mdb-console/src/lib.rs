//! mdb-console — a typed bridge over the MPLAB `mdb` debugger console.
//!
//! This crate drives the line-oriented debugger REPL as a subprocess. It
//! serializes command/reply exchanges, defers commands until the session
//! is connected or programmed, parses replies into typed results, and
//! classifies the unsolicited stop notifications the console prints.
pub mod breakpoint;
pub mod channel;
pub mod classifier;
pub mod error;
pub mod event;
pub mod level;
pub mod options;
pub mod parser;
pub mod process;
pub mod session;
pub mod snapshot;

// Re-export key types for convenience.
pub use breakpoint::{BreakOn, Breakpoint, BreakpointInfo, SetBreakpointResponse, Watchpoint};
pub use channel::{PendingCommand, Reply};
pub use classifier::StopKind;
pub use error::{BridgeError, BridgeResult};
pub use event::{BridgeEvent, EventReceiver, OutputLevel};
pub use level::{ConnectionLevel, ConnectionType, HaltReason};
pub use options::{SessionOptions, ToolOption};
pub use parser::Evaluation;
pub use session::ConsoleSession;
pub use snapshot::{StackFrame, Variable};
