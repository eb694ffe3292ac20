//! Stack frames, variables and the cached variable snapshot.

use std::sync::Arc;

use serde::Serialize;

/// One frame of a `backtrace full` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Frame number, 0 = innermost.
    pub index: i64,
    /// Function name.
    pub name: String,
    /// Source file.
    pub file: String,
    /// Source line.
    pub line: i64,
}

/// A named value from a backtrace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    /// Variable name.
    pub name: String,
    /// Raw value as printed by the console.
    pub value: u64,
    /// Array-style children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_children: Option<Vec<Variable>>,
    /// Struct-style children.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub named_children: Option<Vec<Variable>>,
}

impl Variable {
    /// A scalar variable without children.
    pub fn scalar(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
            index_children: None,
            named_children: None,
        }
    }
}

/// Locals and parameters from the most recent backtrace.
///
/// Shared behind `Arc` so repeated reads hand out the same allocation until
/// the next backtrace replaces it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Indented `name = 0x..` lines.
    pub locals: Arc<[Variable]>,
    /// Unindented `name=0x..` lines.
    pub parameters: Arc<[Variable]>,
}

impl Snapshot {
    /// Build a snapshot from parsed lists.
    pub fn new(locals: Vec<Variable>, parameters: Vec<Variable>) -> Self {
        Self {
            locals: locals.into(),
            parameters: parameters.into(),
        }
    }
}

/// A fully parsed `backtrace full` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backtrace {
    /// Frames, innermost first.
    pub frames: Vec<StackFrame>,
    /// Locals and parameters found anywhere in the reply.
    pub snapshot: Snapshot,
}
