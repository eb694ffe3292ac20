//! Breakpoint registry for a console session.
//!
//! The registry is the bridge's own record of which breakpoints exist. It
//! is consulted by the stop classifier to tell a breakpoint hit from an
//! exception, so it only changes once the console has acknowledged a
//! create or delete.

use serde::Serialize;

/// A breakpoint the console has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    /// Console-assigned id, unique per session.
    pub id: i64,
    /// File as echoed by the console.
    pub file: String,
    /// Source line (1-based).
    pub line: i64,
    /// Whether the breakpoint is enabled.
    pub enabled: bool,
    /// Resolved program address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
    /// Whether the console accepted the breakpoint.
    pub verified: bool,
}

/// Result of a `break` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResponse {
    /// Console-assigned id, or `-1` if the reply was not understood.
    pub id: i64,
    /// Line the console placed the breakpoint on, or `-1`.
    pub line: i64,
    /// File the console reported (or the requested file when unverified).
    pub file: String,
    /// Whether the console accepted the breakpoint.
    pub verified: bool,
}

impl SetBreakpointResponse {
    /// The sentinel returned when the reply could not be parsed.
    pub fn unverified(file: impl Into<String>) -> Self {
        Self {
            id: -1,
            line: -1,
            file: file.into(),
            verified: false,
        }
    }
}

/// One row of the `info break` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointInfo {
    /// Console id.
    pub id: i64,
    /// `y` in the table.
    pub enabled: bool,
    /// Program address.
    pub address: u64,
    /// Source file.
    pub file: String,
    /// Source line.
    pub line: i64,
}

/// Access that triggers a watchpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BreakOn {
    /// Reads of the address.
    Read,
    /// Writes to the address.
    Write,
    /// Either.
    ReadWrite,
}

impl BreakOn {
    /// Parse the console spelling (`r`, `w`, `rw`).
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "r" => Some(Self::Read),
            "w" => Some(Self::Write),
            "rw" => Some(Self::ReadWrite),
            _ => None,
        }
    }
}

impl std::fmt::Display for BreakOn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "r",
            Self::Write => "w",
            Self::ReadWrite => "rw",
        })
    }
}

/// Result of a `Watch` command. Watchpoints are not tracked after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Watchpoint {
    /// Console id, or `-1` if the reply was not understood.
    pub id: i64,
    /// Whether the console accepted the watchpoint.
    pub verified: bool,
    /// The console reply, for display.
    pub message: String,
}

/// Normalise a path for comparison: forward slashes, lower case, no
/// surrounding whitespace or quotes.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .trim_matches('"')
        .replace('\\', "/")
        .to_lowercase()
}

/// Compare two paths the way the console echoes them: equal after
/// normalisation, or one is a trailing component suffix of the other.
pub fn paths_match(a: &str, b: &str) -> bool {
    let a = normalize_path(a);
    let b = normalize_path(b);
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a == b || a.ends_with(&format!("/{b}")) || b.ends_with(&format!("/{a}"))
}

/// File name component of a path, accepting either separator.
pub fn basename(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}

/// Active breakpoints, in creation order.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an acknowledged breakpoint. An existing entry with the same id
    /// is replaced.
    pub fn add(&mut self, bp: Breakpoint) {
        if let Some(existing) = self.breakpoints.iter_mut().find(|b| b.id == bp.id) {
            *existing = bp;
        } else {
            self.breakpoints.push(bp);
        }
    }

    /// Remove a breakpoint by id. Returns `true` if one was removed.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        before != self.breakpoints.len()
    }

    /// Remove every breakpoint.
    pub fn clear(&mut self) {
        self.breakpoints.clear();
    }

    /// Find the breakpoint at a file and line.
    pub fn find(&self, file: &str, line: i64) -> Option<&Breakpoint> {
        self.breakpoints
            .iter()
            .find(|bp| bp.line == line && paths_match(&bp.file, file))
    }

    /// Look up a breakpoint by id.
    pub fn get(&self, id: i64) -> Option<&Breakpoint> {
        self.breakpoints.iter().find(|bp| bp.id == id)
    }

    /// All breakpoints.
    pub fn all(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.breakpoints.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.breakpoints.is_empty()
    }
}
