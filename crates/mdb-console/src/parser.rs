//! Reply grammar of the debugger console.
//!
//! The console prints free-form text, so every pattern the bridge relies on
//! lives here, each with its own contract test below. Nothing outside this
//! module matches console text.

use regex::Regex;

use crate::breakpoint::{BreakpointInfo, SetBreakpointResponse};
use crate::snapshot::{Backtrace, Snapshot, StackFrame, Variable};

/// Substring that marks an unsolicited stop notification.
pub const STOP_MARKER: &str = "Stop at";

/// The console prompt, which ends every reply.
pub const PROMPT: &str = ">";

/// Where the target stopped, from a stop notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopLocation {
    /// File as printed by the console.
    pub file: String,
    /// Source line.
    pub line: i64,
}

/// Result of `Print <name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// The expression the console echoed.
    pub name: String,
    /// The printed value.
    pub value: String,
}

/// Compiled reply patterns.
#[derive(Debug)]
pub struct ReplyGrammar {
    breakpoint: Regex,
    device_found: Regex,
    program_success: Regex,
    watchpoint: Regex,
    break_row: Regex,
    stop_file: Regex,
    stop_line: Regex,
    frame: Regex,
    local: Regex,
    parameter: Regex,
    evaluation: Regex,
}

impl ReplyGrammar {
    /// Compile every pattern.
    pub fn new() -> Self {
        Self {
            breakpoint: Regex::new(r"Breakpoint (\d+) at file (.+), line (\d+)\.")
                .expect("breakpoint regex is valid"),
            device_found: Regex::new(r"Target device (.+) found\.")
                .expect("device regex is valid"),
            program_success: Regex::new(r"Program succeeded\.|Programming/Verify complete")
                .expect("program regex is valid"),
            watchpoint: Regex::new(r"Watchpoint (\d+)\.").expect("watchpoint regex is valid"),
            break_row: Regex::new(r"(\d+)\s*(y|n)\s*(0x[0-9A-F]+)\s*at (.*):(\d+)")
                .expect("break table regex is valid"),
            stop_file: Regex::new(r"file:(?<file>.+)").expect("stop file regex is valid"),
            stop_line: Regex::new(r"source line:(?<line>\d+)").expect("stop line regex is valid"),
            frame: Regex::new(r"#(\d+)\s+([\w ]*)\(\) at\s(.*?):(\d+)")
                .expect("frame regex is valid"),
            local: Regex::new(r"\s+(\w+) = 0x(\d+)").expect("local regex is valid"),
            parameter: Regex::new(r"\s+(\w+)=0x(\d+)").expect("parameter regex is valid"),
            evaluation: Regex::new(r"(?m)^\s*([A-Za-z_][\w.\[\]]*)\s*=\s*(.+?)\s*$")
                .expect("evaluation regex is valid"),
        }
    }

    /// Parse the reply to `break <file>:<line>`.
    pub fn parse_breakpoint(&self, reply: &str) -> Option<SetBreakpointResponse> {
        let caps = self.breakpoint.captures(reply)?;
        Some(SetBreakpointResponse {
            id: caps[1].parse().ok()?,
            file: caps[2].trim().to_string(),
            line: caps[3].parse().ok()?,
            verified: true,
        })
    }

    /// The device name from a "Target device X found." acknowledgment.
    pub fn parse_device_found(&self, reply: &str) -> Option<String> {
        self.device_found
            .captures(reply)
            .map(|caps| caps[1].trim().to_string())
    }

    /// Whether a `Program` reply reports success.
    pub fn is_program_success(&self, reply: &str) -> bool {
        self.program_success.is_match(reply)
    }

    /// The id from a "Watchpoint N." acknowledgment.
    pub fn parse_watchpoint(&self, reply: &str) -> Option<i64> {
        self.watchpoint
            .captures(reply)
            .and_then(|caps| caps[1].parse().ok())
    }

    /// Parse the `info break` table. Rows that do not match are skipped.
    pub fn parse_break_table(&self, reply: &str) -> Vec<BreakpointInfo> {
        reply
            .lines()
            .filter_map(|row| {
                let caps = self.break_row.captures(row)?;
                Some(BreakpointInfo {
                    id: caps[1].parse().ok()?,
                    enabled: &caps[2] == "y",
                    address: u64::from_str_radix(caps[3].trim_start_matches("0x"), 16).ok()?,
                    file: caps[4].trim().to_string(),
                    line: caps[5].parse().ok()?,
                })
            })
            .collect()
    }

    /// Extract the stop location once both fields have arrived, with the
    /// offset just past the later field.
    ///
    /// A field running to the very end of `text` may still be growing
    /// (`source line:4` before the `2` arrives), so it only counts once
    /// something follows it.
    pub fn parse_stop_location(&self, text: &str) -> Option<(StopLocation, usize)> {
        let file = self.stop_file.captures(text)?.name("file")?;
        let line = self.stop_line.captures(text)?.name("line")?;
        if file.end() == text.len() || line.end() == text.len() {
            return None;
        }
        let name = file.as_str().trim();
        if name.is_empty() {
            return None;
        }
        let location = StopLocation {
            file: name.to_string(),
            line: line.as_str().parse().ok()?,
        };
        Some((location, file.end().max(line.end())))
    }

    /// Frames of a `backtrace full` reply.
    pub fn parse_frames(&self, reply: &str) -> Vec<StackFrame> {
        self.frame
            .captures_iter(reply)
            .filter_map(|caps| {
                Some(StackFrame {
                    index: caps[1].parse().ok()?,
                    name: caps[2].trim().to_string(),
                    file: caps[3].trim().to_string(),
                    line: caps[4].parse().ok()?,
                })
            })
            .collect()
    }

    /// Indented `name = 0x..` lines of a `backtrace full` reply.
    pub fn parse_locals(&self, reply: &str) -> Vec<Variable> {
        Self::variables(&self.local, reply)
    }

    /// `name=0x..` lines of a `backtrace full` reply.
    pub fn parse_parameters(&self, reply: &str) -> Vec<Variable> {
        Self::variables(&self.parameter, reply)
    }

    /// Run all three backtrace passes over one reply.
    pub fn parse_backtrace(&self, reply: &str) -> Backtrace {
        Backtrace {
            frames: self.parse_frames(reply),
            snapshot: Snapshot::new(self.parse_locals(reply), self.parse_parameters(reply)),
        }
    }

    /// Parse the reply to `Print <name>`.
    pub fn parse_evaluation(&self, reply: &str) -> Option<Evaluation> {
        let caps = self.evaluation.captures(reply)?;
        Some(Evaluation {
            name: caps[1].to_string(),
            value: caps[2].to_string(),
        })
    }

    fn variables(pattern: &Regex, reply: &str) -> Vec<Variable> {
        pattern
            .captures_iter(reply)
            .filter_map(|caps| {
                let value = u64::from_str_radix(&caps[2], 16).ok()?;
                Some(Variable::scalar(&caps[1], value))
            })
            .collect()
    }
}

impl Default for ReplyGrammar {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the `hwtool` listing into tool names.
///
/// The first line is a header and the last two are the trailing blank line
/// and the prompt. Each remaining row is tab separated with the tool name
/// in the last cell.
pub fn parse_tool_list(reply: &str) -> Vec<String> {
    let lines: Vec<&str> = reply.split('\n').collect();
    if lines.len() <= 3 {
        return Vec::new();
    }
    lines[1..lines.len() - 2]
        .iter()
        .filter_map(|row| row.split('\t').last())
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect()
}

/// Remove a trailing prompt and surrounding whitespace from a reply.
pub fn strip_prompt(reply: &str) -> &str {
    let trimmed = reply.trim_end();
    trimmed.strip_suffix(PROMPT).unwrap_or(trimmed).trim()
}
