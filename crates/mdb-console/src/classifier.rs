//! Classification of unsolicited stop notifications.
//!
//! The classifier sees every stdout chunk. A chunk containing the stop
//! marker starts a notification; if the file and line fields have not both
//! arrived yet, following chunks are appended until they have, up to
//! [`MAX_REASSEMBLY_CHUNKS`]. Each notification yields exactly one
//! [`StopKind`].

use tracing::{debug, warn};

use crate::breakpoint::BreakpointRegistry;
use crate::event::BridgeEvent;
use crate::level::HaltReason;
use crate::parser::{ReplyGrammar, StopLocation, STOP_MARKER};

/// Extra chunks read while waiting for the location fields of a stop.
pub const MAX_REASSEMBLY_CHUNKS: usize = 8;

/// Why the target stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopKind {
    /// A registered breakpoint was hit.
    Breakpoint(StopLocation),
    /// The target stopped where no breakpoint is registered, or the
    /// location never arrived.
    Exception(Option<StopLocation>),
    /// A deliberate step/next completed.
    Step,
    /// A deliberate halt completed.
    Pause,
}

impl StopKind {
    /// The caller-facing event for this stop.
    pub fn to_event(&self) -> BridgeEvent {
        match self {
            Self::Breakpoint(_) => BridgeEvent::StopOnBreakpoint,
            Self::Exception(_) => BridgeEvent::StopOnException,
            Self::Step => BridgeEvent::StopOnStep,
            Self::Pause => BridgeEvent::StopOnPause,
        }
    }
}

/// Scans console output for stop notifications.
#[derive(Debug, Default)]
pub struct StopClassifier {
    /// Notification text gathered so far, starting at the marker.
    assembling: Option<String>,
    /// Chunks appended to `assembling`.
    extra_chunks: usize,
    /// End of the previous chunk, in case the marker is split.
    tail: String,
}

impl StopClassifier {
    /// Create an idle classifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a notification is partially received.
    pub fn is_assembling(&self) -> bool {
        self.assembling.is_some()
    }

    /// Feed one stdout chunk. Returns one classification per notification
    /// completed by this chunk, in order.
    pub fn feed(
        &mut self,
        chunk: &str,
        grammar: &ReplyGrammar,
        halt: HaltReason,
        registry: &BreakpointRegistry,
    ) -> Vec<StopKind> {
        let mut stops = Vec::new();
        let mut halt = halt;
        let (mut scan, mut resuming) = match self.assembling.take() {
            Some(mut text) => {
                text.push_str(chunk);
                self.extra_chunks += 1;
                (text, true)
            }
            None => {
                let mut text = std::mem::take(&mut self.tail);
                text.push_str(chunk);
                (text, false)
            }
        };

        loop {
            let Some(start) = scan.find(STOP_MARKER) else {
                self.tail = marker_tail(&scan).to_string();
                return stops;
            };
            let text = scan.split_off(start);

            if !resuming {
                self.extra_chunks = 0;
                let deliberate = match halt {
                    HaltReason::Step | HaltReason::Next => Some(StopKind::Step),
                    HaltReason::Halt => Some(StopKind::Pause),
                    HaltReason::None => None,
                };
                if let Some(kind) = deliberate {
                    debug!(?halt, "stop after deliberate command");
                    stops.push(kind);
                    halt = HaltReason::None;
                    scan = text[STOP_MARKER.len()..].to_string();
                    continue;
                }
            }
            resuming = false;

            // Fields after a second marker belong to that notification.
            let body_end = text[STOP_MARKER.len()..]
                .find(STOP_MARKER)
                .map_or(text.len(), |i| i + STOP_MARKER.len());

            match grammar.parse_stop_location(&text[..body_end]) {
                Some((location, end)) => {
                    stops.push(classify(location, registry));
                    scan = text[end..].to_string();
                }
                None if self.extra_chunks >= MAX_REASSEMBLY_CHUNKS || body_end < text.len() => {
                    warn!(
                        chunks = self.extra_chunks,
                        "stop notification incomplete, reporting exception"
                    );
                    stops.push(StopKind::Exception(None));
                    scan = text[STOP_MARKER.len()..].to_string();
                }
                None => {
                    self.assembling = Some(text);
                    return stops;
                }
            }
        }
    }
}

fn classify(location: StopLocation, registry: &BreakpointRegistry) -> StopKind {
    match registry.find(&location.file, location.line) {
        Some(bp) => {
            debug!(id = bp.id, file = %location.file, line = location.line, "breakpoint hit");
            StopKind::Breakpoint(location)
        }
        None => {
            debug!(file = %location.file, line = location.line, "stop without breakpoint");
            StopKind::Exception(Some(location))
        }
    }
}

/// The longest suffix of `text` that could be the start of a split marker.
fn marker_tail(text: &str) -> &str {
    let keep = STOP_MARKER.len() - 1;
    if text.len() <= keep {
        return text;
    }
    let mut start = text.len() - keep;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
