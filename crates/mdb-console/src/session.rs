//! The public session API over one debugger console.
//!
//! A [`ConsoleSession`] owns the command channel and the state the stop
//! classifier consults (breakpoint registry, halt reason). Every method
//! takes `&self`, so a session can be shared behind an `Arc` and driven by
//! several callers at once; the channel serializes their exchanges.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::breakpoint::{
    basename, BreakOn, Breakpoint, BreakpointInfo, BreakpointRegistry, SetBreakpointResponse,
    Watchpoint,
};
use crate::channel::{CommandChannel, PendingCommand, Reply};
use crate::classifier::StopClassifier;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{BridgeEvent, EventReceiver, EventSender};
use crate::level::{ConnectionLevel, ConnectionType, GateClosed, HaltReason, LevelGate};
use crate::options::{SessionOptions, ToolOption};
use crate::parser::{parse_tool_list, strip_prompt, Evaluation, ReplyGrammar, PROMPT};
use crate::process::{spawn_console, spawn_exit_watcher, spawn_stderr_logger};
use crate::snapshot::{Snapshot, StackFrame, Variable};

/// Attach replies shorter than this (prompt excluded) get one more read.
const MIN_ATTACH_REPLY: usize = 3;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the read loop.
struct Shared {
    grammar: ReplyGrammar,
    gate: Arc<LevelGate>,
    events: EventSender,
    registry: Mutex<BreakpointRegistry>,
    halt: Mutex<HaltReason>,
    classifier: Mutex<StopClassifier>,
    exit_code: Mutex<Option<i32>>,
}

impl Shared {
    fn classify(&self, chunk: &str) {
        let halt = *lock(&self.halt);
        let stops = {
            let registry = lock(&self.registry);
            lock(&self.classifier).feed(chunk, &self.grammar, halt, &registry)
        };
        for kind in stops {
            debug!(?kind, "target stopped");
            let _ = self.events.send(kind.to_event());
        }
    }

    fn on_exit(&self, code: Option<i32>) {
        *lock(&self.exit_code) = code;
        self.gate.close(GateClosed::Exited(code));
        let _ = self.events.send(BridgeEvent::Exited { code });
    }
}

/// A debugger console session.
pub struct ConsoleSession {
    shared: Arc<Shared>,
    channel: CommandChannel,
    options: SessionOptions,
    snapshot: Mutex<Snapshot>,
    connection_type: Mutex<Option<ConnectionType>>,
    disposed: AtomicBool,
}

impl ConsoleSession {
    /// Spawn the debugger at `path` and wait for its first prompt.
    pub async fn spawn(
        path: &str,
        options: SessionOptions,
    ) -> BridgeResult<(Self, EventReceiver)> {
        let process = spawn_console(path)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        if let Some(stderr) = process.stderr {
            spawn_stderr_logger(stderr, events_tx.clone());
        }

        let session = Self::start(process.stdin, process.stdout, options, events_tx);
        let shared = session.shared.clone();
        spawn_exit_watcher(process.child, move |code| shared.on_exit(code));

        session.wait_for_prompt().await?;
        Ok((session, events_rx))
    }

    /// Run a session over arbitrary pipes, e.g. an in-memory console.
    /// Does not wait for a banner.
    pub fn from_io<W, R>(stdin: W, stdout: R, options: SessionOptions) -> (Self, EventReceiver)
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Self::start(stdin, stdout, options, events_tx), events_rx)
    }

    fn start<W, R>(stdin: W, stdout: R, options: SessionOptions, events: EventSender) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let gate = Arc::new(LevelGate::new());
        let shared = Arc::new(Shared {
            grammar: ReplyGrammar::new(),
            gate: gate.clone(),
            events: events.clone(),
            registry: Mutex::new(BreakpointRegistry::new()),
            halt: Mutex::new(HaltReason::None),
            classifier: Mutex::new(StopClassifier::new()),
            exit_code: Mutex::new(None),
        });
        let handler = {
            let shared = shared.clone();
            Box::new(move |chunk: &str| shared.classify(chunk))
        };
        let channel = CommandChannel::start(stdin, stdout, gate, events, handler);

        Self {
            shared,
            channel,
            options,
            snapshot: Mutex::new(Snapshot::default()),
            connection_type: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    /// Consume console output up to the first prompt.
    pub async fn wait_for_prompt(&self) -> BridgeResult<()> {
        self.ensure_live()?;
        let banner = self
            .channel
            .read_reply(PROMPT, self.options.extended_timeout)
            .await?;
        if banner.complete {
            debug!(banner = %strip_prompt(&banner.text), "debugger ready");
        } else {
            warn!("no prompt from debugger before timeout");
        }
        Ok(())
    }

    // ── accessors ──

    /// The current readiness level.
    pub fn level(&self) -> ConnectionLevel {
        self.shared.gate.level()
    }

    /// What the session attached to, once connected.
    pub fn connection_type(&self) -> Option<ConnectionType> {
        *lock(&self.connection_type)
    }

    /// Whether [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Exit code of the debugger, once it has exited.
    pub fn exit_code(&self) -> Option<i32> {
        *lock(&self.shared.exit_code)
    }

    /// A copy of the active breakpoints.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        lock(&self.shared.registry).all().to_vec()
    }

    // ── raw commands ──

    /// Send `command` once the session holds `required`, returning the
    /// reply text. A reply that timed out is returned as received.
    pub async fn query(&self, command: &str, required: ConnectionLevel) -> BridgeResult<String> {
        Ok(self.exchange(&self.pending(command, required)).await?.text)
    }

    /// Send a fully specified command.
    pub async fn exchange(&self, command: &PendingCommand) -> BridgeResult<Reply> {
        self.ensure_live()?;
        self.channel.exchange(command).await
    }

    // ── breakpoints ──

    /// Set a breakpoint at `file:line`. The console only knows file names,
    /// so the directory part is dropped.
    pub async fn set_breakpoint(&self, file: &str, line: i64) -> BridgeResult<SetBreakpointResponse> {
        let command = format!("break {}:{line}", basename(file));
        let reply = self.query(&command, ConnectionLevel::Connected).await?;

        let Some(resp) = self.shared.grammar.parse_breakpoint(&reply) else {
            warn!(file, line, reply = %strip_prompt(&reply), "breakpoint not acknowledged");
            return Ok(SetBreakpointResponse::unverified(file));
        };
        info!(id = resp.id, file = %resp.file, line = resp.line, "breakpoint set");
        lock(&self.shared.registry).add(Breakpoint {
            id: resp.id,
            file: resp.file.clone(),
            line: resp.line,
            enabled: true,
            address: None,
            verified: true,
        });
        Ok(resp)
    }

    /// Delete one breakpoint. The registry entry is removed only once the
    /// console has answered; returns whether it did.
    pub async fn clear_breakpoint(&self, id: i64) -> BridgeResult<bool> {
        let reply = self
            .exchange(&self.pending(format!("delete {id}"), ConnectionLevel::Connected))
            .await?;
        if !reply.complete {
            warn!(id, "breakpoint delete not acknowledged");
            return Ok(false);
        }
        lock(&self.shared.registry).remove(id);
        debug!(id, "breakpoint cleared");
        Ok(true)
    }

    /// Delete every breakpoint. The registry is emptied only once the
    /// console has answered; returns whether it did.
    pub async fn clear_breakpoints(&self) -> BridgeResult<bool> {
        let reply = self
            .exchange(&self.pending("delete", ConnectionLevel::Connected))
            .await?;
        if !reply.complete {
            warn!("breakpoint delete not acknowledged");
            return Ok(false);
        }
        lock(&self.shared.registry).clear();
        debug!("all breakpoints cleared");
        Ok(true)
    }

    /// List breakpoints as the console reports them. Addresses and enabled
    /// flags of known breakpoints are refreshed from the table.
    pub async fn get_breakpoints(&self) -> BridgeResult<Vec<BreakpointInfo>> {
        let reply = self.query("info break", ConnectionLevel::Connected).await?;
        let rows = self.shared.grammar.parse_break_table(&reply);

        let mut registry = lock(&self.shared.registry);
        for row in &rows {
            if let Some(known) = registry.get(row.id).cloned() {
                registry.add(Breakpoint {
                    enabled: row.enabled,
                    address: Some(row.address),
                    ..known
                });
            }
        }
        Ok(rows)
    }

    // ── stack and variables ──

    /// Fetch the call stack and replace the variable snapshot.
    pub async fn get_stack(&self) -> BridgeResult<Vec<StackFrame>> {
        let reply = self
            .query("backtrace full", ConnectionLevel::Programmed)
            .await?;
        let backtrace = self.shared.grammar.parse_backtrace(&reply);
        debug!(
            frames = backtrace.frames.len(),
            locals = backtrace.snapshot.locals.len(),
            parameters = backtrace.snapshot.parameters.len(),
            "backtrace parsed"
        );
        *lock(&self.snapshot) = backtrace.snapshot;
        Ok(backtrace.frames)
    }

    /// Locals from the last [`get_stack`](Self::get_stack).
    pub fn get_local_variables(&self) -> BridgeResult<Arc<[Variable]>> {
        self.ensure_not_disposed()?;
        Ok(lock(&self.snapshot).locals.clone())
    }

    /// Parameters from the last [`get_stack`](Self::get_stack).
    pub fn get_parameters(&self) -> BridgeResult<Arc<[Variable]>> {
        self.ensure_not_disposed()?;
        Ok(lock(&self.snapshot).parameters.clone())
    }

    pub fn has_local_variables(&self) -> BridgeResult<bool> {
        Ok(!self.get_local_variables()?.is_empty())
    }

    pub fn has_parameters(&self) -> BridgeResult<bool> {
        Ok(!self.get_parameters()?.is_empty())
    }

    /// Print an expression.
    pub async fn evaluate(&self, name: &str) -> BridgeResult<Option<Evaluation>> {
        let reply = self
            .query(&format!("Print {name}"), ConnectionLevel::Programmed)
            .await?;
        Ok(self.shared.grammar.parse_evaluation(&reply))
    }

    // ── watchpoints ──

    /// Create a data watchpoint.
    pub async fn watch(
        &self,
        address: u64,
        break_on: BreakOn,
        value: Option<u64>,
        pass_count: Option<u32>,
    ) -> BridgeResult<Watchpoint> {
        let command = watch_command(address, break_on, value, pass_count);
        let reply = self.query(&command, ConnectionLevel::Programmed).await?;
        let message = strip_prompt(&reply).to_string();
        Ok(match self.shared.grammar.parse_watchpoint(&reply) {
            Some(id) => {
                info!(id, address, "watchpoint set");
                Watchpoint {
                    id,
                    verified: true,
                    message,
                }
            }
            None => {
                warn!(address, reply = %message, "watchpoint not acknowledged");
                Watchpoint {
                    id: -1,
                    verified: false,
                    message,
                }
            }
        })
    }

    // ── tools ──

    /// Names of the hardware tools the console can see.
    pub async fn attached_tools(&self) -> BridgeResult<Vec<String>> {
        let reply = self.query("hwtool", ConnectionLevel::None).await?;
        Ok(parse_tool_list(&reply))
    }

    // ── connect / program ──

    /// Select `device`, apply `options`, and attach `tool`.
    pub async fn connect(
        &self,
        device: &str,
        tool: &str,
        program_mode: bool,
        options: &[ToolOption],
    ) -> BridgeResult<ConnectionType> {
        let reply = self
            .exchange(&self.pending(format!("Device {device}"), ConnectionLevel::None))
            .await?;
        if !reply.complete {
            return Err(BridgeError::ConnectionFailure {
                device: device.to_string(),
                reply: strip_prompt(&reply.text).to_string(),
            });
        }
        self.raise(ConnectionLevel::DeviceSet);

        for option in options {
            if !option.is_applicable() {
                debug!(key = %option.key, value = %option.value, "skipping tool option");
                continue;
            }
            self.query(&option.command(), ConnectionLevel::DeviceSet)
                .await?;
        }

        let mut command = format!("HwTool {tool}");
        if program_mode {
            command.push_str(" -p");
        }
        let attach = self
            .pending(command, ConnectionLevel::DeviceSet)
            .with_max_wait(self.options.extended_timeout)
            .with_min_reply(MIN_ATTACH_REPLY);
        let reply = self.exchange(&attach).await?;

        let connection_type = ConnectionType::from_tool(tool);
        if connection_type.requires_device_ack() {
            let found = self.shared.grammar.parse_device_found(&reply.text);
            if !found.is_some_and(|found| found.eq_ignore_ascii_case(device)) {
                return Err(BridgeError::ConnectionFailure {
                    device: device.to_string(),
                    reply: strip_prompt(&reply.text).to_string(),
                });
            }
        }

        *lock(&self.connection_type) = Some(connection_type);
        info!(device, tool, ?connection_type, "connected");
        self.raise(ConnectionLevel::Connected);
        Ok(connection_type)
    }

    /// Connect, program `elf`, then either report a stop on entry or run.
    pub async fn start_debugger(
        &self,
        device: &str,
        tool: &str,
        elf: &Path,
        options: &[ToolOption],
        stop_on_entry: bool,
    ) -> BridgeResult<ConnectionType> {
        self.ensure_live()?;
        if !elf.is_file() {
            return Err(BridgeError::FileNotFound(elf.to_path_buf()));
        }

        let connection_type = self.connect(device, tool, false, options).await?;

        let program = self
            .pending(
                format!("Program \"{}\"", elf.display()),
                ConnectionLevel::Connected,
            )
            .with_max_wait(self.options.extended_timeout);
        let reply = self.exchange(&program).await?;
        if !self.shared.grammar.is_program_success(&reply.text) {
            return Err(BridgeError::ProgrammingFailure {
                reply: strip_prompt(&reply.text).to_string(),
            });
        }
        info!(elf = %elf.display(), "target programmed");
        self.raise(ConnectionLevel::Programmed);

        if stop_on_entry {
            let _ = self.shared.events.send(BridgeEvent::StopOnEntry);
        } else {
            self.run().await?;
        }
        Ok(connection_type)
    }

    // ── run control ──

    /// Start the target.
    pub async fn run(&self) -> BridgeResult<()> {
        self.control("Run", HaltReason::None).await
    }

    /// Resume the target.
    pub async fn continue_execution(&self) -> BridgeResult<()> {
        self.control("Continue", HaltReason::None).await
    }

    /// Step one source line, into calls.
    pub async fn step(&self) -> BridgeResult<()> {
        self.control("Step", HaltReason::Step).await
    }

    /// Step one machine instruction.
    pub async fn step_instruction(&self) -> BridgeResult<()> {
        self.control("Stepi", HaltReason::Step).await
    }

    /// Step one source line, over calls.
    pub async fn next(&self) -> BridgeResult<()> {
        self.control("Next", HaltReason::Next).await
    }

    /// Stop the running target.
    pub async fn halt(&self) -> BridgeResult<()> {
        self.control("Halt", HaltReason::Halt).await
    }

    // ── shutdown ──

    /// Ask the debugger to quit and fail every later call. Safe to call
    /// more than once.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("disposing debugger session");
        self.channel.send_detached("Quit");
        self.shared.gate.close(GateClosed::Disposed);
    }

    // ── internals ──

    fn pending(&self, text: impl Into<String>, required: ConnectionLevel) -> PendingCommand {
        PendingCommand::new(text, required).with_max_wait(self.options.default_timeout)
    }

    /// The halt reason is set under the exchange lock, right before the
    /// command is written, so a stop from an earlier command is never
    /// attributed to this one.
    async fn control(&self, command: &str, reason: HaltReason) -> BridgeResult<()> {
        self.ensure_live()?;
        let pending = self.pending(command, ConnectionLevel::Programmed);
        let shared = &self.shared;
        self.channel
            .exchange_with(&pending, || *lock(&shared.halt) = reason)
            .await?;
        Ok(())
    }

    fn raise(&self, level: ConnectionLevel) {
        if self.shared.gate.raise(level) {
            info!(?level, "connection level reached");
            let _ = self.shared.events.send(BridgeEvent::LevelReached { level });
        }
    }

    fn ensure_not_disposed(&self) -> BridgeResult<()> {
        if self.is_disposed() {
            return Err(BridgeError::UseAfterDispose);
        }
        Ok(())
    }

    fn ensure_live(&self) -> BridgeResult<()> {
        self.ensure_not_disposed()?;
        self.shared.gate.check_open()?;
        Ok(())
    }
}

impl Drop for ConsoleSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ConsoleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSession")
            .field("level", &self.level())
            .field("connection_type", &self.connection_type())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// `Watch <address> <type>[:<value>] [<pass count>]`
fn watch_command(
    address: u64,
    break_on: BreakOn,
    value: Option<u64>,
    pass_count: Option<u32>,
) -> String {
    let mut command = format!("Watch 0x{address:X} {break_on}");
    if let Some(value) = value {
        command.push_str(&format!(":{value}"));
    }
    if let Some(count) = pass_count {
        command.push_str(&format!(" {count}"));
    }
    command
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_command_variants() {
        assert_eq!(
            watch_command(0xA000_0010, BreakOn::Write, None, None),
            "Watch 0xA0000010 w"
        );
        assert_eq!(
            watch_command(0x20, BreakOn::ReadWrite, Some(5), Some(3)),
            "Watch 0x20 rw:5 3"
        );
        assert_eq!(
            watch_command(0x20, BreakOn::Read, None, Some(2)),
            "Watch 0x20 r 2"
        );
    }

    #[tokio::test]
    async fn cached_reads_fail_after_dispose() {
        let (bridge_in, _console_in) = tokio::io::duplex(1024);
        let (_console_out, bridge_out) = tokio::io::duplex(1024);
        let (session, _events) =
            ConsoleSession::from_io(bridge_in, bridge_out, SessionOptions::default());

        assert!(session.get_local_variables().unwrap().is_empty());
        assert!(!session.has_parameters().unwrap());

        session.dispose();
        session.dispose();
        assert!(session.is_disposed());
        assert!(matches!(
            session.get_local_variables(),
            Err(BridgeError::UseAfterDispose)
        ));
    }

    #[tokio::test]
    async fn session_starts_at_no_level() {
        let (bridge_in, _console_in) = tokio::io::duplex(1024);
        let (_console_out, bridge_out) = tokio::io::duplex(1024);
        let (session, _events) =
            ConsoleSession::from_io(bridge_in, bridge_out, SessionOptions::default());
        assert_eq!(session.level(), ConnectionLevel::None);
        assert_eq!(session.connection_type(), None);
        assert_eq!(session.exit_code(), None);
        assert!(session.breakpoints().is_empty());
    }
}
