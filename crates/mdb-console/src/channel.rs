//! Serialized command/reply exchanges over the console pipes.
//!
//! One reader task owns console stdout. Every chunk it reads is published
//! as output, appended to the reply of the exchange in flight (if any), and
//! handed to a chunk handler (the stop classifier). Replies and stop
//! notifications therefore come from a single stream of reads instead of
//! two readers racing for the same bytes.
//!
//! Exchanges are serialized by an async mutex held from registering the
//! reply buffer until the reply is complete or its wait runs out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::event::{BridgeEvent, EventSender, OutputLevel};
use crate::level::{ConnectionLevel, GateClosed, LevelGate};
use crate::options::DEFAULT_TIMEOUT;
use crate::parser::{strip_prompt, PROMPT};

/// Line ending the console expects.
const LINE_ENDING: &str = "\r\n";

/// Callback invoked with every stdout chunk after reply bookkeeping.
pub type ChunkHandler = Box<dyn Fn(&str) + Send + Sync>;

/// An intent to send a command, possibly deferred until a level is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Command text without line ending.
    pub text: String,
    /// Level the session must hold before the command is written.
    pub required_level: ConnectionLevel,
    /// Substring that ends the reply.
    pub terminator: String,
    /// Longest wait for the terminator.
    pub max_wait: Duration,
    /// Replies shorter than this (prompt excluded) get one more read.
    pub min_reply_len: usize,
}

impl PendingCommand {
    /// A command with the default prompt terminator and wait.
    pub fn new(text: impl Into<String>, required_level: ConnectionLevel) -> Self {
        Self {
            text: text.into(),
            required_level,
            terminator: PROMPT.to_string(),
            max_wait: DEFAULT_TIMEOUT,
            min_reply_len: 0,
        }
    }

    /// Use a different reply terminator.
    pub fn with_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = terminator.into();
        self
    }

    /// Use a different wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Read once more if the first reply is shorter than `len`.
    pub fn with_min_reply(mut self, len: usize) -> Self {
        self.min_reply_len = len;
        self
    }
}

/// The text gathered for one exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Everything received while the exchange was waiting.
    pub text: String,
    /// Whether the terminator was seen before the wait ran out.
    pub complete: bool,
}

/// Decodes console bytes whose reads may end inside a multi-byte
/// character. The incomplete tail is held back until the next read.
#[derive(Debug, Default)]
pub(crate) struct Utf8Stream {
    pending: Vec<u8>,
}

impl Utf8Stream {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(std::str::from_utf8(&self.pending[..valid]).unwrap_or_default());
                    match e.error_len() {
                        None => {
                            self.pending.drain(..valid);
                            return text;
                        }
                        Some(invalid) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + invalid);
                        }
                    }
                }
            }
        }
    }
}

/// Reply buffer of the exchange in flight.
struct Waiter {
    terminator: String,
    buffer: String,
    done: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct Inbox {
    waiter: Option<Waiter>,
    closed: bool,
}

impl Inbox {
    fn deliver(&mut self, chunk: &str) {
        if let Some(waiter) = self.waiter.as_mut() {
            waiter.buffer.push_str(chunk);
            if waiter.buffer.contains(&waiter.terminator) {
                if let Some(done) = waiter.done.take() {
                    let _ = done.send(());
                }
            }
        }
    }
}

/// Serializes command/reply exchanges with the console.
pub struct CommandChannel {
    writer_tx: mpsc::Sender<Vec<u8>>,
    inbox: Arc<Mutex<Inbox>>,
    exchange: tokio::sync::Mutex<()>,
    gate: Arc<LevelGate>,
    events: EventSender,
}

impl CommandChannel {
    /// Start the writer and reader tasks over the given pipes.
    pub fn start<W, R>(
        stdin: W,
        stdout: R,
        gate: Arc<LevelGate>,
        events: EventSender,
        on_chunk: ChunkHandler,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (writer_tx, mut writer_rx) = mpsc::channel::<Vec<u8>>(64);
        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(bytes) = writer_rx.recv().await {
                if let Err(e) = stdin.write_all(&bytes).await {
                    error!("failed to write to debugger: {e}");
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    error!("failed to flush debugger input: {e}");
                    break;
                }
            }
        });

        let inbox = Arc::new(Mutex::new(Inbox::default()));
        {
            let inbox = inbox.clone();
            let gate = gate.clone();
            let events = events.clone();
            tokio::spawn(async move {
                let mut stdout = stdout;
                let mut buf = vec![0u8; 4096];
                let mut decoder = Utf8Stream::default();
                loop {
                    let n = match stdout.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => n,
                        Err(e) => {
                            error!("failed to read from debugger: {e}");
                            break;
                        }
                    };
                    let chunk = decoder.decode(&buf[..n]);
                    if chunk.is_empty() {
                        continue;
                    }
                    trace!(chunk = %chunk, "debugger output");

                    if let Ok(mut inbox) = inbox.lock() {
                        inbox.deliver(&chunk);
                    }
                    let _ = events.send(BridgeEvent::Output {
                        text: chunk.clone(),
                        level: OutputLevel::Stdout,
                    });
                    on_chunk(&chunk);
                }

                info!("debugger output closed");
                if let Ok(mut inbox) = inbox.lock() {
                    inbox.closed = true;
                    // Dropping the sender wakes the exchange in flight.
                    if let Some(waiter) = inbox.waiter.as_mut() {
                        waiter.done = None;
                    }
                }
                gate.close(GateClosed::Exited(None));
            });
        }

        Self {
            writer_tx,
            inbox,
            exchange: tokio::sync::Mutex::new(()),
            gate,
            events,
        }
    }

    /// The readiness gate this channel waits on.
    pub fn gate(&self) -> &Arc<LevelGate> {
        &self.gate
    }

    /// Send a command and return its reply text.
    ///
    /// A reply that times out is returned as received, possibly empty;
    /// callers detect failure by the expected pattern being absent.
    pub async fn query(&self, command: &PendingCommand) -> BridgeResult<String> {
        Ok(self.exchange(command).await?.text)
    }

    /// Send a command and return its reply with completion status.
    pub async fn exchange(&self, command: &PendingCommand) -> BridgeResult<Reply> {
        self.exchange_with(command, || {}).await
    }

    /// Like [`exchange`](Self::exchange), running `before_write` once the
    /// exchange lock is held, immediately before the command is written.
    pub async fn exchange_with<F>(
        &self,
        command: &PendingCommand,
        before_write: F,
    ) -> BridgeResult<Reply>
    where
        F: FnOnce(),
    {
        if command.text.contains(['\r', '\n']) {
            warn!(command = %command.text, "refusing multi-line command");
            return Err(BridgeError::InvalidCommand(command.text.clone()));
        }
        self.gate.check_open()?;
        self.gate.wait_for(command.required_level).await?;

        let _guard = self.exchange.lock().await;
        self.gate.check_open()?;

        let done = self.register(&command.terminator)?;
        before_write();
        self.write_line(&command.text).await?;

        let mut reply = self.await_reply(done, command.max_wait, &command.text).await;
        if reply.complete && strip_prompt(&reply.text).len() < command.min_reply_len {
            debug!(command = %command.text, "short reply, reading once more");
            let done = self.register(&command.terminator)?;
            let more = self.await_reply(done, command.max_wait, &command.text).await;
            reply.text.push_str(&more.text);
            reply.complete = more.complete;
        }
        Ok(reply)
    }

    /// Wait for output ending in `terminator` without sending anything.
    /// Used to consume the console banner.
    pub async fn read_reply(&self, terminator: &str, max_wait: Duration) -> BridgeResult<Reply> {
        let _guard = self.exchange.lock().await;
        self.gate.check_open()?;
        let done = self.register(terminator)?;
        Ok(self.await_reply(done, max_wait, "<banner>").await)
    }

    /// Queue a command without taking the exchange lock or waiting for a
    /// reply. Used for `Quit` on dispose.
    pub fn send_detached(&self, text: &str) {
        let line = format!("{text}{LINE_ENDING}");
        match self.writer_tx.try_send(line.into_bytes()) {
            Ok(()) => debug!(command = text, "sent"),
            Err(e) => warn!(command = text, "could not send: {e}"),
        }
    }

    /// Install a fresh reply buffer. Anything received before this point
    /// belongs to no exchange and is never attributed to this reply.
    fn register(&self, terminator: &str) -> BridgeResult<oneshot::Receiver<()>> {
        let (tx, rx) = oneshot::channel();
        let mut inbox = self
            .inbox
            .lock()
            .map_err(|_| BridgeError::ProcessUnavailable("reply buffer poisoned".into()))?;
        if inbox.closed {
            return Err(BridgeError::ProcessUnavailable(
                "debugger output closed".into(),
            ));
        }
        if let Some(stale) = inbox.waiter.take() {
            if !stale.buffer.is_empty() {
                trace!(discarded = %stale.buffer, "discarding unread output");
            }
        }
        inbox.waiter = Some(Waiter {
            terminator: terminator.to_string(),
            buffer: String::new(),
            done: Some(tx),
        });
        Ok(rx)
    }

    async fn write_line(&self, text: &str) -> BridgeResult<()> {
        let line = format!("{text}{LINE_ENDING}");
        self.writer_tx
            .send(line.into_bytes())
            .await
            .map_err(|_| BridgeError::ProcessUnavailable("debugger input closed".into()))?;
        debug!(command = text, "sent");
        let _ = self.events.send(BridgeEvent::Output {
            text: text.to_string(),
            level: OutputLevel::Command,
        });
        Ok(())
    }

    async fn await_reply(
        &self,
        done: oneshot::Receiver<()>,
        max_wait: Duration,
        command: &str,
    ) -> Reply {
        let complete = match timeout(max_wait, done).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                warn!(command, "debugger output closed before reply completed");
                false
            }
            Err(_) => {
                warn!(command, ?max_wait, "timed out waiting for reply");
                false
            }
        };
        let text = self
            .inbox
            .lock()
            .ok()
            .and_then(|mut inbox| inbox.waiter.take())
            .map(|waiter| waiter.buffer)
            .unwrap_or_default();
        Reply { text, complete }
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("readiness", &self.gate.readiness())
            .finish()
    }
}
