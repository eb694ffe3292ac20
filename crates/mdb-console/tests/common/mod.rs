//! A scripted in-memory stand-in for the debugger console.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mdb_console::{BridgeEvent, ConsoleSession, EventReceiver, SessionOptions};
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// Answers one command line, or `None` to stay silent.
pub type Responder = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

enum Push {
    Text(String),
    Close,
}

/// Handle on the fake console's side of the pipes.
pub struct FakeConsole {
    commands: Arc<Mutex<Vec<String>>>,
    push: mpsc::UnboundedSender<Push>,
}

impl FakeConsole {
    /// Every command line received so far, without line endings.
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Write unsolicited output, as a stop notification would arrive.
    pub fn push(&self, text: &str) {
        self.push.send(Push::Text(text.to_string())).unwrap();
    }

    /// Close console output, as if the process died.
    pub fn close(&self) {
        let _ = self.push.send(Push::Close);
    }

    /// Wait until `command` has been received.
    pub async fn wait_for_command(&self, command: &str) {
        for _ in 0..200 {
            if self.commands().iter().any(|c| c == command) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("console never received {command:?}; got {:?}", self.commands());
    }
}

/// Timeouts short enough for tests, long enough for scheduling noise.
pub fn test_options() -> SessionOptions {
    SessionOptions {
        default_timeout: Duration::from_secs(2),
        extended_timeout: Duration::from_secs(2),
    }
}

/// Replies a well-behaved simulator session gives.
pub fn standard_reply(command: &str) -> Option<String> {
    let reply = match command {
        "Quit" => return None,
        c if c.starts_with("HwTool Sim") => "Simulator selected.\n>",
        c if c.starts_with("HwTool") => "Target device PIC32MX795F512L found.\n>",
        c if c.starts_with("Program") => "Program succeeded.\n>",
        "Run" | "Continue" => "Running\n>",
        _ => ">",
    };
    Some(reply.to_string())
}

/// Start a session against a fake console driven by `responder`.
pub fn start<F>(responder: F) -> (Arc<ConsoleSession>, EventReceiver, FakeConsole)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let responder: Responder = Box::new(responder);
    let (bridge_in, console_in) = duplex(64 * 1024);
    let (mut console_out, bridge_out) = duplex(64 * 1024);
    let commands = Arc::new(Mutex::new(Vec::new()));
    let (push_tx, mut push_rx) = mpsc::unbounded_channel();

    {
        let commands = commands.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(console_in).lines();
            loop {
                tokio::select! {
                    line = lines.next_line() => {
                        let Ok(Some(line)) = line else { break };
                        let line = line.trim_end_matches('\r').to_string();
                        commands.lock().unwrap().push(line.clone());
                        if let Some(reply) = responder(&line) {
                            if console_out.write_all(reply.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                    }
                    push = push_rx.recv() => match push {
                        Some(Push::Text(text)) => {
                            if console_out.write_all(text.as_bytes()).await.is_err() {
                                break;
                            }
                        }
                        Some(Push::Close) | None => break,
                    },
                }
            }
        });
    }

    let (session, events) = ConsoleSession::from_io(bridge_in, bridge_out, test_options());
    (
        Arc::new(session),
        events,
        FakeConsole {
            commands,
            push: push_tx,
        },
    )
}

/// Next stop event, skipping output and level events.
pub async fn next_stop(events: &mut EventReceiver) -> Option<BridgeEvent> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if event.is_stop() {
                return Some(event);
            }
        }
        None
    };
    tokio::time::timeout(Duration::from_secs(2), wait)
        .await
        .ok()
        .flatten()
}

/// Stop events that arrive within a short window.
pub async fn drain_stops(events: &mut EventReceiver) -> Vec<BridgeEvent> {
    let mut stops = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_millis(150);
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        if event.is_stop() {
            stops.push(event);
        }
    }
    stops
}

/// A stop notification as the console prints it.
pub fn stop_at(file: &str, line: u32) -> String {
    format!("Stop at\n\taddress:0x9d0001f4\n\tfile:{file}\n\tsource line:{line}\n")
}
