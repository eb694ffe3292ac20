//! Debugger process supervision: spawn, stderr logging, exit watching.

use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tracing::{error, info};

use crate::channel::Utf8Stream;
use crate::error::{BridgeError, BridgeResult};
use crate::event::{BridgeEvent, EventSender, OutputLevel};

/// A freshly spawned debugger with its pipes detached from the child.
#[derive(Debug)]
pub struct ConsoleProcess {
    /// The child handle, for exit watching.
    pub child: Child,
    /// Console input.
    pub stdin: ChildStdin,
    /// Console output.
    pub stdout: ChildStdout,
    /// Console diagnostics.
    pub stderr: Option<ChildStderr>,
}

/// Remove one layer of surrounding quotes from an executable path.
pub fn strip_quotes(path: &str) -> &str {
    let path = path.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = path
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    path
}

/// Spawn the debugger with all three standard streams piped and no
/// arguments.
pub fn spawn_console(path: &str) -> BridgeResult<ConsoleProcess> {
    let program = strip_quotes(path);
    info!(program, "starting debugger");

    let mut child = Command::new(program)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(BridgeError::SpawnFailed)?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| BridgeError::ProcessUnavailable("could not capture stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| BridgeError::ProcessUnavailable("could not capture stdout".into()))?;
    let stderr = child.stderr.take();

    Ok(ConsoleProcess {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Log everything the debugger writes to stderr. Diagnostic only: the
/// text is forwarded as [`OutputLevel::Stderr`] and never reaches a reply.
pub fn spawn_stderr_logger(mut stderr: ChildStderr, events: EventSender) {
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut decoder = Utf8Stream::default();
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let text = decoder.decode(&buf[..n]);
                    if text.is_empty() {
                        continue;
                    }
                    error!(stderr = %text.trim_end(), "debugger reported an error");
                    let _ = events.send(BridgeEvent::Output {
                        text,
                        level: OutputLevel::Stderr,
                    });
                }
            }
        }
    });
}

/// Wait for the debugger to exit and hand the exit code to `on_exit`.
pub fn spawn_exit_watcher<F>(mut child: Child, on_exit: F)
where
    F: FnOnce(Option<i32>) + Send + 'static,
{
    tokio::spawn(async move {
        let code = match child.wait().await {
            Ok(status) => status.code(),
            Err(e) => {
                error!("failed to wait for debugger: {e}");
                None
            }
        };
        info!(?code, "debugger exited");
        on_exit(code);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_quotes_removes_one_layer() {
        assert_eq!(
            strip_quotes("\"/opt/microchip/mplabx/v6.20/mplab_platform/bin/mdb.sh\""),
            "/opt/microchip/mplabx/v6.20/mplab_platform/bin/mdb.sh"
        );
        assert_eq!(strip_quotes("'C:\\mdb.bat'"), "C:\\mdb.bat");
        assert_eq!(strip_quotes("  mdb.sh "), "mdb.sh");
    }

    #[test]
    fn strip_quotes_leaves_unbalanced_quotes() {
        assert_eq!(strip_quotes("\"mdb.sh"), "\"mdb.sh");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[tokio::test]
    async fn spawn_nonexistent_debugger_fails() {
        let err = spawn_console("\"definitely-not-a-real-debugger-xyz\"").unwrap_err();
        assert!(matches!(err, BridgeError::SpawnFailed(_)), "got: {err:?}");
    }
}
