mod common;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use common::{standard_reply, start, FakeConsole};
use mdb_console::{
    BreakOn, BridgeError, BridgeEvent, ConnectionLevel, ConsoleSession, EventReceiver,
    PendingCommand, SetBreakpointResponse, Variable,
};

const BACKTRACE: &str = "#0  delay () at timer.c:12\n ms=0x20\n        n = 0x1\n\
                         #1  main () at main.c:95\n        count = 0x10\n>";

async fn connected<F>(responder: F) -> (Arc<ConsoleSession>, EventReceiver, FakeConsole)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let (session, events, console) = start(responder);
    session
        .connect("PIC32MX795F512L", "Sim", false, &[])
        .await
        .unwrap();
    (session, events, console)
}

async fn programmed<F>(responder: F) -> (Arc<ConsoleSession>, EventReceiver, FakeConsole)
where
    F: Fn(&str) -> Option<String> + Send + Sync + 'static,
{
    let (session, events, console) = start(responder);
    let mut elf = tempfile::NamedTempFile::new().unwrap();
    elf.write_all(b"\x7fELF").unwrap();
    session
        .start_debugger("PIC32MX795F512L", "Sim", elf.path(), &[], true)
        .await
        .unwrap();
    (session, events, console)
}

// ── serialization ───────────────────────────────────────────────

#[tokio::test]
async fn concurrent_queries_never_interleave() {
    let (session, _events, console) = start(|cmd| Some(format!("{cmd}\n>")));

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let session = session.clone();
            tokio::spawn(async move {
                let command = format!("echo-{i}");
                let reply = session.query(&command, ConnectionLevel::None).await.unwrap();
                (command, reply)
            })
        })
        .collect();

    for task in tasks {
        let (command, reply) = task.await.unwrap();
        assert_eq!(reply, format!("{command}\n>"));
    }
    assert_eq!(console.commands().len(), 16);
}

#[tokio::test]
async fn timed_out_reply_returns_partial_text() {
    let (session, _events, _console) = start(|cmd| {
        if cmd == "slow" {
            Some("Programming...".into())
        } else {
            standard_reply(cmd)
        }
    });

    let pending = PendingCommand::new("slow", ConnectionLevel::None)
        .with_max_wait(Duration::from_millis(100));
    let reply = session.exchange(&pending).await.unwrap();
    assert!(!reply.complete);
    assert_eq!(reply.text, "Programming...");

    // The channel stays usable after a timeout.
    let reply = session.query("info break", ConnectionLevel::None).await.unwrap();
    assert_eq!(reply, ">");
}

#[tokio::test]
async fn multi_line_command_is_refused() {
    let (session, _events, console) = start(|cmd| Some(format!("{cmd}-reply\n>")));

    let err = session
        .query("Print a\r\nPrint b", ConnectionLevel::None)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidCommand(_)), "got: {err:?}");

    let err = session.evaluate("a\nRun").await.unwrap_err();
    assert!(matches!(err, BridgeError::InvalidCommand(_)), "got: {err:?}");

    // Nothing reached the console, and the next exchange gets its own reply.
    let reply = session.query("Print c", ConnectionLevel::None).await.unwrap();
    assert_eq!(reply, "Print c-reply\n>");
    assert_eq!(console.commands(), vec!["Print c".to_string()]);
}

// ── breakpoints ─────────────────────────────────────────────────

#[tokio::test]
async fn set_breakpoint_registers_acknowledged_breakpoint() {
    let (session, _events, console) = connected(|cmd| {
        if cmd == "break main.c:42" {
            Some("Breakpoint 3 at file main.c, line 42.\n>".into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;

    let resp = session
        .set_breakpoint("/home/dev/Blink.X/main.c", 42)
        .await
        .unwrap();
    assert_eq!(
        resp,
        SetBreakpointResponse {
            id: 3,
            line: 42,
            file: "main.c".into(),
            verified: true,
        }
    );
    assert!(console.commands().contains(&"break main.c:42".to_string()));

    let registered = session.breakpoints();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].id, 3);
    assert_eq!(registered[0].line, 42);
}

#[tokio::test]
async fn unparsable_breakpoint_reply_is_unverified() {
    let (session, _events, _console) = connected(|cmd| {
        if cmd.starts_with("break") {
            Some("Invalid breakpoint location.\n>".into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;

    let resp = session.set_breakpoint("main.c", 420).await.unwrap();
    assert_eq!(resp.id, -1);
    assert_eq!(resp.line, -1);
    assert!(!resp.verified);
    assert!(session.breakpoints().is_empty());
}

#[tokio::test]
async fn clear_breakpoints_waits_for_acknowledgment() {
    let (session, _events, console) = connected(|cmd| match cmd {
        "break main.c:42" => Some("Breakpoint 1 at file main.c, line 42.\n>".into()),
        "break adc.c:7" => Some("Breakpoint 2 at file adc.c, line 7.\n>".into()),
        "delete" => None,
        _ => standard_reply(cmd),
    })
    .await;
    session.set_breakpoint("main.c", 42).await.unwrap();
    session.set_breakpoint("adc.c", 7).await.unwrap();

    let clear = {
        let session = session.clone();
        tokio::spawn(async move { session.clear_breakpoints().await })
    };
    console.wait_for_command("delete").await;
    assert_eq!(session.breakpoints().len(), 2);

    console.push(">");
    assert!(clear.await.unwrap().unwrap());
    assert!(session.breakpoints().is_empty());
}

#[tokio::test]
async fn unacknowledged_delete_keeps_breakpoint() {
    let (session, _events, _console) = start(|cmd| match cmd {
        "break main.c:42" => Some("Breakpoint 1 at file main.c, line 42.\n>".into()),
        c if c.starts_with("delete") => Some("Deleting...".into()),
        _ => standard_reply(cmd),
    });
    session
        .connect("PIC32MX795F512L", "Sim", false, &[])
        .await
        .unwrap();
    session.set_breakpoint("main.c", 42).await.unwrap();

    // Times out after the default wait without seeing a prompt.
    assert!(!session.clear_breakpoint(1).await.unwrap());
    assert_eq!(session.breakpoints().len(), 1);
}

#[tokio::test]
async fn breakpoint_table_refreshes_registry() {
    let (session, _events, console) = connected(|cmd| match cmd {
        "break main.c:42" => Some("Breakpoint 1 at file main.c, line 42.\n>".into()),
        "info break" => Some(
            "Num Enb Address    Location\n\
             1   n   0x9D0001F4 at main.c:42\n\
             5   y   0x9D000200 at adc.c:17\n>"
                .into(),
        ),
        _ => standard_reply(cmd),
    })
    .await;
    session.set_breakpoint("main.c", 42).await.unwrap();

    let rows = session.get_breakpoints().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].id, 5);
    assert!(console.commands().contains(&"info break".to_string()));

    let registered = session.breakpoints();
    assert_eq!(registered.len(), 1);
    assert_eq!(registered[0].address, Some(0x9D00_01F4));
    assert!(!registered[0].enabled);
}

#[tokio::test]
async fn breakpoints_wait_for_connection() {
    let (session, _events, console) = start(standard_reply);
    let set = {
        let session = session.clone();
        tokio::spawn(async move { session.set_breakpoint("main.c", 1).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!set.is_finished());
    assert!(console.commands().is_empty());

    session
        .connect("PIC32MX795F512L", "Sim", false, &[])
        .await
        .unwrap();
    assert!(!set.await.unwrap().unwrap().verified);
}

// ── stack and variables ─────────────────────────────────────────

#[tokio::test]
async fn stack_populates_cached_snapshot() {
    let (session, _events, console) = programmed(|cmd| {
        if cmd == "backtrace full" {
            Some(BACKTRACE.into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;
    assert!(!session.has_local_variables().unwrap());

    let frames = session.get_stack().await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].name, "delay");
    assert_eq!(frames[1].line, 95);

    let first = session.get_local_variables().unwrap();
    let second = session.get_local_variables().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(
        first.to_vec(),
        vec![Variable::scalar("n", 1), Variable::scalar("count", 0x10)]
    );
    assert_eq!(
        session.get_parameters().unwrap().to_vec(),
        vec![Variable::scalar("ms", 0x20)]
    );
    assert!(session.has_parameters().unwrap());

    let queried = console
        .commands()
        .iter()
        .filter(|c| *c == "backtrace full")
        .count();
    assert_eq!(queried, 1);
}

#[tokio::test]
async fn next_stack_replaces_snapshot() {
    let (session, _events, _console) = programmed(|cmd| {
        if cmd == "backtrace full" {
            Some(BACKTRACE.into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;

    session.get_stack().await.unwrap();
    let before = session.get_local_variables().unwrap();
    session.get_stack().await.unwrap();
    let after = session.get_local_variables().unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(before, after);
}

#[tokio::test]
async fn evaluate_prints_expression() {
    let (session, _events, _console) = programmed(|cmd| match cmd {
        "Print count" => Some("count=16\n>".into()),
        "Print missing" => Some("Symbol missing not found.\n>".into()),
        _ => standard_reply(cmd),
    })
    .await;

    let eval = session.evaluate("count").await.unwrap().unwrap();
    assert_eq!(eval.value, "16");
    assert!(session.evaluate("missing").await.unwrap().is_none());
}

// ── watchpoints and tools ───────────────────────────────────────

#[tokio::test]
async fn watch_builds_command_and_parses_id() {
    let (session, _events, console) = programmed(|cmd| {
        if cmd.starts_with("Watch") {
            Some("Watchpoint 2.\n>".into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;

    let wp = session
        .watch(0xA000_0010, BreakOn::Write, Some(5), Some(3))
        .await
        .unwrap();
    assert_eq!(wp.id, 2);
    assert!(wp.verified);
    assert_eq!(wp.message, "Watchpoint 2.");
    assert!(console
        .commands()
        .contains(&"Watch 0xA0000010 w:5 3".to_string()));
}

#[tokio::test]
async fn rejected_watch_is_unverified() {
    let (session, _events, _console) = programmed(|cmd| {
        if cmd.starts_with("Watch") {
            Some("Invalid address.\n>".into())
        } else {
            standard_reply(cmd)
        }
    })
    .await;

    let wp = session.watch(0x10, BreakOn::Read, None, None).await.unwrap();
    assert_eq!(wp.id, -1);
    assert!(!wp.verified);
    assert_eq!(wp.message, "Invalid address.");
}

#[tokio::test]
async fn attached_tools_lists_names() {
    let (session, _events, _console) = start(|cmd| {
        if cmd == "hwtool" {
            Some("Tools found:\n0\tPICkit 4\tBUR1234\tPICkit4\n1\tSimulator\t\tSim\n\n>".into())
        } else {
            standard_reply(cmd)
        }
    });
    assert_eq!(session.attached_tools().await.unwrap(), vec!["PICkit4", "Sim"]);
}

// ── lifecycle ───────────────────────────────────────────────────

#[tokio::test]
async fn dispose_sends_quit_and_fails_later_calls() {
    let (session, _events, console) = connected(standard_reply).await;
    let deferred = {
        let session = session.clone();
        tokio::spawn(async move { session.get_stack().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.dispose();
    session.dispose();
    console.wait_for_command("Quit").await;
    assert_eq!(
        console.commands().iter().filter(|c| *c == "Quit").count(),
        1
    );

    assert!(matches!(
        deferred.await.unwrap(),
        Err(BridgeError::UseAfterDispose)
    ));
    assert!(matches!(
        session.query("info break", ConnectionLevel::None).await,
        Err(BridgeError::UseAfterDispose)
    ));
    assert!(matches!(
        session.set_breakpoint("main.c", 1).await,
        Err(BridgeError::UseAfterDispose)
    ));
    assert_eq!(session.level(), ConnectionLevel::None);
}

#[tokio::test]
async fn closed_console_makes_session_unavailable() {
    let (session, _events, console) = connected(standard_reply).await;
    console.close();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = session
        .query("info break", ConnectionLevel::None)
        .await
        .unwrap_err();
    assert!(matches!(err, BridgeError::ProcessUnavailable(_)), "got: {err:?}");
}

#[tokio::test]
async fn console_output_is_forwarded() {
    let (session, mut events, _console) = start(standard_reply);
    session.query("Run", ConnectionLevel::None).await.unwrap();

    let mut stdout = String::new();
    while let Ok(event) = events.try_recv() {
        if let BridgeEvent::Output { text, level } = event {
            if level == mdb_console::OutputLevel::Stdout {
                stdout.push_str(&text);
            }
        }
    }
    assert_eq!(stdout, "Running\n>");
}
