use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use mdb_config::logging::{
    default_log_file_path, ensure_log_dir, log_level_to_filter, rotate_log_files,
    DEFAULT_MAX_LOG_FILES, DEFAULT_MAX_LOG_SIZE,
};
use mdb_config::{load_config, load_file, Config, DefaultPaths, PlatformPaths};
use mdb_console::{BridgeEvent, ConsoleSession, EventReceiver, OutputLevel};

use crate::repl::{ReplCommand, HELP};

/// Command-line arguments.
#[derive(Debug, Default)]
pub(crate) struct Args {
    /// Explicit config file, bypassing the global/project lookup.
    pub config: Option<PathBuf>,
    /// Firmware image, overriding `[target] elf`.
    pub elf: Option<PathBuf>,
}

impl Args {
    pub(crate) fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config needs a file")?;
                    parsed.config = Some(PathBuf::from(path));
                }
                flag if flag.starts_with('-') => bail!("unknown option {flag}"),
                _ if parsed.elf.is_none() => parsed.elf = Some(PathBuf::from(arg)),
                _ => bail!("unexpected argument {arg}"),
            }
        }
        Ok(parsed)
    }
}

/// Load config, start logging, run the session until the user quits.
pub(crate) fn run_bridge(args: Args) -> Result<()> {
    let paths = DefaultPaths::new().context("failed to detect platform paths")?;

    let config = match &args.config {
        Some(path) => load_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let project_dir = std::env::current_dir().ok();
            load_config(&paths.config_dir(), project_dir.as_deref())
                .context("failed to load configuration")?
        }
    };

    init_logging(&config);
    info!("mdb-bridge starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let result = runtime.block_on(session_main(config, args.elf));
    runtime.shutdown_timeout(Duration::from_secs(2));

    info!("mdb-bridge exited");
    result
}

// ── Logging initialisation ──────────────────────────────────────────────────

fn init_logging(config: &Config) {
    let log_path = config
        .log
        .file
        .clone()
        .unwrap_or_else(default_log_file_path);

    ensure_log_dir(&log_path).ok();
    rotate_log_files(&log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES).ok();

    let filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| log_level_to_filter(config.log.level.as_str()).to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&filter)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Ok(file) => tracing_subscriber::fmt()
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .with_env_filter(env_filter)
            .init(),
        // Without a log file, diagnostics go to stderr so stdout stays clean.
        Err(_) => tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .init(),
    }
}

// ── Session ─────────────────────────────────────────────────────────────────

async fn session_main(config: Config, elf: Option<PathBuf>) -> Result<()> {
    let device = config
        .target
        .device
        .clone()
        .context("no device configured; set [target] device")?;
    let tool = config.target.tool.clone();
    let options = config.target.tool_options();

    let (session, events) = ConsoleSession::spawn(&config.debugger.path, config.session_options())
        .await
        .with_context(|| format!("failed to start debugger {}", config.debugger.path))?;
    let printer = tokio::spawn(print_events(events));

    match elf.or_else(|| config.target.elf.clone()) {
        Some(elf) => {
            session
                .start_debugger(&device, &tool, &elf, &options, config.target.stop_on_entry)
                .await
                .with_context(|| format!("failed to program {}", elf.display()))?;
            println!("programmed {} on {device} via {tool}", elf.display());
        }
        None => {
            let kind = session
                .connect(&device, &tool, config.target.program_mode, &options)
                .await
                .with_context(|| format!("failed to connect to {device}"))?;
            println!("connected to {device} ({kind:?}); no firmware programmed");
        }
    }

    let mut lines = spawn_stdin_reader();
    prompt();
    while let Some(line) = lines.recv().await {
        match ReplCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(ReplCommand::Quit)) => break,
            Ok(Some(cmd)) => {
                if let Err(e) = execute(&session, cmd).await {
                    error!("command failed: {e:#}");
                    println!("error: {e:#}");
                    if session.exit_code().is_some() || session.is_disposed() {
                        break;
                    }
                }
            }
            Err(e) => println!("{e:#}"),
        }
        prompt();
    }

    session.dispose();
    drop(session);
    let _ = tokio::time::timeout(Duration::from_secs(1), printer).await;
    Ok(())
}

async fn execute(session: &ConsoleSession, cmd: ReplCommand) -> Result<()> {
    match cmd {
        ReplCommand::Break { file, line } => {
            let resp = session.set_breakpoint(&file, line).await?;
            if resp.verified {
                println!("breakpoint {} at {}:{}", resp.id, resp.file, resp.line);
            } else {
                println!("breakpoint at {file}:{line} was not accepted");
            }
        }
        ReplCommand::Delete(Some(id)) => {
            if !session.clear_breakpoint(id).await? {
                warn!(id, "delete not acknowledged");
                println!("breakpoint {id} may still be set");
            }
        }
        ReplCommand::Delete(None) => {
            if !session.clear_breakpoints().await? {
                println!("breakpoints may still be set");
            }
        }
        ReplCommand::Info => {
            for bp in session.get_breakpoints().await? {
                let enabled = if bp.enabled { "y" } else { "n" };
                println!(
                    "{:>3} {enabled} 0x{:08X} {}:{}",
                    bp.id, bp.address, bp.file, bp.line
                );
            }
        }
        ReplCommand::Run => session.run().await?,
        ReplCommand::Continue => session.continue_execution().await?,
        ReplCommand::Step => session.step().await?,
        ReplCommand::Stepi => session.step_instruction().await?,
        ReplCommand::Next => session.next().await?,
        ReplCommand::Halt => session.halt().await?,
        ReplCommand::Stack => {
            for frame in session.get_stack().await? {
                println!("#{} {} at {}:{}", frame.index, frame.name, frame.file, frame.line);
            }
        }
        ReplCommand::Locals => {
            for var in session.get_local_variables()?.iter() {
                println!("{} = 0x{:X}", var.name, var.value);
            }
        }
        ReplCommand::Params => {
            for var in session.get_parameters()?.iter() {
                println!("{} = 0x{:X}", var.name, var.value);
            }
        }
        ReplCommand::Print(name) => match session.evaluate(&name).await? {
            Some(eval) => println!("{} = {}", eval.name, eval.value),
            None => println!("{name}: no value"),
        },
        ReplCommand::Watch {
            address,
            break_on,
            value,
            pass_count,
        } => {
            let wp = session.watch(address, break_on, value, pass_count).await?;
            println!("{}", wp.message);
        }
        ReplCommand::Tools => {
            for tool in session.attached_tools().await? {
                println!("{tool}");
            }
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => {}
    }
    Ok(())
}

async fn print_events(mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        match event {
            BridgeEvent::Output {
                level: OutputLevel::Command,
                ..
            } => {}
            BridgeEvent::Output { text, .. } => print!("{text}"),
            BridgeEvent::LevelReached { level } => println!("[level: {level:?}]"),
            BridgeEvent::Exited { code } => {
                println!("[debugger exited: {code:?}]");
                break;
            }
            stop => println!("[{}]", stop_label(&stop)),
        }
        std::io::stdout().flush().ok();
    }
}

fn stop_label(event: &BridgeEvent) -> &'static str {
    match event {
        BridgeEvent::StopOnEntry => "stopped on entry",
        BridgeEvent::StopOnBreakpoint => "stopped at breakpoint",
        BridgeEvent::StopOnException => "stopped (exception)",
        BridgeEvent::StopOnStep => "step complete",
        BridgeEvent::StopOnPause => "paused",
        _ => "event",
    }
}

/// Forward stdin lines from a blocking thread.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn prompt() {
    print!("(mdb-bridge) ");
    std::io::stdout().flush().ok();
}
