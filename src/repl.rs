//! Front-end command words typed at the bridge prompt.

use anyhow::{anyhow, bail, Context, Result};
use mdb_console::BreakOn;

/// One line of user input, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ReplCommand {
    Break { file: String, line: i64 },
    Delete(Option<i64>),
    Info,
    Run,
    Continue,
    Step,
    Stepi,
    Next,
    Halt,
    Stack,
    Locals,
    Params,
    Print(String),
    Watch {
        address: u64,
        break_on: BreakOn,
        value: Option<u64>,
        pass_count: Option<u32>,
    },
    Tools,
    Help,
    Quit,
}

pub(crate) const HELP: &str = "\
commands:
  break <file>:<line>                  set a breakpoint
  delete [<id>]                        delete one or all breakpoints
  info                                 list breakpoints
  run | continue | step | stepi | next | halt
  stack                                show the call stack
  locals | params                      variables from the last stack
  print <name>                         evaluate an expression
  watch <addr> <r|w|rw> [value] [count]
  tools                                list attached hardware tools
  quit";

impl ReplCommand {
    /// Parse one input line. Blank lines yield `None`.
    pub(crate) fn parse(line: &str) -> Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(word) = words.next() else {
            return Ok(None);
        };
        let rest: Vec<&str> = words.collect();

        let cmd = match word.to_ascii_lowercase().as_str() {
            "break" | "b" => {
                let spec = single(&rest, "break <file>:<line>")?;
                let (file, line) = spec
                    .rsplit_once(':')
                    .ok_or_else(|| anyhow!("expected <file>:<line>, got {spec:?}"))?;
                let line = line
                    .parse()
                    .with_context(|| format!("invalid line number {line:?}"))?;
                Self::Break {
                    file: file.to_string(),
                    line,
                }
            }
            "delete" | "d" => match rest.as_slice() {
                [] => Self::Delete(None),
                [id] => Self::Delete(Some(
                    id.parse()
                        .with_context(|| format!("invalid breakpoint id {id:?}"))?,
                )),
                _ => bail!("usage: delete [<id>]"),
            },
            "info" => Self::Info,
            "run" | "r" => Self::Run,
            "continue" | "c" => Self::Continue,
            "step" | "s" => Self::Step,
            "stepi" | "si" => Self::Stepi,
            "next" | "n" => Self::Next,
            "halt" => Self::Halt,
            "stack" | "bt" => Self::Stack,
            "locals" => Self::Locals,
            "params" => Self::Params,
            "print" | "p" => Self::Print(single(&rest, "print <name>")?.to_string()),
            "watch" => parse_watch(&rest)?,
            "tools" => Self::Tools,
            "help" | "?" => Self::Help,
            "quit" | "q" | "exit" => Self::Quit,
            other => bail!("unknown command {other:?} (try `help`)"),
        };
        Ok(Some(cmd))
    }
}

fn single<'a>(rest: &[&'a str], usage: &str) -> Result<&'a str> {
    match rest {
        [one] => Ok(*one),
        _ => bail!("usage: {usage}"),
    }
}

fn parse_watch(rest: &[&str]) -> Result<ReplCommand> {
    const USAGE: &str = "usage: watch <addr> <r|w|rw> [value] [count]";
    let (address, kind, value, count) = match rest {
        [a, k] => (a, k, None, None),
        [a, k, v] => (a, k, Some(v), None),
        [a, k, v, c] => (a, k, Some(v), Some(c)),
        _ => bail!(USAGE),
    };
    let break_on = BreakOn::parse(kind).ok_or_else(|| anyhow!("{USAGE}"))?;
    Ok(ReplCommand::Watch {
        address: parse_number(address)?,
        break_on,
        value: value.map(|v| parse_number(v)).transpose()?,
        pass_count: count
            .map(|c| c.parse().with_context(|| format!("invalid count {c:?}")))
            .transpose()?,
    })
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(text: &str) -> Result<u64> {
    let parsed = match text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
    {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid number {text:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ReplCommand {
        ReplCommand::parse(line).unwrap().unwrap()
    }

    #[test]
    fn blank_line_is_nothing() {
        assert_eq!(ReplCommand::parse("   ").unwrap(), None);
    }

    #[test]
    fn break_takes_file_and_line() {
        assert_eq!(
            parse("break src/main.c:42"),
            ReplCommand::Break {
                file: "src/main.c".into(),
                line: 42
            }
        );
        assert!(ReplCommand::parse("break main.c").is_err());
        assert!(ReplCommand::parse("break main.c:x").is_err());
    }

    #[test]
    fn break_keeps_drive_letter() {
        assert_eq!(
            parse("b C:\\proj\\adc.c:7"),
            ReplCommand::Break {
                file: "C:\\proj\\adc.c".into(),
                line: 7
            }
        );
    }

    #[test]
    fn delete_with_and_without_id() {
        assert_eq!(parse("delete"), ReplCommand::Delete(None));
        assert_eq!(parse("delete 3"), ReplCommand::Delete(Some(3)));
        assert!(ReplCommand::parse("delete 1 2").is_err());
    }

    #[test]
    fn run_controls_and_aliases() {
        assert_eq!(parse("RUN"), ReplCommand::Run);
        assert_eq!(parse("c"), ReplCommand::Continue);
        assert_eq!(parse("si"), ReplCommand::Stepi);
        assert_eq!(parse("next"), ReplCommand::Next);
        assert_eq!(parse("halt"), ReplCommand::Halt);
        assert_eq!(parse("bt"), ReplCommand::Stack);
    }

    #[test]
    fn watch_forms() {
        assert_eq!(
            parse("watch 0xA0000010 w"),
            ReplCommand::Watch {
                address: 0xA000_0010,
                break_on: BreakOn::Write,
                value: None,
                pass_count: None,
            }
        );
        assert_eq!(
            parse("watch 32 rw 0x5 3"),
            ReplCommand::Watch {
                address: 32,
                break_on: BreakOn::ReadWrite,
                value: Some(5),
                pass_count: Some(3),
            }
        );
        assert!(ReplCommand::parse("watch 0x10 x").is_err());
        assert!(ReplCommand::parse("watch zz r").is_err());
    }

    #[test]
    fn print_needs_a_name() {
        assert_eq!(parse("print count"), ReplCommand::Print("count".into()));
        assert!(ReplCommand::parse("print").is_err());
    }

    #[test]
    fn unknown_word_is_an_error() {
        let err = ReplCommand::parse("frobnicate").unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }
}
