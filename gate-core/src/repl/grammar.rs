//! Parser for the diagnostics console.
//!
//! The command keyword is looked up in the [`catalog`](super::catalog) and the
//! remaining arguments are parsed with `winnow` combinators. Errors carry the
//! byte offset of the failure and the usage string of the command being
//! parsed.

use core::fmt;
use core::time::Duration;

use winnow::ModalResult;
use winnow::ascii::{Caseless, dec_uint, space0, space1};
use winnow::combinator::{alt, opt, preceded, terminated};
use winnow::error::{ContextError, ErrMode};
use winnow::prelude::*;
use winnow::token::take_while;

use super::catalog::{self, CommandTag};

/// Structured commands produced by the parser.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Suspend(SuspendCommand),
    Screen(Switch),
    Active,
    Inactive { delay: Option<Duration> },
    Rail(RailCommand),
    Cpus(u8),
    Irq(Switch),
    Resched(Switch),
    Idle,
    Advance(Duration),
    Status,
    Help { topic: Option<&'a str> },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SuspendCommand {
    Prepare,
    Post,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    pub const fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RailCommand {
    Need,
    Release { delay: Option<Duration> },
}

/// Why a line failed to parse.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The line held no command keyword.
    Empty,
    /// The keyword does not name a known command.
    UnknownCommand,
    /// The arguments did not match the command's usage.
    InvalidArguments { usage: &'static str },
}

/// Parse failure with the byte offset where it was detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ParseErrorKind::Empty => f.write_str("expected command keyword"),
            ParseErrorKind::UnknownCommand => {
                write!(f, "unknown command at column {}", self.offset + 1)
            }
            ParseErrorKind::InvalidArguments { usage } => {
                write!(
                    f,
                    "invalid argument at column {}, usage: {usage}",
                    self.offset + 1
                )
            }
        }
    }
}

/// Parse a console command from the provided line.
pub fn parse(line: &str) -> Result<Command<'_>, ParseError> {
    let line = line.trim_end();
    let mut input = line.trim_start();
    let keyword_offset = line.len() - input.len();

    let keyword = match word.parse_next(&mut input) {
        Ok(keyword) => keyword,
        Err(_) => {
            return Err(ParseError {
                offset: keyword_offset,
                kind: ParseErrorKind::Empty,
            });
        }
    };

    let spec = catalog::find(keyword).ok_or(ParseError {
        offset: keyword_offset,
        kind: ParseErrorKind::UnknownCommand,
    })?;

    let arguments_offset = line.len() - input.len();
    let result = match spec.tag {
        CommandTag::Suspend => preceded(space1, suspend_action)
            .map(Command::Suspend)
            .parse(input),
        CommandTag::Screen => preceded(space1, switch).map(Command::Screen).parse(input),
        CommandTag::Active => bare(Command::Active).parse(input),
        CommandTag::Inactive => optional_delay
            .map(|delay| Command::Inactive { delay })
            .parse(input),
        CommandTag::Rail => preceded(space1, rail_action).map(Command::Rail).parse(input),
        CommandTag::Cpus => preceded(space1, unit_count)
            .map(Command::Cpus)
            .parse(input),
        CommandTag::Irq => preceded(space1, switch).map(Command::Irq).parse(input),
        CommandTag::Resched => preceded(space1, switch).map(Command::Resched).parse(input),
        CommandTag::Idle => bare(Command::Idle).parse(input),
        CommandTag::Advance => preceded(space1, duration)
            .map(Command::Advance)
            .parse(input),
        CommandTag::Status => bare(Command::Status).parse(input),
        CommandTag::Help => opt(preceded(space1, word))
            .map(|topic| Command::Help { topic })
            .parse(input),
    };

    result.map_err(|err| ParseError {
        offset: arguments_offset + err.offset(),
        kind: ParseErrorKind::InvalidArguments { usage: spec.usage },
    })
}

fn bare<'a>(command: Command<'a>) -> impl Parser<&'a str, Command<'a>, ErrMode<ContextError>> {
    space0.value(command)
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .parse_next(input)
}

fn unit_count(input: &mut &str) -> ModalResult<u8> {
    dec_uint.parse_next(input)
}

fn switch(input: &mut &str) -> ModalResult<Switch> {
    alt((
        Caseless("on").value(Switch::On),
        Caseless("off").value(Switch::Off),
    ))
    .parse_next(input)
}

fn suspend_action(input: &mut &str) -> ModalResult<SuspendCommand> {
    alt((
        Caseless("prepare").value(SuspendCommand::Prepare),
        Caseless("post").value(SuspendCommand::Post),
    ))
    .parse_next(input)
}

fn rail_action(input: &mut &str) -> ModalResult<RailCommand> {
    alt((
        Caseless("need").value(RailCommand::Need),
        preceded(Caseless("release"), optional_delay)
            .map(|delay| RailCommand::Release { delay }),
    ))
    .parse_next(input)
}

fn optional_delay(input: &mut &str) -> ModalResult<Option<Duration>> {
    terminated(opt(preceded(space1, duration)), space0).parse_next(input)
}

/// Duration literal: an unsigned integer followed by `us`, `ms`, or `s`.
fn duration(input: &mut &str) -> ModalResult<Duration> {
    let value = dec_uint::<_, u64, ErrMode<ContextError>>.parse_next(input)?;
    alt((
        Caseless("us").value(Duration::from_micros(value)),
        Caseless("ms").value(Duration::from_millis(value)),
        Caseless("s").value(Duration::from_secs(value)),
    ))
    .parse_next(input)
}
