mod session;

use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::process;

use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::style::Print;
use crossterm::terminal::{self, ClearType};
use crossterm::{cursor, queue};

use session::{CompletionResponse, Session, TranscriptProfile};

const BANNER: &str = "Power gate emulator ready. Type `help` for commands or `exit` to quit.";
const PROMPT: &str = "> ";

fn main() -> io::Result<()> {
    let profile = parse_profile().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!(
            "Usage: emulator [--profile <console|debounce|migration>] | emulator <console|debounce|migration>"
        );
        process::exit(2);
    });

    let mut session = Session::new(profile)?;
    if io::stdin().is_terminal() {
        run_interactive(&mut session)
    } else {
        run_batch(&mut session)
    }
}

/// Line-at-a-time loop for piped input.
fn run_batch(session: &mut Session) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut line = String::new();

    writeln!(writer, "{BANNER}")?;

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

/// Raw-mode editor with tab completion.
fn run_interactive(session: &mut Session) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let result = interactive_loop(session);
    terminal::disable_raw_mode()?;
    result
}

fn interactive_loop(session: &mut Session) -> io::Result<()> {
    let mut stdout = io::stdout();
    let mut buffer = String::new();

    write!(stdout, "{BANNER}\r\n")?;
    redraw(&mut stdout, &buffer)?;

    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind == KeyEventKind::Release {
            continue;
        }

        match key.code {
            KeyCode::Enter => {
                write!(stdout, "\r\n")?;
                let line = std::mem::take(&mut buffer);
                let trimmed = line.trim();
                if should_terminate(trimmed) {
                    write!(stdout, "Session closed.\r\n")?;
                    return Ok(());
                }
                for response in session.handle_command(trimmed)? {
                    write!(stdout, "{response}\r\n")?;
                }
            }
            KeyCode::Tab => match session.handle_completion(&buffer, buffer.len())? {
                CompletionResponse::Applied { replacement } => {
                    buffer.replace_range(replacement.start..replacement.end, replacement.value);
                    if replacement.append_space {
                        buffer.push(' ');
                    }
                }
                CompletionResponse::Suggestions { options } => {
                    write!(stdout, "\r\n{}\r\n", options.join("  "))?;
                }
                CompletionResponse::NoMatches => {}
            },
            KeyCode::Backspace => {
                buffer.pop();
            }
            KeyCode::Char('c' | 'd') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                write!(stdout, "\r\n")?;
                return Ok(());
            }
            KeyCode::Char(c) if c.is_ascii() && !c.is_ascii_control() => buffer.push(c),
            _ => {}
        }

        redraw(&mut stdout, &buffer)?;
    }
}

fn redraw(stdout: &mut io::Stdout, buffer: &str) -> io::Result<()> {
    queue!(
        stdout,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(PROMPT),
        Print(buffer)
    )?;
    stdout.flush()
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_profile() -> Result<TranscriptProfile, String> {
    let mut args = env::args().skip(1);
    if let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--profile=") {
            TranscriptProfile::from_tag(value)
        } else if arg == "--profile" {
            if let Some(value) = args.next() {
                TranscriptProfile::from_tag(&value)
            } else {
                Err("Expected value after --profile".to_string())
            }
        } else {
            TranscriptProfile::from_tag(&arg)
        }
    } else {
        Ok(TranscriptProfile::Console)
    }
}
