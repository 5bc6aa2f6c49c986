use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TranscriptProfile};

fn main() -> io::Result<()> {
    record_profile(TranscriptProfile::Console)?;
    record_profile(TranscriptProfile::Debounce)?;
    record_profile(TranscriptProfile::Migration)?;
    Ok(())
}

fn record_profile(profile: TranscriptProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    match profile {
        TranscriptProfile::Console => record_console(&mut session),
        TranscriptProfile::Debounce => record_debounce(&mut session),
        TranscriptProfile::Migration => record_migration(&mut session),
    }
}

fn record_console(session: &mut Session) -> io::Result<()> {
    session.handle_completion("s", 1)?;
    session.handle_completion("sus", 3)?;
    session.handle_completion("suspend ", "suspend ".len())?;
    session.handle_completion("rail r", "rail r".len())?;
    session.handle_completion("help ", "help ".len())?;

    for line in [
        "help",
        "help rail",
        "idle",
        "advance 30s",
        "screen on",
        "idle",
        "screen off",
        "suspend prepare",
        "idle",
        "suspend post",
        "irq on",
        "idle",
        "irq off",
        "resched on",
        "idle",
        "resched off",
        "idle",
        "status",
        "reboot now",
    ] {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

fn record_debounce(session: &mut Session) -> io::Result<()> {
    for line in [
        "advance 30s",
        "active",
        "idle",
        "inactive 250ms",
        "advance 100ms",
        "active",
        "advance 500ms",
        "status",
        "inactive",
        "advance 500ms",
        "rail need",
        "rail release 2s",
        "status",
        "advance 2s",
        "idle",
        "status",
    ] {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

fn record_migration(session: &mut Session) -> io::Result<()> {
    for line in [
        "screen on",
        "screen off",
        "advance 10s",
        "status",
        "screen on",
        "cpus 1",
        "screen off",
        "advance 5s",
        "screen on",
        "advance 10s",
        "screen off",
        "advance 10s",
        "status",
    ] {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}
