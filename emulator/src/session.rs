use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::ops::Add;
use std::path::Path;
use std::time::{Duration, Instant as HostInstant};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gate_core::cluster::{
    ClusterMigrationGate, ClusterParameters, ClusterPlatform, ClusterState, MigrationOutcome,
    ScreenOffOutcome,
};
use gate_core::config::GateConfig;
use gate_core::debounce::{Edge, ScheduleOutcome, ScheduleReport};
use gate_core::error::{BackendError, GateError};
use gate_core::gate::IdleGate;
use gate_core::idle::{IdleDepth, IdleOutcome, IdlePlatform, IdleReport};
use gate_core::repl::catalog;
use gate_core::repl::completion::{CompletionEngine, Replacement};
use gate_core::repl::grammar::{self, Command, RailCommand, SuspendCommand, Switch};
use gate_core::repl::status::{StatusFormatter, StatusSnapshot};
use gate_core::suspend::{PowerEvent, SuspendTransition};
use gate_core::telemetry::TelemetryInstant;

/// Time the emulated core spends in a low-power state per `idle` command.
const IDLE_RESIDENCY: Duration = Duration::from_micros(750);

/// Units online when a session starts.
const DEFAULT_ONLINE_UNITS: usize = 4;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptProfile {
    Console,
    Debounce,
    Migration,
}

impl TranscriptProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            TranscriptProfile::Console => "transcripts/emulator-console.log",
            TranscriptProfile::Debounce => "transcripts/emulator-debounce.log",
            TranscriptProfile::Migration => "transcripts/emulator-migration.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            TranscriptProfile::Console => "Power gate emulator console transcript",
            TranscriptProfile::Debounce => "Power gate emulator debounce transcript",
            TranscriptProfile::Migration => "Power gate emulator cluster migration transcript",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("console") {
            Ok(Self::Console)
        } else if tag.eq_ignore_ascii_case("debounce") {
            Ok(Self::Debounce)
        } else if tag.eq_ignore_ascii_case("migration") {
            Ok(Self::Migration)
        } else {
            Err(format!("Unknown transcript profile `{tag}`"))
        }
    }
}

/// Virtual clock reading, measured from session start.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct VirtualInstant(Duration);

impl VirtualInstant {
    pub fn offset(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for VirtualInstant {
    type Output = VirtualInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        VirtualInstant(self.0.saturating_add(rhs))
    }
}

impl TelemetryInstant for VirtualInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

/// Idle backend driven by console toggles.
#[derive(Debug, Default)]
struct EmulatedIdle {
    clock: VirtualInstant,
    masked: bool,
    irq_pending: bool,
    resched: bool,
    entries: usize,
}

impl IdlePlatform for EmulatedIdle {
    type Instant = VirtualInstant;

    fn now(&mut self) -> VirtualInstant {
        self.clock
    }

    fn mask_local_interrupts(&mut self) {
        self.masked = true;
    }

    fn unmask_local_interrupts(&mut self) {
        self.masked = false;
    }

    fn interrupt_pending(&mut self) -> bool {
        self.irq_pending
    }

    fn reschedule_requested(&mut self) -> bool {
        self.resched
    }

    fn enter_low_power(&mut self, _depth: IdleDepth) -> Result<(), BackendError> {
        if !self.masked {
            return Err(BackendError::EntryFailed);
        }
        self.entries += 1;
        self.clock = self.clock + IDLE_RESIDENCY;
        Ok(())
    }
}

/// Two-cluster SoC model with a configurable online unit count.
#[derive(Debug)]
struct EmulatedCluster {
    online: usize,
    active: ClusterState,
    auto_hotplug: bool,
    single_unit_requested: bool,
    hotplug_log: Vec<(u32, bool)>,
}

impl EmulatedCluster {
    fn new(online: usize) -> Self {
        Self {
            online,
            active: ClusterState::Normal,
            auto_hotplug: true,
            single_unit_requested: false,
            hotplug_log: Vec::new(),
        }
    }
}

impl ClusterPlatform for EmulatedCluster {
    fn online_units(&mut self) -> usize {
        self.online
    }

    fn active_cluster(&mut self) -> ClusterState {
        self.active
    }

    fn set_cluster_parameters(&mut self, _params: ClusterParameters) {}

    fn reparent_cpu_clock(&mut self, target: ClusterState) -> Result<(), BackendError> {
        self.active = target;
        Ok(())
    }

    fn disable_auto_hotplug(&mut self) {
        self.auto_hotplug = false;
    }

    fn enable_auto_hotplug(&mut self) {
        self.auto_hotplug = true;
    }

    fn request_single_unit(&mut self) {
        self.single_unit_requested = true;
    }

    fn release_single_unit(&mut self) {
        self.single_unit_requested = false;
    }

    fn record_hotplug(&mut self, unit: u32, online: bool) {
        self.hotplug_log.push((unit, online));
    }
}

#[derive(Debug)]
pub enum CompletionResponse {
    NoMatches,
    Applied { replacement: Replacement },
    Suggestions { options: Vec<&'static str> },
}

pub struct Session {
    gate: IdleGate<NoopRawMutex, VirtualInstant>,
    cluster: ClusterMigrationGate<NoopRawMutex, EmulatedCluster, VirtualInstant>,
    idle: EmulatedIdle,
    now: VirtualInstant,
    transcript: TranscriptLogger,
    started_at: HostInstant,
    completion: CompletionEngine,
}

impl Session {
    pub fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::new(profile)?;
        let config = GateConfig::default();
        let now = VirtualInstant::default();

        Ok(Self {
            gate: IdleGate::new(config, now),
            cluster: ClusterMigrationGate::new(config, EmulatedCluster::new(DEFAULT_ONLINE_UNITS)),
            idle: EmulatedIdle::default(),
            now,
            transcript,
            started_at: HostInstant::now(),
            completion: CompletionEngine::new(),
        })
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let elapsed = self.started_at.elapsed();
        self.transcript
            .append_line(elapsed, self.now, TranscriptRole::Host, trimmed)?;

        let lines = match grammar::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        self.record_output(elapsed, &lines)?;
        Ok(lines)
    }

    pub fn handle_completion(
        &mut self,
        buffer: &str,
        cursor: usize,
    ) -> io::Result<CompletionResponse> {
        let cursor = cursor.min(buffer.len());
        let (prefix, suffix) = buffer.split_at(cursor);
        let elapsed = self.started_at.elapsed();
        self.transcript
            .log_completion_request(elapsed, self.now, prefix, suffix, cursor)?;

        let result = self.completion.complete(buffer, cursor);
        if result.options.is_empty() {
            self.transcript.log_completion_none(elapsed, self.now)?;
            return Ok(CompletionResponse::NoMatches);
        }

        let options: Vec<&'static str> = result.options.iter().copied().collect();
        if let Some(replacement) = result.replacement {
            self.transcript
                .log_completion_applied(elapsed, self.now, &replacement)?;
            return Ok(CompletionResponse::Applied { replacement });
        }

        self.transcript
            .log_completion_options(elapsed, self.now, &options)?;
        Ok(CompletionResponse::Suggestions { options })
    }

    fn execute(&mut self, command: Command<'_>) -> Vec<String> {
        match command {
            Command::Suspend(action) => self.suspend(action),
            Command::Screen(switch) => self.screen(switch),
            Command::Active => {
                let result = self.gate.external_active(self.now);
                vec![self.describe_schedule("active", result)]
            }
            Command::Inactive { delay } => {
                let result = self.gate.external_inactive(self.now, delay);
                vec![self.describe_schedule("inactive", result)]
            }
            Command::Rail(RailCommand::Need) => {
                let result = self.gate.needs_full_rail(self.now);
                vec![self.describe_schedule("rail need", result)]
            }
            Command::Rail(RailCommand::Release { delay }) => {
                let result = self.gate.release_full_rail(self.now, delay);
                vec![self.describe_schedule("rail release", result)]
            }
            Command::Cpus(count) => {
                self.cluster.platform_mut().online = usize::from(count);
                vec![format!("OK cpus online={count}")]
            }
            Command::Irq(switch) => {
                self.idle.irq_pending = switch.is_on();
                vec![format!("OK irq pending={}", switch.is_on())]
            }
            Command::Resched(switch) => {
                self.idle.resched = switch.is_on();
                vec![format!("OK resched requested={}", switch.is_on())]
            }
            Command::Idle => self.idle(),
            Command::Advance(duration) => self.advance(duration),
            Command::Status => self.status(),
            Command::Help { topic } => help_lines(topic),
        }
    }

    fn suspend(&mut self, action: SuspendCommand) -> Vec<String> {
        let event = match action {
            SuspendCommand::Prepare => PowerEvent::SuspendPrepare,
            SuspendCommand::Post => PowerEvent::PostSuspend,
        };
        let transition = match self.gate.power_event(event, self.now) {
            SuspendTransition::Disabled => "deep-idle=disabled",
            SuspendTransition::Enabled => "deep-idle=enabled",
            SuspendTransition::Ignored => "ignored",
        };
        vec![format!("OK {event} {transition}")]
    }

    fn screen(&mut self, switch: Switch) -> Vec<String> {
        let changed = self.gate.screen_changed(switch.is_on(), self.now);
        let detail = if switch.is_on() {
            let outcome = self.cluster.screen_on(self.now);
            format!("migration-canceled={}", outcome.canceled_migration)
        } else {
            match self.cluster.screen_off(self.now) {
                Ok(ScreenOffOutcome::Scheduled { due }) => {
                    format!("migration due={}", format_offset(due))
                }
                Ok(ScreenOffOutcome::AlreadyPending { due }) => {
                    format!("migration already-pending due={}", format_offset(due))
                }
                Ok(ScreenOffOutcome::AlreadyLowPower) => "cluster already low-power".to_string(),
                Ok(ScreenOffOutcome::ClusterChanged) => "cluster changed".to_string(),
                Err(err) => return vec![format!("ERR screen {err}")],
            }
        };

        let label = if switch.is_on() { "on" } else { "off" };
        vec![format!("OK screen {label} changed={changed} {detail}")]
    }

    fn idle(&mut self) -> Vec<String> {
        self.idle.clock = self.now;
        let result = self.gate.idle(&mut self.idle);
        self.now = self.now.max(self.idle.clock);

        let mut lines = match result {
            Ok(report) => vec![describe_idle(&report, self.gate.idle_ready_at())],
            Err(err) => vec![format!("ERR idle {err}")],
        };
        lines.extend(self.run_due_work(self.now));
        lines
    }

    fn advance(&mut self, duration: Duration) -> Vec<String> {
        let target = self.now + duration;
        let mut lines = self.run_due_work(target);
        self.now = target;
        lines.push(format!("OK clock={}", format_offset(self.now)));
        lines
    }

    /// Steps through every deadline up to `target` in order.
    fn run_due_work(&mut self, target: VirtualInstant) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(deadline) = self.next_deadline() {
            if deadline > target {
                break;
            }
            self.now = self.now.max(deadline);
            lines.extend(self.service());
        }
        lines
    }

    fn next_deadline(&self) -> Option<VirtualInstant> {
        match (self.gate.next_deadline(), self.cluster.next_deadline()) {
            (Some(left), Some(right)) => Some(left.min(right)),
            (left, right) => left.or(right),
        }
    }

    fn service(&mut self) -> Vec<String> {
        let now = self.now;
        let mut lines = Vec::new();
        let report = self.gate.service(now);
        for transition in &report.fired {
            lines.push(format!(
                "EVT {} {} at={} changed={}",
                transition.flag,
                edge_label(transition.edge),
                format_offset(now),
                transition.changed
            ));
        }
        if report.idle_enabled {
            lines.push(format!("EVT idle enabled at={}", format_offset(now)));
        }

        if let Some(result) = self.cluster.service(now) {
            lines.push(describe_migration(result, now));
        }
        lines
    }

    fn status(&self) -> Vec<String> {
        let snapshot = StatusSnapshot::capture(&self.gate, &self.cluster, self.now);
        let formatter = StatusFormatter::new(&snapshot);
        let mut flags = String::new();
        let mut idle = String::new();
        let mut cluster = String::new();
        let rendered = formatter
            .write_flags_line(&mut flags)
            .and_then(|()| formatter.write_idle_line(&mut idle))
            .and_then(|()| formatter.write_cluster_line(&mut cluster));
        if rendered.is_err() {
            return vec!["ERR status formatting failed".to_string()];
        }

        let platform = self.cluster.platform();
        let _ = write!(
            cluster,
            " online={} auto-hotplug={} single-unit={}",
            platform.online, platform.auto_hotplug, platform.single_unit_requested
        );
        vec![
            format!("OK status clock={}", format_offset(self.now)),
            flags,
            idle,
            cluster,
        ]
    }

    fn describe_schedule(
        &self,
        label: &str,
        result: Result<ScheduleReport<VirtualInstant>, GateError>,
    ) -> String {
        match result {
            Ok(report) => {
                let outcome = match report.outcome {
                    ScheduleOutcome::Applied => "applied".to_string(),
                    ScheduleOutcome::Scheduled { due } => {
                        format!("scheduled due={}", format_offset(due))
                    }
                    ScheduleOutcome::AlreadyPending { due } => {
                        format!("already-pending due={}", format_offset(due))
                    }
                    ScheduleOutcome::Unchanged => "unchanged".to_string(),
                };
                let canceled = if report.canceled_opposite {
                    " canceled-opposite"
                } else {
                    ""
                };
                format!(
                    "OK {label} {} {} {outcome}{canceled}",
                    report.flag,
                    edge_label(report.edge)
                )
            }
            Err(err) => format!("ERR {label} {err}"),
        }
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, self.now, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

fn describe_idle(report: &IdleReport, ready_at: VirtualInstant) -> String {
    match report.outcome {
        IdleOutcome::HeldOff => format!(
            "OK idle held-off planned={} ready={}",
            report.planned,
            format_offset(ready_at)
        ),
        outcome => {
            let anomaly = if report.anomaly { " anomaly" } else { "" };
            format!(
                "OK idle {outcome} planned={} duration={}{anomaly}",
                report.planned,
                format_duration_short(report.duration)
            )
        }
    }
}

fn describe_migration(result: Result<MigrationOutcome, GateError>, now: VirtualInstant) -> String {
    match result {
        Ok(MigrationOutcome::Migrated) => {
            format!("EVT cluster migrated to low-power at={}", format_offset(now))
        }
        Ok(MigrationOutcome::AlreadyLowPower) => {
            format!("EVT cluster already low-power at={}", format_offset(now))
        }
        Err(err) => format!("EVT cluster migration failed at={} ({err})", format_offset(now)),
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some(spec) = catalog::find(target) {
                lines.push(format!("{:<32} - {}", spec.usage, spec.summary));
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for spec in catalog::commands() {
                lines.push(format!("  {:<32} - {}", spec.usage, spec.summary));
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    catalog::commands()
        .iter()
        .map(|spec| spec.name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn edge_label(edge: Edge) -> &'static str {
    match edge {
        Edge::Assert => "assert",
        Edge::Clear => "clear",
    }
}

fn format_offset(instant: VirtualInstant) -> String {
    format!("+{}ms", instant.offset().as_millis())
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() > 0 {
        format!("{:.3}s", duration.as_secs_f64())
    } else if duration.as_millis() > 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{}us", duration.as_micros())
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(profile: TranscriptProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };

        logger.write_header(profile)?;
        Ok(logger)
    }

    fn write_header(&mut self, profile: TranscriptProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Columns: host milliseconds since session start, virtual clock"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        clock: VirtualInstant,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] [{:>10}] {} {}",
            elapsed.as_millis(),
            format_offset(clock),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }

    fn log_completion_request(
        &mut self,
        elapsed: Duration,
        clock: VirtualInstant,
        prefix: &str,
        suffix: &str,
        cursor: usize,
    ) -> io::Result<()> {
        let message = format!("[TAB] prefix={prefix:?} suffix={suffix:?} cursor={cursor}");
        self.append_line(elapsed, clock, TranscriptRole::Host, &message)
    }

    fn log_completion_none(&mut self, elapsed: Duration, clock: VirtualInstant) -> io::Result<()> {
        self.append_line(
            elapsed,
            clock,
            TranscriptRole::Emulator,
            "completion: no matches",
        )
    }

    fn log_completion_applied(
        &mut self,
        elapsed: Duration,
        clock: VirtualInstant,
        replacement: &Replacement,
    ) -> io::Result<()> {
        let message = format!(
            "completion applied: {} (range={}..{})",
            replacement.value, replacement.start, replacement.end
        );
        self.append_line(elapsed, clock, TranscriptRole::Emulator, &message)
    }

    fn log_completion_options(
        &mut self,
        elapsed: Duration,
        clock: VirtualInstant,
        options: &[&'static str],
    ) -> io::Result<()> {
        let summary = format!("completion options ({})", options.len());
        self.append_line(elapsed, clock, TranscriptRole::Emulator, &summary)?;
        for option in options {
            let line = format!("  {option}");
            self.append_line(elapsed, clock, TranscriptRole::Emulator, &line)?;
        }
        Ok(())
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("transcript write failed")
    }

    #[test]
    fn help_lists_every_catalog_command() {
        let lines = help_lines(None);
        assert_eq!(lines.len(), catalog::commands().len() + 2);
        assert!(help_lines(Some("bogus"))[1].contains("advance"));
    }

    #[test]
    fn migration_waits_for_single_unit() {
        let mut session = Session::new(TranscriptProfile::Migration).unwrap();

        run(&mut session, "screen off");
        let lines = run(&mut session, "advance 10s");
        assert!(lines[0].contains("migration failed"), "{lines:?}");
        assert_eq!(session.cluster.cluster_state(), ClusterState::Normal);

        run(&mut session, "cpus 1");
        run(&mut session, "screen off");
        let lines = run(&mut session, "advance 10s");
        assert!(lines[0].contains("migrated to low-power"), "{lines:?}");
        assert_eq!(session.cluster.platform().hotplug_log, vec![(4, true), (0, false)]);
    }

    #[test]
    fn idle_is_held_off_until_startup_delay_passes() {
        let mut session = Session::new(TranscriptProfile::Console).unwrap();

        let lines = run(&mut session, "idle");
        assert!(lines[0].starts_with("OK idle held-off"), "{lines:?}");

        let lines = run(&mut session, "advance 30s");
        assert!(lines.iter().any(|line| line.starts_with("EVT idle enabled")));

        let lines = run(&mut session, "idle");
        assert!(lines[0].starts_with("OK idle entered deep"), "{lines:?}");
    }

    #[test]
    fn syntax_errors_report_usage() {
        let mut session = Session::new(TranscriptProfile::Console).unwrap();
        let lines = run(&mut session, "rail sideways");
        assert!(lines[0].starts_with("ERR syntax"));
        assert!(lines[0].contains("rail need|release"));
    }
}
