//! Console logging for gate activity.
//!
//! Each helper has a `defmt` body for the MCU and a `println!` body for host
//! builds so the worker can be exercised by `cargo test`.

use gate_core::cluster::{MigrationOutcome, ScreenOffOutcome};
use gate_core::debounce::{Edge, FiredTransition, ScheduleOutcome, ScheduleReport};
use gate_core::error::{BackendError, GateError};
use gate_core::idle::IdleReport;
use gate_core::suspend::{PowerEvent, SuspendTransition};

use crate::clock::FirmwareInstant;

const fn edge_label(edge: Edge) -> &'static str {
    match edge {
        Edge::Assert => "assert",
        Edge::Clear => "clear",
    }
}

const fn schedule_label<I>(outcome: &ScheduleOutcome<I>) -> &'static str {
    match outcome {
        ScheduleOutcome::Applied => "applied",
        ScheduleOutcome::Scheduled { .. } => "scheduled",
        ScheduleOutcome::AlreadyPending { .. } => "already-pending",
        ScheduleOutcome::Unchanged => "unchanged",
    }
}

const fn transition_label(transition: SuspendTransition) -> &'static str {
    match transition {
        SuspendTransition::Disabled => "deep-idle-disabled",
        SuspendTransition::Enabled => "deep-idle-enabled",
        SuspendTransition::Ignored => "ignored",
    }
}

const fn error_label(error: GateError) -> &'static str {
    match error {
        GateError::PreconditionViolated { .. } => "precondition-violated",
        GateError::BackendFailure(BackendError::ClockReparent(_)) => "clock-reparent-failed",
        GateError::BackendFailure(BackendError::EntryFailed) => "entry-failed",
        GateError::BackendFailure(BackendError::Unsupported) => "unsupported",
        GateError::ShuttingDown => "shutting-down",
        GateError::NotInitialized => "not-initialized",
    }
}

fn error_detail(error: GateError) -> i64 {
    match error {
        GateError::PreconditionViolated { online_units } => {
            i64::try_from(online_units).unwrap_or(i64::MAX)
        }
        GateError::BackendFailure(BackendError::ClockReparent(code)) => i64::from(code),
        _ => 0,
    }
}

fn schedule_due(report: &ScheduleReport<FirmwareInstant>) -> Option<u64> {
    match report.outcome {
        ScheduleOutcome::Scheduled { due } | ScheduleOutcome::AlreadyPending { due } => {
            Some(due.as_micros())
        }
        ScheduleOutcome::Applied | ScheduleOutcome::Unchanged => None,
    }
}

#[cfg(target_os = "none")]
pub fn log_schedule(report: &ScheduleReport<FirmwareInstant>, timestamp: FirmwareInstant) {
    match schedule_due(report) {
        Some(due) => defmt::info!(
            "gate: {} {} {} due={}us canceled-opposite={} t={}us",
            report.flag.name(),
            edge_label(report.edge),
            schedule_label(&report.outcome),
            due,
            report.canceled_opposite,
            timestamp.as_micros()
        ),
        None => defmt::info!(
            "gate: {} {} {} canceled-opposite={} t={}us",
            report.flag.name(),
            edge_label(report.edge),
            schedule_label(&report.outcome),
            report.canceled_opposite,
            timestamp.as_micros()
        ),
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_schedule(report: &ScheduleReport<FirmwareInstant>, timestamp: FirmwareInstant) {
    match schedule_due(report) {
        Some(due) => println!(
            "gate: {} {} {} due={}us canceled-opposite={} t={}us",
            report.flag.name(),
            edge_label(report.edge),
            schedule_label(&report.outcome),
            due,
            report.canceled_opposite,
            timestamp.as_micros()
        ),
        None => println!(
            "gate: {} {} {} canceled-opposite={} t={}us",
            report.flag.name(),
            edge_label(report.edge),
            schedule_label(&report.outcome),
            report.canceled_opposite,
            timestamp.as_micros()
        ),
    }
}

#[cfg(target_os = "none")]
pub fn log_rejected(event: &'static str, error: GateError, timestamp: FirmwareInstant) {
    defmt::warn!(
        "gate: {} rejected ({} {}) t={}us",
        event,
        error_label(error),
        error_detail(error),
        timestamp.as_micros()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_rejected(event: &'static str, error: GateError, timestamp: FirmwareInstant) {
    println!(
        "gate: {} rejected ({} {}) t={}us",
        event,
        error_label(error),
        error_detail(error),
        timestamp.as_micros()
    );
}

#[cfg(target_os = "none")]
pub fn log_fired(transition: &FiredTransition<FirmwareInstant>, timestamp: FirmwareInstant) {
    defmt::info!(
        "gate: {} {} fired changed={} late={}us",
        transition.flag.name(),
        edge_label(transition.edge),
        transition.changed,
        timestamp
            .as_micros()
            .saturating_sub(transition.due.as_micros())
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_fired(transition: &FiredTransition<FirmwareInstant>, timestamp: FirmwareInstant) {
    println!(
        "gate: {} {} fired changed={} late={}us",
        transition.flag.name(),
        edge_label(transition.edge),
        transition.changed,
        timestamp
            .as_micros()
            .saturating_sub(transition.due.as_micros())
    );
}

#[cfg(target_os = "none")]
pub fn log_idle_enabled(timestamp: FirmwareInstant) {
    defmt::info!("idle: startup hold-off released t={}us", timestamp.as_micros());
}

#[cfg(not(target_os = "none"))]
pub fn log_idle_enabled(timestamp: FirmwareInstant) {
    println!("idle: startup hold-off released t={}us", timestamp.as_micros());
}

#[cfg(target_os = "none")]
pub fn log_idle_anomaly(report: &IdleReport) {
    defmt::warn!(
        "idle: flags changed under mask, planned={} fell back to shallow",
        report.planned.as_str()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_idle_anomaly(report: &IdleReport) {
    println!(
        "idle: flags changed under mask, planned={} fell back to shallow",
        report.planned.as_str()
    );
}

#[cfg(target_os = "none")]
pub fn log_power_event(
    event: PowerEvent,
    transition: SuspendTransition,
    timestamp: FirmwareInstant,
) {
    defmt::info!(
        "suspend: {} -> {} t={}us",
        event.as_str(),
        transition_label(transition),
        timestamp.as_micros()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_power_event(
    event: PowerEvent,
    transition: SuspendTransition,
    timestamp: FirmwareInstant,
) {
    println!(
        "suspend: {} -> {} t={}us",
        event.as_str(),
        transition_label(transition),
        timestamp.as_micros()
    );
}

#[cfg(target_os = "none")]
pub fn log_screen_off(outcome: ScreenOffOutcome<FirmwareInstant>, timestamp: FirmwareInstant) {
    match outcome {
        ScreenOffOutcome::Scheduled { due } | ScreenOffOutcome::AlreadyPending { due } => {
            defmt::info!(
                "cluster: migration due={}us t={}us",
                due.as_micros(),
                timestamp.as_micros()
            );
        }
        ScreenOffOutcome::AlreadyLowPower => {
            defmt::info!("cluster: already low-power t={}us", timestamp.as_micros());
        }
        ScreenOffOutcome::ClusterChanged => {
            defmt::warn!(
                "cluster: active cluster changed during screen-off t={}us",
                timestamp.as_micros()
            );
        }
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_screen_off(outcome: ScreenOffOutcome<FirmwareInstant>, timestamp: FirmwareInstant) {
    match outcome {
        ScreenOffOutcome::Scheduled { due } | ScreenOffOutcome::AlreadyPending { due } => {
            println!(
                "cluster: migration due={}us t={}us",
                due.as_micros(),
                timestamp.as_micros()
            );
        }
        ScreenOffOutcome::AlreadyLowPower => {
            println!("cluster: already low-power t={}us", timestamp.as_micros());
        }
        ScreenOffOutcome::ClusterChanged => {
            println!(
                "cluster: active cluster changed during screen-off t={}us",
                timestamp.as_micros()
            );
        }
    }
}

#[cfg(target_os = "none")]
pub fn log_screen_on(canceled_migration: bool, timestamp: FirmwareInstant) {
    defmt::info!(
        "cluster: screen on canceled-migration={} t={}us",
        canceled_migration,
        timestamp.as_micros()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_screen_on(canceled_migration: bool, timestamp: FirmwareInstant) {
    println!(
        "cluster: screen on canceled-migration={} t={}us",
        canceled_migration,
        timestamp.as_micros()
    );
}

#[cfg(target_os = "none")]
pub fn log_migration(result: Result<MigrationOutcome, GateError>, timestamp: FirmwareInstant) {
    match result {
        Ok(MigrationOutcome::Migrated) => {
            defmt::info!("cluster: migrated to low-power t={}us", timestamp.as_micros());
        }
        Ok(MigrationOutcome::AlreadyLowPower) => {
            defmt::info!("cluster: already low-power t={}us", timestamp.as_micros());
        }
        Err(error) => defmt::warn!(
            "cluster: migration failed ({} {}) t={}us",
            error_label(error),
            error_detail(error),
            timestamp.as_micros()
        ),
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_migration(result: Result<MigrationOutcome, GateError>, timestamp: FirmwareInstant) {
    match result {
        Ok(MigrationOutcome::Migrated) => {
            println!("cluster: migrated to low-power t={}us", timestamp.as_micros());
        }
        Ok(MigrationOutcome::AlreadyLowPower) => {
            println!("cluster: already low-power t={}us", timestamp.as_micros());
        }
        Err(error) => println!(
            "cluster: migration failed ({} {}) t={}us",
            error_label(error),
            error_detail(error),
            timestamp.as_micros()
        ),
    }
}

#[cfg(target_os = "none")]
pub fn log_teardown(canceled: usize, timestamp: FirmwareInstant) {
    defmt::warn!(
        "gate: teardown canceled {} timers t={}us",
        canceled,
        timestamp.as_micros()
    );
}

#[cfg(not(target_os = "none"))]
pub fn log_teardown(canceled: usize, timestamp: FirmwareInstant) {
    println!(
        "gate: teardown canceled {} timers t={}us",
        canceled,
        timestamp.as_micros()
    );
}
