//! Shared status surface for console front-ends.
//!
//! [`StatusSnapshot::capture`] samples both gates at one instant and
//! [`StatusFormatter`] keeps the textual rendering consistent across targets.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Vec;

use crate::cluster::{ClusterMigrationGate, ClusterPlatform, ClusterState};
use crate::debounce::Edge;
use crate::flags::{ALL_FLAGS, FLAG_COUNT, Flag, FlagSet};
use crate::gate::IdleGate;
use crate::idle::IdleReport;
use crate::telemetry::TelemetryInstant;

/// Debounce transition still waiting to fire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingTransition {
    pub flag: Flag,
    pub edge: Edge,
    pub remaining: Duration,
}

/// Point-in-time view of the gate state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub flags: FlagSet,
    pub pending: Vec<PendingTransition, FLAG_COUNT>,
    pub idle_enabled: bool,
    pub last_idle: Option<IdleReport>,
    pub anomalies: u32,
    pub cluster: ClusterState,
    pub migration_in: Option<Duration>,
}

impl StatusSnapshot {
    /// Samples `gate` and `cluster` at `now`.
    pub fn capture<M, P, I>(
        gate: &IdleGate<M, I>,
        cluster: &ClusterMigrationGate<M, P, I>,
        now: I,
    ) -> Self
    where
        M: RawMutex,
        P: ClusterPlatform,
        I: TelemetryInstant + Ord + Add<Duration, Output = I>,
    {
        let mut pending = Vec::new();
        for flag in ALL_FLAGS {
            if let Some((edge, due)) = gate.pending(flag) {
                let _ = pending.push(PendingTransition {
                    flag,
                    edge,
                    remaining: due.saturating_duration_since(now),
                });
            }
        }

        Self {
            flags: gate.snapshot(),
            pending,
            idle_enabled: gate.idle_enabled_at(now),
            last_idle: gate.last_idle(),
            anomalies: gate.anomaly_count(),
            cluster: cluster.cluster_state(),
            migration_in: cluster
                .pending_migration()
                .map(|due| due.saturating_duration_since(now)),
        }
    }
}

/// Renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the flag line (e.g. `flags screen-on,work-initialized pending=none`).
    pub fn write_flags_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "flags {} pending=", self.snapshot.flags)?;
        if self.snapshot.pending.is_empty() {
            return writer.write_str("none");
        }

        for (index, transition) in self.snapshot.pending.iter().enumerate() {
            if index > 0 {
                writer.write_char(',')?;
            }
            let edge = match transition.edge {
                Edge::Assert => "assert",
                Edge::Clear => "clear",
            };
            write!(writer, "{}:{}", transition.flag, edge)?;
            write_duration(writer, Some(transition.remaining))?;
        }
        Ok(())
    }

    /// Writes the idle line (e.g. `idle enabled=true last=entered deep duration=+750us anomalies=0`).
    pub fn write_idle_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(
            writer,
            "idle enabled={} last=",
            self.snapshot.idle_enabled
        )?;
        match self.snapshot.last_idle {
            Some(report) => {
                write!(writer, "{} planned={} duration=", report.outcome, report.planned)?;
                write_duration(writer, Some(report.duration))?;
            }
            None => writer.write_str("none")?,
        }
        write!(writer, " anomalies={}", self.snapshot.anomalies)
    }

    /// Writes the cluster line (e.g. `cluster state=normal migration=+9.5s`).
    pub fn write_cluster_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "cluster state={} migration=", self.snapshot.cluster)?;
        write_duration(writer, self.snapshot.migration_in)
    }
}

fn write_duration<W: fmt::Write>(writer: &mut W, duration: Option<Duration>) -> fmt::Result {
    match duration {
        None => writer.write_str("n/a"),
        Some(value) if value >= Duration::from_secs(1) => {
            let millis = value.as_millis();
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(value) if value >= Duration::from_millis(1) => {
            write!(writer, "+{}ms", value.as_millis())
        }
        Some(value) => write!(writer, "+{}us", value.as_micros()),
    }
}
