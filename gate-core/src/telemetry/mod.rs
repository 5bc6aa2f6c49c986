//! Telemetry event catalog and ring buffer shared by firmware and host targets.
//!
//! The core never logs. Flag transitions, suspend notifications, idle
//! anomalies, and cluster migration milestones are recorded here as compact
//! typed events; the firmware and the emulator decide how to surface them.

use core::{convert::TryFrom, fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::debounce::Edge;
use crate::flags::Flag;
use crate::idle::IdleDepth;

/// Monotonic identifier assigned to each recorded event.
pub type EventId = u32;

/// Discriminated telemetry events recorded by the gate components.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    FlagAsserted(Flag),
    FlagCleared(Flag),
    SuspendEntered,
    SuspendExited,
    IdleAnomaly,
    IdleEnabled,
    MigrationScheduled,
    MigrationCanceled,
    MigrationCompleted,
    MigrationRefused,
    MigrationFailed,
    Teardown,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::FlagAsserted(flag) => write!(f, "flag-asserted {flag}"),
            TelemetryEventKind::FlagCleared(flag) => write!(f, "flag-cleared {flag}"),
            TelemetryEventKind::SuspendEntered => f.write_str("suspend-entered"),
            TelemetryEventKind::SuspendExited => f.write_str("suspend-exited"),
            TelemetryEventKind::IdleAnomaly => f.write_str("idle-anomaly"),
            TelemetryEventKind::IdleEnabled => f.write_str("idle-enabled"),
            TelemetryEventKind::MigrationScheduled => f.write_str("migration-scheduled"),
            TelemetryEventKind::MigrationCanceled => f.write_str("migration-canceled"),
            TelemetryEventKind::MigrationCompleted => f.write_str("migration-completed"),
            TelemetryEventKind::MigrationRefused => f.write_str("migration-refused"),
            TelemetryEventKind::MigrationFailed => f.write_str("migration-failed"),
            TelemetryEventKind::Teardown => f.write_str("teardown"),
        }
    }
}

impl TelemetryEventKind {
    /// Builds the flag event matching a transition edge.
    #[must_use]
    pub const fn for_edge(flag: Flag, edge: Edge) -> Self {
        match edge {
            Edge::Assert => TelemetryEventKind::FlagAsserted(flag),
            Edge::Clear => TelemetryEventKind::FlagCleared(flag),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Flag transition details.
    Flag(FlagTelemetry),
    /// Idle entry whose force flags disagreed with the planned depth.
    Idle(IdleTelemetry),
    /// Cluster migration milestone.
    Migration(MigrationTelemetry),
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Flag transition payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FlagTelemetry {
    /// `true` when the transition fired from a debounce timer.
    pub debounced: bool,
    pub elapsed_since_previous: Option<Duration>,
}

/// Idle anomaly payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdleTelemetry {
    pub planned: IdleDepth,
    pub entered: IdleDepth,
}

/// Cluster migration payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MigrationTelemetry {
    pub online_units: u8,
    pub delay: Option<Duration>,
    pub error_code: Option<i32>,
}

impl MigrationTelemetry {
    #[must_use]
    pub fn new(online_units: usize) -> Self {
        Self {
            online_units: truncate_units(online_units),
            delay: None,
            error_code: None,
        }
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub const fn with_error_code(mut self, code: i32) -> Self {
        self.error_code = Some(code);
        self
    }
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_flag_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_flag_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a flag transition and captures elapsed time since the previous one.
    pub fn record_flag_transition(
        &mut self,
        flag: Flag,
        edge: Edge,
        debounced: bool,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = self
            .last_flag_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_flag_transition_at = Some(timestamp);

        self.record(
            TelemetryEventKind::for_edge(flag, edge),
            TelemetryPayload::Flag(FlagTelemetry {
                debounced,
                elapsed_since_previous: elapsed,
            }),
            timestamp,
        )
    }

    /// Records an idle entry that fell back to a shallower depth.
    pub fn record_idle_anomaly(
        &mut self,
        planned: IdleDepth,
        entered: IdleDepth,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::IdleAnomaly,
            TelemetryPayload::Idle(IdleTelemetry { planned, entered }),
            timestamp,
        )
    }

    /// Records a cluster migration milestone.
    pub fn record_migration(
        &mut self,
        event: TelemetryEventKind,
        details: MigrationTelemetry,
        timestamp: TInstant,
    ) -> EventId {
        self.record(event, TelemetryPayload::Migration(details), timestamp)
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_units(count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
    struct MicrosInstant(u64);

    impl TelemetryInstant for MicrosInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_micros(self.0.saturating_sub(earlier.0))
        }
    }

    #[test]
    fn records_elapsed_between_flag_transitions() {
        let mut recorder = TelemetryRecorder::<MicrosInstant>::new();

        let first = recorder.record_flag_transition(
            Flag::ExternalActive,
            Edge::Assert,
            false,
            MicrosInstant(100),
        );
        assert_eq!(first, 0);
        match recorder.latest().copied().unwrap().details {
            TelemetryPayload::Flag(details) => {
                assert_eq!(details.elapsed_since_previous, None);
                assert!(!details.debounced);
            }
            _ => panic!("expected flag payload"),
        }

        let second = recorder.record_flag_transition(
            Flag::ExternalActive,
            Edge::Clear,
            true,
            MicrosInstant(600),
        );
        assert_eq!(second, 1);
        let record = recorder.latest().copied().unwrap();
        assert_eq!(
            record.event,
            TelemetryEventKind::FlagCleared(Flag::ExternalActive)
        );
        match record.details {
            TelemetryPayload::Flag(details) => {
                let elapsed = details.elapsed_since_previous.expect("missing elapsed");
                assert_eq!(elapsed.as_micros(), 500);
                assert!(details.debounced);
            }
            _ => panic!("expected flag payload"),
        }
    }

    #[test]
    fn migration_payload_truncates_unit_count() {
        let details = MigrationTelemetry::new(300).with_error_code(-22);
        assert_eq!(details.online_units, u8::MAX);
        assert_eq!(details.error_code, Some(-22));
    }

    #[test]
    fn ring_keeps_most_recent_entries() {
        let mut recorder = TelemetryRecorder::<MicrosInstant, 4>::new();
        for tick in 0..6 {
            recorder.record(
                TelemetryEventKind::IdleEnabled,
                TelemetryPayload::none(),
                MicrosInstant(tick),
            );
        }

        assert_eq!(recorder.len(), 4);
        let first = recorder.oldest_first().next().copied().unwrap();
        assert_eq!(first.timestamp, MicrosInstant(2));
        assert_eq!(first.id, 2);
    }
}
