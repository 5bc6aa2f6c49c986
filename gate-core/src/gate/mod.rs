//! The idle gate: flag register, debounce timers, suspend coordinator, and the
//! idle-depth selector wired together behind one shared handle.
//!
//! Producers call the `&self` methods from any context. The deferred-work
//! context polls [`IdleGate::next_deadline`] and calls [`IdleGate::service`];
//! the idle path calls [`IdleGate::idle`].

use core::cell::RefCell;
use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use heapless::Vec;
use portable_atomic::{AtomicBool, Ordering};

use crate::config::GateConfig;
use crate::debounce::{DebounceBank, Edge, FiredTransition, ScheduleReport};
use crate::error::GateError;
use crate::flags::{FLAG_COUNT, Flag, FlagRegister, FlagSet};
use crate::idle::{IdleDepthSelector, IdleOutcome, IdlePlatform, IdleReport, classify};
use crate::suspend::{PowerEvent, SuspendCoordinator, SuspendTransition};
use crate::telemetry::{TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder};

/// Work performed by one [`IdleGate::service`] call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServiceReport<I> {
    pub fired: Vec<FiredTransition<I>, FLAG_COUNT>,
    /// `true` when this call ended the startup hold-off.
    pub idle_enabled: bool,
}

impl<I> ServiceReport<I> {
    pub fn is_empty(&self) -> bool {
        self.fired.is_empty() && !self.idle_enabled
    }
}

/// Shared power gate handle.
pub struct IdleGate<M, I>
where
    M: RawMutex,
    I: TelemetryInstant,
{
    config: GateConfig,
    flags: FlagRegister,
    debounce: DebounceBank<M, I>,
    selector: IdleDepthSelector<M>,
    suspend: SuspendCoordinator,
    idle_ready_at: I,
    hold_off_released: AtomicBool,
    telemetry: Mutex<M, RefCell<TelemetryRecorder<I>>>,
}

impl<M, I> IdleGate<M, I>
where
    M: RawMutex,
    I: TelemetryInstant + Ord + Add<Duration, Output = I>,
{
    /// Creates the gate with every condition flag clear and the debounce
    /// machinery ready. Idle stays held off until `now + startup_hold_off`.
    pub fn new(config: GateConfig, now: I) -> Self {
        let flags = FlagRegister::new();
        flags.set(Flag::WorkInitialized);

        let hold_off = config.startup_hold_off();
        Self {
            config,
            flags,
            debounce: DebounceBank::new(),
            selector: IdleDepthSelector::new(),
            suspend: SuspendCoordinator::new(),
            idle_ready_at: now + hold_off,
            hold_off_released: AtomicBool::new(hold_off.is_zero()),
            telemetry: Mutex::new(RefCell::new(TelemetryRecorder::new())),
        }
    }

    /// An external block became active. Cancels a pending inactive clear.
    pub fn external_active(&self, now: I) -> Result<ScheduleReport<I>, GateError> {
        let report = self
            .debounce
            .assert(&self.flags, Flag::ExternalActive, Duration::ZERO, now)?;
        self.note_schedule(&report, now);
        Ok(report)
    }

    /// An external block went quiet. `ExternalActive` clears after `delay`
    /// (or the configured default) unless activity resumes first.
    pub fn external_inactive(
        &self,
        now: I,
        delay: Option<Duration>,
    ) -> Result<ScheduleReport<I>, GateError> {
        let delay = delay.unwrap_or(self.config.external_inactive_delay());
        let report = self
            .debounce
            .clear(&self.flags, Flag::ExternalActive, delay, now)?;
        self.note_schedule(&report, now);
        Ok(report)
    }

    /// A consumer needs the full power rail. Cancels a pending release.
    pub fn needs_full_rail(&self, now: I) -> Result<ScheduleReport<I>, GateError> {
        let report = self
            .debounce
            .assert(&self.flags, Flag::NeedsFullRail, Duration::ZERO, now)?;
        self.note_schedule(&report, now);
        Ok(report)
    }

    /// The full-rail consumer is done. `NeedsFullRail` clears after `delay`
    /// (or the configured default) unless it is needed again first.
    pub fn release_full_rail(
        &self,
        now: I,
        delay: Option<Duration>,
    ) -> Result<ScheduleReport<I>, GateError> {
        let delay = delay.unwrap_or(self.config.full_rail_release_delay());
        let report = self
            .debounce
            .clear(&self.flags, Flag::NeedsFullRail, delay, now)?;
        self.note_schedule(&report, now);
        Ok(report)
    }

    /// Mirrors the display state. Returns `true` when the flag changed.
    pub fn screen_changed(&self, on: bool, now: I) -> bool {
        let changed = self.flags.assign(Flag::ScreenOn, on);
        if changed {
            let edge = if on { Edge::Assert } else { Edge::Clear };
            self.with_recorder(|recorder| {
                recorder.record_flag_transition(Flag::ScreenOn, edge, false, now);
            });
        }
        changed
    }

    /// Forwards a power-management notification.
    pub fn power_event(&self, event: PowerEvent, now: I) -> SuspendTransition {
        let transition = self.suspend.notify(&self.flags, event);
        let kind = match transition {
            SuspendTransition::Disabled => Some(TelemetryEventKind::SuspendEntered),
            SuspendTransition::Enabled => Some(TelemetryEventKind::SuspendExited),
            SuspendTransition::Ignored => None,
        };
        if let Some(kind) = kind {
            self.with_recorder(|recorder| {
                recorder.record(kind, TelemetryPayload::none(), now);
            });
        }
        transition
    }

    /// Runs one idle episode on the calling execution unit.
    pub fn idle<P>(&self, platform: &mut P) -> Result<IdleReport, GateError>
    where
        P: IdlePlatform<Instant = I>,
    {
        let now = platform.now();
        if !self.idle_enabled_at(now) {
            return Ok(self.selector.remember(IdleReport {
                planned: classify(self.flags.snapshot()),
                outcome: IdleOutcome::HeldOff,
                duration: Duration::ZERO,
                anomaly: false,
            }));
        }

        self.selector
            .enter_observed(&self.flags, platform, |planned, entered| {
                self.with_recorder(|recorder| {
                    recorder.record_idle_anomaly(planned, entered, now);
                });
            })
    }

    /// Applies expired debounce transitions and ends the startup hold-off
    /// once its deadline passed.
    pub fn service(&self, now: I) -> ServiceReport<I> {
        let fired = self.debounce.service(&self.flags, now);
        let idle_enabled = now >= self.idle_ready_at
            && !self.hold_off_released.swap(true, Ordering::AcqRel);

        self.with_recorder(|recorder| {
            for transition in fired.iter().filter(|transition| transition.changed) {
                recorder.record_flag_transition(transition.flag, transition.edge, true, now);
            }
            if idle_enabled {
                recorder.record(TelemetryEventKind::IdleEnabled, TelemetryPayload::none(), now);
            }
        });

        ServiceReport {
            fired,
            idle_enabled,
        }
    }

    /// Earliest instant at which [`service`](Self::service) has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let debounce = self.debounce.next_deadline();
        let hold_off = if self.hold_off_released.load(Ordering::Acquire) {
            None
        } else {
            Some(self.idle_ready_at)
        };

        match (debounce, hold_off) {
            (Some(left), Some(right)) => Some(left.min(right)),
            (left, right) => left.or(right),
        }
    }

    /// Cancels every pending debounce timer and rejects new requests.
    pub fn shutdown(&self, now: I) -> usize {
        let canceled = self.debounce.shutdown(&self.flags);
        self.with_recorder(|recorder| {
            recorder.record(TelemetryEventKind::Teardown, TelemetryPayload::none(), now);
        });
        canceled
    }

    /// Cancels a pending debounce transition for `flag`.
    pub fn cancel(&self, flag: Flag) -> bool {
        self.debounce.cancel(&self.flags, flag)
    }

    pub fn pending(&self, flag: Flag) -> Option<(Edge, I)> {
        self.debounce.pending(flag)
    }

    pub fn snapshot(&self) -> FlagSet {
        self.flags.snapshot()
    }

    pub fn flags(&self) -> &FlagRegister {
        &self.flags
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn last_idle(&self) -> Option<IdleReport> {
        self.selector.last_report()
    }

    pub fn anomaly_count(&self) -> u32 {
        self.selector.anomaly_count()
    }

    pub fn idle_ready_at(&self) -> I {
        self.idle_ready_at
    }

    /// Returns `true` once idle may be entered at `now`.
    pub fn idle_enabled_at(&self, now: I) -> bool {
        self.hold_off_released.load(Ordering::Acquire) || now >= self.idle_ready_at
    }

    /// Runs `f` with shared access to the telemetry ring.
    pub fn with_telemetry<R>(&self, f: impl FnOnce(&TelemetryRecorder<I>) -> R) -> R {
        self.telemetry.lock(|cell| f(&cell.borrow()))
    }

    fn with_recorder(&self, f: impl FnOnce(&mut TelemetryRecorder<I>)) {
        self.telemetry.lock(|cell| f(&mut cell.borrow_mut()));
    }

    fn note_schedule(&self, report: &ScheduleReport<I>, now: I) {
        if report.applied() {
            self.with_recorder(|recorder| {
                recorder.record_flag_transition(report.flag, report.edge, false, now);
            });
        }
    }
}
