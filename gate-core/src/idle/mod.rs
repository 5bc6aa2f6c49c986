//! Idle-depth selection.
//!
//! The selector turns a snapshot of the flag register into one of three idle
//! depths. It first derives the depth from the flags and records it as a force
//! flag, then re-validates urgent conditions with local interrupts masked, and
//! finally commits to whatever the force flags say at that instant.

use core::cell::Cell;
use core::fmt;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use portable_atomic::{AtomicU32, Ordering};

use crate::error::{BackendError, GateError};
use crate::flags::{Flag, FlagRegister, FlagSet};
use crate::telemetry::TelemetryInstant;

/// How deep the CPU may idle. Ordered from shallowest to deepest.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum IdleDepth {
    Shallow,
    Medium,
    Deep,
}

impl IdleDepth {
    pub const fn as_str(self) -> &'static str {
        match self {
            IdleDepth::Shallow => "shallow",
            IdleDepth::Medium => "medium",
            IdleDepth::Deep => "deep",
        }
    }
}

impl fmt::Display for IdleDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgent condition that canceled an idle entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AbortReason {
    InterruptPending,
    RescheduleRequested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::InterruptPending => f.write_str("interrupt pending"),
            AbortReason::RescheduleRequested => f.write_str("reschedule requested"),
        }
    }
}

/// What happened to an idle request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IdleOutcome {
    /// The backend was asked to enter the given depth.
    Entered(IdleDepth),
    /// The urgent re-check found work; no low-power state was entered.
    Aborted(AbortReason),
    /// Idle is still disabled by the startup hold-off.
    HeldOff,
}

impl fmt::Display for IdleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdleOutcome::Entered(depth) => write!(f, "entered {depth}"),
            IdleOutcome::Aborted(reason) => write!(f, "aborted ({reason})"),
            IdleOutcome::HeldOff => f.write_str("held off"),
        }
    }
}

/// Result of one idle episode, kept for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IdleReport {
    /// Depth derived from the flags before the urgent re-check.
    pub planned: IdleDepth,
    pub outcome: IdleOutcome,
    /// Wall-clock time spent between the two clock reads around the entry.
    pub duration: Duration,
    /// `true` when the force flags changed underneath the selector.
    pub anomaly: bool,
}

impl IdleReport {
    /// Depth actually entered, if any.
    pub const fn entered(&self) -> Option<IdleDepth> {
        match self.outcome {
            IdleOutcome::Entered(depth) => Some(depth),
            _ => None,
        }
    }
}

/// Hardware seam for the idle path.
pub trait IdlePlatform {
    type Instant: TelemetryInstant;

    fn now(&mut self) -> Self::Instant;

    /// Masks interrupts on the calling execution unit only.
    fn mask_local_interrupts(&mut self);

    fn unmask_local_interrupts(&mut self);

    /// Returns `true` when an interrupt is latched for this unit.
    fn interrupt_pending(&mut self) -> bool;

    /// Returns `true` when the scheduler wants this unit back.
    fn reschedule_requested(&mut self) -> bool;

    /// Last-moment hardware veto that forces the shallow depth.
    fn deep_idle_vetoed(&mut self) -> bool {
        false
    }

    /// Executes the low-power instruction sequence for `depth`. Returns once
    /// the unit wakes up.
    fn enter_low_power(&mut self, depth: IdleDepth) -> Result<(), BackendError>;
}

/// Derives the idle depth from the condition flags, ignoring the force flags.
pub fn classify(flags: FlagSet) -> IdleDepth {
    if flags.contains(Flag::DisabledBySuspend) {
        IdleDepth::Shallow
    } else if flags.contains(Flag::NeedsFullRail)
        || flags.contains(Flag::ExternalActive)
        || flags.contains(Flag::ScreenOn)
    {
        IdleDepth::Medium
    } else {
        IdleDepth::Deep
    }
}

/// Resolves the force flags by priority: shallow beats medium beats deep.
pub fn resolve_depth(flags: FlagSet) -> IdleDepth {
    if flags.contains(Flag::ForceShallow) {
        IdleDepth::Shallow
    } else if flags.contains(Flag::ForceMedium) {
        IdleDepth::Medium
    } else {
        IdleDepth::Deep
    }
}

/// Force flag that encodes `depth`; deep idle has none.
pub const fn force_flag(depth: IdleDepth) -> Option<Flag> {
    match depth {
        IdleDepth::Shallow => Some(Flag::ForceShallow),
        IdleDepth::Medium => Some(Flag::ForceMedium),
        IdleDepth::Deep => None,
    }
}

/// Chooses and executes idle entries against an [`IdlePlatform`].
pub struct IdleDepthSelector<M>
where
    M: RawMutex,
{
    last: Mutex<M, Cell<Option<IdleReport>>>,
    anomalies: AtomicU32,
}

impl<M> IdleDepthSelector<M>
where
    M: RawMutex,
{
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(Cell::new(None)),
            anomalies: AtomicU32::new(0),
        }
    }

    /// Resets the force flags and re-derives them from the current snapshot.
    pub fn prepare(&self, flags: &FlagRegister) -> IdleDepth {
        flags.clear(Flag::ForceShallow);
        flags.clear(Flag::ForceMedium);

        let planned = classify(flags.snapshot());
        if let Some(force) = force_flag(planned) {
            flags.set(force);
        }
        planned
    }

    /// Runs one idle episode.
    ///
    /// Urgent conditions abort the entry before any low-power state is
    /// touched. A backend failure is returned after interrupts are unmasked
    /// and does not update [`last_report`](Self::last_report).
    pub fn enter<P>(&self, flags: &FlagRegister, platform: &mut P) -> Result<IdleReport, GateError>
    where
        P: IdlePlatform,
    {
        self.enter_observed(flags, platform, |_, _| {})
    }

    /// Like [`enter`](Self::enter), calling `on_anomaly(planned, entered)`
    /// once interrupts are unmasked whenever the force flags disagreed with
    /// the plan. The anomaly is counted and reported even when the backend
    /// entry then fails.
    pub fn enter_observed<P, F>(
        &self,
        flags: &FlagRegister,
        platform: &mut P,
        on_anomaly: F,
    ) -> Result<IdleReport, GateError>
    where
        P: IdlePlatform,
        F: FnOnce(IdleDepth, IdleDepth),
    {
        let planned = self.prepare(flags);

        let started = platform.now();
        platform.mask_local_interrupts();

        let abort = if platform.interrupt_pending() {
            Some(AbortReason::InterruptPending)
        } else if platform.reschedule_requested() {
            Some(AbortReason::RescheduleRequested)
        } else {
            None
        };

        if let Some(reason) = abort {
            platform.unmask_local_interrupts();
            let finished = platform.now();
            return Ok(self.remember(IdleReport {
                planned,
                outcome: IdleOutcome::Aborted(reason),
                duration: finished.saturating_duration_since(started),
                anomaly: false,
            }));
        }

        let resolved = resolve_depth(flags.snapshot());
        let anomaly = resolved != planned;
        let mut depth = if anomaly { IdleDepth::Shallow } else { resolved };
        if platform.deep_idle_vetoed() {
            depth = IdleDepth::Shallow;
        }

        let result = platform.enter_low_power(depth);
        let finished = platform.now();
        platform.unmask_local_interrupts();

        if anomaly {
            self.anomalies.fetch_add(1, Ordering::Relaxed);
            on_anomaly(planned, depth);
        }
        result?;

        Ok(self.remember(IdleReport {
            planned,
            outcome: IdleOutcome::Entered(depth),
            duration: finished.saturating_duration_since(started),
            anomaly,
        }))
    }

    /// Most recent idle report.
    pub fn last_report(&self) -> Option<IdleReport> {
        self.last.lock(Cell::get)
    }

    /// Number of entries whose force flags disagreed with the plan.
    pub fn anomaly_count(&self) -> u32 {
        self.anomalies.load(Ordering::Relaxed)
    }

    pub(crate) fn remember(&self, report: IdleReport) -> IdleReport {
        self.last.lock(|cell| cell.set(Some(report)));
        report
    }
}

impl<M> Default for IdleDepthSelector<M>
where
    M: RawMutex,
{
    fn default() -> Self {
        Self::new()
    }
}
