//! Low-power cluster migration gate.
//!
//! Screen-off arms a delayed switch to the low-power cluster; screen-on
//! cancels it. The switch itself is only attempted with exactly one execution
//! unit online and re-checks the active cluster before touching the clock.
//! The gate owns its platform and is driven through `&mut self` from the
//! single deferred-work context, so a cancel from screen-on can never overlap
//! a migration in flight.

use core::cell::Cell;
use core::fmt;
use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

use crate::config::GateConfig;
use crate::debounce::{DebounceTimer, Edge};
use crate::error::{BackendError, GateError};
use crate::telemetry::{
    MigrationTelemetry, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
};

/// Which core cluster is executing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClusterState {
    Normal,
    LowPower,
}

impl ClusterState {
    pub const fn as_str(self) -> &'static str {
        match self {
            ClusterState::Normal => "normal",
            ClusterState::LowPower => "low-power",
        }
    }
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Switch request written to the cluster controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ClusterParameters {
    pub target: ClusterState,
    pub switch_delay_us: u32,
}

impl ClusterParameters {
    /// Immediate switch to `target`.
    pub const fn select(target: ClusterState) -> Self {
        Self {
            target,
            switch_delay_us: 0,
        }
    }
}

/// Hardware seam for cluster switching and hotplug bookkeeping.
pub trait ClusterPlatform {
    fn online_units(&mut self) -> usize;

    fn active_cluster(&mut self) -> ClusterState;

    fn set_cluster_parameters(&mut self, params: ClusterParameters);

    /// Moves the CPU clock onto the clock that feeds `target`.
    fn reparent_cpu_clock(&mut self, target: ClusterState) -> Result<(), BackendError>;

    fn disable_auto_hotplug(&mut self);

    fn enable_auto_hotplug(&mut self);

    /// Takes a quality-of-service request limiting the system to one unit.
    fn request_single_unit(&mut self);

    fn release_single_unit(&mut self);

    /// Updates hotplug statistics for logical `unit`.
    fn record_hotplug(&mut self, unit: u32, online: bool);
}

/// Result of a screen-off notification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScreenOffOutcome<I> {
    Scheduled { due: I },
    AlreadyPending { due: I },
    AlreadyLowPower,
    /// The active cluster changed while auto-hotplug was being disabled.
    ClusterChanged,
}

/// Result of a screen-on notification.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScreenOnOutcome {
    pub canceled_migration: bool,
}

/// Successful migration attempt.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MigrationOutcome {
    Migrated,
    AlreadyLowPower,
}

/// Debounced switch to the low-power cluster.
pub struct ClusterMigrationGate<M, P, I>
where
    M: RawMutex,
    I: TelemetryInstant,
{
    platform: P,
    migration_delay: Duration,
    low_power_unit: u32,
    params: Mutex<M, Cell<Option<ClusterParameters>>>,
    timer: DebounceTimer<I>,
    state: ClusterState,
    single_unit_held: bool,
    shutting_down: bool,
    telemetry: TelemetryRecorder<I>,
}

impl<M, P, I> ClusterMigrationGate<M, P, I>
where
    M: RawMutex,
    P: ClusterPlatform,
    I: TelemetryInstant + Ord + Add<Duration, Output = I>,
{
    pub fn new(config: GateConfig, mut platform: P) -> Self {
        let state = platform.active_cluster();
        Self {
            platform,
            migration_delay: config.migration_delay(),
            low_power_unit: config.low_power_unit(),
            params: Mutex::new(Cell::new(None)),
            timer: DebounceTimer::new(),
            state,
            single_unit_held: false,
            shutting_down: false,
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Handles the display turning off.
    pub fn screen_off(&mut self, now: I) -> Result<ScreenOffOutcome<I>, GateError> {
        if self.shutting_down {
            return Err(GateError::ShuttingDown);
        }

        if !self.single_unit_held {
            self.platform.request_single_unit();
            self.single_unit_held = true;
        }

        if self.platform.active_cluster() == ClusterState::LowPower {
            self.platform.disable_auto_hotplug();
            self.state = ClusterState::LowPower;
            if self.platform.active_cluster() != ClusterState::LowPower {
                self.state = ClusterState::Normal;
                return Ok(ScreenOffOutcome::ClusterChanged);
            }
            return Ok(ScreenOffOutcome::AlreadyLowPower);
        }

        if let Some((_, due)) = self.timer.pending() {
            return Ok(ScreenOffOutcome::AlreadyPending { due });
        }

        let due = now + self.migration_delay;
        self.timer.arm(Edge::Assert, due);
        let online = self.platform.online_units();
        self.telemetry.record_migration(
            TelemetryEventKind::MigrationScheduled,
            MigrationTelemetry::new(online).with_delay(self.migration_delay),
            now,
        );
        Ok(ScreenOffOutcome::Scheduled { due })
    }

    /// Handles the display turning on. The pending migration is canceled
    /// before this returns.
    pub fn screen_on(&mut self, now: I) -> ScreenOnOutcome {
        let canceled_migration = self.timer.cancel();
        if canceled_migration {
            let online = self.platform.online_units();
            self.telemetry.record_migration(
                TelemetryEventKind::MigrationCanceled,
                MigrationTelemetry::new(online),
                now,
            );
        }

        if self.single_unit_held {
            self.platform.release_single_unit();
            self.single_unit_held = false;
        }
        self.platform.enable_auto_hotplug();
        self.state = self.platform.active_cluster();

        ScreenOnOutcome { canceled_migration }
    }

    /// Runs the pending migration once its deadline passed.
    pub fn service(&mut self, now: I) -> Option<Result<MigrationOutcome, GateError>> {
        if self.shutting_down {
            return None;
        }
        self.timer.expire(now)?;
        Some(self.migrate_to_low_power(now))
    }

    /// Switches execution to the low-power cluster.
    ///
    /// Refuses unless exactly one unit is online. A clock reparent failure
    /// leaves the cluster state and hotplug statistics untouched.
    pub fn migrate_to_low_power(&mut self, now: I) -> Result<MigrationOutcome, GateError> {
        let online = self.platform.online_units();
        if online != 1 {
            self.telemetry.record_migration(
                TelemetryEventKind::MigrationRefused,
                MigrationTelemetry::new(online),
                now,
            );
            return Err(GateError::PreconditionViolated {
                online_units: online,
            });
        }

        self.platform.disable_auto_hotplug();

        if self.platform.active_cluster() == ClusterState::LowPower {
            self.state = ClusterState::LowPower;
            return Ok(MigrationOutcome::AlreadyLowPower);
        }

        let params = ClusterParameters::select(ClusterState::LowPower);
        let platform = &mut self.platform;
        self.params.lock(|cell| {
            platform.set_cluster_parameters(params);
            cell.set(Some(params));
        });

        if let Err(err) = self.platform.reparent_cpu_clock(ClusterState::LowPower) {
            let mut details = MigrationTelemetry::new(online);
            if let BackendError::ClockReparent(code) = err {
                details = details.with_error_code(code);
            }
            self.telemetry
                .record_migration(TelemetryEventKind::MigrationFailed, details, now);
            return Err(err.into());
        }

        self.platform.record_hotplug(self.low_power_unit, true);
        self.platform.record_hotplug(0, false);
        self.state = ClusterState::LowPower;
        self.telemetry.record_migration(
            TelemetryEventKind::MigrationCompleted,
            MigrationTelemetry::new(online),
            now,
        );

        Ok(MigrationOutcome::Migrated)
    }

    /// Cancels any pending migration and rejects further screen-off requests.
    pub fn shutdown(&mut self, now: I) -> bool {
        self.shutting_down = true;
        let canceled = self.timer.cancel();
        self.telemetry
            .record(TelemetryEventKind::Teardown, TelemetryPayload::none(), now);
        canceled
    }

    pub fn cluster_state(&self) -> ClusterState {
        self.state
    }

    pub fn pending_migration(&self) -> Option<I> {
        self.timer.pending().map(|(_, due)| due)
    }

    pub fn next_deadline(&self) -> Option<I> {
        if self.shutting_down {
            None
        } else {
            self.pending_migration()
        }
    }

    /// Last parameters written to the cluster controller.
    pub fn last_parameters(&self) -> Option<ClusterParameters> {
        self.params.lock(Cell::get)
    }

    pub fn single_unit_held(&self) -> bool {
        self.single_unit_held
    }

    pub fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }
}
