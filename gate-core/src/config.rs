//! Tunables shared by the idle gate and the cluster migration gate.

use core::time::Duration;

/// Delay applied before an external-inactive request clears `ExternalActive`.
pub const DEFAULT_EXTERNAL_INACTIVE_DELAY: Duration = Duration::from_millis(500);

/// Delay applied before a full-rail release clears `NeedsFullRail`.
pub const DEFAULT_FULL_RAIL_RELEASE_DELAY: Duration = Duration::from_millis(500);

/// Grace period between screen-off and the low-power cluster switch.
pub const DEFAULT_MIGRATION_DELAY: Duration = Duration::from_secs(10);

/// CPU idle stays disabled for this long after initialization.
pub const DEFAULT_STARTUP_HOLD_OFF: Duration = Duration::from_secs(30);

/// Logical id reported for the low-power unit in hotplug accounting.
pub const DEFAULT_LOW_POWER_UNIT: u32 = 4;

/// Configuration consumed by [`IdleGate`](crate::gate::IdleGate) and
/// [`ClusterMigrationGate`](crate::cluster::ClusterMigrationGate).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GateConfig {
    external_inactive_delay: Duration,
    full_rail_release_delay: Duration,
    migration_delay: Duration,
    startup_hold_off: Duration,
    low_power_unit: u32,
}

impl GateConfig {
    /// Creates a configuration populated with the default tunables.
    pub const fn new() -> Self {
        Self {
            external_inactive_delay: DEFAULT_EXTERNAL_INACTIVE_DELAY,
            full_rail_release_delay: DEFAULT_FULL_RAIL_RELEASE_DELAY,
            migration_delay: DEFAULT_MIGRATION_DELAY,
            startup_hold_off: DEFAULT_STARTUP_HOLD_OFF,
            low_power_unit: DEFAULT_LOW_POWER_UNIT,
        }
    }

    /// Overrides the default external-inactive debounce delay.
    #[must_use]
    pub const fn with_external_inactive_delay(mut self, delay: Duration) -> Self {
        self.external_inactive_delay = delay;
        self
    }

    /// Overrides the default full-rail release debounce delay.
    #[must_use]
    pub const fn with_full_rail_release_delay(mut self, delay: Duration) -> Self {
        self.full_rail_release_delay = delay;
        self
    }

    /// Overrides the screen-off to cluster-switch delay.
    #[must_use]
    pub const fn with_migration_delay(mut self, delay: Duration) -> Self {
        self.migration_delay = delay;
        self
    }

    /// Overrides the startup idle hold-off. Zero enables idle immediately.
    #[must_use]
    pub const fn with_startup_hold_off(mut self, hold_off: Duration) -> Self {
        self.startup_hold_off = hold_off;
        self
    }

    /// Overrides the logical id recorded for the low-power unit.
    #[must_use]
    pub const fn with_low_power_unit(mut self, unit: u32) -> Self {
        self.low_power_unit = unit;
        self
    }

    pub const fn external_inactive_delay(&self) -> Duration {
        self.external_inactive_delay
    }

    pub const fn full_rail_release_delay(&self) -> Duration {
        self.full_rail_release_delay
    }

    pub const fn migration_delay(&self) -> Duration {
        self.migration_delay
    }

    pub const fn startup_hold_off(&self) -> Duration {
        self.startup_hold_off
    }

    pub const fn low_power_unit(&self) -> u32 {
        self.low_power_unit
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::new()
    }
}
