#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;

use gate_core::cluster::{ClusterParameters, ClusterPlatform, ClusterState};
use gate_core::error::BackendError;
use gate_core::idle::{IdleDepth, IdlePlatform};
use gate_core::telemetry::TelemetryInstant;

/// Millisecond-resolution virtual instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub fn ms(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for MockInstant {
    type Output = MockInstant;

    fn add(self, rhs: Duration) -> Self::Output {
        MockInstant(self.0 + rhs.as_millis() as u64)
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Default)]
pub struct MockIdle {
    pub clock: u64,
    pub masked: bool,
    pub irq_pending: bool,
    pub resched: bool,
    pub entries: Vec<IdleDepth>,
    pub sleep_ms: u64,
    pub fail_entry: bool,
}

impl MockIdle {
    pub fn at(clock: u64) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }
}

impl IdlePlatform for MockIdle {
    type Instant = MockInstant;

    fn now(&mut self) -> MockInstant {
        MockInstant(self.clock)
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

    fn enter_low_power(&mut self, depth: IdleDepth) -> Result<(), BackendError> {
        assert!(self.masked, "low-power entry must run with interrupts masked");
        if self.fail_entry {
            return Err(BackendError::EntryFailed);
        }
        self.entries.push(depth);
        self.clock += self.sleep_ms;
        Ok(())
    }
}

pub struct MockCluster {
    pub online: usize,
    pub active: ClusterState,
    pub hotplug_enabled: bool,
    pub single_unit_requested: bool,
    pub parameters: Vec<ClusterParameters>,
    pub reparent_error: Option<i32>,
    pub reparent_calls: usize,
    pub hotplug_log: Vec<(u32, bool)>,
    /// Cluster reported once auto-hotplug is disabled.
    pub switch_on_hotplug_disable: Option<ClusterState>,
}

impl MockCluster {
    pub fn with_online(online: usize) -> Self {
        Self {
            online,
            active: ClusterState::Normal,
            hotplug_enabled: true,
            single_unit_requested: false,
            parameters: Vec::new(),
            reparent_error: None,
            reparent_calls: 0,
            hotplug_log: Vec::new(),
            switch_on_hotplug_disable: None,
        }
    }
}

impl ClusterPlatform for MockCluster {
    fn online_units(&mut self) -> usize {
        self.online
    }

    fn active_cluster(&mut self) -> ClusterState {
        self.active
    }

    fn set_cluster_parameters(&mut self, params: ClusterParameters) {
        self.parameters.push(params);
    }

    fn reparent_cpu_clock(&mut self, target: ClusterState) -> Result<(), BackendError> {
        self.reparent_calls += 1;
        if let Some(code) = self.reparent_error {
            return Err(BackendError::ClockReparent(code));
        }
        self.active = target;
        Ok(())
    }

    fn disable_auto_hotplug(&mut self) {
        self.hotplug_enabled = false;
        if let Some(state) = self.switch_on_hotplug_disable.take() {
            self.active = state;
        }
    }

    fn enable_auto_hotplug(&mut self) {
        self.hotplug_enabled = true;
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
