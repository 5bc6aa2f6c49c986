//! Hardware adapters for the gate traits.
//!
//! The STM32G0 has a single core, so [`SingleClusterPlatform`] reports one
//! unit online and tracks the selected cluster clock in software. On the MCU,
//! [`CortexIdle`] drives `WFI` with PRIMASK set so a pending interrupt still
//! wakes the core.

use gate_core::cluster::{ClusterParameters, ClusterPlatform, ClusterState};
use gate_core::error::BackendError;

/// Cluster backend for a single-core part.
#[derive(Debug)]
pub struct SingleClusterPlatform {
    active: ClusterState,
    auto_hotplug: bool,
    single_unit_requested: bool,
    last_parameters: Option<ClusterParameters>,
    hotplug_events: u32,
}

impl SingleClusterPlatform {
    pub const fn new() -> Self {
        Self {
            active: ClusterState::Normal,
            auto_hotplug: true,
            single_unit_requested: false,
            last_parameters: None,
            hotplug_events: 0,
        }
    }

    pub fn auto_hotplug(&self) -> bool {
        self.auto_hotplug
    }

    pub fn single_unit_requested(&self) -> bool {
        self.single_unit_requested
    }

    pub fn last_parameters(&self) -> Option<ClusterParameters> {
        self.last_parameters
    }

    pub fn hotplug_events(&self) -> u32 {
        self.hotplug_events
    }
}

impl Default for SingleClusterPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterPlatform for SingleClusterPlatform {
    fn online_units(&mut self) -> usize {
        1
    }

    fn active_cluster(&mut self) -> ClusterState {
        self.active
    }

    fn set_cluster_parameters(&mut self, params: ClusterParameters) {
        self.last_parameters = Some(params);
    }

    fn reparent_cpu_clock(&mut self, target: ClusterState) -> Result<(), BackendError> {
        match self.last_parameters {
            Some(params) if params.target == target => {
                self.active = target;
                Ok(())
            }
            _ => Err(BackendError::ClockReparent(-22)),
        }
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

    fn record_hotplug(&mut self, _unit: u32, _online: bool) {
        self.hotplug_events = self.hotplug_events.wrapping_add(1);
    }
}

#[cfg(target_os = "none")]
pub use cortex::CortexIdle;

#[cfg(target_os = "none")]
mod cortex {
    use cortex_m::peripheral::SCB;
    use gate_core::error::BackendError;
    use gate_core::idle::{IdleDepth, IdlePlatform};

    use crate::clock::FirmwareInstant;
    use crate::events;

    /// ICSR.ISRPENDING: an external interrupt is pending.
    const ICSR_ISRPENDING: u32 = 1 << 22;

    pub struct CortexIdle {
        scb: SCB,
        allow_stop: bool,
    }

    impl CortexIdle {
        /// `allow_stop` permits SLEEPDEEP entries. Leave it off while the
        /// embassy time driver runs from a timer that halts in stop mode.
        pub fn new(scb: SCB, allow_stop: bool) -> Self {
            Self { scb, allow_stop }
        }
    }

    impl IdlePlatform for CortexIdle {
        type Instant = FirmwareInstant;

        fn now(&mut self) -> FirmwareInstant {
            FirmwareInstant::now()
        }

        fn mask_local_interrupts(&mut self) {
            cortex_m::interrupt::disable();
        }

        fn unmask_local_interrupts(&mut self) {
            // SAFETY: paired with `mask_local_interrupts` on the idle path,
            // outside of any critical section.
            unsafe { cortex_m::interrupt::enable() };
        }

        fn interrupt_pending(&mut self) -> bool {
            // SAFETY: read-only access to a status register.
            let icsr = unsafe { (*SCB::PTR).icsr.read() };
            icsr & ICSR_ISRPENDING != 0
        }

        fn reschedule_requested(&mut self) -> bool {
            events::WORK_PENDING.is_raised()
        }

        fn deep_idle_vetoed(&mut self) -> bool {
            !self.allow_stop
        }

        fn enter_low_power(&mut self, depth: IdleDepth) -> Result<(), BackendError> {
            match depth {
                IdleDepth::Shallow | IdleDepth::Medium => cortex_m::asm::wfi(),
                IdleDepth::Deep => {
                    self.scb.set_sleepdeep();
                    cortex_m::asm::wfi();
                    self.scb.clear_sleepdeep();
                }
            }
            Ok(())
        }
    }
}
