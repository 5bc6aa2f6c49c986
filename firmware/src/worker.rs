//! Deferred-work context for the gate.
//!
//! The worker owns the cluster migration gate and applies queued events to
//! both gates. The runtime waits on the event queue and on
//! [`GateWorker::next_deadline`], whichever comes first, and then calls back
//! into the worker with the current instant.

use gate_core::cluster::{ClusterMigrationGate, ClusterPlatform};
use gate_core::gate::IdleGate;

use crate::clock::FirmwareInstant;
use crate::events::{GateEvent, GateMutex};
use crate::log;

pub type FirmwareGate = IdleGate<GateMutex, FirmwareInstant>;
pub type FirmwareCluster<P> = ClusterMigrationGate<GateMutex, P, FirmwareInstant>;

/// Whether the worker loop keeps running.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Stop,
}

pub struct GateWorker<'g, P>
where
    P: ClusterPlatform,
{
    gate: &'g FirmwareGate,
    cluster: FirmwareCluster<P>,
}

impl<'g, P> GateWorker<'g, P>
where
    P: ClusterPlatform,
{
    pub fn new(gate: &'g FirmwareGate, cluster: FirmwareCluster<P>) -> Self {
        Self { gate, cluster }
    }

    /// Applies one queued event.
    pub fn handle(&mut self, event: GateEvent, now: FirmwareInstant) -> Flow {
        let schedule = match event {
            GateEvent::Power(power) => {
                let transition = self.gate.power_event(power, now);
                log::log_power_event(power, transition, now);
                return Flow::Continue;
            }
            GateEvent::Screen { on } => {
                self.screen_changed(on, now);
                return Flow::Continue;
            }
            GateEvent::Shutdown => {
                let canceled = self.gate.shutdown(now) + usize::from(self.cluster.shutdown(now));
                log::log_teardown(canceled, now);
                return Flow::Stop;
            }
            GateEvent::ExternalActive => self.gate.external_active(now),
            GateEvent::ExternalInactive { delay } => self.gate.external_inactive(now, delay),
            GateEvent::NeedsFullRail => self.gate.needs_full_rail(now),
            GateEvent::ReleaseFullRail { delay } => self.gate.release_full_rail(now, delay),
        };

        match schedule {
            Ok(report) => log::log_schedule(&report, now),
            Err(error) => log::log_rejected(event.label(), error, now),
        }
        Flow::Continue
    }

    /// Runs every timer whose deadline has passed.
    pub fn service(&mut self, now: FirmwareInstant) {
        let report = self.gate.service(now);
        for transition in &report.fired {
            log::log_fired(transition, now);
        }
        if report.idle_enabled {
            log::log_idle_enabled(now);
        }

        if let Some(result) = self.cluster.service(now) {
            log::log_migration(result, now);
        }
    }

    /// Earliest instant at which [`service`](Self::service) has work.
    pub fn next_deadline(&self) -> Option<FirmwareInstant> {
        match (self.gate.next_deadline(), self.cluster.next_deadline()) {
            (Some(left), Some(right)) => Some(left.min(right)),
            (left, right) => left.or(right),
        }
    }

    pub fn cluster(&self) -> &FirmwareCluster<P> {
        &self.cluster
    }

    fn screen_changed(&mut self, on: bool, now: FirmwareInstant) {
        self.gate.screen_changed(on, now);
        if on {
            let outcome = self.cluster.screen_on(now);
            log::log_screen_on(outcome.canceled_migration, now);
        } else {
            match self.cluster.screen_off(now) {
                Ok(outcome) => log::log_screen_off(outcome, now),
                Err(error) => log::log_rejected("screen-off", error, now),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use core::time::Duration;

    use embassy_time::Instant;
    use gate_core::cluster::ClusterState;
    use gate_core::config::GateConfig;
    use gate_core::flags::Flag;
    use gate_core::suspend::PowerEvent;

    use super::*;
    use crate::hw::SingleClusterPlatform;

    fn at_ms(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_millis(value))
    }

    fn worker(gate: &FirmwareGate) -> GateWorker<'_, SingleClusterPlatform> {
        GateWorker::new(
            gate,
            FirmwareCluster::new(GateConfig::default(), SingleClusterPlatform::new()),
        )
    }

    #[test]
    fn screen_off_migrates_after_delay() {
        let gate = FirmwareGate::new(
            GateConfig::default().with_startup_hold_off(Duration::ZERO),
            at_ms(0),
        );
        let mut worker = worker(&gate);

        worker.handle(GateEvent::Screen { on: true }, at_ms(0));
        worker.handle(GateEvent::Screen { on: false }, at_ms(35_000));
        assert!(!gate.flags().test(Flag::ScreenOn));
        assert_eq!(worker.next_deadline(), Some(at_ms(45_000)));

        worker.service(at_ms(45_000));
        assert_eq!(worker.cluster().cluster_state(), ClusterState::LowPower);
        assert!(!worker.cluster().platform().auto_hotplug());
        assert_eq!(worker.next_deadline(), None);
    }

    #[test]
    fn hold_off_deadline_is_reported() {
        let gate = FirmwareGate::new(GateConfig::default(), at_ms(0));
        let mut worker = worker(&gate);

        assert_eq!(worker.next_deadline(), Some(at_ms(30_000)));
        worker.service(at_ms(30_000));
        assert!(gate.idle_enabled_at(at_ms(30_000)));
        assert_eq!(worker.next_deadline(), None);
    }

    #[test]
    fn rail_release_is_debounced() {
        let gate = FirmwareGate::new(GateConfig::default(), at_ms(0));
        let mut worker = worker(&gate);

        worker.handle(GateEvent::NeedsFullRail, at_ms(0));
        worker.handle(
            GateEvent::ReleaseFullRail {
                delay: Some(Duration::from_millis(200)),
            },
            at_ms(10),
        );
        assert!(gate.flags().test(Flag::TopOnCancelPending));

        worker.service(at_ms(210));
        assert!(!gate.flags().test(Flag::NeedsFullRail));
        assert!(!gate.flags().test(Flag::TopOnCancelPending));
    }

    #[test]
    fn shutdown_stops_worker_and_cancels_timers() {
        let gate = FirmwareGate::new(
            GateConfig::default().with_startup_hold_off(Duration::ZERO),
            at_ms(0),
        );
        let mut worker = worker(&gate);

        worker.handle(GateEvent::Power(PowerEvent::SuspendPrepare), at_ms(0));
        worker.handle(GateEvent::Screen { on: false }, at_ms(0));
        worker.handle(GateEvent::ExternalActive, at_ms(0));
        worker.handle(GateEvent::ExternalInactive { delay: None }, at_ms(1));

        assert_eq!(worker.handle(GateEvent::Shutdown, at_ms(2)), Flow::Stop);
        assert_eq!(worker.next_deadline(), None);
        assert!(gate.flags().test(Flag::DisabledBySuspend));
        assert!(gate.flags().test(Flag::ExternalActive));
    }
}
