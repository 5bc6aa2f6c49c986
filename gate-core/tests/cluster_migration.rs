mod support;

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gate_core::cluster::{
    ClusterMigrationGate, ClusterParameters, ClusterState, MigrationOutcome, ScreenOffOutcome,
};
use gate_core::config::GateConfig;
use gate_core::error::{BackendError, GateError};
use gate_core::telemetry::TelemetryEventKind;

use support::{MockCluster, MockInstant};

type Gate = ClusterMigrationGate<NoopRawMutex, MockCluster, MockInstant>;

fn gate_with(online: usize) -> Gate {
    ClusterMigrationGate::new(GateConfig::default(), MockCluster::with_online(online))
}

#[test]
fn migration_refused_with_two_units_online() {
    let mut gate = gate_with(2);

    let scheduled = gate.screen_off(MockInstant(0)).unwrap();
    assert_eq!(
        scheduled,
        ScreenOffOutcome::Scheduled {
            due: MockInstant(10_000)
        }
    );

    assert_eq!(
        gate.service(MockInstant(10_000)),
        Some(Err(GateError::PreconditionViolated { online_units: 2 }))
    );
    assert_eq!(gate.cluster_state(), ClusterState::Normal);
    assert_eq!(gate.platform().reparent_calls, 0);
    assert!(gate.platform().hotplug_enabled);
    assert!(gate.platform().hotplug_log.is_empty());
}

#[test]
fn refusal_holds_for_any_unit_count_but_one() {
    for online in [0, 2, 3, 4, 8] {
        let mut gate = gate_with(online);
        assert_eq!(
            gate.migrate_to_low_power(MockInstant(0)),
            Err(GateError::PreconditionViolated {
                online_units: online
            })
        );
        assert_eq!(gate.cluster_state(), ClusterState::Normal);
        assert!(gate.platform().parameters.is_empty());
    }
}

#[test]
fn screen_on_before_delay_cancels_migration() {
    let mut gate = gate_with(1);
    gate.screen_off(MockInstant(0)).unwrap();
    assert!(gate.platform().single_unit_requested);

    let outcome = gate.screen_on(MockInstant(5_000));
    assert!(outcome.canceled_migration);
    assert_eq!(gate.pending_migration(), None);
    assert_eq!(gate.service(MockInstant(10_000)), None);

    assert_eq!(gate.cluster_state(), ClusterState::Normal);
    assert!(gate.platform().hotplug_enabled);
    assert!(!gate.platform().single_unit_requested);
    assert_eq!(gate.platform().reparent_calls, 0);
}

#[test]
fn successful_migration_updates_hotplug_accounting() {
    let mut gate = ClusterMigrationGate::<NoopRawMutex, _, MockInstant>::new(
        GateConfig::default()
            .with_migration_delay(Duration::from_secs(2))
            .with_low_power_unit(6),
        MockCluster::with_online(1),
    );

    gate.screen_off(MockInstant(100)).unwrap();
    assert_eq!(gate.next_deadline(), Some(MockInstant(2_100)));
    assert_eq!(
        gate.service(MockInstant(2_100)),
        Some(Ok(MigrationOutcome::Migrated))
    );

    assert_eq!(gate.cluster_state(), ClusterState::LowPower);
    assert!(!gate.platform().hotplug_enabled);
    assert_eq!(gate.platform().hotplug_log, vec![(6, true), (0, false)]);
    assert_eq!(
        gate.platform().parameters,
        vec![ClusterParameters {
            target: ClusterState::LowPower,
            switch_delay_us: 0,
        }]
    );

    let events: Vec<_> = gate
        .telemetry()
        .oldest_first()
        .map(|record| record.event)
        .collect();
    assert_eq!(
        events,
        vec![
            TelemetryEventKind::MigrationScheduled,
            TelemetryEventKind::MigrationCompleted
        ]
    );
}

#[test]
fn already_low_power_skips_clock_reparent() {
    let mut platform = MockCluster::with_online(1);
    platform.active = ClusterState::LowPower;
    let mut gate: Gate = ClusterMigrationGate::new(GateConfig::default(), platform);

    assert_eq!(
        gate.migrate_to_low_power(MockInstant(0)),
        Ok(MigrationOutcome::AlreadyLowPower)
    );
    assert_eq!(gate.platform().reparent_calls, 0);
    assert!(!gate.platform().hotplug_enabled);
}

#[test]
fn reparent_failure_is_reported_to_caller() {
    let mut platform = MockCluster::with_online(1);
    platform.reparent_error = Some(-5);
    let mut gate: Gate = ClusterMigrationGate::new(GateConfig::default(), platform);

    gate.screen_off(MockInstant(0)).unwrap();
    assert_eq!(
        gate.service(MockInstant(10_000)),
        Some(Err(GateError::BackendFailure(BackendError::ClockReparent(
            -5
        ))))
    );
    assert_eq!(gate.cluster_state(), ClusterState::Normal);
    assert!(gate.platform().hotplug_log.is_empty());
}

#[test]
fn screen_off_twice_keeps_single_request() {
    let mut gate = gate_with(1);
    gate.screen_off(MockInstant(0)).unwrap();
    assert_eq!(
        gate.screen_off(MockInstant(1_000)),
        Ok(ScreenOffOutcome::AlreadyPending {
            due: MockInstant(10_000)
        })
    );
    gate.screen_on(MockInstant(2_000));
    assert!(!gate.single_unit_held());
}

#[test]
fn cluster_switch_during_hotplug_disable_is_reported() {
    let mut platform = MockCluster::with_online(1);
    platform.active = ClusterState::LowPower;
    platform.switch_on_hotplug_disable = Some(ClusterState::Normal);
    let mut gate: Gate = ClusterMigrationGate::new(GateConfig::default(), platform);

    assert_eq!(
        gate.screen_off(MockInstant(0)),
        Ok(ScreenOffOutcome::ClusterChanged)
    );
    assert_eq!(gate.cluster_state(), ClusterState::Normal);
    assert_eq!(gate.pending_migration(), None);
    assert_eq!(gate.next_deadline(), None);
    assert!(gate.platform().single_unit_requested);
    assert_eq!(gate.platform().reparent_calls, 0);
}
