mod support;

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gate_core::config::GateConfig;
use gate_core::error::{BackendError, GateError};
use gate_core::flags::{Flag, FlagRegister, FlagSet};
use gate_core::gate::IdleGate;
use gate_core::idle::{
    AbortReason, IdleDepth, IdleDepthSelector, IdleOutcome, IdlePlatform, classify,
};
use gate_core::suspend::PowerEvent;
use gate_core::telemetry::TelemetryEventKind;

use support::{MockIdle, MockInstant};

type Gate = IdleGate<NoopRawMutex, MockInstant>;

fn ready_gate() -> Gate {
    IdleGate::new(
        GateConfig::default().with_startup_hold_off(Duration::ZERO),
        MockInstant::ms(0),
    )
}

#[test]
fn all_flags_clear_selects_deep() {
    let gate = ready_gate();
    let mut platform = MockIdle::default();

    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Deep));
    assert_eq!(platform.entries, vec![IdleDepth::Deep]);
}

#[test]
fn suspend_overrides_everything_else() {
    let gate = ready_gate();
    gate.screen_changed(true, MockInstant::ms(0));
    gate.needs_full_rail(MockInstant::ms(0)).unwrap();
    gate.external_active(MockInstant::ms(0)).unwrap();
    gate.power_event(PowerEvent::SuspendPrepare, MockInstant::ms(1));

    let mut platform = MockIdle::default();
    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Shallow));
    assert!(gate.flags().test(Flag::ForceShallow));
    assert!(!gate.flags().test(Flag::ForceMedium));

    gate.power_event(PowerEvent::PostSuspend, MockInstant::ms(2));
    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Medium));
}

#[test]
fn full_rail_need_selects_medium() {
    let gate = ready_gate();
    gate.needs_full_rail(MockInstant::ms(0)).unwrap();

    let mut platform = MockIdle::default();
    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Medium));
}

#[test]
fn depth_is_a_pure_function_of_the_condition_flags() {
    let selector = IdleDepthSelector::<NoopRawMutex>::new();

    // Every combination of the four condition flags, with stale force flags
    // left over from a previous entry.
    let conditions = [
        Flag::DisabledBySuspend,
        Flag::NeedsFullRail,
        Flag::ExternalActive,
        Flag::ScreenOn,
    ];
    for mask in 0u8..16 {
        let flags = FlagRegister::new();
        flags.set(Flag::ForceShallow);
        flags.set(Flag::ForceMedium);
        let mut expected_set = FlagSet::empty();
        for (bit, flag) in conditions.iter().enumerate() {
            if mask & (1 << bit) != 0 {
                flags.set(*flag);
                expected_set.insert(*flag);
            }
        }

        let expected = if mask & 1 != 0 {
            IdleDepth::Shallow
        } else if mask != 0 {
            IdleDepth::Medium
        } else {
            IdleDepth::Deep
        };
        assert_eq!(classify(expected_set), expected);

        let first = selector.prepare(&flags);
        let second = selector.prepare(&flags);
        assert_eq!(first, expected, "mask {mask:#06b}");
        assert_eq!(first, second, "mask {mask:#06b}");
    }
}

#[test]
fn urgent_conditions_abort_at_any_depth() {
    for depth_flag in [None, Some(Flag::NeedsFullRail), Some(Flag::DisabledBySuspend)] {
        for (irq, resched, reason) in [
            (true, false, AbortReason::InterruptPending),
            (false, true, AbortReason::RescheduleRequested),
            (true, true, AbortReason::InterruptPending),
        ] {
            let gate = ready_gate();
            match depth_flag {
                Some(Flag::NeedsFullRail) => {
                    gate.needs_full_rail(MockInstant::ms(0)).unwrap();
                }
                Some(Flag::DisabledBySuspend) => {
                    gate.power_event(PowerEvent::SuspendPrepare, MockInstant::ms(0));
                }
                _ => {}
            }

            let mut platform = MockIdle {
                irq_pending: irq,
                resched,
                sleep_ms: 100,
                ..MockIdle::default()
            };
            let report = gate.idle(&mut platform).unwrap();

            assert_eq!(report.outcome, IdleOutcome::Aborted(reason));
            assert_eq!(report.duration, Duration::ZERO);
            assert!(platform.entries.is_empty());
            assert!(!platform.masked);
        }
    }
}

#[test]
fn startup_hold_off_blocks_idle_until_serviced_deadline() {
    let gate: Gate = IdleGate::new(GateConfig::default(), MockInstant::ms(0));
    let mut platform = MockIdle::at(1_000);

    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::HeldOff);
    assert_eq!(report.planned, IdleDepth::Deep);
    assert!(platform.entries.is_empty());

    assert_eq!(gate.next_deadline(), Some(MockInstant::ms(30_000)));
    assert!(gate.service(MockInstant::ms(30_000)).idle_enabled);

    platform.clock = 30_001;
    let report = gate.idle(&mut platform).unwrap();
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Deep));
}

/// Platform that rewrites the force flags during the urgent re-check, the way
/// another execution unit entering idle concurrently would.
struct RacingPlatform<'a> {
    inner: MockIdle,
    flags: &'a FlagRegister,
}

impl IdlePlatform for RacingPlatform<'_> {
    type Instant = MockInstant;

    fn now(&mut self) -> MockInstant {
        self.inner.now()
    }

    fn mask_local_interrupts(&mut self) {
        self.inner.mask_local_interrupts();
    }

    fn unmask_local_interrupts(&mut self) {
        self.inner.unmask_local_interrupts();
    }

    fn interrupt_pending(&mut self) -> bool {
        self.flags.clear(Flag::ForceMedium);
        false
    }

    fn reschedule_requested(&mut self) -> bool {
        false
    }

    fn enter_low_power(&mut self, depth: IdleDepth) -> Result<(), BackendError> {
        self.inner.enter_low_power(depth)
    }
}

#[test]
fn concurrent_force_flag_rewrite_fails_safe_to_shallow() {
    let gate = ready_gate();
    gate.screen_changed(true, MockInstant::ms(0));

    let mut platform = RacingPlatform {
        inner: MockIdle::default(),
        flags: gate.flags(),
    };
    let report = gate.idle(&mut platform).unwrap();

    assert_eq!(report.planned, IdleDepth::Medium);
    assert_eq!(report.outcome, IdleOutcome::Entered(IdleDepth::Shallow));
    assert!(report.anomaly);
    assert_eq!(gate.anomaly_count(), 1);
    assert_eq!(
        gate.with_telemetry(|recorder| recorder.latest().map(|record| record.event)),
        Some(TelemetryEventKind::IdleAnomaly)
    );
}

#[test]
fn anomaly_survives_backend_failure() {
    let gate = ready_gate();
    gate.needs_full_rail(MockInstant::ms(0)).unwrap();

    let mut platform = RacingPlatform {
        inner: MockIdle {
            fail_entry: true,
            ..MockIdle::default()
        },
        flags: gate.flags(),
    };
    assert_eq!(
        gate.idle(&mut platform),
        Err(GateError::BackendFailure(BackendError::EntryFailed))
    );

    assert_eq!(gate.anomaly_count(), 1);
    assert_eq!(
        gate.with_telemetry(|recorder| recorder.latest().map(|record| record.event)),
        Some(TelemetryEventKind::IdleAnomaly)
    );
    assert!(!platform.inner.masked);
}

#[test]
fn last_idle_report_tracks_duration() {
    let gate = ready_gate();
    let mut platform = MockIdle {
        sleep_ms: 42,
        ..MockIdle::default()
    };

    gate.idle(&mut platform).unwrap();
    let last = gate.last_idle().expect("idle report");
    assert_eq!(last.duration, Duration::from_millis(42));
    assert_eq!(last.entered(), Some(IdleDepth::Deep));
    assert!(!gate.flags().test(Flag::ForceShallow));
    assert!(!gate.flags().test(Flag::ForceMedium));
}
