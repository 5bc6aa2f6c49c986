mod support;

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use gate_core::config::GateConfig;
use gate_core::debounce::{DebounceBank, Edge, ScheduleOutcome};
use gate_core::error::GateError;
use gate_core::flags::{Flag, FlagRegister};
use gate_core::gate::IdleGate;
use gate_core::telemetry::{TelemetryEventKind, TelemetryPayload};

use support::MockInstant;

type Bank = DebounceBank<NoopRawMutex, MockInstant>;

const PRODUCER_FLAGS: [Flag; 3] = [Flag::ExternalActive, Flag::NeedsFullRail, Flag::ScreenOn];

fn ready_flags() -> FlagRegister {
    let flags = FlagRegister::new();
    flags.set(Flag::WorkInitialized);
    flags
}

/// Deterministic LCG driving the assert/clear interleavings.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        self.0 >> 33
    }
}

#[test]
fn at_most_one_timer_per_flag_under_interleaving() {
    let flags = ready_flags();
    let bank = Bank::new();
    let mut rng = Lcg(7);
    let mut now = 0u64;

    for _ in 0..2_000 {
        let flag = PRODUCER_FLAGS[(rng.next() % PRODUCER_FLAGS.len() as u64) as usize];
        let delay = Duration::from_millis(rng.next() % 40);
        let result = if rng.next() % 2 == 0 {
            bank.assert(&flags, flag, delay, MockInstant(now))
        } else {
            bank.clear(&flags, flag, delay, MockInstant(now))
        };
        result.unwrap();

        now += rng.next() % 15;
        bank.service(&flags, MockInstant(now));

        for candidate in [Flag::ExternalActive, Flag::NeedsFullRail] {
            assert!(!(flags.test(candidate.pending_clear_marker().unwrap())
                && matches!(bank.pending(candidate), Some((Edge::Assert, _)))));
            let marker = candidate.pending_clear_marker().unwrap();
            let clearing = matches!(bank.pending(candidate), Some((Edge::Clear, _)));
            assert_eq!(flags.test(marker), clearing, "{candidate} marker out of sync");
        }
    }
}

#[test]
fn activity_resuming_before_deadline_keeps_flag_asserted() {
    let gate: IdleGate<NoopRawMutex, MockInstant> =
        IdleGate::new(GateConfig::default(), MockInstant(0));

    gate.external_active(MockInstant(0)).unwrap();
    gate.external_inactive(MockInstant(10), Some(Duration::from_millis(100)))
        .unwrap();
    assert!(gate.flags().test(Flag::InactivePending));

    let report = gate.external_active(MockInstant(50)).unwrap();
    assert!(report.canceled_opposite);
    assert_eq!(report.outcome, ScheduleOutcome::Unchanged);
    assert!(!gate.flags().test(Flag::InactivePending));

    assert!(gate.service(MockInstant(200)).fired.is_empty());
    assert!(gate.flags().test(Flag::ExternalActive));
}

#[test]
fn rapid_toggling_yields_one_clear() {
    let gate: IdleGate<NoopRawMutex, MockInstant> = IdleGate::new(
        GateConfig::default().with_startup_hold_off(Duration::ZERO),
        MockInstant(0),
    );

    for tick in 0..10 {
        gate.needs_full_rail(MockInstant(tick * 20)).unwrap();
        gate.release_full_rail(MockInstant(tick * 20 + 10), None)
            .unwrap();
    }

    let serviced = gate.service(MockInstant(10_000));
    assert_eq!(serviced.fired.len(), 1);
    assert_eq!(serviced.fired[0].edge, Edge::Clear);
    assert!(!gate.flags().test(Flag::NeedsFullRail));

    let debounced_clears = gate.with_telemetry(|recorder| {
        recorder
            .oldest_first()
            .filter(|record| {
                record.event == TelemetryEventKind::FlagCleared(Flag::NeedsFullRail)
                    && matches!(record.details, TelemetryPayload::Flag(details) if details.debounced)
            })
            .count()
    });
    assert_eq!(debounced_clears, 1);
}

#[test]
fn cancel_is_idempotent_and_side_effect_free() {
    let flags = ready_flags();
    let bank = Bank::new();

    let before = flags.snapshot();
    assert!(!bank.cancel(&flags, Flag::NeedsFullRail));
    assert_eq!(flags.snapshot(), before);

    flags.set(Flag::NeedsFullRail);
    bank.clear(&flags, Flag::NeedsFullRail, Duration::from_millis(5), MockInstant(0))
        .unwrap();
    assert!(bank.cancel(&flags, Flag::NeedsFullRail));
    let after_first = flags.snapshot();
    assert!(!bank.cancel(&flags, Flag::NeedsFullRail));
    assert_eq!(flags.snapshot(), after_first);

    assert!(bank.service(&flags, MockInstant(100)).is_empty());
    assert!(flags.test(Flag::NeedsFullRail));
}

#[test]
fn teardown_prevents_any_later_firing() {
    let gate: IdleGate<NoopRawMutex, MockInstant> =
        IdleGate::new(GateConfig::default(), MockInstant(0));
    gate.external_active(MockInstant(0)).unwrap();
    gate.external_inactive(MockInstant(0), None).unwrap();

    assert_eq!(gate.shutdown(MockInstant(1)), 1);
    assert!(gate.service(MockInstant(60_000)).fired.is_empty());
    assert!(gate.flags().test(Flag::ExternalActive));
    assert_eq!(
        gate.external_inactive(MockInstant(2), None),
        Err(GateError::ShuttingDown)
    );
    assert!(GateError::ShuttingDown.is_terminal());
}

#[test]
fn requests_before_initialization_are_rejected() {
    let flags = FlagRegister::new();
    let bank = Bank::new();

    assert_eq!(
        bank.clear(&flags, Flag::ExternalActive, Duration::ZERO, MockInstant(0)),
        Err(GateError::NotInitialized)
    );
}
