//! Embassy-backed instant used by the gate on the MCU.

use core::ops::Add;

use embassy_time::{Duration, Instant};
use gate_core::telemetry::TelemetryInstant;

/// Monotonic instant wrapper bridging `embassy_time` with `gate-core`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0.as_micros()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(value: Instant) -> Self {
        Self(value)
    }
}

impl Add<core::time::Duration> for FirmwareInstant {
    type Output = FirmwareInstant;

    fn add(self, rhs: core::time::Duration) -> Self::Output {
        let delta = core_duration_to_embassy(rhs);
        Self(self.0.checked_add(delta).unwrap_or(Instant::MAX))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> core::time::Duration {
        let micros = self.0.saturating_duration_since(earlier.0).as_micros();
        core::time::Duration::from_micros(micros)
    }
}

/// Saturates at the largest tick count embassy can represent.
pub fn core_duration_to_embassy(duration: core::time::Duration) -> Duration {
    let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
    Duration::from_micros(micros)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn micros(value: u64) -> FirmwareInstant {
        FirmwareInstant::from(Instant::from_micros(value))
    }

    #[test]
    fn adds_core_durations() {
        let later = micros(1_000) + core::time::Duration::from_millis(10);
        assert_eq!(later.as_micros(), 11_000);
    }

    #[test]
    fn elapsed_saturates_at_zero() {
        let earlier = micros(500);
        let later = micros(2_000);
        assert_eq!(
            later.saturating_duration_since(earlier),
            core::time::Duration::from_micros(1_500)
        );
        assert_eq!(
            earlier.saturating_duration_since(later),
            core::time::Duration::ZERO
        );
    }
}
