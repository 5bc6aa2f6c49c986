use embassy_futures::yield_now;
use embassy_time::Timer;
use gate_core::idle::IdleOutcome;

use crate::clock::FirmwareInstant;
use crate::hw::CortexIdle;
use crate::log;
use crate::worker::FirmwareGate;

#[embassy_executor::task]
pub async fn run(gate: &'static FirmwareGate, mut platform: CortexIdle) -> ! {
    loop {
        match gate.idle(&mut platform) {
            Ok(report) if report.outcome == IdleOutcome::HeldOff => {
                Timer::at(gate.idle_ready_at().into_embassy()).await;
            }
            Ok(report) => {
                if report.anomaly {
                    log::log_idle_anomaly(&report);
                }
                yield_now().await;
            }
            Err(error) => {
                log::log_rejected("idle", error, FirmwareInstant::now());
                yield_now().await;
            }
        }
    }
}
