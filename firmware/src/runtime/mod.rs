use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use gate_core::config::GateConfig;
use static_cell::StaticCell;

use crate::clock::FirmwareInstant;
use crate::events::{self, EventQueue, EventSource, GateEvent};
use crate::hw::{CortexIdle, SingleClusterPlatform};
use crate::worker::{FirmwareCluster, FirmwareGate, GateWorker};

mod idle_task;
mod worker_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static EVENT_QUEUE: EventQueue = EventQueue::new();
static GATE: StaticCell<FirmwareGate> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let _peripherals = hal::init(hal::Config::default());
    let core = cortex_m::Peripherals::take().expect("core peripherals already taken");

    let config = GateConfig::new();
    let gate: &'static FirmwareGate = GATE.init(FirmwareGate::new(config, FirmwareInstant::now()));
    let cluster = FirmwareCluster::new(config, SingleClusterPlatform::new());
    let worker = GateWorker::new(gate, cluster);

    spawner
        .spawn(worker_task::run(worker, EVENT_QUEUE.receiver()))
        .expect("failed to spawn gate worker task");
    spawner
        .spawn(idle_task::run(gate, CortexIdle::new(core.SCB, false)))
        .expect("failed to spawn idle task");

    // The panel is lit at boot; the observer reports later changes.
    EventSource::new(EVENT_QUEUE.sender(), &events::WORK_PENDING)
        .emit(GateEvent::Screen { on: true })
        .await;

    core::future::pending::<()>().await;
}
