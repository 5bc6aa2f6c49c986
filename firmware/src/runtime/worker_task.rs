use embassy_futures::select::{Either, select};
use embassy_time::Timer;

use crate::clock::FirmwareInstant;
use crate::events::{self, EventReceiver};
use crate::hw::SingleClusterPlatform;
use crate::worker::{Flow, GateWorker};

#[embassy_executor::task]
pub async fn run(
    mut worker: GateWorker<'static, SingleClusterPlatform>,
    receiver: EventReceiver<'static>,
) {
    loop {
        let next = match worker.next_deadline() {
            Some(deadline) => select(receiver.receive(), Timer::at(deadline.into_embassy())).await,
            None => Either::First(receiver.receive().await),
        };

        let now = FirmwareInstant::now();
        match next {
            Either::First(event) => {
                if worker.handle(event, now) == Flow::Stop {
                    break;
                }
            }
            Either::Second(()) => worker.service(now),
        }

        events::WORK_PENDING.settle(&receiver);
    }
}
