//! Event queue feeding the gate worker.
//!
//! Power notifiers, the screen observer, and the activity and rail producers
//! each hold an [`EventSource`]. Events are applied in arrival order by the
//! single worker task.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use gate_core::suspend::PowerEvent;
use portable_atomic::{AtomicBool, Ordering};

/// Depth of the queue shared between producers and the worker.
pub const EVENT_QUEUE_DEPTH: usize = 8;

/// Mutex flavour shared by the gate and the queue. Producers may run in
/// interrupt context.
pub type GateMutex = CriticalSectionRawMutex;

pub type EventQueue = Channel<GateMutex, GateEvent, EVENT_QUEUE_DEPTH>;
pub type EventSender<'a> = Sender<'a, GateMutex, GateEvent, EVENT_QUEUE_DEPTH>;
pub type EventReceiver<'a> = Receiver<'a, GateMutex, GateEvent, EVENT_QUEUE_DEPTH>;

/// Reschedule request raised by every queued event. The idle loop treats a
/// raised signal as work waiting for the worker.
pub static WORK_PENDING: WorkSignal = WorkSignal::new();

/// Notifications consumed by the gate worker.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GateEvent {
    Power(PowerEvent),
    Screen { on: bool },
    ExternalActive,
    ExternalInactive { delay: Option<Duration> },
    NeedsFullRail,
    ReleaseFullRail { delay: Option<Duration> },
    Shutdown,
}

impl GateEvent {
    pub const fn label(&self) -> &'static str {
        match self {
            GateEvent::Power(event) => event.as_str(),
            GateEvent::Screen { on: true } => "screen-on",
            GateEvent::Screen { on: false } => "screen-off",
            GateEvent::ExternalActive => "external-active",
            GateEvent::ExternalInactive { .. } => "external-inactive",
            GateEvent::NeedsFullRail => "needs-full-rail",
            GateEvent::ReleaseFullRail { .. } => "release-full-rail",
            GateEvent::Shutdown => "shutdown",
        }
    }
}

/// Flag shared between producers, the worker, and the idle loop.
pub struct WorkSignal(AtomicBool);

impl WorkSignal {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Lowers the signal unless events are still queued. Returns the
    /// resulting state.
    ///
    /// The signal is lowered before the queue is inspected, so a producer
    /// that sends concurrently either is seen here or raises it afterwards.
    pub fn settle(&self, receiver: &EventReceiver<'_>) -> bool {
        self.0.store(false, Ordering::SeqCst);
        if receiver.is_empty() {
            return self.is_raised();
        }
        self.raise();
        true
    }
}

impl Default for WorkSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle over the event queue.
#[derive(Clone, Copy)]
pub struct EventSource<'a> {
    sender: EventSender<'a>,
    signal: &'a WorkSignal,
}

impl<'a> EventSource<'a> {
    pub fn new(sender: EventSender<'a>, signal: &'a WorkSignal) -> Self {
        Self { sender, signal }
    }

    /// Queues `event` without blocking. A full queue hands the event back.
    pub fn try_emit(&self, event: GateEvent) -> Result<(), GateEvent> {
        match self.sender.try_send(event) {
            Ok(()) => {
                self.signal.raise();
                Ok(())
            }
            Err(TrySendError::Full(event)) => Err(event),
        }
    }

    /// Queues `event`, waiting for space.
    pub async fn emit(&self, event: GateEvent) {
        self.sender.send(event).await;
        self.signal.raise();
    }
}
