//! Cancelable one-shot transitions that debounce individual flags.
//!
//! Every [`Flag`] owns at most one [`DebounceTimer`]. Scheduling an edge first
//! cancels a pending timer for the opposite edge, under the same lock, so the
//! two transitions can never race. Timers do not run on their own: the owner
//! polls [`DebounceBank::next_deadline`] and calls [`DebounceBank::service`]
//! from a single deferred-work context once the deadline passes.

use core::cell::RefCell;
use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};
use heapless::Vec;

use crate::error::GateError;
use crate::flags::{ALL_FLAGS, FLAG_COUNT, Flag, FlagRegister};

/// Direction of a flag transition.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Edge {
    Assert,
    Clear,
}

impl Edge {
    /// Returns the edge that moves the flag the other way.
    pub const fn opposite(self) -> Self {
        match self {
            Edge::Assert => Edge::Clear,
            Edge::Clear => Edge::Assert,
        }
    }

    /// Flag level reached once this edge applies.
    pub const fn level(self) -> bool {
        matches!(self, Edge::Assert)
    }
}

/// State of a single debounce timer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TimerState<I> {
    Idle,
    PendingAssert { due: I },
    PendingClear { due: I },
}

/// One deferred transition for one flag toward one target level.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DebounceTimer<I> {
    state: TimerState<I>,
}

impl<I> DebounceTimer<I>
where
    I: Copy + Ord,
{
    pub const fn new() -> Self {
        Self {
            state: TimerState::Idle,
        }
    }

    pub const fn state(&self) -> TimerState<I> {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self.state, TimerState::Idle)
    }

    /// Edge and deadline of the pending transition, if any.
    pub fn pending(&self) -> Option<(Edge, I)> {
        match self.state {
            TimerState::Idle => None,
            TimerState::PendingAssert { due } => Some((Edge::Assert, due)),
            TimerState::PendingClear { due } => Some((Edge::Clear, due)),
        }
    }

    pub fn pending_edge(&self) -> Option<Edge> {
        self.pending().map(|(edge, _)| edge)
    }

    /// Arms the timer, replacing whatever was pending.
    pub fn arm(&mut self, edge: Edge, due: I) {
        self.state = match edge {
            Edge::Assert => TimerState::PendingAssert { due },
            Edge::Clear => TimerState::PendingClear { due },
        };
    }

    /// Cancels the pending transition. Returns `true` when one was pending.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.is_pending();
        self.state = TimerState::Idle;
        was_pending
    }

    /// Cancels the pending transition only when it moves toward `edge`.
    pub fn cancel_edge(&mut self, edge: Edge) -> bool {
        if self.pending_edge() == Some(edge) {
            self.cancel()
        } else {
            false
        }
    }

    /// Disarms and returns the pending transition once `now` reaches its deadline.
    pub fn expire(&mut self, now: I) -> Option<(Edge, I)> {
        match self.pending() {
            Some((edge, due)) if now >= due => {
                self.state = TimerState::Idle;
                Some((edge, due))
            }
            _ => None,
        }
    }
}

impl<I> Default for DebounceTimer<I>
where
    I: Copy + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Result of an assert or clear request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScheduleOutcome<I> {
    /// Zero delay: the flag changed in the caller's context.
    Applied,
    /// The transition fires at `due`.
    Scheduled { due: I },
    /// A transition in the same direction was already pending; its deadline
    /// is kept.
    AlreadyPending { due: I },
    /// The flag already had the requested level.
    Unchanged,
}

/// Summary returned to the producer after scheduling.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ScheduleReport<I> {
    pub flag: Flag,
    pub edge: Edge,
    pub outcome: ScheduleOutcome<I>,
    /// `true` when a pending transition in the opposite direction was canceled.
    pub canceled_opposite: bool,
}

impl<I> ScheduleReport<I> {
    /// Returns `true` when the flag level changed synchronously.
    pub fn applied(&self) -> bool {
        matches!(self.outcome, ScheduleOutcome::Applied)
    }
}

/// Transition applied by [`DebounceBank::service`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FiredTransition<I> {
    pub flag: Flag,
    pub edge: Edge,
    pub due: I,
    /// `false` when the flag already had the target level when the timer fired.
    pub changed: bool,
}

/// Per-flag debounce timers guarded by one lock.
pub struct DebounceBank<M, I>
where
    M: RawMutex,
{
    timers: Mutex<M, RefCell<[DebounceTimer<I>; FLAG_COUNT]>>,
}

impl<M, I> DebounceBank<M, I>
where
    M: RawMutex,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    pub const fn new() -> Self {
        Self {
            timers: Mutex::new(RefCell::new(
                [DebounceTimer {
                    state: TimerState::Idle,
                }; FLAG_COUNT],
            )),
        }
    }

    /// Schedules `flag` to become asserted after `delay`, canceling a pending
    /// clear first.
    pub fn assert(
        &self,
        flags: &FlagRegister,
        flag: Flag,
        delay: Duration,
        now: I,
    ) -> Result<ScheduleReport<I>, GateError> {
        self.schedule(flags, flag, Edge::Assert, delay, now)
    }

    /// Schedules `flag` to become clear after `delay`, canceling a pending
    /// assert first. While the clear is pending the flag's marker (if any) is
    /// asserted.
    pub fn clear(
        &self,
        flags: &FlagRegister,
        flag: Flag,
        delay: Duration,
        now: I,
    ) -> Result<ScheduleReport<I>, GateError> {
        self.schedule(flags, flag, Edge::Clear, delay, now)
    }

    fn schedule(
        &self,
        flags: &FlagRegister,
        flag: Flag,
        edge: Edge,
        delay: Duration,
        now: I,
    ) -> Result<ScheduleReport<I>, GateError> {
        if !flags.test(Flag::WorkInitialized) {
            return Err(GateError::NotInitialized);
        }

        self.timers.lock(|cell| {
            // Checked under the lock so nothing is armed after `shutdown`
            // cleared the slots.
            if flags.is_tearing_down() {
                return Err(GateError::ShuttingDown);
            }
            let mut timers = cell.borrow_mut();
            let timer = &mut timers[flag.as_index()];

            let canceled_opposite = timer.cancel_edge(edge.opposite());
            if canceled_opposite && edge == Edge::Assert {
                clear_marker(flags, flag);
            }

            let outcome = if let Some((pending, due)) = timer.pending() {
                debug_assert_eq!(pending, edge);
                ScheduleOutcome::AlreadyPending { due }
            } else if flags.test(flag) == edge.level() {
                ScheduleOutcome::Unchanged
            } else if delay.is_zero() {
                flags.assign(flag, edge.level());
                ScheduleOutcome::Applied
            } else {
                let due = now + delay;
                timer.arm(edge, due);
                if edge == Edge::Clear {
                    if let Some(marker) = flag.pending_clear_marker() {
                        flags.set(marker);
                    }
                }
                ScheduleOutcome::Scheduled { due }
            };

            Ok(ScheduleReport {
                flag,
                edge,
                outcome,
                canceled_opposite,
            })
        })
    }

    /// Cancels any pending transition for `flag`. Canceling an idle timer is
    /// a no-op; after this returns the flag will not change because of it.
    pub fn cancel(&self, flags: &FlagRegister, flag: Flag) -> bool {
        self.timers.lock(|cell| {
            let mut timers = cell.borrow_mut();
            let canceled = timers[flag.as_index()].cancel();
            if canceled {
                clear_marker(flags, flag);
            }
            canceled
        })
    }

    /// Pending edge and deadline for `flag`.
    pub fn pending(&self, flag: Flag) -> Option<(Edge, I)> {
        self.timers
            .lock(|cell| cell.borrow()[flag.as_index()].pending())
    }

    /// Earliest deadline across all timers.
    pub fn next_deadline(&self) -> Option<I> {
        self.timers.lock(|cell| {
            cell.borrow()
                .iter()
                .filter_map(|timer| timer.pending().map(|(_, due)| due))
                .min()
        })
    }

    /// Applies every transition whose deadline has passed.
    ///
    /// Flag writes happen under the timer lock. The returned list is for the
    /// caller to log or record after the lock is released.
    pub fn service(&self, flags: &FlagRegister, now: I) -> Vec<FiredTransition<I>, FLAG_COUNT> {
        let mut fired = Vec::new();
        if flags.is_tearing_down() {
            return fired;
        }

        self.timers.lock(|cell| {
            let mut timers = cell.borrow_mut();
            for flag in ALL_FLAGS {
                if let Some((edge, due)) = timers[flag.as_index()].expire(now) {
                    let changed = flags.assign(flag, edge.level());
                    if edge == Edge::Clear {
                        clear_marker(flags, flag);
                    }
                    // One slot per flag, so the push cannot overflow.
                    let _ = fired.push(FiredTransition {
                        flag,
                        edge,
                        due,
                        changed,
                    });
                }
            }
        });

        fired
    }

    /// Begins teardown and cancels every pending timer. Returns how many were
    /// canceled. No timer fires after this returns.
    pub fn shutdown(&self, flags: &FlagRegister) -> usize {
        flags.begin_teardown();
        self.timers.lock(|cell| {
            let mut timers = cell.borrow_mut();
            let mut canceled = 0;
            for flag in ALL_FLAGS {
                if timers[flag.as_index()].cancel() {
                    clear_marker(flags, flag);
                    canceled += 1;
                }
            }
            canceled
        })
    }
}

impl<M, I> Default for DebounceBank<M, I>
where
    M: RawMutex,
    I: Copy + Ord + Add<Duration, Output = I>,
{
    fn default() -> Self {
        Self::new()
    }
}

fn clear_marker(flags: &FlagRegister, flag: Flag) {
    if let Some(marker) = flag.pending_clear_marker() {
        flags.clear(marker);
    }
}
