//! Suspend/resume coordination.
//!
//! Suspend preparation forces the shallowest idle depth until the system has
//! resumed. Transitions are immediate; there is nothing to debounce.

use core::fmt;

use crate::flags::{Flag, FlagRegister};

/// Power-management notification delivered by the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerEvent {
    SuspendPrepare,
    PostSuspend,
    HibernationPrepare,
    PostHibernation,
    RestorePrepare,
}

impl PowerEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            PowerEvent::SuspendPrepare => "suspend-prepare",
            PowerEvent::PostSuspend => "post-suspend",
            PowerEvent::HibernationPrepare => "hibernation-prepare",
            PowerEvent::PostHibernation => "post-hibernation",
            PowerEvent::RestorePrepare => "restore-prepare",
        }
    }
}

impl fmt::Display for PowerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effect of a [`PowerEvent`] on the flag register.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SuspendTransition {
    /// Deep idle is now disabled by suspend.
    Disabled,
    /// The suspend restriction was lifted.
    Enabled,
    /// Acknowledged without side effects.
    Ignored,
}

/// Toggles [`Flag::DisabledBySuspend`] from power-management notifications.
#[derive(Copy, Clone, Debug, Default)]
pub struct SuspendCoordinator;

impl SuspendCoordinator {
    pub const fn new() -> Self {
        Self
    }

    pub fn notify(&self, flags: &FlagRegister, event: PowerEvent) -> SuspendTransition {
        match event {
            PowerEvent::SuspendPrepare => {
                flags.set(Flag::DisabledBySuspend);
                SuspendTransition::Disabled
            }
            PowerEvent::PostSuspend => {
                flags.clear(Flag::DisabledBySuspend);
                SuspendTransition::Enabled
            }
            PowerEvent::HibernationPrepare
            | PowerEvent::PostHibernation
            | PowerEvent::RestorePrepare => SuspendTransition::Ignored,
        }
    }
}
