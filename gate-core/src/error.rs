//! Error types reported by the action-executing components.
//!
//! Producer-facing flag setters never fail; only idle entry, cluster
//! migration, and debounce scheduling return these errors, and always to
//! their direct caller.

use core::fmt;

/// Failure reported by a hardware backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BackendError {
    /// The clock framework refused to reparent the CPU clock (errno-style code).
    ClockReparent(i32),
    /// The low-power entry sequence reported a failure.
    EntryFailed,
    /// The platform does not implement the requested operation.
    Unsupported,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::ClockReparent(code) => write!(f, "clock reparent failed ({code})"),
            BackendError::EntryFailed => f.write_str("low-power entry failed"),
            BackendError::Unsupported => f.write_str("operation unsupported"),
        }
    }
}

/// Errors surfaced by the gate components.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GateError {
    /// Migration attempted while more (or fewer) than one unit was online.
    PreconditionViolated { online_units: usize },
    /// A backend action failed; gate state was left unchanged.
    BackendFailure(BackendError),
    /// Scheduling was attempted after teardown began.
    ShuttingDown,
    /// Scheduling was attempted before the debounce machinery was initialized.
    NotInitialized,
}

impl GateError {
    /// Returns `true` when retrying the same request can never succeed.
    pub const fn is_terminal(self) -> bool {
        matches!(self, GateError::ShuttingDown)
    }
}

impl From<BackendError> for GateError {
    fn from(value: BackendError) -> Self {
        GateError::BackendFailure(value)
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateError::PreconditionViolated { online_units } => {
                write!(f, "precondition violated: {online_units} units online")
            }
            GateError::BackendFailure(err) => write!(f, "backend failure: {err}"),
            GateError::ShuttingDown => f.write_str("shutting down"),
            GateError::NotInitialized => f.write_str("debounce work not initialized"),
        }
    }
}
