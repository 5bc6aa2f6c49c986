//! Diagnostics console tooling shared between firmware and emulator targets.
//!
//! The grammar lives in [`grammar`]; [`catalog`] lists the commands and their
//! usage strings, and [`status`] renders the gate state for the `status`
//! command.

pub mod catalog;
pub mod completion;
pub mod grammar;
pub mod status;
