#![no_std]

// Shared logic for the power gate: the debounced flag register, the idle-depth
// selector, and the cluster migration gate.
//
// This crate stays portable across MCU firmware and host tooling by avoiding the
// Rust standard library. Hardware access is expressed through the platform
// traits in [`idle`] and [`cluster`] so firmware and the emulator can plug in
// their own backends.

pub mod cluster;
pub mod config;
pub mod debounce;
pub mod error;
pub mod flags;
pub mod gate;
pub mod idle;
pub mod repl;
pub mod suspend;
pub mod telemetry;
