//! # LogSplitter Control Unit Library
//!
//! Control core for a two-stage hydraulic log-splitter: a single-threaded
//! polling loop that scans debounced operator/limit inputs, reads filtered
//! hydraulic pressure, and drives the extend/retract valve relays through
//! an interlock-aware gate.
//!
//! ## Architecture
//!
//! 1. **SequenceController** — the two-stage run state machine
//! 2. **SafetySystem** — over-pressure interlock with hysteresis
//! 3. **EmergencyStop** — live/latched e-stop with explicit reset
//! 4. **RelayController** — origin-aware, idempotent actuator gate
//!
//! ## Single-Writer Model
//!
//! Everything mutates on the one control thread. Per cycle the order is
//! fixed: inputs are scanned, the e-stop edge is handled before any other
//! input, the safety interlock is evaluated against the latest pressure,
//! and only then is the sequence machine advanced — a newly detected
//! over-pressure condition aborts a run in the same cycle it is seen.

#![deny(clippy::disallowed_types)]

pub mod command;
pub mod config;
pub mod cycle;
pub mod fault;
pub mod input;
pub mod pressure;
pub mod relay;
pub mod safety;
pub mod sequence;
pub mod sim;
