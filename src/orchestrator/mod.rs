//! Update orchestration: phase state first, then (for `done`) the
//! intelligence log.

pub mod runner;

pub use runner::{IntelReport, Orchestrator, PhaseStateReport, UpdateReport, UpdateRequest};
