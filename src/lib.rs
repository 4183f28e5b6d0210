pub mod config;
pub mod document;
pub mod errors;
pub mod intel;
pub mod orchestrator;
pub mod phase;
pub mod signals;
pub mod subsystem;

pub use errors::StateError;
