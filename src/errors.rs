//! Typed error hierarchy for phasekeeper.
//!
//! `StateError` covers every failure the state store, the intelligence log
//! and the shared document I/O layer can report. The CLI wraps it in
//! `anyhow` for display.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from loading, validating, mutating and persisting documents.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("State file not found: {}", path.display())]
    StateFileNotFound { path: PathBuf },

    #[error("'phases' mapping not found in {}", path.display())]
    MissingPhasesSection { path: PathBuf },

    #[error("Phase '{phase_id}' not found in {}", path.display())]
    UnknownPhase { phase_id: String, path: PathBuf },

    #[error("Status '{status}' not allowed. Use one of: blocked, done, in_progress, not_started")]
    InvalidStatus { status: String },

    #[error("{} was modified by another writer since it was loaded", path.display())]
    ConcurrentModification { path: PathBuf },

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to lock {}: {source}", path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Failed to serialize {}: {message}", path.display())]
    Serialize { path: PathBuf, message: String },
}
