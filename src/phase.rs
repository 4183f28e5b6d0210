//! Phase state documents.
//!
//! A state document maps phase ids to phase records and carries a single
//! `current_phase` pointer. One document exists per subsystem, e.g.
//!
//! ```yaml
//! current_phase: backend_phase_1
//! phases:
//!   backend_phase_1:
//!     name: Foundations
//!     status: in_progress
//!   backend_phase_2:
//!     name: Ingestion
//!     status: not_started
//! ```
//!
//! The document is kept as its raw mapping, in file order. A status change
//! writes the phase's `status` and, on request, `current_phase`; every other
//! key is saved back exactly as it was loaded. [`PhaseRecord`] is a
//! read-only view used for reporting and listings.

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{key, scalar_text};
use crate::errors::StateError;

const PHASES: &str = "phases";
const CURRENT_PHASE: &str = "current_phase";
const NAME: &str = "name";
const STATUS: &str = "status";

/// Lifecycle status of a phase.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    NotStarted,
    InProgress,
    Done,
    Blocked,
}

impl PhaseStatus {
    pub const ALL: [PhaseStatus; 4] = [
        PhaseStatus::NotStarted,
        PhaseStatus::InProgress,
        PhaseStatus::Done,
        PhaseStatus::Blocked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "not_started",
            PhaseStatus::InProgress => "in_progress",
            PhaseStatus::Done => "done",
            PhaseStatus::Blocked => "blocked",
        }
    }

    /// Only `done` triggers an intelligence log write.
    pub fn is_done(self) -> bool {
        self == PhaseStatus::Done
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PhaseStatus {
    type Err = StateError;

    /// Exact match only; `Done` or ` done` are rejected, not coerced.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StateError::InvalidStatus {
                status: s.to_string(),
            })
    }
}

/// Recorded status of a raw phase record, if it is one of the vocabulary.
fn recorded_status(record: &Value) -> Option<PhaseStatus> {
    record
        .get(STATUS)
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
}

/// A phase entry as seen by listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseRecord {
    /// Display name; falls back to the phase id when absent.
    pub name: Option<String>,
    /// `None` when the record has no status, or one outside the vocabulary.
    pub status: Option<PhaseStatus>,
}

impl PhaseRecord {
    pub fn new(name: impl Into<String>, status: PhaseStatus) -> Self {
        Self {
            name: Some(name.into()),
            status: Some(status),
        }
    }

    fn from_value(record: &Value) -> Self {
        Self {
            name: record.get(NAME).and_then(scalar_text),
            status: recorded_status(record),
        }
    }

    fn to_value(&self) -> Value {
        let mut record = Mapping::new();
        if let Some(name) = &self.name {
            record.insert(key(NAME), Value::from(name.as_str()));
        }
        if let Some(status) = self.status {
            record.insert(key(STATUS), Value::from(status.as_str()));
        }
        Value::Mapping(record)
    }

    /// A record without a recognised status has not been started.
    pub fn effective_status(&self) -> PhaseStatus {
        self.status.unwrap_or_default()
    }

    pub fn display_name<'a>(&'a self, phase_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(phase_id)
    }
}

/// A per-subsystem phase state document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDocument {
    root: Mapping,
}

/// Result of a successful status change, for caller reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseUpdate {
    pub phase_id: String,
    pub phase_name: String,
    /// `None` when the phase had no recognised status before the change.
    pub old_status: Option<PhaseStatus>,
    pub new_status: PhaseStatus,
    pub made_current: bool,
}

impl StateDocument {
    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    /// Build a document from `(id, record)` pairs.
    pub fn with_phases<I>(phases: I) -> Self
    where
        I: IntoIterator<Item = (String, PhaseRecord)>,
    {
        let phases: Mapping = phases
            .into_iter()
            .map(|(id, record)| (Value::String(id), record.to_value()))
            .collect();
        let mut root = Mapping::new();
        root.insert(key(PHASES), Value::Mapping(phases));
        Self { root }
    }

    /// `None` when `phases` is absent or is not a mapping.
    fn phases_mapping(&self) -> Option<&Mapping> {
        self.root.get(PHASES)?.as_mapping()
    }

    /// Phases in document order, or `None` without a `phases` mapping.
    pub fn phases(&self) -> Option<Vec<(String, PhaseRecord)>> {
        let phases = self.phases_mapping()?;
        Some(
            phases
                .iter()
                .filter_map(|(id, record)| {
                    scalar_text(id).map(|id| (id, PhaseRecord::from_value(record)))
                })
                .collect(),
        )
    }

    pub fn phase(&self, phase_id: &str) -> Option<PhaseRecord> {
        self.phases_mapping()?
            .get(phase_id)
            .map(PhaseRecord::from_value)
    }

    pub fn current_phase(&self) -> Option<&str> {
        self.root.get(CURRENT_PHASE)?.as_str()
    }

    /// Phase count per status, in status order.
    pub fn status_counts(&self) -> BTreeMap<PhaseStatus, usize> {
        let mut counts = BTreeMap::new();
        for (_, record) in self.phases().unwrap_or_default() {
            *counts.entry(record.effective_status()).or_insert(0) += 1;
        }
        counts
    }

    /// Validate and apply a status change given as a raw string.
    ///
    /// Checks run in order: `phases` mapping present, phase id known, status
    /// valid. Every check happens before the first write, so on error the
    /// document is untouched. `origin` only labels errors.
    pub fn update(
        &mut self,
        origin: &Path,
        phase_id: &str,
        new_status: &str,
        make_current: bool,
    ) -> Result<PhaseUpdate, StateError> {
        self.ensure_phase(origin, phase_id)?;
        let status: PhaseStatus = new_status.parse()?;
        self.set_status(origin, phase_id, status, make_current)
    }

    /// Apply an already-validated status change.
    pub fn set_status(
        &mut self,
        origin: &Path,
        phase_id: &str,
        new_status: PhaseStatus,
        make_current: bool,
    ) -> Result<PhaseUpdate, StateError> {
        self.ensure_phase(origin, phase_id)?;
        let slot = self
            .root
            .get_mut(PHASES)
            .and_then(|phases| phases.get_mut(phase_id))
            .ok_or_else(|| unknown_phase(origin, phase_id))?;

        // `p1:` with no body is an empty record.
        if slot.is_null() {
            *slot = Value::Mapping(Mapping::new());
        }
        let old_status = recorded_status(slot);
        let phase_name = slot
            .get(NAME)
            .and_then(scalar_text)
            .unwrap_or_else(|| phase_id.to_string());

        let record = slot
            .as_mapping_mut()
            .ok_or_else(|| not_a_mapping(origin, phase_id))?;
        record.insert(key(STATUS), Value::from(new_status.as_str()));

        if make_current {
            self.root.insert(key(CURRENT_PHASE), Value::from(phase_id));
        }

        Ok(PhaseUpdate {
            phase_id: phase_id.to_string(),
            phase_name,
            old_status,
            new_status,
            made_current: make_current,
        })
    }

    fn ensure_phase(&self, origin: &Path, phase_id: &str) -> Result<(), StateError> {
        let phases = self
            .phases_mapping()
            .ok_or_else(|| StateError::MissingPhasesSection {
                path: origin.to_path_buf(),
            })?;

        match phases.get(phase_id) {
            None => Err(unknown_phase(origin, phase_id)),
            Some(Value::Mapping(_)) | Some(Value::Null) => Ok(()),
            Some(_) => Err(not_a_mapping(origin, phase_id)),
        }
    }
}

fn unknown_phase(origin: &Path, phase_id: &str) -> StateError {
    StateError::UnknownPhase {
        phase_id: phase_id.to_string(),
        path: origin.to_path_buf(),
    }
}

fn not_a_mapping(origin: &Path, phase_id: &str) -> StateError {
    StateError::Parse {
        path: origin.to_path_buf(),
        message: format!("phase '{}' is not a mapping", phase_id),
    }
}
