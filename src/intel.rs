//! Intelligence log: per (subsystem, phase) quality signals.
//!
//! The log is one shared document with an ordered `entries` list:
//!
//! ```yaml
//! entries:
//!   - subsystem: backend
//!     phase_id: backend_phase_1
//!     phase_name: Foundations
//!     status: done
//!     timestamp: 2026-01-12T09:30:00+00:00
//!     signals:
//!       tests_passed: true
//!       warnings: 1
//!       errors: 0
//!     summary: Backend data foundations built
//! ```
//!
//! Entries are appended in insertion order and updated in place; there is
//! at most one entry per (subsystem, phase_id). Other tools write to the same
//! log, so entries are kept as raw mappings: an upsert reads only
//! `subsystem` and `phase_id` to find its entry and leaves every other entry
//! byte-for-byte as loaded. [`IntelEntry`] is a read-only view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use crate::document::{key, scalar_text};
use crate::phase::PhaseStatus;
use crate::signals::{SignalOverrides, Signals};
use crate::subsystem::Subsystem;

const ENTRIES: &str = "entries";
const SUBSYSTEM: &str = "subsystem";
const PHASE_ID: &str = "phase_id";
const PHASE_NAME: &str = "phase_name";
const STATUS: &str = "status";
const TIMESTAMP: &str = "timestamp";
const SIGNALS: &str = "signals";
const SUMMARY: &str = "summary";

fn entry_matches(entry: &Value, subsystem: &str, phase_id: &str) -> bool {
    entry.get(SUBSYSTEM).and_then(Value::as_str) == Some(subsystem)
        && entry.get(PHASE_ID).and_then(Value::as_str) == Some(phase_id)
}

/// A single intelligence log entry, as read for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntelEntry {
    pub subsystem: String,
    pub phase_id: String,
    pub phase_name: String,
    /// `None` when missing or outside the status vocabulary.
    pub status: Option<PhaseStatus>,
    /// `None` when missing or not an RFC 3339 timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    pub signals: Signals,
    pub summary: String,
}

impl IntelEntry {
    /// View of a raw entry; `None` unless it names a subsystem and a phase.
    fn from_value(entry: &Value) -> Option<Self> {
        let text = |name: &str| entry.get(name).and_then(scalar_text);
        Some(Self {
            subsystem: text(SUBSYSTEM)?,
            phase_id: text(PHASE_ID)?,
            phase_name: text(PHASE_NAME).unwrap_or_default(),
            status: entry
                .get(STATUS)
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            timestamp: entry
                .get(TIMESTAMP)
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|t| t.with_timezone(&Utc)),
            signals: Signals::from_recorded(entry.get(SIGNALS)),
            summary: text(SUMMARY).unwrap_or_default(),
        })
    }
}

/// The shared intelligence log document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntelLogDocument {
    root: Mapping,
}

/// Arguments for [`IntelLogDocument::upsert`].
#[derive(Debug, Clone)]
pub struct IntelUpsert<'a> {
    pub subsystem: Subsystem,
    pub phase_id: &'a str,
    pub phase_name: &'a str,
    pub status: PhaseStatus,
    pub overrides: SignalOverrides,
    /// Empty strings count as not supplied.
    pub summary: Option<&'a str>,
}

impl IntelUpsert<'_> {
    fn supplied_summary(&self) -> Option<&str> {
        self.summary.filter(|s| !s.is_empty())
    }

    fn generated_summary(&self) -> String {
        format!(
            "Phase {} ({}) marked as {}.",
            self.phase_id, self.phase_name, self.status
        )
    }

    fn new_entry(&self, timestamp: &str) -> Mapping {
        let summary = self
            .supplied_summary()
            .map(str::to_string)
            .unwrap_or_else(|| self.generated_summary());

        let mut entry = Mapping::new();
        entry.insert(key(SUBSYSTEM), Value::from(self.subsystem.as_str()));
        entry.insert(key(PHASE_ID), Value::from(self.phase_id));
        entry.insert(key(PHASE_NAME), Value::from(self.phase_name));
        entry.insert(key(STATUS), Value::from(self.status.as_str()));
        entry.insert(key(TIMESTAMP), Value::from(timestamp));
        entry.insert(key(SIGNALS), Value::Mapping(Signals::default().to_mapping()));
        entry.insert(key(SUMMARY), Value::from(summary));
        entry
    }

    /// Overwrite the fields an upsert owns on an existing entry.
    fn apply(&self, entry: &mut Mapping, timestamp: &str) {
        let mut signals = match entry.get(SIGNALS) {
            Some(Value::Mapping(signals)) => signals.clone(),
            _ => Mapping::new(),
        };
        self.overrides.apply_to(&mut signals);

        entry.insert(key(SIGNALS), Value::Mapping(signals));
        entry.insert(key(STATUS), Value::from(self.status.as_str()));
        entry.insert(key(PHASE_NAME), Value::from(self.phase_name));
        entry.insert(key(TIMESTAMP), Value::from(timestamp));
        if let Some(summary) = self.supplied_summary() {
            entry.insert(key(SUMMARY), Value::from(summary));
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

impl std::fmt::Display for UpsertOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpsertOutcome::Created => write!(f, "created"),
            UpsertOutcome::Updated => write!(f, "updated"),
        }
    }
}

impl IntelLogDocument {
    pub fn as_mapping(&self) -> &Mapping {
        &self.root
    }

    /// Raw entries; a missing or non-list `entries` key reads as empty.
    fn raw_entries(&self) -> &[Value] {
        match self.root.get(ENTRIES) {
            Some(Value::Sequence(entries)) => entries.as_slice(),
            _ => &[],
        }
    }

    /// Entries that name a subsystem and a phase, in log order.
    pub fn entries(&self) -> Vec<IntelEntry> {
        self.raw_entries()
            .iter()
            .filter_map(IntelEntry::from_value)
            .collect()
    }

    pub fn find(&self, subsystem: &str, phase_id: &str) -> Option<IntelEntry> {
        self.raw_entries()
            .iter()
            .find(|e| entry_matches(e, subsystem, phase_id))
            .and_then(IntelEntry::from_value)
    }

    /// Entries for one subsystem, in log order.
    pub fn for_subsystem(&self, subsystem: &str) -> Vec<IntelEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.subsystem == subsystem)
            .collect()
    }

    /// Insert or update the entry for `(subsystem, phase_id)`.
    ///
    /// Supplied overrides replace recorded signals; unsupplied ones keep
    /// them. `status`, `phase_name` and `timestamp` are always refreshed;
    /// `summary` only when a non-empty one is given.
    pub fn upsert(&mut self, request: &IntelUpsert<'_>, now: DateTime<Utc>) -> UpsertOutcome {
        let subsystem = request.subsystem.as_str();
        let timestamp = now.to_rfc3339();

        let mut entries = match self.root.get_mut(ENTRIES) {
            Some(Value::Sequence(entries)) => std::mem::take(entries),
            _ => Vec::new(),
        };

        let outcome = match entries
            .iter_mut()
            .find(|e| entry_matches(e, subsystem, request.phase_id))
        {
            Some(Value::Mapping(entry)) => {
                request.apply(entry, &timestamp);
                UpsertOutcome::Updated
            }
            _ => {
                entries.push(Value::Mapping(request.new_entry(&timestamp)));
                UpsertOutcome::Created
            }
        };

        self.root.insert(key(ENTRIES), Value::Sequence(entries));

        debug!(
            "Intel entry {} for {}/{}: {}",
            outcome,
            subsystem,
            request.phase_id,
            self.find(subsystem, request.phase_id)
                .map(|e| e.signals)
                .unwrap_or_default()
                .summary()
        );
        outcome
    }
}
