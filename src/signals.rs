//! Quality signals attached to a completed phase.
//!
//! [`Signals`] is the last recorded value for a (subsystem, phase) pair;
//! [`SignalOverrides`] is what a CI run reports, where every field may be
//! left out independently.

use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::document::key;

const TESTS_PASSED: &str = "tests_passed";
const WARNINGS: &str = "warnings";
const ERRORS: &str = "errors";

/// Last known test/warning/error signal for a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Signals {
    pub tests_passed: bool,
    pub warnings: u64,
    pub errors: u64,
}

impl Signals {
    /// Read a recorded `signals` value. Fields that are missing, or not of
    /// the expected type, default independently.
    pub fn from_recorded(value: Option<&Value>) -> Self {
        let defaults = Signals::default();
        let null = Value::Null;
        let value = value.unwrap_or(&null);
        Self {
            tests_passed: value
                .get(TESTS_PASSED)
                .and_then(Value::as_bool)
                .unwrap_or(defaults.tests_passed),
            warnings: value
                .get(WARNINGS)
                .and_then(Value::as_u64)
                .unwrap_or(defaults.warnings),
            errors: value
                .get(ERRORS)
                .and_then(Value::as_u64)
                .unwrap_or(defaults.errors),
        }
    }

    pub fn to_mapping(self) -> Mapping {
        let mut mapping = Mapping::new();
        mapping.insert(key(TESTS_PASSED), Value::Bool(self.tests_passed));
        mapping.insert(key(WARNINGS), Value::from(self.warnings));
        mapping.insert(key(ERRORS), Value::from(self.errors));
        mapping
    }

    /// One-line summary for terminal output.
    pub fn summary(&self) -> String {
        format!(
            "tests {}, {} warning{}, {} error{}",
            if self.tests_passed { "passed" } else { "not passed" },
            self.warnings,
            if self.warnings == 1 { "" } else { "s" },
            self.errors,
            if self.errors == 1 { "" } else { "s" }
        )
    }
}

/// Partial signal update. `None` means "not supplied".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalOverrides {
    pub tests_passed: Option<bool>,
    pub warnings: Option<u64>,
    pub errors: Option<u64>,
}

impl SignalOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.tests_passed.is_none() && self.warnings.is_none() && self.errors.is_none()
    }

    pub fn tests_passed(mut self, passed: bool) -> Self {
        self.tests_passed = Some(passed);
        self
    }

    pub fn warnings(mut self, count: u64) -> Self {
        self.warnings = Some(count);
        self
    }

    pub fn errors(mut self, count: u64) -> Self {
        self.errors = Some(count);
        self
    }

    /// Merge into a recorded `signals` mapping in place.
    ///
    /// Missing fields are backfilled with defaults, supplied overrides
    /// replace the recorded value, and everything else is left as it is.
    pub fn apply_to(&self, recorded: &mut Mapping) {
        for (name, default) in Signals::default().to_mapping() {
            if !recorded.contains_key(&name) {
                recorded.insert(name, default);
            }
        }
        if let Some(tests_passed) = self.tests_passed {
            recorded.insert(key(TESTS_PASSED), Value::Bool(tests_passed));
        }
        if let Some(warnings) = self.warnings {
            recorded.insert(key(WARNINGS), Value::from(warnings));
        }
        if let Some(errors) = self.errors {
            recorded.insert(key(ERRORS), Value::from(errors));
        }
    }
}
