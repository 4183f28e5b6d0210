//! Subsystem classification of state documents.
//!
//! The subsystem tag keys intelligence log entries. By default it is guessed
//! from the state document's file name; callers that know better pass a
//! [`Subsystem`] explicitly and skip the classifier entirely.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Coarse project area a phase belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Backend,
    Frontend,
    Unknown,
}

impl Subsystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Backend => "backend",
            Subsystem::Frontend => "frontend",
            Subsystem::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subsystem {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backend" => Ok(Subsystem::Backend),
            "frontend" => Ok(Subsystem::Frontend),
            "unknown" => Ok(Subsystem::Unknown),
            _ => anyhow::bail!(
                "Invalid subsystem '{}'. Valid values: backend, frontend, unknown",
                s
            ),
        }
    }
}

/// Maps a state document identity to a subsystem. Never fails; `Unknown` is
/// a valid answer.
pub trait SubsystemClassifier {
    fn classify(&self, identity: &Path) -> Subsystem;
}

/// Case-insensitive substring match on the file name. Backend patterns are
/// checked first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstringClassifier {
    backend: Vec<String>,
    frontend: Vec<String>,
}

impl SubstringClassifier {
    pub fn new(backend: Vec<String>, frontend: Vec<String>) -> Self {
        Self {
            backend: backend.into_iter().map(|p| p.to_lowercase()).collect(),
            frontend: frontend.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    pub fn backend_patterns(&self) -> &[String] {
        &self.backend
    }

    pub fn frontend_patterns(&self) -> &[String] {
        &self.frontend
    }
}

impl Default for SubstringClassifier {
    fn default() -> Self {
        Self::new(
            vec!["backend".to_string()],
            vec!["nextjs".to_string(), "frontend".to_string()],
        )
    }
}

impl SubsystemClassifier for SubstringClassifier {
    fn classify(&self, identity: &Path) -> Subsystem {
        let name = identity
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        let matches = |patterns: &[String]| {
            patterns
                .iter()
                .any(|p| !p.is_empty() && name.contains(p.as_str()))
        };

        if matches(&self.backend) {
            Subsystem::Backend
        } else if matches(&self.frontend) {
            Subsystem::Frontend
        } else {
            Subsystem::Unknown
        }
    }
}

/// Classify with the default heuristic.
pub fn derive_subsystem(identity: &Path) -> Subsystem {
    SubstringClassifier::default().classify(identity)
}
