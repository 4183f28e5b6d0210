use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::Config;
use crate::document::DocumentStore;
use crate::errors::StateError;
use crate::intel::{IntelLogDocument, IntelUpsert, UpsertOutcome};
use crate::phase::{PhaseUpdate, StateDocument};
use crate::signals::{SignalOverrides, Signals};
use crate::subsystem::{SubstringClassifier, Subsystem, SubsystemClassifier};

/// One status change plus the CI signals that go with it.
#[derive(Debug, Clone)]
pub struct UpdateRequest {
    pub state_file: PathBuf,
    pub phase_id: String,
    /// Raw status; validated against the status vocabulary.
    pub status: String,
    pub make_current: bool,
    pub overrides: SignalOverrides,
    pub summary: Option<String>,
    /// Skips the classifier when set.
    pub subsystem: Option<Subsystem>,
}

impl UpdateRequest {
    pub fn new(
        state_file: impl Into<PathBuf>,
        phase_id: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        Self {
            state_file: state_file.into(),
            phase_id: phase_id.into(),
            status: status.into(),
            make_current: false,
            overrides: SignalOverrides::none(),
            summary: None,
            subsystem: None,
        }
    }
}

/// Outcome of the phase state step.
#[derive(Debug, Clone)]
pub struct PhaseStateReport {
    pub state_file: PathBuf,
    pub update: PhaseUpdate,
}

impl PhaseStateReport {
    pub fn confirmation(&self) -> String {
        format!(
            "Updated {}: phase '{}' status = '{}'{}",
            self.state_file.display(),
            self.update.phase_id,
            self.update.new_status,
            if self.update.made_current {
                " and set as current_phase"
            } else {
                ""
            }
        )
    }
}

/// Outcome of the intelligence log step.
#[derive(Debug, Clone)]
pub struct IntelReport {
    pub subsystem: Subsystem,
    pub phase_id: String,
    pub log_path: PathBuf,
    pub outcome: UpsertOutcome,
    pub signals: Signals,
}

impl IntelReport {
    pub fn confirmation(&self) -> String {
        format!(
            "Intel log updated for subsystem='{}', phase='{}' in {}",
            self.subsystem,
            self.phase_id,
            self.log_path.display()
        )
    }
}

#[derive(Debug, Clone)]
pub struct UpdateReport {
    pub state: PhaseStateReport,
    /// `None` unless the phase moved to `done`.
    pub intel: Option<IntelReport>,
}

/// Sequences the phase state update and the intelligence log upsert.
///
/// The two documents are persisted independently: once the state step has
/// committed, a failure in the intel step does not undo it.
pub struct Orchestrator {
    intel_path: PathBuf,
    locking: bool,
    classifier: Box<dyn SubsystemClassifier>,
}

impl Orchestrator {
    pub fn new(intel_path: impl Into<PathBuf>) -> Self {
        Self {
            intel_path: intel_path.into(),
            locking: true,
            classifier: Box::new(SubstringClassifier::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.intel_path())
            .with_locking(config.locking())
            .with_classifier(config.classifier())
    }

    pub fn with_locking(mut self, locking: bool) -> Self {
        self.locking = locking;
        self
    }

    pub fn with_classifier(mut self, classifier: impl SubsystemClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn intel_path(&self) -> &Path {
        &self.intel_path
    }

    /// Explicit subsystem if given, otherwise the classifier's guess.
    pub fn subsystem_for(&self, request: &UpdateRequest) -> Subsystem {
        request
            .subsystem
            .unwrap_or_else(|| self.classifier.classify(&request.state_file))
    }

    /// Run both steps.
    pub fn run(&self, request: &UpdateRequest) -> Result<UpdateReport, StateError> {
        let state = self.update_phase(request)?;
        let intel = self.record_intel(request, &state)?;
        Ok(UpdateReport { state, intel })
    }

    /// Load, validate, mutate and persist the state document.
    pub fn update_phase(&self, request: &UpdateRequest) -> Result<PhaseStateReport, StateError> {
        let store = DocumentStore::new(&request.state_file).with_locking(self.locking);
        if !store.exists() {
            return Err(StateError::StateFileNotFound {
                path: request.state_file.clone(),
            });
        }

        let mut checkout = store.checkout::<StateDocument>()?;
        let update = checkout.document.update(
            &request.state_file,
            &request.phase_id,
            &request.status,
            request.make_current,
        )?;
        checkout.commit()?;

        info!(
            phase = %update.phase_id,
            from = update.old_status.map_or("(unset)", |s| s.as_str()),
            to = %update.new_status,
            "Updated {}",
            request.state_file.display()
        );

        Ok(PhaseStateReport {
            state_file: request.state_file.clone(),
            update,
        })
    }

    /// Upsert the intelligence log entry. Does nothing unless the phase is now `done`.
    pub fn record_intel(
        &self,
        request: &UpdateRequest,
        state: &PhaseStateReport,
    ) -> Result<Option<IntelReport>, StateError> {
        if !state.update.new_status.is_done() {
            debug!(
                "Phase {} is {}; intel log left untouched",
                state.update.phase_id, state.update.new_status
            );
            return Ok(None);
        }

        let subsystem = self.subsystem_for(request);
        let store = DocumentStore::new(&self.intel_path).with_locking(self.locking);
        let mut checkout = store.checkout::<IntelLogDocument>()?;

        let upsert = IntelUpsert {
            subsystem,
            phase_id: &state.update.phase_id,
            phase_name: &state.update.phase_name,
            status: state.update.new_status,
            overrides: request.overrides,
            summary: request.summary.as_deref(),
        };
        let outcome = checkout.document.upsert(&upsert, Utc::now());
        let signals = checkout
            .document
            .find(subsystem.as_str(), &state.update.phase_id)
            .map(|entry| entry.signals)
            .unwrap_or_default();
        checkout.commit()?;

        info!(
            %subsystem,
            phase = %state.update.phase_id,
            %outcome,
            "Intel log {}",
            self.intel_path.display()
        );

        Ok(Some(IntelReport {
            subsystem,
            phase_id: state.update.phase_id.clone(),
            log_path: self.intel_path.clone(),
            outcome,
            signals,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::PhaseStatus;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    const FOUNDATIONS: &str = r#"{"phases": {"backend_phase_1": {"name": "Foundations", "status": "in_progress"}}}"#;

    struct Project {
        dir: TempDir,
    }

    impl Project {
        fn new() -> Self {
            let dir = tempdir().unwrap();
            fs::create_dir_all(dir.path().join("state")).unwrap();
            Self { dir }
        }

        fn state_file(&self, name: &str, content: &str) -> PathBuf {
            let path = self.dir.path().join("state").join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn intel_path(&self) -> PathBuf {
            self.dir.path().join("state").join("cursor_intel.mdc")
        }

        fn orchestrator(&self) -> Orchestrator {
            Orchestrator::new(self.intel_path())
        }

        fn intel(&self) -> IntelLogDocument {
            DocumentStore::new(self.intel_path()).load().unwrap()
        }

        fn state(&self, path: &Path) -> StateDocument {
            DocumentStore::new(path).load().unwrap()
        }
    }

    #[test]
    fn test_end_to_end_done_with_ci_signals() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);

        let mut request = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        request.make_current = true;
        request.overrides = SignalOverrides::none()
            .tests_passed(true)
            .warnings(1)
            .errors(0);
        request.summary = Some("Backend data foundations built".to_string());

        let report = project.orchestrator().run(&request).unwrap();

        assert_eq!(report.state.update.old_status, Some(PhaseStatus::InProgress));
        let state = project.state(&state_file);
        assert_eq!(
            state.phase("backend_phase_1").unwrap().status,
            Some(PhaseStatus::Done)
        );
        assert_eq!(state.current_phase(), Some("backend_phase_1"));

        let intel = report.intel.expect("intel report");
        assert_eq!(intel.subsystem, Subsystem::Backend);
        assert_eq!(intel.outcome, UpsertOutcome::Created);

        let entries = project.intel().entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.subsystem, "backend");
        assert_eq!(entry.phase_id, "backend_phase_1");
        assert_eq!(entry.phase_name, "Foundations");
        assert_eq!(
            entry.signals,
            Signals {
                tests_passed: true,
                warnings: 1,
                errors: 0
            }
        );
        assert_eq!(entry.summary, "Backend data foundations built");
    }

    #[test]
    fn test_non_done_status_leaves_intel_log_alone() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);

        let request = UpdateRequest::new(&state_file, "backend_phase_1", "blocked");
        let report = project.orchestrator().run(&request).unwrap();

        assert!(report.intel.is_none());
        assert!(!project.intel_path().exists());
        assert_eq!(
            project.state(&state_file).phase("backend_phase_1").unwrap().status,
            Some(PhaseStatus::Blocked)
        );
    }

    #[test]
    fn test_missing_state_file_is_reported_first() {
        let project = Project::new();
        let missing = project.dir.path().join("state").join("backend_state.mdc");

        let err = project
            .orchestrator()
            .run(&UpdateRequest::new(&missing, "backend_phase_1", "not-a-status"))
            .unwrap_err();

        assert!(matches!(err, StateError::StateFileNotFound { .. }));
        assert!(!missing.exists());
    }

    #[test]
    fn test_rejected_update_persists_nothing() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);

        for (phase_id, status) in [("backend_phase_7", "done"), ("backend_phase_1", "complete")] {
            let err = project
                .orchestrator()
                .run(&UpdateRequest::new(&state_file, phase_id, status))
                .unwrap_err();
            assert!(matches!(
                err,
                StateError::UnknownPhase { .. } | StateError::InvalidStatus { .. }
            ));
        }

        assert_eq!(fs::read_to_string(&state_file).unwrap(), FOUNDATIONS);
        assert!(!project.intel_path().exists());
    }

    #[test]
    fn test_repeated_done_updates_single_entry() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);
        let orchestrator = project.orchestrator();

        let mut first = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        first.overrides = SignalOverrides::none().warnings(3).tests_passed(true);
        orchestrator.run(&first).unwrap();

        let mut second = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        second.overrides = SignalOverrides::none().errors(2);
        let report = orchestrator.run(&second).unwrap();

        let intel = report.intel.unwrap();
        assert_eq!(intel.outcome, UpsertOutcome::Updated);
        assert_eq!(
            intel.signals,
            Signals {
                tests_passed: true,
                warnings: 3,
                errors: 2
            }
        );
        assert_eq!(project.intel().entries().len(), 1);
    }

    #[test]
    fn test_explicit_subsystem_bypasses_classifier() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);

        let mut request = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        request.subsystem = Some(Subsystem::Frontend);
        project.orchestrator().run(&request).unwrap();

        assert!(project.intel().find("frontend", "backend_phase_1").is_some());
        assert!(project.intel().find("backend", "backend_phase_1").is_none());
    }

    #[test]
    fn test_custom_classifier() {
        let project = Project::new();
        let state_file = project.state_file("api_state.mdc", &FOUNDATIONS.replace("backend_phase_1", "api_1"));

        let orchestrator = project.orchestrator().with_classifier(SubstringClassifier::new(
            vec!["api".to_string()],
            vec![],
        ));
        let report = orchestrator
            .run(&UpdateRequest::new(&state_file, "api_1", "done"))
            .unwrap();

        assert_eq!(report.intel.unwrap().subsystem, Subsystem::Backend);
    }

    #[test]
    fn test_intel_failure_keeps_state_update() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);

        // A directory where the log file should be makes the intel step fail.
        let blocked = project.dir.path().join("state").join("intel_dir");
        fs::create_dir_all(&blocked).unwrap();
        let orchestrator = Orchestrator::new(&blocked);

        let err = orchestrator
            .run(&UpdateRequest::new(&state_file, "backend_phase_1", "done"))
            .unwrap_err();

        assert!(matches!(err, StateError::Read { .. }));
        assert_eq!(
            project.state(&state_file).phase("backend_phase_1").unwrap().status,
            Some(PhaseStatus::Done)
        );
    }

    #[test]
    fn test_hand_written_intel_entries_do_not_block_done_updates() {
        let project = Project::new();
        let state_file = project.state_file("backend_state.mdc", FOUNDATIONS);
        let frontend_entry = "\
entries:
- subsystem: frontend
  phase_id: nextjs_phase_1
  status: done
  summary: added by hand
";
        fs::write(project.intel_path(), frontend_entry).unwrap();

        let mut request = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        request.overrides = SignalOverrides::none().tests_passed(true);
        let report = project.orchestrator().run(&request).unwrap();

        assert_eq!(report.intel.unwrap().outcome, UpsertOutcome::Created);
        let log = project.intel();
        let frontend = log.find("frontend", "nextjs_phase_1").unwrap();
        assert_eq!(frontend.timestamp, None);
        assert_eq!(frontend.summary, "added by hand");
        assert!(log.find("backend", "backend_phase_1").unwrap().signals.tests_passed);

        let text = fs::read_to_string(project.intel_path()).unwrap();
        let frontend_block = text.split("- subsystem: backend").next().unwrap();
        assert!(!frontend_block.contains("timestamp"));
        assert!(!frontend_block.contains("signals"));
    }

    #[test]
    fn test_confirmation_lines() {
        let project = Project::new();
        let state_file = project.state_file("nextjs_state.mdc", FOUNDATIONS);

        let mut request = UpdateRequest::new(&state_file, "backend_phase_1", "done");
        request.make_current = true;
        let report = project.orchestrator().with_locking(false).run(&request).unwrap();

        assert!(report.state.confirmation().ends_with(
            "phase 'backend_phase_1' status = 'done' and set as current_phase"
        ));
        let intel = report.intel.unwrap();
        assert!(
            intel
                .confirmation()
                .starts_with("Intel log updated for subsystem='frontend', phase='backend_phase_1'")
        );
    }
}
