//! Phase status update — `phasekeeper update`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::warn;

use phasekeeper::config::Config;
use phasekeeper::orchestrator::{Orchestrator, UpdateRequest};
use phasekeeper::signals::SignalOverrides;

use super::super::UpdateArgs;

/// `--tests-passed` and `--tests-failed` are mutually exclusive; neither
/// means "not supplied".
fn tests_override(passed: bool, failed: bool) -> Option<bool> {
    match (passed, failed) {
        (true, _) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

pub fn cmd_update(project_dir: &Path, config_path: Option<&Path>, args: &UpdateArgs) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), config_path.map(Path::to_path_buf))?
        .with_cli_overrides(args.intel_path.clone(), args.no_lock);
    for warning in config.validate() {
        warn!("{}", warning);
    }

    let orchestrator = Orchestrator::from_config(&config);
    let request = UpdateRequest {
        state_file: args.state_file.clone(),
        phase_id: args.phase_id.clone(),
        status: args.status.clone(),
        make_current: args.make_current,
        overrides: SignalOverrides {
            tests_passed: tests_override(args.tests_passed, args.tests_failed),
            warnings: args.warnings,
            errors: args.errors,
        },
        summary: args.summary.clone(),
        subsystem: args.subsystem,
    };

    let state = orchestrator.update_phase(&request)?;
    println!("{}", state.confirmation());

    let intel = orchestrator.record_intel(&request, &state).with_context(|| {
        format!(
            "{} was updated, but the intel log update failed",
            state.state_file.display()
        )
    })?;
    if let Some(intel) = intel {
        println!("{}", intel.confirmation());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tests_override_tri_state() {
        assert_eq!(tests_override(true, false), Some(true));
        assert_eq!(tests_override(false, true), Some(false));
        assert_eq!(tests_override(false, false), None);
    }
}
