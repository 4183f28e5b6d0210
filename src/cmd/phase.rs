//! Read-only views — `phasekeeper status` and `phasekeeper intel`.

use anyhow::{Context, Result};
use console::style;
use std::path::{Path, PathBuf};

use phasekeeper::StateError;
use phasekeeper::config::Config;
use phasekeeper::document::DocumentStore;
use phasekeeper::intel::{IntelEntry, IntelLogDocument};
use phasekeeper::phase::{PhaseStatus, StateDocument};
use phasekeeper::subsystem::Subsystem;

fn styled_status(status: PhaseStatus) -> String {
    let padded = format!("{:<12}", status);
    match status {
        PhaseStatus::Done => style(padded).green().to_string(),
        PhaseStatus::InProgress => style(padded).yellow().to_string(),
        PhaseStatus::Blocked => style(padded).red().to_string(),
        PhaseStatus::NotStarted => style(padded).dim().to_string(),
    }
}

fn styled_recorded_status(status: Option<PhaseStatus>) -> String {
    match status {
        Some(status) => styled_status(status),
        None => style(format!("{:<12}", "-")).dim().to_string(),
    }
}

pub fn cmd_status(state_file: &Path) -> Result<()> {
    let store = DocumentStore::new(state_file);
    if !store.exists() {
        return Err(StateError::StateFileNotFound {
            path: state_file.to_path_buf(),
        }
        .into());
    }

    let doc: StateDocument = store.load()?;
    let phases = doc
        .phases()
        .ok_or_else(|| StateError::MissingPhasesSection {
            path: state_file.to_path_buf(),
        })?;

    println!();
    println!("State file:    {}", state_file.display());
    println!(
        "Current phase: {}",
        doc.current_phase().unwrap_or("(none)")
    );
    println!();

    if phases.is_empty() {
        println!("No phases defined.");
        println!();
        return Ok(());
    }

    println!("  {:<24} {:<12} Name", "Phase", "Status");
    println!("  {:<24} {:<12} ----", "-".repeat(24), "-".repeat(12));
    for (phase_id, record) in &phases {
        // `*` marks the current phase
        let marker = if doc.current_phase() == Some(phase_id.as_str()) {
            "*"
        } else {
            " "
        };
        println!(
            "{} {:<24} {} {}",
            marker,
            phase_id,
            styled_status(record.effective_status()),
            record.display_name(phase_id)
        );
    }
    println!();

    let counts = doc.status_counts();
    let breakdown: Vec<String> = counts
        .iter()
        .map(|(status, count)| format!("{} {}", count, status))
        .collect();
    println!(
        "{} phase{}: {}",
        phases.len(),
        if phases.len() == 1 { "" } else { "s" },
        breakdown.join(", ")
    );
    println!();
    Ok(())
}

pub fn cmd_intel(
    project_dir: &Path,
    config_path: Option<&Path>,
    intel_path: Option<PathBuf>,
    subsystem: Option<Subsystem>,
    json: bool,
) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), config_path.map(Path::to_path_buf))?
        .with_cli_overrides(intel_path, false);
    let log_path = config.intel_path();

    let log: IntelLogDocument = DocumentStore::new(&log_path).load()?;
    let entries: Vec<IntelEntry> = match subsystem {
        Some(subsystem) => log.for_subsystem(subsystem.as_str()),
        None => log.entries(),
    };

    if json {
        let rendered =
            serde_json::to_string_pretty(&entries).context("Failed to serialize intel entries")?;
        println!("{}", rendered);
        return Ok(());
    }

    println!();
    println!("Intel log: {}", log_path.display());
    println!();

    if entries.is_empty() {
        println!("No intel entries found.");
        println!();
        return Ok(());
    }

    println!(
        "{:<10} {:<24} {:<12} {:<17} Signals",
        "Subsystem", "Phase", "Status", "Updated"
    );
    println!(
        "{:<10} {:<24} {:<12} {:<17} -------",
        "-".repeat(10),
        "-".repeat(24),
        "-".repeat(12),
        "-".repeat(17)
    );
    for entry in &entries {
        println!(
            "{:<10} {:<24} {} {:<17} {}",
            entry.subsystem,
            entry.phase_id,
            styled_recorded_status(entry.status),
            entry
                .timestamp
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "-".to_string()),
            entry.signals.summary()
        );
        if !entry.summary.is_empty() {
            println!("           {}", style(&entry.summary).dim());
        }
    }
    println!();
    Ok(())
}
