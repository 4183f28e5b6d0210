//! Configuration view and validation commands — `phasekeeper config`.

use anyhow::Result;
use std::path::Path;

use phasekeeper::config::{CONFIG_FILE, Config, KeeperToml};

use super::super::ConfigCommands;

fn print_toml(toml: &KeeperToml) {
    println!("[intel]");
    println!("  path = \"{}\"", toml.intel.path.display());
    println!();
    println!("[subsystems]");
    println!("  backend = {:?}", toml.subsystems.backend);
    println!("  frontend = {:?}", toml.subsystems.frontend);
    println!();
    println!("[persistence]");
    println!("  lock = {}", toml.persistence.lock);
    println!();
}

pub fn cmd_config(
    project_dir: &Path,
    config_path: Option<&Path>,
    command: Option<ConfigCommands>,
) -> Result<()> {
    let config = Config::new(project_dir.to_path_buf(), config_path.map(Path::to_path_buf))?;

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("phasekeeper Configuration");
            println!("=========================");
            println!();

            if config.config_file_exists() {
                println!("Config file: {}", config.config_path.display());
            } else {
                println!("No {} found at {}", CONFIG_FILE, config.config_path.display());
                println!("Using default configuration:");
            }
            println!();
            print_toml(&config.toml);

            println!("Effective values (with env/CLI overrides):");
            println!("  intel path = \"{}\"", config.intel_path().display());
            println!("  lock = {}", config.locking());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config.config_file_exists() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if config.config_file_exists() {
                println!(
                    "{} already exists at {}",
                    CONFIG_FILE,
                    config.config_path.display()
                );
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            KeeperToml::default().save(&config.config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config.config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [intel] path");
            println!("  - [subsystems] backend, frontend file-name patterns");
            println!("  - [persistence] lock");
            println!();
        }
    }

    Ok(())
}
