//! Configuration for phasekeeper.
//!
//! Settings are read from `phasekeeper.toml` in the project directory (or
//! the file given with `--config`) and layered as CLI > environment > file >
//! default.
//!
//! # Configuration File Format
//!
//! ```toml
//! [intel]
//! path = "state/cursor_intel.mdc"
//!
//! [subsystems]
//! backend = ["backend"]
//! frontend = ["nextjs", "frontend"]
//!
//! [persistence]
//! lock = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::subsystem::SubstringClassifier;

/// Default config file name, looked up in the project directory.
pub const CONFIG_FILE: &str = "phasekeeper.toml";

/// Default intelligence log location, relative to the project directory.
pub const DEFAULT_INTEL_PATH: &str = "state/cursor_intel.mdc";

/// Overrides `[intel] path`.
pub const ENV_INTEL_PATH: &str = "PHASEKEEPER_INTEL_PATH";

/// Disables document locking unless set to `false` or `0`.
pub const ENV_NO_LOCK: &str = "PHASEKEEPER_NO_LOCK";

/// Intelligence log settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelConfig {
    /// Log location; relative paths resolve against the project directory
    #[serde(default = "default_intel_path")]
    pub path: PathBuf,
}

fn default_intel_path() -> PathBuf {
    PathBuf::from(DEFAULT_INTEL_PATH)
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            path: default_intel_path(),
        }
    }
}

/// File-name substrings used to classify state documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsystemsConfig {
    #[serde(default = "default_backend_patterns")]
    pub backend: Vec<String>,
    #[serde(default = "default_frontend_patterns")]
    pub frontend: Vec<String>,
}

fn default_backend_patterns() -> Vec<String> {
    vec!["backend".to_string()]
}

fn default_frontend_patterns() -> Vec<String> {
    vec!["nextjs".to_string(), "frontend".to_string()]
}

impl Default for SubsystemsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend_patterns(),
            frontend: default_frontend_patterns(),
        }
    }
}

/// Persistence safeguards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Hold an advisory lock for each load-mutate-persist cycle
    #[serde(default = "default_lock")]
    pub lock: bool,
}

fn default_lock() -> bool {
    true
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            lock: default_lock(),
        }
    }
}

/// The `phasekeeper.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeeperToml {
    #[serde(default)]
    pub intel: IntelConfig,
    #[serde(default)]
    pub subsystems: SubsystemsConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl KeeperToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse phasekeeper.toml")
    }

    /// Returns default configuration if the file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize phasekeeper.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    pub fn classifier(&self) -> SubstringClassifier {
        SubstringClassifier::new(
            self.subsystems.backend.clone(),
            self.subsystems.frontend.clone(),
        )
    }

    /// Return warnings for settings that are legal but probably unintended.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.intel.path.as_os_str().is_empty() {
            warnings.push("[intel] path is empty".to_string());
        }

        for (name, patterns) in [
            ("backend", &self.subsystems.backend),
            ("frontend", &self.subsystems.frontend),
        ] {
            if patterns.iter().all(|p| p.is_empty()) {
                warnings.push(format!(
                    "[subsystems] {} has no patterns; nothing will classify as {}",
                    name, name
                ));
            }
        }

        for pattern in &self.subsystems.frontend {
            if !pattern.is_empty()
                && self
                    .subsystems
                    .backend
                    .iter()
                    .any(|b| b.eq_ignore_ascii_case(pattern))
            {
                warnings.push(format!(
                    "[subsystems] pattern '{}' is listed for both backend and frontend; backend wins",
                    pattern
                ));
            }
        }

        if !self.persistence.lock {
            warnings.push(
                "[persistence] lock = false; concurrent writers may lose updates".to_string(),
            );
        }

        warnings
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub config_path: PathBuf,
    pub toml: KeeperToml,
    cli_intel_path: Option<PathBuf>,
    cli_no_lock: bool,
}

impl Config {
    /// Load configuration for a project directory. `config_path` defaults to
    /// `<project_dir>/phasekeeper.toml`.
    pub fn new(project_dir: PathBuf, config_path: Option<PathBuf>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let config_path = config_path.unwrap_or_else(|| project_dir.join(CONFIG_FILE));
        let toml = KeeperToml::load_or_default(&config_path)?;

        Ok(Self {
            project_dir,
            config_path,
            toml,
            cli_intel_path: None,
            cli_no_lock: false,
        })
    }

    /// Apply command-line overrides.
    pub fn with_cli_overrides(mut self, intel_path: Option<PathBuf>, no_lock: bool) -> Self {
        self.cli_intel_path = intel_path;
        self.cli_no_lock = no_lock;
        self
    }

    pub fn config_file_exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Intelligence log location (CLI → env → file → default).
    pub fn intel_path(&self) -> PathBuf {
        let path = self
            .cli_intel_path
            .clone()
            .or_else(|| std::env::var_os(ENV_INTEL_PATH).map(PathBuf::from))
            .unwrap_or_else(|| self.toml.intel.path.clone());

        if path.is_absolute() {
            path
        } else {
            self.project_dir.join(path)
        }
    }

    /// Whether to lock documents (CLI → env → file).
    pub fn locking(&self) -> bool {
        if self.cli_no_lock {
            return false;
        }
        if let Ok(env_val) = std::env::var(ENV_NO_LOCK) {
            return env_val == "false" || env_val == "0";
        }
        self.toml.persistence.lock
    }

    pub fn classifier(&self) -> SubstringClassifier {
        self.toml.classifier()
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystem::{Subsystem, SubsystemClassifier};
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        unsafe {
            std::env::remove_var(ENV_INTEL_PATH);
            std::env::remove_var(ENV_NO_LOCK);
        }
    }

    #[test]
    fn test_defaults() {
        let toml = KeeperToml::default();
        assert_eq!(toml.intel.path, PathBuf::from("state/cursor_intel.mdc"));
        assert_eq!(toml.subsystems.backend, vec!["backend"]);
        assert_eq!(toml.subsystems.frontend, vec!["nextjs", "frontend"]);
        assert!(toml.persistence.lock);
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_file_keeps_defaults() {
        let toml = KeeperToml::parse(
            r#"
[subsystems]
frontend = ["web"]
"#,
        )
        .unwrap();
        assert_eq!(toml.subsystems.frontend, vec!["web"]);
        assert_eq!(toml.subsystems.backend, vec!["backend"]);
        assert_eq!(toml.intel, IntelConfig::default());
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(KeeperToml::parse("[persistence]\nlock = \"yes\"\n").is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let mut toml = KeeperToml::default();
        toml.intel.path = PathBuf::from("ops/intel.yaml");
        toml.persistence.lock = false;
        toml.save(&path).unwrap();

        assert_eq!(KeeperToml::load(&path).unwrap(), toml);
    }

    #[test]
    fn test_validate_warnings() {
        let mut toml = KeeperToml::default();
        toml.subsystems.backend = vec![String::new()];
        toml.subsystems.frontend = vec!["Backend".to_string()];
        toml.persistence.lock = false;

        let warnings = toml.validate();
        assert!(warnings.iter().any(|w| w.contains("backend has no patterns")));
        assert!(warnings.iter().any(|w| w.contains("lock = false")));
    }

    #[test]
    fn test_classifier_uses_configured_patterns() {
        let toml = KeeperToml::parse("[subsystems]\nbackend = [\"api\"]\n").unwrap();
        let classifier = toml.classifier();
        assert_eq!(
            classifier.classify(Path::new("api_state.mdc")),
            Subsystem::Backend
        );
        assert_eq!(
            classifier.classify(Path::new("backend_state.mdc")),
            Subsystem::Unknown
        );
    }

    #[test]
    fn test_intel_path_precedence() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[intel]\npath = \"from_file.mdc\"\n",
        )
        .unwrap();

        let config = Config::new(dir.path().to_path_buf(), None).unwrap();
        assert_eq!(config.intel_path(), config.project_dir.join("from_file.mdc"));

        unsafe { std::env::set_var(ENV_INTEL_PATH, "from_env.mdc") };
        assert_eq!(config.intel_path(), config.project_dir.join("from_env.mdc"));

        let absolute = dir.path().join("abs").join("from_cli.mdc");
        let config = config.with_cli_overrides(Some(absolute.clone()), false);
        assert_eq!(config.intel_path(), absolute);

        clear_env();
    }

    #[test]
    fn test_locking_precedence() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();

        let dir = tempdir().unwrap();
        let config = Config::new(dir.path().to_path_buf(), None).unwrap();
        assert!(!config.config_file_exists());
        assert!(config.locking());

        unsafe { std::env::set_var(ENV_NO_LOCK, "1") };
        assert!(!config.locking());

        unsafe { std::env::set_var(ENV_NO_LOCK, "false") };
        assert!(config.locking());

        let config = config.with_cli_overrides(None, true);
        assert!(!config.locking());

        clear_env();
    }

    #[test]
    fn test_explicit_config_path() {
        let dir = tempdir().unwrap();
        let custom = dir.path().join("custom.toml");
        std::fs::write(&custom, "[persistence]\nlock = false\n").unwrap();

        let config = Config::new(dir.path().to_path_buf(), Some(custom.clone())).unwrap();
        assert_eq!(config.config_path, custom);
        assert!(!config.toml.persistence.lock);
    }

    #[test]
    fn test_missing_project_dir_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(Config::new(dir.path().join("nope"), None).is_err());
    }
}
