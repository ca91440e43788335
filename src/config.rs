//! Settings and configuration checks.
//!
//! Settings are persisted as TOML. Components never read them globally:
//! each one receives the values it needs at construction, and a settings
//! change is applied by rebuilding the dependents.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default environment launcher.
pub const DEFAULT_LAUNCHER: &str = "uv";

/// Default package installed into the script environment.
pub const DEFAULT_DEPENDENCY: &str = "openpyxl";

/// Default repair budget for validation and execution.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Largest accepted repair budget.
pub const MAX_RETRY_LIMIT: u32 = 100;

/// Connection settings for an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API base URL, e.g. `https://api.openai.com/v1`.
    #[serde(default)]
    pub base_url: String,
    /// Bearer token.
    #[serde(default)]
    pub api_key: String,
    /// Model identifier sent with every request.
    #[serde(default)]
    pub model_name: String,
}

impl LlmConfig {
    /// Creates a config from its three required parts.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model_name: model_name.into(),
        }
    }

    /// Returns true when every field is filled in.
    pub fn is_complete(&self) -> bool {
        self.validate().is_valid()
    }
}

/// Application settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Launcher used to create and manage the interpreter environment.
    #[serde(default = "default_launcher")]
    pub launcher_path: String,

    /// Directory of the isolated environment. Defaults to `<config dir>/pyenv`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env_dir: Option<PathBuf>,

    /// Package the generated scripts import.
    #[serde(default = "default_dependency")]
    pub dependency: String,

    /// Repair budget shared by validation and execution.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Input directory used when a run does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_input_dir: Option<PathBuf>,

    /// Output directory used when a run does not name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_output_dir: Option<PathBuf>,

    /// Chat model connection. Kept last so it serializes as a trailing table.
    #[serde(default)]
    pub llm: LlmConfig,
}

fn default_launcher() -> String {
    DEFAULT_LAUNCHER.to_string()
}

fn default_dependency() -> String {
    DEFAULT_DEPENDENCY.to_string()
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            launcher_path: default_launcher(),
            env_dir: None,
            dependency: default_dependency(),
            max_retries: default_max_retries(),
            default_input_dir: None,
            default_output_dir: None,
            llm: LlmConfig::default(),
        }
    }
}

impl Settings {
    /// Resolves the environment directory, falling back to `<config_dir>/pyenv`.
    pub fn resolved_env_dir(&self, config_dir: &Path) -> PathBuf {
        self.env_dir
            .clone()
            .unwrap_or_else(|| config_dir.join("pyenv"))
    }

    /// Returns the launcher, treating a blank value as the default.
    pub fn launcher(&self) -> &str {
        if self.launcher_path.trim().is_empty() {
            DEFAULT_LAUNCHER
        } else {
            &self.launcher_path
        }
    }
}

/// Returns the per-user configuration directory for logforge.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("logforge"))
        .unwrap_or_else(|| PathBuf::from(".logforge"))
}

/// Loads and saves [`Settings`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    /// Creates a store backed by the given TOML file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads settings. A missing file yields defaults.
    pub fn load(&self) -> Result<Settings> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = ?self.path, "no settings file, using defaults");
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(Error::Config(format!(
                    "failed to read settings file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("settings file is corrupted: {}", e)))
    }

    /// Saves settings, creating parent directories as needed.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(settings)
            .map_err(|e| Error::Config(format!("failed to serialize settings: {}", e)))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}

/// Outcome of checking a configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigReport {
    /// Problems that prevent use.
    pub errors: Vec<String>,
    /// Suspicious but usable values.
    pub warnings: Vec<String>,
}

impl ConfigReport {
    /// Returns true if there are no errors.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Adds an error to the report.
    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Adds a warning to the report.
    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: ConfigReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }

    /// Converts to a Result, failing if there are errors.
    pub fn into_result(self) -> Result<Vec<String>> {
        if self.is_valid() {
            Ok(self.warnings)
        } else {
            Err(Error::Config(self.errors.join("; ")))
        }
    }
}

/// Trait for checkable configuration types.
pub trait Validate {
    /// Checks the configuration and returns any issues found.
    fn validate(&self) -> ConfigReport;
}

impl Validate for LlmConfig {
    fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();

        if self.base_url.trim().is_empty() {
            report.add_error("LLM base_url must not be empty");
        } else if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://")
        {
            report.add_warning(format!(
                "LLM base_url '{}' has no http(s) scheme",
                self.base_url
            ));
        }

        if self.api_key.trim().is_empty() {
            report.add_error("LLM api_key must not be empty");
        }

        if self.model_name.trim().is_empty() {
            report.add_error("LLM model_name must not be empty");
        }

        report
    }
}

impl Validate for Settings {
    fn validate(&self) -> ConfigReport {
        let mut report = ConfigReport::default();
        report.merge(self.llm.validate());

        if self.max_retries == 0 {
            report.add_warning("max_retries = 0 means failing code is never repaired");
        }

        if self.max_retries > MAX_RETRY_LIMIT {
            report.add_error(format!("max_retries must not exceed {}", MAX_RETRY_LIMIT));
        } else if self.max_retries > 10 {
            report.add_warning("max_retries > 10 may lead to excessive LLM calls");
        }

        if self.dependency.trim().is_empty() {
            report.add_error("dependency must not be empty");
        }

        report
    }
}
