//! LogForge - turns sample log lines into batch log-to-spreadsheet converters
//!
//! This library asks a chat model for a Python processing script, checks and
//! repairs it, and runs it over directories of log files in an isolated
//! interpreter environment while reporting progress.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod llm;
pub mod monitor;
pub mod pipeline;
pub mod project;
pub mod prompt;
pub mod repair;
pub mod runner;
pub mod validator;

pub use error::{Error, Result};

pub use analyzer::SampleAnalyzer;
pub use config::{default_config_dir, ConfigReport, LlmConfig, Settings, SettingsStore, Validate};
pub use executor::{BatchExecutor, BatchResult};
pub use extract::{extract_code, TARGET_LANGUAGE};
pub use llm::{ChatModel, LlmClient, Message, Role};
pub use monitor::{BatchProgress, BatchStatus, ProgressInfo, ProgressMonitor};
pub use pipeline::{GenerateResult, Pipeline};
pub use project::{JsonProjectStore, Project, ProjectStatus, ProjectStore, ProjectUpdate};
pub use repair::{LlmRepairer, RepairKind, Repairer};
pub use runner::{EnvStatus, Interpreter, PythonEnv, RunningScript};
pub use validator::{CodeValidator, ValidationResult};
