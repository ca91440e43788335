//! Error types for the logforge pipeline.

use thiserror::Error;

use crate::executor::BatchResult;

/// Top-level error type for generation, validation and batch execution.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The caller passed an argument that cannot be acted on.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A directory, project or file does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The environment launcher could not be run.
    #[error("{launcher} is not available: {reason}. {remediation}")]
    ToolchainUnavailable {
        launcher: String,
        reason: String,
        remediation: String,
    },

    /// Creating the environment or installing its dependency failed.
    #[error("environment setup failed: {0}")]
    Environment(String),

    /// The model reply did not contain usable code.
    #[error("no usable code in model response: {0}")]
    Extraction(String),

    /// The chat-completion call failed.
    #[error("LLM call failed: {0}")]
    LlmCall(String),

    /// Asking the model for a repaired candidate failed.
    #[error("LLM repair failed: {0}")]
    RepairCall(String),

    /// The syntax check itself could not be run.
    #[error("syntax check execution failed: {0}")]
    CheckExecution(String),

    /// The interpreter could not be started for a batch run.
    #[error("failed to start script: {0}")]
    Launch(String),

    /// A batch run failed after its repair budget, or because a repair call failed.
    #[error("batch execution failed after {attempts} attempt(s): {last_error}")]
    Execution {
        attempts: u32,
        last_error: String,
        repair_error: Option<String>,
        result: Box<BatchResult>,
    },

    /// Project store failure.
    #[error("project store error: {0}")]
    Store(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for logforge operations.
pub type Result<T> = std::result::Result<T, Error>;
