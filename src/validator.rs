//! Syntax validation with bounded model repair.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::repair::Repairer;
use crate::runner::Interpreter;

/// Outcome of a validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the final candidate passed the syntax check.
    pub valid: bool,
    /// The final candidate.
    pub code: String,
    /// Diagnostics from every failed check, oldest first.
    pub errors: Vec<String>,
    /// Repairs consumed. Never exceeds the retry budget.
    pub retries: u32,
}

/// Parse-checks candidates and feeds failures back to a repairer.
pub struct CodeValidator {
    interpreter: Arc<dyn Interpreter>,
    repairer: Arc<dyn Repairer>,
}

impl CodeValidator {
    /// Creates a validator.
    pub fn new(interpreter: Arc<dyn Interpreter>, repairer: Arc<dyn Repairer>) -> Self {
        Self {
            interpreter,
            repairer,
        }
    }

    /// Checks `code`, repairing it up to `max_retries` times.
    ///
    /// Syntax failures are absorbed until the budget is spent. A failed
    /// repair or a check that could not run is returned as an error.
    pub async fn validate(&self, code: &str, max_retries: u32) -> Result<ValidationResult> {
        let mut candidate = code.to_string();
        let mut errors = Vec::new();

        for attempt in 0..=max_retries {
            let diagnostic = match self.check(&candidate).await? {
                None => {
                    tracing::info!(attempt, "syntax check passed");
                    return Ok(ValidationResult {
                        valid: true,
                        code: candidate,
                        errors,
                        retries: attempt,
                    });
                }
                Some(diagnostic) => diagnostic,
            };

            tracing::warn!(
                interpreter = self.interpreter.name(),
                attempt,
                max_retries,
                "syntax check failed"
            );
            errors.push(diagnostic.clone());

            if attempt == max_retries {
                break;
            }

            candidate = self.repairer.repair(&candidate, &diagnostic).await?;
        }

        tracing::warn!(max_retries, "syntax repair budget exhausted");
        Ok(ValidationResult {
            valid: false,
            code: candidate,
            errors,
            retries: max_retries,
        })
    }

    /// Runs one parse-only check on a throwaway copy of `code`.
    async fn check(&self, code: &str) -> Result<Option<String>> {
        let dir = tempfile::Builder::new().prefix("logforge-check-").tempdir()?;
        let script: PathBuf = dir.path().join("candidate.py");
        tokio::fs::write(&script, code).await?;

        let outcome = self.interpreter.check_syntax(&script).await;
        dir.close()?;
        outcome
    }
}
