//! Model-backed code repair.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::extract::extract_code;
use crate::llm::{ChatModel, Message};
use crate::prompt::{repair_instruction, repair_message};

/// Produces a corrected candidate from failing code and its diagnostic.
#[async_trait]
pub trait Repairer: Send + Sync {
    /// Returns repaired code, or an error if no candidate could be obtained.
    async fn repair(&self, code: &str, error: &str) -> Result<String>;
}

/// Which stage the failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairKind {
    /// The parse-only check rejected the code.
    Syntax,
    /// The script ran and exited with a failure.
    Runtime,
}

impl RepairKind {
    fn failure_kind(self) -> &'static str {
        match self {
            RepairKind::Syntax => "syntax error",
            RepairKind::Runtime => "runtime error",
        }
    }
}

/// [`Repairer`] that asks a chat model for a fixed version.
pub struct LlmRepairer {
    model: Arc<dyn ChatModel>,
    kind: RepairKind,
}

impl LlmRepairer {
    /// Creates a repairer for the given failure kind.
    pub fn new(model: Arc<dyn ChatModel>, kind: RepairKind) -> Self {
        Self { model, kind }
    }

    /// Builds the repair conversation.
    pub fn conversation(&self, code: &str, error: &str) -> Vec<Message> {
        let failure = self.kind.failure_kind();
        vec![
            Message::system(repair_instruction(failure)),
            Message::user(repair_message(failure, code, error)),
        ]
    }
}

#[async_trait]
impl Repairer for LlmRepairer {
    async fn repair(&self, code: &str, error: &str) -> Result<String> {
        tracing::info!(kind = ?self.kind, "requesting repair");

        let reply = self
            .model
            .chat(&self.conversation(code, error))
            .await
            .map_err(|e| Error::RepairCall(e.to_string()))?;

        let fixed = extract_code(&reply);
        if fixed.is_empty() {
            return Err(Error::Extraction(
                "repair reply did not contain code".to_string(),
            ));
        }

        Ok(fixed)
    }
}
