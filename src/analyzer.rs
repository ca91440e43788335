//! Sample analysis: log sample in, candidate script out.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::extract::extract_code;
use crate::llm::{ChatModel, Message};
use crate::prompt::{sample_message, GENERATION_INSTRUCTION};

/// Generates a processing script from a log sample.
pub struct SampleAnalyzer {
    model: Arc<dyn ChatModel>,
}

impl SampleAnalyzer {
    /// Creates an analyzer backed by the given chat model.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Builds the two-message generation conversation for a sample.
    pub fn conversation(sample: &str) -> Vec<Message> {
        vec![
            Message::system(GENERATION_INSTRUCTION),
            Message::user(sample_message(sample)),
        ]
    }

    /// Asks the model for a script that processes logs shaped like `sample`.
    ///
    /// Blank samples are rejected before any model call.
    pub async fn analyze(&self, sample: &str) -> Result<String> {
        if sample.trim().is_empty() {
            return Err(Error::InvalidInput(
                "sample text must not be empty".to_string(),
            ));
        }

        tracing::info!(sample_chars = sample.len(), "requesting script generation");

        let reply = self.model.chat(&Self::conversation(sample)).await?;
        let code = extract_code(&reply);

        if code.is_empty() {
            tracing::warn!(reply_chars = reply.len(), "model reply contained no code");
            return Err(Error::Extraction(
                "LLM response did not contain valid Python code".to_string(),
            ));
        }

        tracing::info!(code_chars = code.len(), "script generated");
        Ok(code)
    }
}
