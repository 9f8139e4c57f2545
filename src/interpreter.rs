//! Narrative interpretation of DAX results

use crate::error::{InsightError, Result};
use crate::execution::result::TabularPayload;
use crate::llm::TextGenerator;
use crate::question::Question;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ResultInterpreter: Send + Sync {
    /// Explain `rows` in plain English as an answer to `question`.
    async fn interpret(&self, rows: &TabularPayload, question: &Question) -> Result<String>;
}

pub struct NarrativeInterpreter {
    generator: Arc<dyn TextGenerator>,
    system_context: String,
}

impl NarrativeInterpreter {
    pub fn new(generator: Arc<dyn TextGenerator>, system_context: impl Into<String>) -> Self {
        Self {
            generator,
            system_context: system_context.into(),
        }
    }
}

#[async_trait]
impl ResultInterpreter for NarrativeInterpreter {
    async fn interpret(&self, rows: &TabularPayload, question: &Question) -> Result<String> {
        let prompt = format!(
            "Here are the raw results of a DAX query for usage stats:\n{}\n\nExplain these results in plain English to answer: {}",
            rows.to_pretty_json(),
            question
        );

        let narrative = self
            .generator
            .complete(&self.system_context, &prompt)
            .await
            .map_err(|e| InsightError::Interpretation(e.to_string()))?;

        if narrative.is_empty() {
            return Err(InsightError::Interpretation(
                "generation service returned an empty explanation".to_string(),
            ));
        }
        Ok(narrative)
    }
}
