//! DAX synthesis
//!
//! Asks the text-generation service for a DAX query answering the user's
//! question. Retries are corrective: every earlier attempt, with its query
//! and the engine's complaint, is put in front of the model.

use crate::error::{InsightError, Result};
use crate::execution::engine::QueryCandidate;
use crate::execution_loop::attempt::AttemptRecord;
use crate::execution_loop::error_recovery::ErrorRecovery;
use crate::llm::TextGenerator;
use crate::metadata::DatasetMetadata;
use crate::question::Question;
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use tracing::debug;

lazy_static::lazy_static! {
    static ref FENCED_BLOCK: Regex =
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").expect("valid fence pattern");
    // A tag on its own line may be any case; inline it must be lowercase so
    // "```EVALUATE ..." keeps its first keyword.
    static ref OPENING_FENCE: Regex =
        Regex::new(r"^```(?:[A-Za-z0-9_+-]*[ \t]*\r?\n|[a-z0-9_+-]*[ \t]+)?").expect("valid fence pattern");
    static ref CLOSING_FENCE: Regex = Regex::new(r"\s*```\s*$").expect("valid fence pattern");
}

#[async_trait]
pub trait QuerySynthesizer: Send + Sync {
    /// Produce the next candidate; its attempt number is `prior_failures.len() + 1`.
    async fn synthesize(
        &self,
        metadata: &DatasetMetadata,
        question: &Question,
        prior_failures: &[AttemptRecord],
    ) -> Result<QueryCandidate>;
}

pub struct DaxSynthesizer {
    generator: Arc<dyn TextGenerator>,
    system_context: String,
    recovery: ErrorRecovery,
}

impl DaxSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, system_context: impl Into<String>) -> Self {
        Self {
            generator,
            system_context: system_context.into(),
            recovery: ErrorRecovery::new(),
        }
    }

    fn build_prompt(
        &self,
        metadata: &DatasetMetadata,
        question: &Question,
        prior_failures: &[AttemptRecord],
    ) -> Result<String> {
        let mut parts = Vec::new();
        parts.push("You have this dataset metadata:".to_string());
        parts.push(serde_json::to_string(metadata)?);
        parts.push(format!("\nGenerate a DAX query to answer: {}", question));

        let recovery = self.recovery.build_recovery_prompt(prior_failures);
        if !recovery.is_empty() {
            parts.push(format!("\n{}", recovery));
        }

        parts.push("Remove any special formatting, if any. Return only the DAX code.".to_string());
        Ok(parts.join("\n"))
    }
}

#[async_trait]
impl QuerySynthesizer for DaxSynthesizer {
    async fn synthesize(
        &self,
        metadata: &DatasetMetadata,
        question: &Question,
        prior_failures: &[AttemptRecord],
    ) -> Result<QueryCandidate> {
        let attempt_number = prior_failures.len() as u32 + 1;
        let prompt = self.build_prompt(metadata, question, prior_failures)?;

        let raw = self
            .generator
            .complete(&self.system_context, &prompt)
            .await
            .map_err(|e| InsightError::Synthesis(e.to_string()))?;

        let query = sanitize_query(&raw);
        if query.is_empty() {
            return Err(InsightError::Synthesis(
                "generation service returned no DAX".to_string(),
            ));
        }

        debug!(attempt = attempt_number, "Synthesized DAX:\n{}", query);
        Ok(QueryCandidate::new(attempt_number, query))
    }
}

/// Strip the formatting models wrap around code: markdown fences (with or
/// without a language tag, possibly surrounded by prose, possibly left
/// unclosed or kept on one line) and stray backticks.
pub fn sanitize_query(raw: &str) -> String {
    if let Some(body) = FENCED_BLOCK.captures(raw).and_then(|caps| caps.get(1)) {
        return body.as_str().trim().trim_matches('`').trim().to_string();
    }

    let trimmed = raw.trim();
    let body = OPENING_FENCE.replace(trimmed, "");
    let body = CLOSING_FENCE.replace(&body, "");
    body.trim().trim_matches('`').trim().to_string()
}
