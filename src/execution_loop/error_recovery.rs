//! Error Recovery
//!
//! Turns the attempt history into the feedback section of the next DAX
//! synthesis prompt, so each retry sees every earlier query and why it failed.

use crate::execution_loop::attempt::AttemptRecord;
use crate::execution_loop::error_classifier::FailureKind;

/// Error recovery prompt builder
pub struct ErrorRecovery;

impl ErrorRecovery {
    pub fn new() -> Self {
        Self
    }

    /// Build the recovery section; empty when there is no history yet
    pub fn build_recovery_prompt(&self, history: &[AttemptRecord]) -> String {
        if history.is_empty() {
            return String::new();
        }

        let mut prompt_parts = Vec::new();
        prompt_parts.push(format!(
            "RETRY ATTEMPT {}: the previous {} attempt(s) failed. Do not repeat them.",
            history.len() + 1,
            history.len()
        ));

        for record in history {
            prompt_parts.push(format!("\nAttempt {}:", record.attempt_number));
            match record.query() {
                Some(query) => prompt_parts.push(format!("DAX:\n{}", query)),
                None => prompt_parts.push("DAX: (none was generated)".to_string()),
            }
            if let Some(failure) = record.failure() {
                prompt_parts.push(format!("Error ({}): {}", failure.kind, failure.message));
                if let Some(hint) = hint_for(failure.kind) {
                    prompt_parts.push(hint.to_string());
                }
            }
        }

        prompt_parts.push("\nFix the problems above in the new query.".to_string());
        prompt_parts.join("\n")
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new()
    }
}

fn hint_for(kind: FailureKind) -> Option<&'static str> {
    match kind {
        FailureKind::InvalidQuery => Some(
            "The engine rejected this DAX. Check table, column and measure names against the model description and make sure the query starts with EVALUATE.",
        ),
        FailureKind::Transient => {
            Some("The service failed temporarily; the query itself may have been valid.")
        }
        FailureKind::AuthRejected => {
            Some("The service refused access; the query itself was not evaluated.")
        }
        FailureKind::SynthesisFailed | FailureKind::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::engine::{ExecutionOutcome, QueryCandidate};
    use crate::execution_loop::error_classifier::AttemptFailure;

    fn failed(attempt: u32, query: Option<&str>, kind: FailureKind, message: &str) -> AttemptRecord {
        AttemptRecord {
            attempt_number: attempt,
            candidate: query.map(|q| QueryCandidate::new(attempt, q)),
            outcome: ExecutionOutcome::Failure(AttemptFailure::new(kind, message)),
        }
    }

    #[test]
    fn test_no_history_no_prompt() {
        assert!(ErrorRecovery::new().build_recovery_prompt(&[]).is_empty());
    }

    #[test]
    fn test_every_attempt_in_order() {
        let history = vec![
            failed(1, Some("EVALUTE Reports"), FailureKind::InvalidQuery, "syntax error"),
            failed(2, None, FailureKind::SynthesisFailed, "LLM unreachable"),
            failed(3, Some("EVALUATE Views"), FailureKind::Transient, "HTTP 503"),
        ];
        let prompt = ErrorRecovery::new().build_recovery_prompt(&history);

        assert!(prompt.starts_with("RETRY ATTEMPT 4"));
        let first = prompt.find("EVALUTE Reports").unwrap();
        let second = prompt.find("(none was generated)").unwrap();
        let third = prompt.find("EVALUATE Views").unwrap();
        assert!(first < second && second < third);
        assert!(prompt.contains("Error (InvalidQuery): syntax error"));
        assert!(prompt.contains("Error (Transient): HTTP 503"));
    }
}
