//! Attempt history and terminal run results

use crate::error::InsightError;
use crate::execution::engine::{ExecutionOutcome, QueryCandidate};
use crate::execution_loop::error_classifier::AttemptFailure;
use serde::Serialize;
use std::fmt;

/// One generate/execute cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub attempt_number: u32,
    /// `None` when synthesis failed before producing any DAX
    pub candidate: Option<QueryCandidate>,
    pub outcome: ExecutionOutcome,
}

impl AttemptRecord {
    pub fn query(&self) -> Option<&str> {
        self.candidate.as_ref().map(|c| c.query.as_str())
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        self.outcome.failure()
    }
}

/// States a run moves through, reported to observers as they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Authenticated,
    Synthesizing { attempt: u32 },
    Executing { attempt: u32 },
    Succeeded { attempt: u32 },
    Exhausted,
    Interpreted,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => write!(f, "init"),
            RunState::Authenticated => write!(f, "authenticated"),
            RunState::Synthesizing { attempt } => write!(f, "synthesizing (attempt {})", attempt),
            RunState::Executing { attempt } => write!(f, "executing (attempt {})", attempt),
            RunState::Succeeded { attempt } => write!(f, "succeeded (attempt {})", attempt),
            RunState::Exhausted => write!(f, "exhausted"),
            RunState::Interpreted => write!(f, "interpreted"),
            RunState::Failed => write!(f, "failed"),
        }
    }
}

/// Terminal state of a run
#[derive(Debug)]
pub enum PipelineResult {
    /// A query succeeded and was explained
    Answered {
        narrative: String,
        attempts: Vec<AttemptRecord>,
    },
    /// Every attempt in the budget failed
    Exhausted {
        last_error: AttemptFailure,
        attempts: Vec<AttemptRecord>,
    },
    /// Authentication or interpretation failed
    Failed {
        error: InsightError,
        attempts: Vec<AttemptRecord>,
    },
}

impl PipelineResult {
    pub fn attempts(&self) -> &[AttemptRecord] {
        match self {
            PipelineResult::Answered { attempts, .. }
            | PipelineResult::Exhausted { attempts, .. }
            | PipelineResult::Failed { attempts, .. } => attempts,
        }
    }

    pub fn narrative(&self) -> Option<&str> {
        match self {
            PipelineResult::Answered { narrative, .. } => Some(narrative),
            _ => None,
        }
    }

    pub fn is_answered(&self) -> bool {
        matches!(self, PipelineResult::Answered { .. })
    }
}

impl fmt::Display for PipelineResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineResult::Answered { narrative, .. } => write!(f, "{}", narrative),
            PipelineResult::Exhausted {
                last_error,
                attempts,
            } => {
                writeln!(
                    f,
                    "All {} DAX attempts failed. Please refine your question.",
                    attempts.len()
                )?;
                for record in attempts {
                    writeln!(f, "\nAttempt {}:", record.attempt_number)?;
                    match record.query() {
                        Some(query) => writeln!(f, "{}", query)?,
                        None => writeln!(f, "(no query generated)")?,
                    }
                    if let Some(failure) = record.failure() {
                        writeln!(f, "-> {}", failure)?;
                    }
                }
                write!(f, "\nLast error: {}", last_error)
            }
            // Terminal errors are reported on their own
            PipelineResult::Failed { error, .. } => write!(f, "{}", error),
        }
    }
}
