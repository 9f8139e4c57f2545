//! Query Executor Trait - contract for running one DAX query
//!
//! Executors never return an error: every transport problem, non-success
//! status or malformed body comes back as [`ExecutionOutcome::Failure`] so
//! the retry loop can decide what to do next from data alone.

use crate::auth::Credential;
use crate::execution::result::TabularPayload;
use crate::execution_loop::error_classifier::AttemptFailure;
use crate::metadata::DatasetMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A generated DAX query, tagged with the attempt that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCandidate {
    pub attempt_number: u32,
    pub query: String,
}

impl QueryCandidate {
    pub fn new(attempt_number: u32, query: impl Into<String>) -> Self {
        Self {
            attempt_number,
            query: query.into(),
        }
    }
}

/// Result of executing one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionOutcome {
    Success(TabularPayload),
    Failure(AttemptFailure),
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success(_))
    }

    pub fn failure(&self) -> Option<&AttemptFailure> {
        match self {
            ExecutionOutcome::Failure(failure) => Some(failure),
            ExecutionOutcome::Success(_) => None,
        }
    }
}

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Execute a single query against the dataset
    async fn execute(
        &self,
        credential: &Credential,
        metadata: &DatasetMetadata,
        candidate: &QueryCandidate,
    ) -> ExecutionOutcome;
}
