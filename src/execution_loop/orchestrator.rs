//! Retry Orchestrator
//!
//! Bounded, self-correcting generate → execute loop. One token per run; each
//! attempt synthesizes DAX from the full failure history, executes it, and
//! records the outcome. The first success stops the loop and is handed to
//! the interpreter; running out of budget ends the run as `Exhausted`.

use crate::auth::TokenProvider;
use crate::error::{InsightError, Result};
use crate::execution::engine::{ExecutionOutcome, QueryExecutor};
use crate::execution_loop::attempt::{AttemptRecord, PipelineResult, RunState};
use crate::execution_loop::error_classifier::{AttemptFailure, FailureKind};
use crate::interpreter::ResultInterpreter;
use crate::metadata::DatasetMetadata;
use crate::question::Question;
use crate::synthesizer::QuerySynthesizer;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Progress hook for callers that want to follow a run as it happens
pub trait RunObserver: Send + Sync {
    fn on_state(&self, _state: RunState) {}
    fn on_attempt(&self, _record: &AttemptRecord) {}
}

struct SilentObserver;

impl RunObserver for SilentObserver {}

pub struct RetryOrchestrator {
    token_provider: Arc<dyn TokenProvider>,
    synthesizer: Arc<dyn QuerySynthesizer>,
    executor: Arc<dyn QueryExecutor>,
    interpreter: Arc<dyn ResultInterpreter>,
    max_retries: u32,
    observer: Arc<dyn RunObserver>,
}

impl RetryOrchestrator {
    pub fn new(
        token_provider: Arc<dyn TokenProvider>,
        synthesizer: Arc<dyn QuerySynthesizer>,
        executor: Arc<dyn QueryExecutor>,
        interpreter: Arc<dyn ResultInterpreter>,
        max_retries: u32,
    ) -> Result<Self> {
        if max_retries == 0 {
            return Err(InsightError::Config(
                "max retries must be a positive integer".to_string(),
            ));
        }

        Ok(Self {
            token_provider,
            synthesizer,
            executor,
            interpreter,
            max_retries,
            observer: Arc::new(SilentObserver),
        })
    }

    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Answer one question. Never returns an error: every ending is a
    /// [`PipelineResult`] variant.
    pub async fn run(&self, metadata: &DatasetMetadata, question: &Question) -> PipelineResult {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "pipeline_run",
            %run_id,
            workspace = %metadata.workspace_id,
            dataset = %metadata.dataset_id
        );
        self.run_inner(metadata, question).instrument(span).await
    }

    async fn run_inner(&self, metadata: &DatasetMetadata, question: &Question) -> PipelineResult {
        self.enter(RunState::Init);

        let credential = match self.token_provider.acquire().await {
            Ok(credential) => credential,
            Err(e) => {
                error!("Authentication failed, aborting run: {}", e);
                self.enter(RunState::Failed);
                return PipelineResult::Failed {
                    error: e,
                    attempts: Vec::new(),
                };
            }
        };
        self.enter(RunState::Authenticated);

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(self.max_retries as usize);

        for attempt in 1..=self.max_retries {
            info!("DAX attempt {} of {}", attempt, self.max_retries);

            self.enter(RunState::Synthesizing { attempt });
            let record = match self.synthesizer.synthesize(metadata, question, &attempts).await {
                Ok(candidate) => {
                    self.enter(RunState::Executing { attempt });
                    let outcome = self.executor.execute(&credential, metadata, &candidate).await;
                    AttemptRecord {
                        attempt_number: attempt,
                        candidate: Some(candidate),
                        outcome,
                    }
                }
                Err(e) => {
                    warn!("Synthesis failed on attempt {}: {}", attempt, e);
                    AttemptRecord {
                        attempt_number: attempt,
                        candidate: None,
                        outcome: ExecutionOutcome::Failure(AttemptFailure::new(
                            FailureKind::SynthesisFailed,
                            e.to_string(),
                        )),
                    }
                }
            };

            if let Some(failure) = record.failure() {
                warn!("Attempt {} failed: {}", attempt, failure);
            }
            self.observer.on_attempt(&record);

            let succeeded = record.outcome.is_success();
            attempts.push(record);
            if succeeded {
                info!("Query succeeded on attempt {}", attempt);
                self.enter(RunState::Succeeded { attempt });
                break;
            }
        }

        let rows = match attempts.last().map(|r| &r.outcome) {
            Some(ExecutionOutcome::Success(rows)) => rows,
            _ => {
                let last_error = attempts
                    .last()
                    .and_then(|r| r.failure())
                    .cloned()
                    .unwrap_or_else(|| AttemptFailure::new(FailureKind::Unknown, "no attempt was made"));
                warn!(
                    "All {} DAX attempts failed; last error: {}",
                    attempts.len(),
                    last_error
                );
                self.enter(RunState::Exhausted);
                self.enter(RunState::Failed);
                return PipelineResult::Exhausted {
                    last_error,
                    attempts,
                };
            }
        };

        let interpretation = self.interpreter.interpret(rows, question).await;
        match interpretation {
            Ok(narrative) => {
                self.enter(RunState::Interpreted);
                PipelineResult::Answered {
                    narrative,
                    attempts,
                }
            }
            Err(e) => {
                error!("Interpretation failed: {}", e);
                self.enter(RunState::Failed);
                PipelineResult::Failed { error: e, attempts }
            }
        }
    }

    fn enter(&self, state: RunState) {
        info!(state = %state, "Pipeline state");
        self.observer.on_state(state);
    }
}
