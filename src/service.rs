//! Insights service
//!
//! Wires configuration, reference data and the concrete Azure AD / OpenAI /
//! Power BI components into one [`RetryOrchestrator`] per question.

use crate::auth::{AzureAdTokenProvider, TokenProvider};
use crate::config::Config;
use crate::error::Result;
use crate::execution::engine::QueryExecutor;
use crate::execution::powerbi_engine::PowerBiExecutor;
use crate::execution_loop::attempt::PipelineResult;
use crate::execution_loop::orchestrator::{RetryOrchestrator, RunObserver};
use crate::interpreter::NarrativeInterpreter;
use crate::llm::{LlmClient, TextGenerator};
use crate::metadata::{shared_cache, ReferenceCache};
use crate::question::Question;
use crate::synthesizer::DaxSynthesizer;
use std::sync::Arc;
use tracing::{debug, info};

pub struct InsightsService {
    max_retries: u32,
    reference: Arc<ReferenceCache>,
    token_provider: Arc<dyn TokenProvider>,
    executor: Arc<dyn QueryExecutor>,
    dax_llm: Arc<dyn TextGenerator>,
    narrative_llm: Arc<dyn TextGenerator>,
}

impl InsightsService {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let reference = shared_cache(&config.reference_source(), config.reference_ttl);

        let dax_llm = LlmClient::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.dax_model.clone(),
            config.http_timeout,
        )?;
        let narrative_llm = LlmClient::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.narrative_model.clone(),
            config.http_timeout,
        )?;
        debug!(
            dax_model = dax_llm.model(),
            narrative_model = narrative_llm.model(),
            "Text generation clients ready"
        );

        Ok(Self {
            max_retries: config.max_retries,
            reference,
            token_provider: Arc::new(AzureAdTokenProvider::from_config(config)?),
            executor: Arc::new(PowerBiExecutor::from_config(config)?),
            dax_llm: Arc::new(dax_llm),
            narrative_llm: Arc::new(narrative_llm),
        })
    }

    /// Workspace names from the catalogue, sorted
    pub fn workspace_names(&self) -> Result<Vec<String>> {
        let data = self.reference.get()?;
        Ok(data.workspace_names().into_iter().map(str::to_string).collect())
    }

    /// Force the reference files to be re-read
    pub fn reload_reference(&self) -> Result<()> {
        self.reference.reload()?;
        Ok(())
    }

    /// Answer `question` against the dataset registered under `workspace`.
    ///
    /// Errors here are pre-flight problems (unknown workspace, blank question,
    /// unreadable reference files); everything after that is a
    /// [`PipelineResult`].
    pub async fn ask(
        &self,
        workspace: &str,
        question: &str,
        observer: Option<Arc<dyn RunObserver>>,
    ) -> Result<PipelineResult> {
        let question = Question::new(question)?;
        let data = self.reference.get()?;
        let metadata = data.dataset(workspace)?;
        info!(
            "Selected workspace '{}': ID={}",
            workspace, metadata.workspace_id
        );

        let synthesizer = DaxSynthesizer::new(
            Arc::clone(&self.dax_llm),
            data.system_context.clone(),
        );
        let interpreter =
            NarrativeInterpreter::new(Arc::clone(&self.narrative_llm), data.system_context.clone());

        let mut orchestrator = RetryOrchestrator::new(
            Arc::clone(&self.token_provider),
            Arc::new(synthesizer),
            Arc::clone(&self.executor),
            Arc::new(interpreter),
            self.max_retries,
        )?;
        if let Some(observer) = observer {
            orchestrator = orchestrator.with_observer(observer);
        }
        debug!(max_retries = orchestrator.max_retries(), "Starting run");

        Ok(orchestrator.run(&metadata, &question).await)
    }
}
