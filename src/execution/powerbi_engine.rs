//! Power BI Execution Engine
//!
//! Runs DAX through the REST `executeQueries` endpoint of a dataset.

use crate::auth::Credential;
use crate::config::Config;
use crate::error::Result;
use crate::execution::engine::{ExecutionOutcome, QueryCandidate, QueryExecutor};
use crate::execution::result::parse_execute_response;
use crate::execution_loop::error_classifier::{AttemptFailure, ErrorClassifier};
use crate::metadata::DatasetMetadata;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

// POST {api_base}/groups/{workspace}/datasets/{dataset}/executeQueries
// Body: {"queries":[{"query":"EVALUATE ..."}],"serializerSettings":{"includeNulls":true}}

#[derive(Debug, Serialize)]
struct ExecuteQueriesRequest<'a> {
    queries: [DaxQuery<'a>; 1],
    #[serde(rename = "serializerSettings")]
    serializer_settings: SerializerSettings,
}

#[derive(Debug, Serialize)]
struct DaxQuery<'a> {
    query: &'a str,
}

#[derive(Debug, Serialize)]
struct SerializerSettings {
    #[serde(rename = "includeNulls")]
    include_nulls: bool,
}

/// Power BI execution engine
pub struct PowerBiExecutor {
    client: Client,
    api_base: String,
    include_nulls: bool,
    classifier: ErrorClassifier,
}

impl PowerBiExecutor {
    /// Create a new executor
    ///
    /// # Arguments
    /// * `api_base` - REST root, e.g. "https://api.powerbi.com/v1.0/myorg"
    /// * `timeout` - Upper bound for one executeQueries round trip
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            include_nulls: true,
            classifier: ErrorClassifier::new(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.pbi_api_base.clone(), config.http_timeout)
    }

    /// Toggle `serializerSettings.includeNulls` (on by default)
    pub fn with_include_nulls(mut self, include_nulls: bool) -> Self {
        self.include_nulls = include_nulls;
        self
    }

    fn execute_url(&self, metadata: &DatasetMetadata) -> String {
        format!(
            "{}/groups/{}/datasets/{}/executeQueries",
            self.api_base, metadata.workspace_id, metadata.dataset_id
        )
    }
}

#[async_trait]
impl QueryExecutor for PowerBiExecutor {
    async fn execute(
        &self,
        credential: &Credential,
        metadata: &DatasetMetadata,
        candidate: &QueryCandidate,
    ) -> ExecutionOutcome {
        let url = self.execute_url(metadata);
        let request = ExecuteQueriesRequest {
            queries: [DaxQuery {
                query: &candidate.query,
            }],
            serializer_settings: SerializerSettings {
                include_nulls: self.include_nulls,
            },
        };

        debug!(url = %url, attempt = candidate.attempt_number, "Executing DAX");
        let response = match self
            .client
            .post(&url)
            .header("Authorization", credential.bearer_header())
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let kind = self.classifier.classify_transport(&e);
                warn!("executeQueries transport error ({}): {}", kind, e);
                return ExecutionOutcome::Failure(AttemptFailure::new(
                    kind,
                    format!("executeQueries request failed: {}", e),
                ));
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                let kind = self.classifier.classify_transport(&e);
                return ExecutionOutcome::Failure(AttemptFailure::new(
                    kind,
                    format!("Failed to read executeQueries response: {}", e),
                ));
            }
        };

        if !status.is_success() {
            let failure = self.classifier.classify_response(status, &body);
            warn!("executeQueries failed: {}", failure);
            return ExecutionOutcome::Failure(failure);
        }

        match parse_execute_response(&body) {
            Ok(payload) => {
                info!(rows = payload.row_count(), "DAX query succeeded");
                ExecutionOutcome::Success(payload)
            }
            Err(failure) => {
                warn!("executeQueries returned an unusable body: {}", failure);
                ExecutionOutcome::Failure(failure)
            }
        }
    }
}
