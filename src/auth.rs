//! Power BI authentication
//!
//! Client-credential token acquisition against Azure AD. The pipeline only
//! sees [`TokenProvider::acquire`]; caching stays inside the provider.

use crate::config::Config;
use crate::error::{InsightError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const POWER_BI_SCOPE: &str = "https://analysis.windows.net/powerbi/api/.default";

/// Bearer credential for the Power BI REST API
#[derive(Clone)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Fetch a credential, failing with [`InsightError::Auth`].
    async fn acquire(&self) -> Result<Credential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: Option<String>,
    error_description: Option<String>,
}

pub struct AzureAdTokenProvider {
    http_client: Client,
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    cached: Arc<RwLock<Option<Credential>>>,
}

impl AzureAdTokenProvider {
    pub fn new(
        authority_host: impl Into<String>,
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            authority_host: authority_host.into().trim_end_matches('/').to_string(),
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            cached: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.authority_host.clone(),
            config.tenant_id.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.http_timeout,
        )
    }

    fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }

    async fn request_token(&self) -> Result<Credential> {
        let body = format!(
            "client_id={}&client_secret={}&scope={}&grant_type=client_credentials",
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.client_secret),
            urlencoding::encode(POWER_BI_SCOPE)
        );

        let response = self
            .http_client
            .post(self.token_url())
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await
            .map_err(|e| InsightError::Auth(format!("token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<TokenErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error_description.or(e.error))
                .unwrap_or(error_body);
            return Err(InsightError::Auth(format!("{} ({})", reason, status.as_u16())));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| InsightError::Auth(format!("Failed to parse token response: {}", e)))?;

        if token.access_token.is_empty() {
            return Err(InsightError::Auth("token response carried no access_token".to_string()));
        }

        let expires_at = Utc::now() + ChronoDuration::seconds(token.expires_in as i64);
        Ok(Credential::new(token.access_token, expires_at))
    }
}

#[async_trait]
impl TokenProvider for AzureAdTokenProvider {
    async fn acquire(&self) -> Result<Credential> {
        {
            let cached = self.cached.read().await;
            if let Some(ref credential) = *cached {
                if credential.expires_at() > Utc::now() + ChronoDuration::minutes(5) {
                    debug!("Reusing cached Power BI token");
                    return Ok(credential.clone());
                }
            }
        }

        let credential = self.request_token().await?;
        info!(expires_at = %credential.expires_at(), "Authenticated to Power BI");

        let mut cached = self.cached.write().await;
        *cached = Some(credential.clone());
        Ok(credential)
    }
}
