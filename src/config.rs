//! Runtime configuration
//!
//! Everything the pipeline needs from the outside world: Azure AD client
//! credentials, the OpenAI key, the DAX retry budget and the locations of the
//! static reference files. Values come from the environment (a `.env` file is
//! honoured by the binary) and can be overridden from the command line.

use crate::error::{InsightError, Result};
use crate::metadata::ReferenceSource;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_PBI_API_BASE: &str = "https://api.powerbi.com/v1.0/myorg";
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_DAX_MODEL: &str = "gpt-4.1";
pub const DEFAULT_NARRATIVE_MODEL: &str = "gpt-4.1-mini";

#[derive(Clone)]
pub struct Config {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub openai_api_key: String,

    /// Maximum generate/execute cycles per question
    pub max_retries: u32,

    pub workspaces_file: PathBuf,
    pub context_file: PathBuf,
    /// How long loaded reference data stays fresh before the next run reloads it
    pub reference_ttl: Duration,

    pub pbi_api_base: String,
    pub authority_host: String,
    pub openai_base_url: String,
    pub dax_model: String,
    pub narrative_model: String,
    pub http_timeout: Duration,
}

impl Config {
    /// Build configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| -> String {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let max_retries = parse_number(&lookup, "MAX_DAX_RETRIES", u64::from(DEFAULT_MAX_RETRIES))?;
        let max_retries = u32::try_from(max_retries).map_err(|_| {
            InsightError::Config(format!(
                "MAX_DAX_RETRIES must be at most {}, got {}",
                u32::MAX,
                max_retries
            ))
        })?;
        let reference_ttl = parse_number(&lookup, "REFERENCE_TTL_SECS", 3600)?;
        let http_timeout = parse_number(&lookup, "HTTP_TIMEOUT_SECS", 120)?;

        Ok(Self {
            tenant_id: get("AZURE_TENANT_ID", ""),
            client_id: get("AZURE_CLIENT_ID", ""),
            client_secret: get("AZURE_CLIENT_SECRET", ""),
            openai_api_key: get("OPENAI_API_KEY", ""),
            max_retries,
            workspaces_file: PathBuf::from(get("WORKSPACES_FILE", "workspaces.json")),
            context_file: PathBuf::from(get("CONTEXT_FILE", "context.txt")),
            reference_ttl: Duration::from_secs(reference_ttl),
            pbi_api_base: get("PBI_API_BASE", DEFAULT_PBI_API_BASE)
                .trim_end_matches('/')
                .to_string(),
            authority_host: get("AZURE_AUTHORITY_HOST", DEFAULT_AUTHORITY_HOST)
                .trim_end_matches('/')
                .to_string(),
            openai_base_url: get("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            dax_model: get("DAX_MODEL", DEFAULT_DAX_MODEL),
            narrative_model: get("NARRATIVE_MODEL", DEFAULT_NARRATIVE_MODEL),
            http_timeout: Duration::from_secs(http_timeout),
        })
    }

    /// The static reference files this configuration points at
    pub fn reference_source(&self) -> ReferenceSource {
        ReferenceSource::new(self.workspaces_file.clone(), self.context_file.clone())
    }

    /// Check that the configuration can drive a full pipeline run.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("AZURE_TENANT_ID", &self.tenant_id),
            ("AZURE_CLIENT_ID", &self.client_id),
            ("AZURE_CLIENT_SECRET", &self.client_secret),
            ("OPENAI_API_KEY", &self.openai_api_key),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(InsightError::Config(format!(
                "missing required settings: {}",
                missing.join(", ")
            )));
        }

        if self.max_retries == 0 {
            return Err(InsightError::Config(
                "max retries must be a positive integer".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_number<F>(lookup: &F, key: &str, default: u64) -> Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
            InsightError::Config(format!("{} must be a non-negative integer, got '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}

// Secrets stay out of logs and panic messages.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .field("max_retries", &self.max_retries)
            .field("workspaces_file", &self.workspaces_file)
            .field("context_file", &self.context_file)
            .field("reference_ttl", &self.reference_ttl)
            .field("pbi_api_base", &self.pbi_api_base)
            .field("authority_host", &self.authority_host)
            .field("openai_base_url", &self.openai_base_url)
            .field("dax_model", &self.dax_model)
            .field("narrative_model", &self.narrative_model)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}
