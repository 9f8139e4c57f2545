//! Error Classifier
//!
//! Maps everything that can go wrong in one DAX attempt onto a small taxonomy
//! the retry loop can reason about and feed back into synthesis.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

const MAX_MESSAGE_LEN: usize = 1000;

/// Failure taxonomy for a single attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// Power BI refused the bearer token (401/403)
    AuthRejected,
    /// The engine rejected the DAX itself (syntax, unknown column, ...)
    InvalidQuery,
    /// Timeouts, connection failures, throttling, 5xx
    Transient,
    /// The generation service failed before any DAX was produced
    SynthesisFailed,
    Unknown,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::AuthRejected => write!(f, "AuthRejected"),
            FailureKind::InvalidQuery => write!(f, "InvalidQuery"),
            FailureKind::Transient => write!(f, "Transient"),
            FailureKind::SynthesisFailed => write!(f, "SynthesisFailed"),
            FailureKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A classified attempt failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl AttemptFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: truncate(message.into()),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Error classifier
pub struct ErrorClassifier;

impl ErrorClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify a non-success HTTP status from the executeQueries endpoint
    pub fn classify_status(&self, status: StatusCode) -> FailureKind {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::AuthRejected,
            StatusCode::BAD_REQUEST => FailureKind::InvalidQuery,
            StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => FailureKind::Transient,
            s if s.is_server_error() => FailureKind::Transient,
            _ => FailureKind::Unknown,
        }
    }

    /// Classify a transport-level error raised before a response arrived
    pub fn classify_transport(&self, error: &reqwest::Error) -> FailureKind {
        if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            FailureKind::Transient
        } else {
            FailureKind::Unknown
        }
    }

    /// Build the failure for an HTTP error response
    pub fn classify_response(&self, status: StatusCode, body: &str) -> AttemptFailure {
        let kind = self.classify_status(status);
        let detail = service_message(body).unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("empty response body")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });
        AttemptFailure::new(kind, format!("HTTP {}: {}", status.as_u16(), detail))
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the most specific human-readable message out of a Power BI error body.
///
/// Order of preference: the `DetailsMessage` entry under `pbi.error.details`,
/// any other detail value, `error.message`, then `error.code`.
pub fn service_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    error_object_message(value.get("error")?)
}

/// Same extraction, applied to an already-parsed `error` object.
pub fn error_object_message(error: &Value) -> Option<String> {
    if let Some(details) = error
        .get("pbi.error")
        .and_then(|pbi| pbi.get("details"))
        .and_then(|d| d.as_array())
    {
        let detail_value = |entry: &Value| {
            entry
                .get("detail")
                .and_then(|d| d.get("value"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };

        let preferred = details
            .iter()
            .find(|d| d.get("code").and_then(|c| c.as_str()) == Some("DetailsMessage"))
            .and_then(detail_value);
        if let Some(message) = preferred.or_else(|| details.iter().find_map(detail_value)) {
            return Some(message);
        }
    }

    error
        .get("message")
        .and_then(|m| m.as_str())
        .or_else(|| error.get("code").and_then(|c| c.as_str()))
        .map(str::to_string)
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut cut = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
        message.push_str("...");
    }
    message
}
