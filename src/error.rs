use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Power BI auth failed: {0}")]
    Auth(String),

    #[error("DAX synthesis error: {0}")]
    Synthesis(String),

    #[error("Interpretation error: {0}")]
    Interpretation(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, InsightError>;
