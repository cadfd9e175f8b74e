use thiserror::Error;

#[derive(Error, Debug)]
pub enum NlqError {
    #[error("LLM error: {0}")]
    Llm(String),

    /// Transient provider failure (service unavailable, rate limit).
    /// The only error class the orchestrator retries.
    #[error("LLM temporarily unavailable: {0}")]
    LlmUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NlqError {
    /// Whether the orchestrator may retry the failed operation with the
    /// same input. Validation and translation outcomes are deterministic,
    /// so only transient provider failures qualify.
    pub fn is_transient(&self) -> bool {
        matches!(self, NlqError::LlmUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, NlqError>;
