use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types that can occur when interacting with LLM providers.
///
/// Classification matters beyond display: `agentworld_core`'s call layer
/// retries [`LLMError::RateLimited`] and [`LLMError::Provider`] with backoff
/// but treats [`LLMError::Auth`] as fatal (spec §4.7).
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum LLMError {
    #[error("HTTP transport error: {0}")]
    Http(String),

    #[error("authentication/authorization error: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("rate limited, retry after {retry_after_ms:?}ms: {message}")]
    RateLimited {
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("response format error: {message}. raw: {raw_response}")]
    ResponseFormat {
        message: String,
        raw_response: String,
    },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("operation not implemented: {0}")]
    NotImplemented(String),

    #[error("request timed out after {0}ms")]
    Timeout(u64),
}

impl LLMError {
    /// Transient errors are retried by the call layer with exponential backoff;
    /// auth/permission failures and malformed requests are not (spec §4.7, §7).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::RateLimited { .. } | LLMError::Http(_) | LLMError::Provider(_)
        )
    }
}

impl From<serde_json::Error> for LLMError {
    fn from(err: serde_json::Error) -> Self {
        LLMError::Json(format!("{} at line {} column {}", err, err.line(), err.column()))
    }
}
