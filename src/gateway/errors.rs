//! Model gateway error types.
//!
//! Callers log these with their own context; the variants carry enough detail
//! to build a useful log line.

use thiserror::Error;

/// Errors surfaced by text-generation backends.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Credential missing or rejected.
    #[error("authentication failed for model '{model}': {reason}")]
    Auth { model: String, reason: String },

    /// The backend asked us to slow down (HTTP 429).
    #[error("rate limited by model '{model}': {detail}")]
    RateLimited { model: String, detail: String },

    /// Non-2xx response other than auth or rate limiting.
    #[error("remote error {status}: {detail}")]
    Remote { status: u16, detail: String },

    /// The call did not finish within its bound.
    #[error("model call timed out after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Could not connect, or the local worker has exited.
    #[error("model service unavailable at {endpoint}: {reason}")]
    ServiceUnavailable { endpoint: String, reason: String },

    /// Structured generation produced text with no parseable JSON object.
    #[error("malformed structured response: {reason}")]
    MalformedStructuredResponse { reason: String, raw: String },

    /// The local worker answered `{success: false}`.
    #[error("local worker failed: {reason}")]
    WorkerFailed { reason: String },

    #[error("unknown model: '{id}'")]
    UnknownModel { id: String },

    /// Bad model configuration (missing base_url, missing command, ...).
    #[error("model config error: {reason}")]
    Config { reason: String },
}

impl ModelError {
    /// Map a reqwest transport error to the gateway taxonomy.
    pub(crate) fn from_reqwest(err: reqwest::Error, endpoint: &str, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ModelError::Timeout {
                duration_secs: timeout_secs,
            }
        } else {
            ModelError::ServiceUnavailable {
                endpoint: endpoint.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = ModelError::Remote {
            status: 502,
            detail: "bad gateway".into(),
        };
        assert_eq!(err.to_string(), "remote error 502: bad gateway");

        let err = ModelError::Timeout { duration_secs: 60 };
        assert_eq!(err.to_string(), "model call timed out after 60s");
    }
}
