//! Capability dispatcher error types.
//!
//! These never cross the dispatcher boundary as `Err`: they are rendered into
//! `ToolResult.error`, and `is_retriable` feeds the orchestrator's retry policy.

use thiserror::Error;

/// Errors raised while executing one tool call.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Connection refused, DNS failure, or a server that would not come up.
    #[error("service unavailable at {target}: {reason}")]
    ServiceUnavailable { target: String, reason: String },

    /// Non-2xx response from the tool service.
    #[error("remote error {status}: {detail}")]
    Remote { status: u16, detail: String },

    #[error("tool '{tool}' timed out after {timeout_secs}s")]
    Timeout { tool: String, timeout_secs: u64 },

    /// The invocation itself is unusable (no matching file, unreadable file).
    #[error("invalid invocation of '{tool}': {reason}")]
    Validation { tool: String, reason: String },

    /// The tool names a capability server missing from config.
    #[error("unknown capability server: '{name}'")]
    UnknownServer { name: String },
}

impl DispatchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retriable(&self) -> bool {
        !matches!(
            self,
            DispatchError::Validation { .. } | DispatchError::UnknownServer { .. }
        )
    }

    /// Classify a reqwest failure for a call to `target`.
    pub(crate) fn from_reqwest(
        err: reqwest::Error,
        tool: &str,
        target: &str,
        timeout_secs: u64,
    ) -> Self {
        if err.is_timeout() {
            DispatchError::Timeout {
                tool: tool.to_string(),
                timeout_secs,
            }
        } else {
            DispatchError::ServiceUnavailable {
                target: target.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(DispatchError::Remote {
            status: 500,
            detail: String::new()
        }
        .is_retriable());
        assert!(DispatchError::Timeout {
            tool: "t".into(),
            timeout_secs: 60
        }
        .is_retriable());
        assert!(DispatchError::ServiceUnavailable {
            target: "x".into(),
            reason: "refused".into()
        }
        .is_retriable());
        assert!(!DispatchError::Validation {
            tool: "t".into(),
            reason: "no file".into()
        }
        .is_retriable());
        assert!(!DispatchError::UnknownServer { name: "v".into() }.is_retriable());
    }
}
