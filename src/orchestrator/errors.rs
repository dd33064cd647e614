//! Orchestrator error types.

use thiserror::Error;

use crate::config::ConfigError;
use crate::dispatcher::DispatchError;
use crate::gateway::ModelError;
use crate::registry::RegistryError;
use crate::uploads::UploadError;

/// Errors surfaced by orchestrator operations.
///
/// `process_turn` never returns these; it folds them into an apologetic
/// response. The direct operations (`run_tool`, `conversation`, ...) do.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Bad input: rejected uploads, unavailable tool.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("tool not found: '{id}'")]
    ToolNotFound { id: String },

    #[error("conversation not found: '{id}'")]
    ConversationNotFound { id: String },

    #[error("model not found: '{id}'")]
    ModelNotFound { id: String },

    #[error("no model is active")]
    NoModelAvailable,

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("dispatcher setup failed: {0}")]
    Dispatch(#[from] DispatchError),
}

impl From<UploadError> for OrchestratorError {
    fn from(e: UploadError) -> Self {
        OrchestratorError::Validation {
            reason: e.to_string(),
        }
    }
}

impl OrchestratorError {
    /// Short machine-readable kind, used in the turn response `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Validation { .. } => "validation_error",
            OrchestratorError::ToolNotFound { .. }
            | OrchestratorError::ConversationNotFound { .. }
            | OrchestratorError::ModelNotFound { .. } => "not_found",
            OrchestratorError::NoModelAvailable => "no_model_available",
            OrchestratorError::Model(_) => "model_error",
            OrchestratorError::Registry(_) | OrchestratorError::Config(_) => "config_error",
            OrchestratorError::Dispatch(_) => "dispatch_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_error_becomes_validation() {
        let err: OrchestratorError = UploadError::UnsupportedType {
            name: "a.exe".into(),
            mime_type: "application/x-msdownload".into(),
        }
        .into();
        assert_eq!(err.kind(), "validation_error");
        assert!(err.to_string().contains("a.exe"));
    }

    #[test]
    fn test_model_error_is_transparent() {
        let err: OrchestratorError = ModelError::UnknownModel { id: "x".into() }.into();
        assert_eq!(err.to_string(), "unknown model: 'x'");
    }
}
