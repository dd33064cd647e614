//! The generation seam and backend selection.

use std::sync::Arc;

use async_trait::async_trait;

use super::errors::ModelError;
use super::hosted::HostedApiBackend;
use super::local_process::LocalProcessBackend;
use super::types::{ModelConfig, ModelKind};

/// Raw text generation. One implementation per `ModelKind`.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ModelError>;

    /// Generation in a JSON-constrained mode, where the backend has one.
    /// Prompts arrive already framed for JSON.
    async fn generate_json(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String, ModelError> {
        self.generate(prompt, system_prompt).await
    }
}

/// Build the backend for a catalogue entry.
///
/// Local workers are spawned here and must report ready before this returns.
pub async fn build_backend(config: &ModelConfig) -> Result<Arc<dyn TextGenerator>, ModelError> {
    match config.kind {
        ModelKind::HostedApi => Ok(Arc::new(HostedApiBackend::new(config)?)),
        ModelKind::LocalProcess => Ok(Arc::new(LocalProcessBackend::spawn(config).await?)),
    }
}
