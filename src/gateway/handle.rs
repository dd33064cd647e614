//! Live model handles and the model catalogue.

use std::collections::HashMap;
use std::sync::Arc;

use super::backend::{build_backend, TextGenerator};
use super::errors::ModelError;
use super::structured::{frame_for_json, is_healthy_reply, parse_structured, HEALTH_PROMPT};
use super::types::{ModelConfig, ModelDescriptor};

/// Capability flag for a dedicated response-synthesis mode.
pub const RESPONSE_SYNTHESIS_CAPABILITY: &str = "response_synthesis";

// ─── ModelHandle ─────────────────────────────────────────────────────────────

/// A descriptor bound to a live backend. Cloning shares the backend.
#[derive(Clone)]
pub struct ModelHandle {
    descriptor: ModelDescriptor,
    backend: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl ModelHandle {
    pub fn new(descriptor: ModelDescriptor, backend: Arc<dyn TextGenerator>) -> Self {
        Self {
            descriptor,
            backend,
        }
    }

    pub fn descriptor(&self) -> &ModelDescriptor {
        &self.descriptor
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn supports_structured_orchestration(&self) -> bool {
        self.descriptor.supports_structured_orchestration
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.descriptor.capabilities.contains(capability)
    }

    /// Free-form generation.
    pub async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ModelError> {
        self.backend.generate(prompt, system_prompt).await
    }

    /// Generation parsed as a JSON value.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<serde_json::Value, ModelError> {
        let (prompt, system_prompt) = frame_for_json(prompt, system_prompt);
        let text = self.backend.generate_json(&prompt, &system_prompt).await?;
        parse_structured(&text).inspect_err(|e| {
            tracing::warn!(model = %self.descriptor.id, error = %e, "structured parse failed");
        })
    }

    /// Liveness via the canonical OK prompt. Any error counts as unhealthy.
    pub async fn health_check(&self) -> bool {
        match self.backend.generate(HEALTH_PROMPT, "").await {
            Ok(reply) => is_healthy_reply(&reply),
            Err(e) => {
                tracing::debug!(model = %self.descriptor.id, error = %e, "health check failed");
                false
            }
        }
    }
}

// ─── ModelCatalogue ──────────────────────────────────────────────────────────

/// Load-once list of configured models, in config order.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalogue {
    models: Vec<ModelConfig>,
    index: HashMap<String, usize>,
}

impl ModelCatalogue {
    pub fn new(models: Vec<ModelConfig>) -> Self {
        let index = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();
        Self { models, index }
    }

    pub fn get(&self, id: &str) -> Option<&ModelConfig> {
        self.index.get(id).map(|&i| &self.models[i])
    }

    pub fn descriptors(&self) -> Vec<ModelDescriptor> {
        self.models.iter().map(ModelConfig::descriptor).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Build a live handle for a catalogue entry.
    pub async fn activate(&self, id: &str) -> Result<ModelHandle, ModelError> {
        let config = self
            .get(id)
            .ok_or_else(|| ModelError::UnknownModel { id: id.to_string() })?;
        let backend = build_backend(config).await?;
        tracing::info!(model = %id, kind = ?config.kind, "model activated");
        Ok(ModelHandle::new(config.descriptor(), backend))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
