//! Orchestrator: the Planning → Executing → Synthesizing → Complete pipeline.
//!
//! Every turn ends in a response. Failures in planning or synthesis fall back
//! to deterministic paths; only a missing model or rejected uploads surface
//! as a turn-level `error`, and even then the caller gets an apology.

use std::sync::{Arc, RwLock};

use chrono::Utc;
use uuid::Uuid;

use super::conversation::ConversationStore;
use super::errors::OrchestratorError;
use super::executor::PlanExecutor;
use super::planner::{plan_turn, PlanningContext};
use super::prompts::PromptTemplates;
use super::retry::RetryPolicy;
use super::synthesis::synthesize;
use super::types::{
    ConversationTurn, ModelHealth, ModelStatus, ToolStatus, TurnRequest, TurnResponse,
};
use crate::config::{AppConfig, OrchestrationSettings, UploadSettings};
use crate::dispatcher::{Dispatcher, ToolExecutor, ToolResult};
use crate::gateway::{ModelCatalogue, ModelDescriptor, ModelHandle};
use crate::registry::{ToolDescriptor, ToolRegistry};
use crate::uploads::{validate_files, FileRecord};

/// Confidence reported when no tools ran.
const NO_TOOLS_CONFIDENCE: f64 = 0.5;

/// `successes / total`, or 0.5 when nothing ran.
pub fn turn_confidence(results: &[ToolResult]) -> f64 {
    if results.is_empty() {
        return NO_TOOLS_CONFIDENCE;
    }
    let succeeded = results.iter().filter(|r| r.success).count();
    succeeded as f64 / results.len() as f64
}

// ─── Orchestrator ───────────────────────────────────────────────────────────

pub struct Orchestrator {
    registry: Arc<ToolRegistry>,
    executor: Arc<dyn ToolExecutor>,
    models: ModelCatalogue,
    /// Replaced wholesale on switch. Turns hold their own clone of the Arc.
    active: RwLock<Option<Arc<ModelHandle>>>,
    conversations: Arc<ConversationStore>,
    settings: OrchestrationSettings,
    uploads: UploadSettings,
    templates: PromptTemplates,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<ToolRegistry>,
        executor: Arc<dyn ToolExecutor>,
        models: ModelCatalogue,
        settings: OrchestrationSettings,
        uploads: UploadSettings,
        templates: PromptTemplates,
    ) -> Self {
        Self {
            registry,
            executor,
            models,
            active: RwLock::new(None),
            conversations: Arc::new(ConversationStore::new(settings.max_history_turns)),
            settings,
            uploads,
            templates,
        }
    }

    /// Wire the full stack from configuration: registry, dispatcher (with
    /// capability servers brought up), model catalogue, and the startup model.
    pub async fn from_config(config: &AppConfig) -> Result<Self, OrchestratorError> {
        let registry = Arc::new(ToolRegistry::from_config(
            &config.tools,
            &config.container.endpoint,
        )?);

        let dispatcher = Dispatcher::new(
            &config.container,
            config.capability_servers.clone(),
            config.orchestration.tool_timeout(),
        )?;
        dispatcher.connect_all().await;

        let orchestrator = Self::new(
            registry,
            Arc::new(dispatcher),
            ModelCatalogue::new(config.models.clone()),
            config.orchestration.clone(),
            config.uploads.clone(),
            PromptTemplates::from_overrides(&config.templates),
        );

        if orchestrator.models.is_empty() {
            tracing::warn!("no models configured; turns will fail until one is added");
        } else if let Some(id) = config.startup_model_id() {
            if let Err(e) = orchestrator.switch_model(id).await {
                tracing::warn!(model = id, error = %e, "startup model unavailable");
            }
        }

        tracing::info!(
            tools = orchestrator.registry.all().len(),
            active_model = ?orchestrator.active_model().map(|m| m.id().to_string()),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    // ─── Model management ───────────────────────────────────────────────

    /// Snapshot of the active model.
    pub fn active_model(&self) -> Option<Arc<ModelHandle>> {
        match self.active.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Install a handle as the active model.
    pub fn set_active_model(&self, handle: ModelHandle) {
        let mut guard = match self.active.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(handle));
    }

    /// Activate a catalogue model. In-flight turns keep their old handle.
    pub async fn switch_model(&self, id: &str) -> Result<ModelDescriptor, OrchestratorError> {
        if self.models.get(id).is_none() {
            return Err(OrchestratorError::ModelNotFound { id: id.to_string() });
        }
        let handle = self.models.activate(id).await?;
        let descriptor = handle.descriptor().clone();
        self.set_active_model(handle);
        tracing::info!(model = id, "switched active model");
        Ok(descriptor)
    }

    pub fn list_models(&self) -> Vec<ModelStatus> {
        let active = self.active_model().map(|m| m.id().to_string());
        self.models
            .descriptors()
            .into_iter()
            .map(|descriptor| ModelStatus {
                active: active.as_deref() == Some(descriptor.id.as_str()),
                descriptor,
            })
            .collect()
    }

    pub async fn model_health(&self) -> Result<ModelHealth, OrchestratorError> {
        let model = self
            .active_model()
            .ok_or(OrchestratorError::NoModelAvailable)?;
        Ok(ModelHealth {
            model_id: model.id().to_string(),
            healthy: model.health_check().await,
        })
    }

    // ─── Tools and conversations ────────────────────────────────────────

    pub async fn list_tools(&self) -> Vec<ToolStatus> {
        let availability = self.executor.probe_availability(&self.registry).await;
        self.registry
            .all()
            .iter()
            .map(|t| ToolStatus {
                id: t.id.clone(),
                description: t.description.clone(),
                transport: t.transport_label(),
                available: availability.is_available(&t.transport),
            })
            .collect()
    }

    pub fn conversation(&self, id: &str) -> Result<Vec<ConversationTurn>, OrchestratorError> {
        self.conversations
            .history(id)
            .ok_or_else(|| OrchestratorError::ConversationNotFound { id: id.to_string() })
    }

    /// Run one tool directly, bypassing planning.
    pub async fn run_tool(
        &self,
        tool_id: &str,
        user_request: &str,
        files: &[FileRecord],
        overrides: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolResult, OrchestratorError> {
        let tool = self
            .registry
            .by_id(tool_id)
            .ok_or_else(|| OrchestratorError::ToolNotFound {
                id: tool_id.to_string(),
            })?;
        validate_files(files, &self.uploads)?;

        let availability = self.executor.probe_availability(&self.registry).await;
        if !availability.is_available(&tool.transport) {
            return Err(OrchestratorError::Validation {
                reason: format!("tool '{tool_id}' is not currently available"),
            });
        }

        Ok(self
            .plan_executor()
            .run_tool(tool_id, user_request, files, Some(&overrides))
            .await)
    }

    pub async fn shutdown(&self) {
        self.executor.shutdown().await;
    }

    fn plan_executor(&self) -> PlanExecutor<'_> {
        PlanExecutor {
            registry: &self.registry,
            executor: self.executor.as_ref(),
            retry: RetryPolicy::from_settings(&self.settings),
            max_concurrent: self.settings.max_concurrent_tools,
        }
    }

    // ─── Turn pipeline ──────────────────────────────────────────────────

    /// Process one user turn. Always returns a response.
    pub async fn process_turn(&self, request: TurnRequest) -> TurnResponse {
        let conversation_id = request
            .conversation_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.run_turn(&conversation_id, &request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    conversation = %conversation_id,
                    error = %e,
                    kind = e.kind(),
                    "turn failed"
                );
                TurnResponse {
                    response: format!("I'm sorry, I couldn't process your request: {e}"),
                    tools_used: Vec::new(),
                    confidence: 0.0,
                    conversation_id,
                    tool_results: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run_turn(
        &self,
        conversation_id: &str,
        request: &TurnRequest,
    ) -> Result<TurnResponse, OrchestratorError> {
        validate_files(&request.files, &self.uploads)?;
        let model = self
            .active_model()
            .ok_or(OrchestratorError::NoModelAvailable)?;

        let history = self
            .conversations
            .recent(conversation_id, self.settings.context_turns);

        // Planning
        let availability = self.executor.probe_availability(&self.registry).await;
        let available: Vec<&ToolDescriptor> = self.registry.available_now(&availability);
        let ctx = PlanningContext {
            user_request: &request.message,
            files: &request.files,
            available: &available,
            history: &history,
        };
        let plan = plan_turn(Some(model.as_ref()), &self.templates, &ctx).await;

        // Executing
        let results = self
            .plan_executor()
            .run_plan(&plan, &request.message, &request.files)
            .await;

        // Synthesizing
        let response = synthesize(
            Some(model.as_ref()),
            &self.templates,
            &request.message,
            &results,
            &history,
        )
        .await;

        // Complete
        let confidence = turn_confidence(&results);
        let tools_used = plan.execution_order.clone();
        self.conversations.append(
            conversation_id,
            ConversationTurn {
                user_message: request.message.clone(),
                tools_used: tools_used.clone(),
                tool_results: results.clone(),
                response: response.clone(),
                timestamp: Utc::now(),
            },
        );

        tracing::info!(
            conversation = %conversation_id,
            model = %model.id(),
            tools = ?tools_used,
            confidence,
            "turn complete"
        );

        Ok(TurnResponse {
            response,
            tools_used,
            confidence,
            conversation_id: conversation_id.to_string(),
            tool_results: results,
            error: None,
        })
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
