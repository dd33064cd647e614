//! Planning phase: pick the tools for a turn.
//!
//! Three paths, tried in order:
//! 1. **Model**: structured orchestration, when the active model supports it
//! 2. **Template**: the `tool_selection` template, parsed as JSON
//! 3. **Heuristic**: one tool per file by MIME type, no model call
//!
//! Whatever path wins, tools missing from the live catalogue are dropped.

use std::collections::HashSet;

use super::prompts::{render, PromptTemplates, PLANNER_SYSTEM_PROMPT};
use super::types::{ConversationTurn, Plan, PlanSource};
use crate::gateway::structured::parse_structured;
use crate::gateway::ModelHandle;
use crate::registry::builtin::{
    AUDIO_TRANSCRIPTION, IMAGE_ANALYSIS, PDF_FULL_EXTRACTION, SPREADSHEET_ANALYSIS,
    TEXT_ANALYSIS, VIDEO_ANALYSIS,
};
use crate::registry::{catalogue_json, ToolDescriptor};
use crate::uploads::{file_manifest, FileRecord};

/// Everything the planner sees for one turn.
pub struct PlanningContext<'a> {
    pub user_request: &'a str,
    pub files: &'a [FileRecord],
    /// Live-available tools only.
    pub available: &'a [&'a ToolDescriptor],
    /// Recent turns, oldest first.
    pub history: &'a [ConversationTurn],
}

impl PlanningContext<'_> {
    fn context_json(&self) -> String {
        let turns: Vec<serde_json::Value> =
            self.history.iter().map(ConversationTurn::prompt_entry).collect();
        serde_json::Value::Array(turns).to_string()
    }

    fn structured_prompt(&self) -> String {
        serde_json::json!({
            "task": "select_tools",
            "user_request": self.user_request,
            "files": file_manifest(self.files),
            "available_tools": catalogue_json(self.available),
            "recent_conversation": self
                .history
                .iter()
                .map(ConversationTurn::prompt_entry)
                .collect::<Vec<_>>(),
            "response_schema": {
                "selected_tools": ["tool id"],
                "reasoning": "string",
                "execution_order": ["tool id"],
                "tool_parameters": {"tool id": {"parameter": "value"}},
                "file_requirements": {"tool id": ["file name"]}
            }
        })
        .to_string()
    }

    fn template_prompt(&self, templates: &PromptTemplates) -> String {
        let manifest = file_manifest(self.files).to_string();
        let catalogue = catalogue_json(self.available).to_string();
        let context = self.context_json();
        render(
            &templates.tool_selection,
            &[
                ("user_request", self.user_request),
                ("file_manifest", &manifest),
                ("tool_catalogue", &catalogue),
                ("conversation_context", &context),
            ],
        )
    }
}

/// Produce the plan for a turn. Never fails: model problems fall through to
/// the heuristic.
pub async fn plan_turn(
    model: Option<&ModelHandle>,
    templates: &PromptTemplates,
    ctx: &PlanningContext<'_>,
) -> Plan {
    let available: HashSet<&str> = ctx.available.iter().map(|t| t.id.as_str()).collect();

    let plan = match model {
        Some(model) if !available.is_empty() => model_plan(model, templates, ctx).await,
        Some(_) => {
            tracing::info!("no tools available, skipping model planning");
            None
        }
        None => None,
    }
    .unwrap_or_else(|| heuristic_plan(ctx.files));

    let plan = plan.retain_available(&available);
    tracing::info!(
        source = ?plan.source,
        tools = ?plan.execution_order,
        reasoning = %plan.reasoning,
        "plan resolved"
    );
    plan
}

async fn model_plan(
    model: &ModelHandle,
    templates: &PromptTemplates,
    ctx: &PlanningContext<'_>,
) -> Option<Plan> {
    if model.supports_structured_orchestration() {
        match model
            .generate_structured(&ctx.structured_prompt(), PLANNER_SYSTEM_PROMPT)
            .await
        {
            Ok(value) => {
                let plan = Plan::from_value(&value, PlanSource::Model);
                if plan.is_none() {
                    tracing::warn!(model = %model.id(), "structured plan missing selected_tools");
                }
                plan
            }
            Err(e) => {
                tracing::warn!(model = %model.id(), error = %e, "structured planning failed");
                None
            }
        }
    } else {
        let text = match model
            .generate(&ctx.template_prompt(templates), PLANNER_SYSTEM_PROMPT)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(model = %model.id(), error = %e, "template planning failed");
                return None;
            }
        };
        match parse_structured(&text) {
            Ok(value) => Plan::from_value(&value, PlanSource::Template),
            Err(e) => {
                tracing::warn!(model = %model.id(), error = %e, "template plan unparseable");
                None
            }
        }
    }
}

// ─── Heuristic fallback ─────────────────────────────────────────────────────

/// One tool per file by fixed MIME precedence, de-duplicated.
pub fn heuristic_plan(files: &[FileRecord]) -> Plan {
    let tools = files
        .iter()
        .filter_map(|f| heuristic_tool_for(&f.mime_type))
        .map(str::to_string)
        .collect();
    Plan::with_tools(tools, "selected by file type", PlanSource::Heuristic)
}

/// The built-in tool for a MIME type. PDF beats spreadsheet beats image beats
/// text/word beats video beats audio.
pub fn heuristic_tool_for(mime_type: &str) -> Option<&'static str> {
    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("pdf") {
        Some(PDF_FULL_EXTRACTION)
    } else if mime.contains("spreadsheet") || mime.contains("excel") || mime == "text/csv" {
        Some(SPREADSHEET_ANALYSIS)
    } else if mime.starts_with("image/") {
        Some(IMAGE_ANALYSIS)
    } else if mime.starts_with("text/") || mime.contains("word") {
        Some(TEXT_ANALYSIS)
    } else if mime.starts_with("video/") {
        Some(VIDEO_ANALYSIS)
    } else if mime.starts_with("audio/") {
        Some(AUDIO_TRANSCRIPTION)
    } else {
        None
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
