//! Orchestrator request, response, and plan types.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dispatcher::ToolResult;
use crate::gateway::ModelDescriptor;
use crate::uploads::FileRecord;

// ─── Turns ──────────────────────────────────────────────────────────────────

/// One user message plus its uploads.
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Continue this conversation; a new id is minted when `None`.
    pub conversation_id: Option<String>,
    pub message: String,
    pub files: Vec<FileRecord>,
}

/// What the caller gets back for a turn. Always populated, even on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub response: String,
    pub tools_used: Vec<String>,
    pub confidence: f64,
    pub conversation_id: String,
    #[serde(default)]
    pub tool_results: Vec<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A completed turn as stored in conversation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub user_message: String,
    pub tools_used: Vec<String>,
    pub tool_results: Vec<ToolResult>,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    /// Compact form for prompts: message, tools, and response only.
    pub fn prompt_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "user": self.user_message,
            "tools_used": self.tools_used,
            "assistant": self.response,
        })
    }
}

// ─── Plan ───────────────────────────────────────────────────────────────────

/// Which planning path produced a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    /// Structured orchestration by the active model.
    Model,
    /// Free-form generation from the tool-selection template.
    Template,
    /// MIME-type mapping, no model call.
    Heuristic,
}

/// Tool selection for one turn. Only ever filtered after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub selected_tools: Vec<String>,
    pub execution_order: Vec<String>,
    pub reasoning: String,
    pub tool_parameters: BTreeMap<String, serde_json::Map<String, serde_json::Value>>,
    /// Advisory only; file matching is done by MIME type.
    pub file_requirements: BTreeMap<String, Vec<String>>,
    pub source: PlanSource,
}

impl Plan {
    /// A plan with the given tools, in order.
    pub fn with_tools(tools: Vec<String>, reasoning: &str, source: PlanSource) -> Self {
        let selected = dedupe(tools);
        Self {
            execution_order: selected.clone(),
            selected_tools: selected,
            reasoning: reasoning.to_string(),
            tool_parameters: BTreeMap::new(),
            file_requirements: BTreeMap::new(),
            source,
        }
    }

    /// Read a plan from model JSON. `None` when `selected_tools` is missing.
    pub fn from_value(value: &serde_json::Value, source: PlanSource) -> Option<Self> {
        let selected = string_list(value.get("selected_tools")?)?;
        let selected = dedupe(selected);

        let execution_order = value
            .get("execution_order")
            .and_then(string_list)
            .map(dedupe)
            .filter(|order| !order.is_empty())
            .unwrap_or_else(|| selected.clone());

        let tool_parameters = value
            .get("tool_parameters")
            .and_then(|v| v.as_object())
            .map(|params| {
                params
                    .iter()
                    .filter_map(|(tool, p)| p.as_object().map(|o| (tool.clone(), o.clone())))
                    .collect()
            })
            .unwrap_or_default();

        let file_requirements = value
            .get("file_requirements")
            .and_then(|v| v.as_object())
            .map(|reqs| {
                reqs.iter()
                    .filter_map(|(tool, names)| string_list(names).map(|n| (tool.clone(), n)))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            selected_tools: selected,
            execution_order,
            reasoning: value
                .get("reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            tool_parameters,
            file_requirements,
            source,
        })
    }

    /// Drop tool ids that are not in `available`.
    pub fn retain_available(self, available: &HashSet<&str>) -> Self {
        let dropped: Vec<&String> = self
            .execution_order
            .iter()
            .chain(self.selected_tools.iter())
            .filter(|id| !available.contains(id.as_str()))
            .collect();
        if !dropped.is_empty() {
            tracing::info!(dropped = ?dropped, "dropping unavailable tools from plan");
        }

        let keep = |ids: Vec<String>| -> Vec<String> {
            ids.into_iter()
                .filter(|id| available.contains(id.as_str()))
                .collect()
        };
        Self {
            selected_tools: keep(self.selected_tools),
            execution_order: keep(self.execution_order),
            ..self
        }
    }

    pub fn overrides_for(&self, tool_id: &str) -> Option<&serde_json::Map<String, serde_json::Value>> {
        self.tool_parameters.get(tool_id)
    }
}

fn string_list(value: &serde_json::Value) -> Option<Vec<String>> {
    value.as_array().map(|items| {
        items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    })
}

/// Remove duplicates, keeping first occurrences in order.
fn dedupe(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

// ─── Status views ───────────────────────────────────────────────────────────

/// A catalogue entry plus whether its transport is live.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolStatus {
    pub id: String,
    pub description: String,
    pub transport: String,
    pub available: bool,
}

/// A model catalogue entry plus whether it is the active one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStatus {
    #[serde(flatten)]
    pub descriptor: ModelDescriptor,
    pub active: bool,
}

/// Result of an active-model health check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealth {
    pub model_id: String,
    pub healthy: bool,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_value_defaults_execution_order() {
        let value = serde_json::json!({
            "selected_tools": ["a", "b", "a"],
            "reasoning": "because",
            "tool_parameters": {"a": {"confidence": 0.7}},
            "file_requirements": {"a": ["x.pdf"]}
        });
        let plan = Plan::from_value(&value, PlanSource::Model).unwrap();
        assert_eq!(plan.selected_tools, vec!["a", "b"]);
        assert_eq!(plan.execution_order, vec!["a", "b"]);
        assert_eq!(plan.reasoning, "because");
        assert_eq!(plan.overrides_for("a").unwrap()["confidence"], 0.7);
        assert_eq!(plan.file_requirements["a"], vec!["x.pdf"]);
    }

    #[test]
    fn test_plan_from_value_explicit_order() {
        let value = serde_json::json!({
            "selected_tools": ["a", "b"],
            "execution_order": ["b", "a"]
        });
        let plan = Plan::from_value(&value, PlanSource::Template).unwrap();
        assert_eq!(plan.execution_order, vec!["b", "a"]);
        assert_eq!(plan.source, PlanSource::Template);
    }

    #[test]
    fn test_plan_from_value_requires_selected_tools() {
        assert!(Plan::from_value(&serde_json::json!({"reasoning": "x"}), PlanSource::Model).is_none());
        assert!(Plan::from_value(&serde_json::json!("text"), PlanSource::Model).is_none());
    }

    #[test]
    fn test_retain_available() {
        let plan = Plan::with_tools(
            vec!["a".into(), "ghost".into(), "b".into()],
            "",
            PlanSource::Model,
        );
        let available = HashSet::from(["a", "b"]);
        let plan = plan.retain_available(&available);
        assert_eq!(plan.execution_order, vec!["a", "b"]);
        assert_eq!(plan.selected_tools, vec!["a", "b"]);
    }

    #[test]
    fn test_turn_response_wire_shape() {
        let response = TurnResponse {
            response: "done".into(),
            tools_used: vec!["a".into()],
            confidence: 1.0,
            conversation_id: "c1".into(),
            tool_results: vec![],
            error: None,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["toolsUsed"][0], "a");
        assert_eq!(json["conversationId"], "c1");
        assert!(json.get("error").is_none());
    }
}
