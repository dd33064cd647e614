//! Executing phase: run each planned tool with retry, in bounded parallel.
//!
//! Results come back in plan order, one per planned tool, whatever the
//! outcome. A failed tool never stops the rest of the plan.

use std::sync::OnceLock;

use futures::stream::{self, StreamExt};
use regex::Regex;

use super::retry::RetryPolicy;
use super::types::Plan;
use crate::dispatcher::{DispatchError, ToolExecutor, ToolInvocation, ToolResult};
use crate::registry::{ToolDescriptor, ToolRegistry};
use crate::uploads::FileRecord;

type Parameters = serde_json::Map<String, serde_json::Value>;

const CONFIDENCE_PATTERN: &str = r"(?i)confidence[:\s]*([0-9]*\.?[0-9]+)";

fn confidence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CONFIDENCE_PATTERN).expect("confidence pattern must compile"))
}

/// A `confidence` value stated in the user's text, e.g. "confidence: 0.5".
pub fn scrape_confidence(text: &str) -> Option<f64> {
    confidence_regex()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Descriptor defaults, then plan overrides, then the scraped confidence.
pub fn merge_parameters(
    tool: &ToolDescriptor,
    overrides: Option<&Parameters>,
    user_request: &str,
) -> Parameters {
    let mut merged = tool.default_values();
    if let Some(overrides) = overrides {
        merged.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(confidence) = scrape_confidence(user_request) {
        let confidence = tool
            .parameter_spec("confidence")
            .map_or(confidence, |spec| spec.clamp(confidence));
        merged.insert("confidence".into(), serde_json::json!(confidence));
    }
    merged
}

// ─── PlanExecutor ───────────────────────────────────────────────────────────

/// Runs tools against an executor with the turn's retry policy.
pub struct PlanExecutor<'a> {
    pub registry: &'a ToolRegistry,
    pub executor: &'a dyn ToolExecutor,
    pub retry: RetryPolicy,
    /// At most this many tools in flight.
    pub max_concurrent: usize,
}

impl PlanExecutor<'_> {
    /// Run the plan's execution order. Output positions match the order.
    pub async fn run_plan(
        &self,
        plan: &Plan,
        user_request: &str,
        files: &[FileRecord],
    ) -> Vec<ToolResult> {
        if plan.execution_order.is_empty() {
            return Vec::new();
        }

        stream::iter(plan.execution_order.iter())
            .map(|tool_id| self.run_tool(tool_id, user_request, files, plan.overrides_for(tool_id)))
            .buffered(self.max_concurrent.max(1))
            .collect()
            .await
    }

    /// Run one tool by id with retry. Unknown ids become a failed result.
    pub async fn run_tool(
        &self,
        tool_id: &str,
        user_request: &str,
        files: &[FileRecord],
        overrides: Option<&Parameters>,
    ) -> ToolResult {
        let Some(tool) = self.registry.by_id(tool_id) else {
            let err = DispatchError::Validation {
                tool: tool_id.to_string(),
                reason: "tool is not in the catalogue".into(),
            };
            return ToolResult::failed(tool_id, &err);
        };

        let matched = tool.matching_files(files);
        let parameters = merge_parameters(tool, overrides, user_request);
        tracing::debug!(
            tool = %tool.id,
            files = matched.len(),
            parameters = %serde_json::Value::Object(parameters.clone()),
            "dispatching tool"
        );

        self.retry
            .run(&tool.id, || {
                // Fresh invocation per attempt.
                let invocation = ToolInvocation {
                    tool_id: tool.id.clone(),
                    files: matched.clone(),
                    user_request: user_request.to_string(),
                    parameters: parameters.clone(),
                };
                async move { self.executor.execute(tool, &invocation).await }
            })
            .await
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
