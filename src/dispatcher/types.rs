//! Dispatcher types: transport settings, invocations, and results.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DispatchError;
use crate::uploads::FileRecord;

// ─── Settings ────────────────────────────────────────────────────────────────

/// The `container:` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct ContainerSettings {
    /// Base URL of the document-processing container.
    #[serde(default = "default_container_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
}

fn default_container_endpoint() -> String {
    "http://localhost:8000".into()
}

fn default_health_path() -> String {
    "/health".into()
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            endpoint: default_container_endpoint(),
            health_path: default_health_path(),
        }
    }
}

/// One entry under `capability_servers:`.
#[derive(Debug, Clone, Deserialize)]
pub struct CapabilityServerConfig {
    pub base_url: String,
    #[serde(default = "default_health_path")]
    pub health_path: String,
    /// Launch command, used only when the health probe fails.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    /// Readiness poll interval after launch (default: 2000).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Readiness polls before giving up (default: 30).
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

fn default_poll_attempts() -> u32 {
    30
}

impl CapabilityServerConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            health_path: default_health_path(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), self.health_path)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// ─── Invocation ──────────────────────────────────────────────────────────────

/// One execution attempt of one tool. Built fresh per attempt.
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub tool_id: String,
    /// Files relevant to this tool, in upload order.
    pub files: Vec<FileRecord>,
    /// The user's message, verbatim.
    pub user_request: String,
    /// Merged parameters (defaults, plan overrides, inferred values).
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

// ─── ToolResult ──────────────────────────────────────────────────────────────

/// Outcome of one planned tool. Serialized as
/// `{toolId, success, result?, error?, executedAt, attempts}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub executed_at: DateTime<Utc>,
    /// Dispatcher calls made, retries included.
    #[serde(default)]
    pub attempts: u32,
    /// Whether the failure may succeed on retry. Internal only.
    #[serde(skip)]
    pub retriable: bool,
}

impl ToolResult {
    pub fn succeeded(tool_id: &str, payload: serde_json::Value) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            success: true,
            result: Some(payload),
            error: None,
            executed_at: Utc::now(),
            attempts: 1,
            retriable: false,
        }
    }

    pub fn failed(tool_id: &str, error: &DispatchError) -> Self {
        Self {
            tool_id: tool_id.to_string(),
            success: false,
            result: None,
            error: Some(error.to_string()),
            executed_at: Utc::now(),
            attempts: 1,
            retriable: error.is_retriable(),
        }
    }

    pub fn from_outcome(tool_id: &str, outcome: Result<serde_json::Value, DispatchError>) -> Self {
        match outcome {
            Ok(payload) => Self::succeeded(tool_id, payload),
            Err(e) => Self::failed(tool_id, &e),
        }
    }

    /// The error text, or an empty string for successes.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_result_wire_shape() {
        let ok = ToolResult::succeeded("pdf", serde_json::json!({"pages": 3}));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["toolId"], "pdf");
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["pages"], 3);
        assert!(json.get("error").is_none());
        assert!(json.get("retriable").is_none());
        assert!(json["executedAt"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_failed_result_keeps_classification() {
        let err = DispatchError::Validation {
            tool: "img".into(),
            reason: "no image".into(),
        };
        let failed = ToolResult::failed("img", &err);
        assert!(!failed.success);
        assert!(!failed.retriable);
        assert!(failed.error_message().contains("no image"));

        let json = serde_json::to_value(&failed).unwrap();
        assert!(json.get("result").is_none());
    }

    #[test]
    fn test_capability_server_health_url() {
        let mut config = CapabilityServerConfig::new("http://localhost:8100/");
        assert_eq!(config.health_url(), "http://localhost:8100/health");
        config.health_path = "/ping".into();
        assert_eq!(config.health_url(), "http://localhost:8100/ping");
    }
}
