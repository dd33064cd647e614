//! Tool descriptor types.
//!
//! Descriptors are immutable after configuration load. Transport bindings are
//! a closed set: a containerized HTTP service or a named capability server.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::uploads::{mime_matches, FileRecord};

// ─── ToolDescriptor ─────────────────────────────────────────────────────────

/// Static catalogue entry for one tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// MIME patterns this tool accepts, in order of preference.
    #[serde(default)]
    pub accepted_input_types: Vec<String>,
    #[serde(default)]
    pub default_parameters: BTreeMap<String, ParameterSpec>,
    pub transport: TransportBinding,
}

/// How a tool is reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportBinding {
    /// Long-lived containerized HTTP service. An empty `endpoint` is filled
    /// from `container.endpoint` when the registry loads.
    ContainerHttp {
        #[serde(default)]
        endpoint: String,
        path: String,
    },
    /// Remote capability server, looked up by name in `capability_servers`.
    CapabilityServer { server_name: String },
}

/// Default value for one parameter, with optional numeric bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub default: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl ParameterSpec {
    pub fn new(default: serde_json::Value) -> Self {
        Self {
            default,
            min: None,
            max: None,
        }
    }

    pub fn bounded(default: f64, min: f64, max: f64) -> Self {
        Self {
            default: serde_json::json!(default),
            min: Some(min),
            max: Some(max),
        }
    }

    /// Clamp a numeric value into the declared bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        let mut v = value;
        if let Some(min) = self.min {
            v = v.max(min);
        }
        if let Some(max) = self.max {
            v = v.min(max);
        }
        v
    }
}

impl ToolDescriptor {
    /// Whether a file of this MIME type is an input this tool accepts.
    pub fn accepts(&self, mime_type: &str) -> bool {
        self.accepted_input_types
            .iter()
            .any(|pattern| mime_matches(pattern, mime_type))
    }

    /// The subset of `files` relevant to this tool, in upload order.
    pub fn matching_files(&self, files: &[FileRecord]) -> Vec<FileRecord> {
        files
            .iter()
            .filter(|f| self.accepts(&f.mime_type))
            .cloned()
            .collect()
    }

    /// Default parameter values as a JSON object.
    pub fn default_values(&self) -> serde_json::Map<String, serde_json::Value> {
        self.default_parameters
            .iter()
            .map(|(name, spec)| (name.clone(), spec.default.clone()))
            .collect()
    }

    pub fn parameter_spec(&self, name: &str) -> Option<&ParameterSpec> {
        self.default_parameters.get(name)
    }

    /// Short label for the transport, used in listings and logs.
    pub fn transport_label(&self) -> String {
        match &self.transport {
            TransportBinding::ContainerHttp { endpoint, path } => {
                format!("container:{endpoint}{path}")
            }
            TransportBinding::CapabilityServer { server_name } => {
                format!("capability_server:{server_name}")
            }
        }
    }

    /// Planner-facing summary (no transport details).
    pub fn catalogue_entry(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "description": self.description,
            "capabilities": self.capabilities,
            "accepted_input_types": self.accepted_input_types,
            "default_parameters": self.default_values(),
        })
    }
}

// ─── Availability ───────────────────────────────────────────────────────────

/// Snapshot of which transports are live right now.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    /// Container endpoints whose health probe succeeded.
    pub reachable_endpoints: HashSet<String>,
    /// Capability servers whose connection flag is set.
    pub connected_servers: HashSet<String>,
}

impl Availability {
    pub fn is_available(&self, binding: &TransportBinding) -> bool {
        match binding {
            TransportBinding::ContainerHttp { endpoint, .. } => {
                self.reachable_endpoints.contains(endpoint)
            }
            TransportBinding::CapabilityServer { server_name } => {
                self.connected_servers.contains(server_name)
            }
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
