//! Tool registry: load-once catalogue with availability filtering.
//!
//! Provides:
//! - Lookup by tool id
//! - The live-available subset, given a transport `Availability` snapshot
//! - Catalogue rendering for planner prompts

use std::collections::{BTreeSet, HashMap};

use super::builtin;
use super::errors::RegistryError;
use super::types::{Availability, ToolDescriptor, TransportBinding};

// ─── ToolRegistry ───────────────────────────────────────────────────────────

/// Immutable tool catalogue, in load order.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    /// `tool id → index into tools`.
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Build a registry, filling empty container endpoints with
    /// `default_endpoint`.
    pub fn new(
        tools: Vec<ToolDescriptor>,
        default_endpoint: &str,
    ) -> Result<Self, RegistryError> {
        let mut resolved = Vec::with_capacity(tools.len());
        let mut index = HashMap::with_capacity(tools.len());

        for mut tool in tools {
            if let TransportBinding::ContainerHttp { endpoint, .. } = &mut tool.transport {
                if endpoint.is_empty() {
                    if default_endpoint.is_empty() {
                        return Err(RegistryError::MissingEndpoint { id: tool.id });
                    }
                    *endpoint = default_endpoint.trim_end_matches('/').to_string();
                }
            }

            if index.insert(tool.id.clone(), resolved.len()).is_some() {
                return Err(RegistryError::DuplicateTool { id: tool.id });
            }
            resolved.push(tool);
        }

        Ok(Self {
            tools: resolved,
            index,
        })
    }

    /// Build from config tools, or the built-in catalogue when none are listed.
    pub fn from_config(
        tools: &[ToolDescriptor],
        default_endpoint: &str,
    ) -> Result<Self, RegistryError> {
        let source = if tools.is_empty() {
            tracing::info!("no tools configured, using built-in catalogue");
            builtin::default_catalogue()
        } else {
            tools.to_vec()
        };
        Self::new(source, default_endpoint)
    }

    /// Look up a tool by id.
    pub fn by_id(&self, id: &str) -> Option<&ToolDescriptor> {
        self.index.get(id).map(|&i| &self.tools[i])
    }

    /// All descriptors, in load order.
    pub fn all(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    /// Descriptors whose bound transport is live in `availability`.
    pub fn available_now(&self, availability: &Availability) -> Vec<&ToolDescriptor> {
        self.tools
            .iter()
            .filter(|t| availability.is_available(&t.transport))
            .collect()
    }

    /// Distinct container endpoints referenced by the catalogue.
    pub fn container_endpoints(&self) -> BTreeSet<&str> {
        self.tools
            .iter()
            .filter_map(|t| match &t.transport {
                TransportBinding::ContainerHttp { endpoint, .. } => Some(endpoint.as_str()),
                TransportBinding::CapabilityServer { .. } => None,
            })
            .collect()
    }

}

/// Render descriptors as the JSON catalogue shown to the planner.
pub fn catalogue_json(tools: &[&ToolDescriptor]) -> serde_json::Value {
    serde_json::Value::Array(tools.iter().map(|t| t.catalogue_entry()).collect())
}

// ─── Tests ──────────────────────────────────────────────────────────────────
