//! The tool-execution seam and its HTTP-backed implementation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;

use super::capability_server::CapabilityServerStrategy;
use super::container::ContainerStrategy;
use super::errors::DispatchError;
use super::types::{CapabilityServerConfig, ContainerSettings, ToolInvocation, ToolResult};
use crate::registry::{Availability, ToolDescriptor, ToolRegistry, TransportBinding};

/// TCP connection timeout for tool services.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs tools. Failures come back inside the `ToolResult`, never as `Err`.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: &ToolDescriptor, invocation: &ToolInvocation) -> ToolResult;

    /// Which transports are live right now.
    async fn probe_availability(&self, registry: &ToolRegistry) -> Availability;

    /// Release launched processes.
    async fn shutdown(&self) {}
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Strategy selection by transport binding.
pub struct Dispatcher {
    container: ContainerStrategy,
    container_health_path: String,
    servers: CapabilityServerStrategy,
}

impl Dispatcher {
    /// `tool_timeout` bounds every tool call.
    pub fn new(
        container: &ContainerSettings,
        servers: HashMap<String, CapabilityServerConfig>,
        tool_timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| DispatchError::ServiceUnavailable {
                target: container.endpoint.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            container: ContainerStrategy::new(http.clone(), tool_timeout),
            container_health_path: container.health_path.clone(),
            servers: CapabilityServerStrategy::new(http, tool_timeout, servers),
        })
    }

    /// Bring every configured capability server up. Partial success is fine.
    pub async fn connect_all(&self) -> Vec<String> {
        self.servers.connect_all().await
    }

    async fn dispatch(
        &self,
        tool: &ToolDescriptor,
        invocation: &ToolInvocation,
    ) -> Result<serde_json::Value, DispatchError> {
        match &tool.transport {
            TransportBinding::ContainerHttp { endpoint, path } => {
                self.container.execute(endpoint, path, invocation).await
            }
            TransportBinding::CapabilityServer { server_name } => {
                self.servers.execute(tool, server_name, invocation).await
            }
        }
    }
}

#[async_trait]
impl ToolExecutor for Dispatcher {
    async fn execute(&self, tool: &ToolDescriptor, invocation: &ToolInvocation) -> ToolResult {
        let start = std::time::Instant::now();
        let outcome = self.dispatch(tool, invocation).await;

        match &outcome {
            Ok(_) => tracing::info!(
                tool = %tool.id,
                transport = %tool.transport_label(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "tool succeeded"
            ),
            Err(e) => tracing::warn!(
                tool = %tool.id,
                transport = %tool.transport_label(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                error = %e,
                retriable = e.is_retriable(),
                "tool failed"
            ),
        }

        ToolResult::from_outcome(&tool.id, outcome)
    }

    async fn probe_availability(&self, registry: &ToolRegistry) -> Availability {
        let mut reachable = HashSet::new();
        for endpoint in registry.container_endpoints() {
            if self.container.probe(endpoint, &self.container_health_path).await {
                reachable.insert(endpoint.to_string());
            } else {
                tracing::debug!(endpoint, "container endpoint unreachable");
            }
        }

        Availability {
            reachable_endpoints: reachable,
            connected_servers: self.servers.connected_servers(),
        }
    }

    async fn shutdown(&self) {
        self.servers.shutdown().await;
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::test_support::{mock_server, Route};
    use crate::registry::builtin::{IMAGE_ANALYSIS, TEXT_ANALYSIS};

    fn dispatcher(container_url: &str, vision_url: &str) -> Dispatcher {
        let container = ContainerSettings {
            endpoint: container_url.to_string(),
            health_path: "/health".into(),
        };
        let mut vision = CapabilityServerConfig::new(vision_url);
        vision.poll_attempts = 1;
        Dispatcher::new(
            &container,
            HashMap::from([("vision".to_string(), vision)]),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_probe_availability() {
        let container = mock_server(vec![Route::new("/health", 200, "ok")]).await;
        let vision = mock_server(vec![Route::new("/health", 200, "ok")]).await;
        let dispatcher = dispatcher(&container.base_url, &vision.base_url);
        let registry = ToolRegistry::from_config(&[], &container.base_url).unwrap();

        // Servers are not connected until something brings them up.
        let before = dispatcher.probe_availability(&registry).await;
        assert_eq!(registry.available_now(&before).len(), 5);

        dispatcher.connect_all().await;
        let after = dispatcher.probe_availability(&registry).await;
        let ids: Vec<&str> = registry
            .available_now(&after)
            .iter()
            .map(|t| t.id.as_str())
            .collect();
        assert_eq!(ids.len(), 6);
        assert!(ids.contains(&IMAGE_ANALYSIS));
    }

    #[tokio::test]
    async fn test_execute_never_errors() {
        let dispatcher = dispatcher("http://127.0.0.1:9", "http://127.0.0.1:9");
        let registry = ToolRegistry::from_config(&[], "http://127.0.0.1:9").unwrap();
        let tool = registry.by_id(TEXT_ANALYSIS).unwrap();
        let invocation = ToolInvocation {
            tool_id: TEXT_ANALYSIS.into(),
            files: vec![],
            user_request: "summarize".into(),
            parameters: serde_json::Map::new(),
        };
        let result = dispatcher.execute(tool, &invocation).await;
        assert!(!result.success);
        assert!(result.retriable);
        assert!(result.error.is_some());
    }
}
