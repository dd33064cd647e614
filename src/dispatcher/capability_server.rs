//! Capability-server strategy.
//!
//! Flow per call:
//! 1. Translate parameters (primary input path + bounded confidence)
//! 2. Make sure the server is up: probe, else launch and poll
//! 3. Try candidate endpoints in order; the first HTTP 200 wins

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::time::Duration;

use reqwest::Client as HttpClient;
use tokio::process::Child;
use tokio::sync::Mutex;

use super::container::{probe_health, read_payload};
use super::errors::DispatchError;
use super::lifecycle::{is_running, launch_server, stop_server, wait_until_healthy};
use super::types::{CapabilityServerConfig, ToolInvocation};
use crate::registry::builtin::DEFAULT_CONFIDENCE;
use crate::registry::ToolDescriptor;

// ─── Parameter translation ───────────────────────────────────────────────────

/// Arguments sent to a capability server: the first accepted file's path and
/// a clamped `confidence`.
pub fn translate_parameters(
    tool: &ToolDescriptor,
    invocation: &ToolInvocation,
) -> Result<serde_json::Value, DispatchError> {
    let primary = invocation
        .files
        .iter()
        .find(|f| tool.accepts(&f.mime_type))
        .ok_or_else(|| DispatchError::Validation {
            tool: tool.id.clone(),
            reason: format!(
                "no input file matching {}",
                tool.accepted_input_types.join(", ")
            ),
        })?;

    let spec = tool.parameter_spec("confidence");
    let requested = invocation
        .parameters
        .get("confidence")
        .and_then(as_number)
        .or_else(|| spec.and_then(|s| as_number(&s.default)))
        .unwrap_or(DEFAULT_CONFIDENCE);
    let confidence = match spec {
        Some(spec) => spec.clamp(requested),
        None => requested.clamp(0.0, 1.0),
    };

    Ok(serde_json::json!({
        "input_path": primary.storage_path.display().to_string(),
        "confidence": confidence,
    }))
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// Ordered candidate calls: the per-tool path, then generic call-by-name.
pub fn candidate_requests(
    base_url: &str,
    tool_id: &str,
    arguments: &serde_json::Value,
) -> Vec<(String, serde_json::Value)> {
    let base = base_url.trim_end_matches('/');
    vec![
        (format!("{base}/tools/{tool_id}"), arguments.clone()),
        (
            format!("{base}/call_tool"),
            serde_json::json!({ "name": tool_id, "arguments": arguments }),
        ),
    ]
}

// ─── CapabilityServerStrategy ────────────────────────────────────────────────

/// Executes capability-server tools and tracks server connection flags.
pub struct CapabilityServerStrategy {
    http: HttpClient,
    timeout: Duration,
    servers: HashMap<String, CapabilityServerConfig>,
    connected: RwLock<HashSet<String>>,
    /// Processes this strategy launched. Also serializes launches.
    launched: Mutex<HashMap<String, Child>>,
}

impl CapabilityServerStrategy {
    pub fn new(
        http: HttpClient,
        timeout: Duration,
        servers: HashMap<String, CapabilityServerConfig>,
    ) -> Self {
        Self {
            http,
            timeout,
            servers,
            connected: RwLock::new(HashSet::new()),
            launched: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_connected(&self, name: &str) -> bool {
        self.connected_servers().contains(name)
    }

    /// Snapshot of the connection flags.
    pub fn connected_servers(&self) -> HashSet<String> {
        match self.connected.read() {
            Ok(set) => set.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_connected(&self, name: &str, up: bool) {
        let mut set = match self.connected.write() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        if up {
            set.insert(name.to_string());
        } else {
            set.remove(name);
        }
    }

    /// Probe the server; launch and poll it if the probe fails.
    pub async fn ensure_ready(&self, name: &str) -> Result<&CapabilityServerConfig, DispatchError> {
        let config = self
            .servers
            .get(name)
            .ok_or_else(|| DispatchError::UnknownServer {
                name: name.to_string(),
            })?;
        let health_url = config.health_url();

        if probe_health(&self.http, &health_url).await {
            self.set_connected(name, true);
            return Ok(config);
        }

        {
            // Held only while launching; readiness polls run unlocked so other
            // servers can start at the same time.
            let mut launched = self.launched.lock().await;

            // Another caller may have brought it up while we waited for the lock.
            if probe_health(&self.http, &health_url).await {
                self.set_connected(name, true);
                return Ok(config);
            }

            let already_running = launched.get_mut(name).map(is_running).unwrap_or(false);
            if !already_running {
                match launch_server(name, config) {
                    Ok(child) => {
                        launched.insert(name.to_string(), child);
                    }
                    Err(e) => {
                        self.set_connected(name, false);
                        return Err(e);
                    }
                }
            }
        }

        if wait_until_healthy(
            &self.http,
            &health_url,
            config.poll_interval(),
            config.poll_attempts,
        )
        .await
        {
            self.set_connected(name, true);
            Ok(config)
        } else {
            self.set_connected(name, false);
            tracing::warn!(server = name, attempts = config.poll_attempts, "server never became healthy");
            Err(DispatchError::ServiceUnavailable {
                target: health_url,
                reason: format!(
                    "server '{name}' not healthy after {} attempts",
                    config.poll_attempts
                ),
            })
        }
    }

    /// Bring every configured server up concurrently. Returns the names that
    /// came up, sorted.
    pub async fn connect_all(&self) -> Vec<String> {
        let mut names: Vec<&String> = self.servers.keys().collect();
        names.sort();

        let starts = names.iter().map(|name| async move {
            let outcome = self.ensure_ready(name).await;
            (*name, outcome)
        });

        let mut up = Vec::new();
        for (name, outcome) in futures::future::join_all(starts).await {
            match outcome {
                Ok(_) => up.push(name.clone()),
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, "capability server failed to start");
                }
            }
        }
        tracing::info!(
            connected = up.len(),
            configured = self.servers.len(),
            "capability servers connected"
        );
        up
    }

    /// Run one tool on `server_name`.
    pub async fn execute(
        &self,
        tool: &ToolDescriptor,
        server_name: &str,
        invocation: &ToolInvocation,
    ) -> Result<serde_json::Value, DispatchError> {
        let arguments = translate_parameters(tool, invocation)?;
        let config = self.ensure_ready(server_name).await?;

        let mut first_error = None;
        for (url, body) in candidate_requests(&config.base_url, &tool.id, &arguments) {
            match self.call_candidate(&tool.id, &url, &body).await {
                Ok(payload) => return Ok(payload),
                Err(e) => {
                    tracing::debug!(tool = %tool.id, url = %url, error = %e, "candidate failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error.unwrap_or_else(|| DispatchError::ServiceUnavailable {
            target: config.base_url.clone(),
            reason: "no candidate endpoints".into(),
        }))
    }

    async fn call_candidate(
        &self,
        tool_id: &str,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, DispatchError> {
        let response = self
            .http
            .post(url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::from_reqwest(e, tool_id, url, self.timeout.as_secs()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::Remote {
                status: status.as_u16(),
                detail,
            });
        }
        read_payload(response, tool_id, url, self.timeout.as_secs()).await
    }

    /// Kill every server this strategy launched and clear all flags.
    pub async fn shutdown(&self) {
        let mut launched = self.launched.lock().await;
        for (name, child) in launched.iter_mut() {
            stop_server(name, child).await;
            tracing::info!(server = %name, "capability server stopped");
        }
        launched.clear();

        let mut set = match self.connected.write() {
            Ok(set) => set,
            Err(poisoned) => poisoned.into_inner(),
        };
        set.clear();
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::test_support::{mock_server, Route};
    use crate::registry::builtin::{default_catalogue, IMAGE_ANALYSIS};
    use crate::uploads::tests::record;

    fn image_tool() -> ToolDescriptor {
        default_catalogue()
            .into_iter()
            .find(|t| t.id == IMAGE_ANALYSIS)
            .unwrap()
    }

    fn invocation(confidence: Option<serde_json::Value>) -> ToolInvocation {
        let mut parameters = serde_json::Map::new();
        if let Some(c) = confidence {
            parameters.insert("confidence".into(), c);
        }
        ToolInvocation {
            tool_id: IMAGE_ANALYSIS.into(),
            files: vec![
                record("notes.pdf", "application/pdf"),
                record("cat.png", "image/png"),
                record("dog.jpg", "image/jpeg"),
            ],
            user_request: "what is in this picture".into(),
            parameters,
        }
    }

    fn strategy(base_url: &str, command: Option<&str>) -> CapabilityServerStrategy {
        let mut config = CapabilityServerConfig::new(base_url);
        config.command = command.map(str::to_string);
        config.args = vec!["-c".into(), "exit 0".into()];
        config.poll_interval_ms = 10;
        config.poll_attempts = 2;
        CapabilityServerStrategy::new(
            HttpClient::new(),
            Duration::from_secs(5),
            HashMap::from([("vision".to_string(), config)]),
        )
    }

    #[test]
    fn test_translate_parameters_defaults() {
        let args = translate_parameters(&image_tool(), &invocation(None)).unwrap();
        assert_eq!(args["input_path"], "/uploads/cat.png");
        assert_eq!(args["confidence"], 0.2);
    }

    #[test]
    fn test_translate_parameters_clamps() {
        let args =
            translate_parameters(&image_tool(), &invocation(Some(serde_json::json!(1.7)))).unwrap();
        assert_eq!(args["confidence"], 1.0);
        let args =
            translate_parameters(&image_tool(), &invocation(Some(serde_json::json!("0.45"))))
                .unwrap();
        assert_eq!(args["confidence"], 0.45);
    }

    #[test]
    fn test_translate_parameters_requires_matching_file() {
        let mut inv = invocation(None);
        inv.files.retain(|f| f.mime_type == "application/pdf");
        assert!(matches!(
            translate_parameters(&image_tool(), &inv).unwrap_err(),
            DispatchError::Validation { .. }
        ));
    }

    #[test]
    fn test_candidate_order() {
        let candidates = candidate_requests("http://h:1/", "image_analysis", &serde_json::json!({}));
        assert_eq!(candidates[0].0, "http://h:1/tools/image_analysis");
        assert_eq!(candidates[1].0, "http://h:1/call_tool");
        assert_eq!(candidates[1].1["name"], "image_analysis");
    }

    #[tokio::test]
    async fn test_first_candidate_wins() {
        let server = mock_server(vec![
            Route::new("/health", 200, "ok"),
            Route::new("/tools/image_analysis", 200, r#"{"objects": ["cat"]}"#),
        ])
        .await;
        let strategy = strategy(&server.base_url, None);

        let payload = strategy
            .execute(&image_tool(), "vision", &invocation(None))
            .await
            .unwrap();
        assert_eq!(payload["objects"][0], "cat");
        assert_eq!(server.hits(), vec!["/health", "/tools/image_analysis"]);
        assert!(strategy.is_connected("vision"));
    }

    #[tokio::test]
    async fn test_falls_back_to_call_tool() {
        let server = mock_server(vec![
            Route::new("/health", 200, "ok"),
            Route::new("/call_tool", 200, r#"{"objects": ["dog"]}"#),
        ])
        .await;
        let strategy = strategy(&server.base_url, None);

        let payload = strategy
            .execute(&image_tool(), "vision", &invocation(None))
            .await
            .unwrap();
        assert_eq!(payload["objects"][0], "dog");
        let bodies = server.bodies();
        assert!(bodies[2].contains("\"name\":\"image_analysis\""));
    }

    #[tokio::test]
    async fn test_all_candidates_fail_returns_first_error() {
        let server = mock_server(vec![
            Route::new("/health", 200, "ok"),
            Route::new("/call_tool", 500, "crashed"),
        ])
        .await;
        let err = strategy(&server.base_url, None)
            .execute(&image_tool(), "vision", &invocation(None))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Remote { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_unhealthy_without_command_clears_flag() {
        let strategy = strategy("http://127.0.0.1:9", None);
        let err = strategy.ensure_ready("vision").await.unwrap_err();
        assert!(matches!(err, DispatchError::ServiceUnavailable { .. }));
        assert!(!strategy.is_connected("vision"));
    }

    #[tokio::test]
    async fn test_launch_that_never_becomes_healthy() {
        let strategy = strategy("http://127.0.0.1:9", Some("sh"));
        let err = strategy.ensure_ready("vision").await.unwrap_err();
        match err {
            DispatchError::ServiceUnavailable { reason, .. } => {
                assert!(reason.contains("2 attempts"))
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
        assert!(!strategy.is_connected("vision"));
        strategy.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let strategy = strategy("http://127.0.0.1:9", None);
        assert!(matches!(
            strategy.execute(&image_tool(), "audio", &invocation(None)).await.unwrap_err(),
            DispatchError::UnknownServer { .. }
        ));
    }

    #[tokio::test]
    async fn test_connect_all_reports_live_servers() {
        let server = mock_server(vec![Route::new("/health", 200, "ok")]).await;
        let strategy = strategy(&server.base_url, None);
        assert_eq!(strategy.connect_all().await, vec!["vision".to_string()]);
        assert!(strategy.connected_servers().contains("vision"));
        strategy.shutdown().await;
        assert!(!strategy.is_connected("vision"));
    }

    #[tokio::test]
    async fn test_connect_all_starts_servers_concurrently() {
        let slow = |name: &str| {
            let mut config = CapabilityServerConfig::new("http://127.0.0.1:9");
            config.command = Some("sh".into());
            config.args = vec!["-c".into(), format!("echo starting {name}")];
            config.poll_interval_ms = 500;
            config.poll_attempts = 4;
            (name.to_string(), config)
        };
        let strategy = CapabilityServerStrategy::new(
            HttpClient::new(),
            Duration::from_secs(5),
            HashMap::from([slow("audio"), slow("vision")]),
        );

        // Each server spends 1.5s polling; run back to back that would be 3s.
        let started = std::time::Instant::now();
        assert!(strategy.connect_all().await.is_empty());
        assert!(started.elapsed() < Duration::from_millis(2_500));
        strategy.shutdown().await;
    }
}
