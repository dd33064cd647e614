//! Container strategy: multipart POST to a long-lived HTTP tool service.

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client as HttpClient;

use super::errors::DispatchError;
use super::types::ToolInvocation;

/// Timeout for health probes.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on error body length kept in `DispatchError::Remote`.
const MAX_ERROR_DETAIL: usize = 500;

/// Executes container-bound tools.
#[derive(Debug, Clone)]
pub struct ContainerStrategy {
    http: HttpClient,
    timeout: Duration,
}

impl ContainerStrategy {
    pub fn new(http: HttpClient, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    /// POST the invocation's files and scalar parameters to `endpoint + path`.
    pub async fn execute(
        &self,
        endpoint: &str,
        path: &str,
        invocation: &ToolInvocation,
    ) -> Result<serde_json::Value, DispatchError> {
        let url = format!("{}{}", endpoint.trim_end_matches('/'), path);
        let form = build_form(invocation).await?;

        tracing::debug!(
            tool = %invocation.tool_id,
            url = %url,
            files = invocation.files.len(),
            "container call"
        );

        let response = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                DispatchError::from_reqwest(e, &invocation.tool_id, &url, self.timeout.as_secs())
            })?;

        read_payload(response, &invocation.tool_id, &url, self.timeout.as_secs()).await
    }

    /// GET the container's health endpoint. Any non-200 or error is unhealthy.
    pub async fn probe(&self, endpoint: &str, health_path: &str) -> bool {
        probe_health(
            &self.http,
            &format!("{}{}", endpoint.trim_end_matches('/'), health_path),
        )
        .await
    }
}

/// Multipart body: one `file` part per file, one text part per scalar parameter.
async fn build_form(invocation: &ToolInvocation) -> Result<Form, DispatchError> {
    let mut form = Form::new();

    for file in &invocation.files {
        let bytes = tokio::fs::read(&file.storage_path)
            .await
            .map_err(|e| DispatchError::Validation {
                tool: invocation.tool_id.clone(),
                reason: format!("cannot read {}: {e}", file.display_name),
            })?;
        let part = Part::bytes(bytes)
            .file_name(file.display_name.clone())
            .mime_str(&file.mime_type)
            .map_err(|e| DispatchError::Validation {
                tool: invocation.tool_id.clone(),
                reason: format!("invalid MIME type '{}': {e}", file.mime_type),
            })?;
        form = form.part("file", part);
    }

    for (name, value) in &invocation.parameters {
        form = form.text(name.clone(), scalar_text(value));
    }

    Ok(form)
}

/// Render a parameter as a form field value. Strings are sent unquoted.
pub(crate) fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn an HTTP response into a payload: JSON when it parses, text otherwise.
pub(crate) async fn read_payload(
    response: reqwest::Response,
    tool: &str,
    url: &str,
    timeout_secs: u64,
) -> Result<serde_json::Value, DispatchError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| DispatchError::from_reqwest(e, tool, url, timeout_secs))?;

    if !status.is_success() {
        return Err(DispatchError::Remote {
            status: status.as_u16(),
            detail: body.chars().take(MAX_ERROR_DETAIL).collect(),
        });
    }

    Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
}

/// Health contract: HTTP 200 from the health URL.
pub(crate) async fn probe_health(http: &HttpClient, url: &str) -> bool {
    match http.get(url).timeout(PROBE_TIMEOUT).send().await {
        Ok(resp) => resp.status() == reqwest::StatusCode::OK,
        Err(_) => false,
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
