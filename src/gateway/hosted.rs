//! Hosted-API backend: OpenAI-compatible chat completions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use super::backend::TextGenerator;
use super::errors::ModelError;
use super::types::ModelConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on error body length kept in `ModelError::Remote`.
const MAX_ERROR_DETAIL: usize = 500;

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ─── HostedApiBackend ────────────────────────────────────────────────────────

/// Client for one hosted chat-completions model.
pub struct HostedApiBackend {
    http: HttpClient,
    model_id: String,
    model_name: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl std::fmt::Debug for HostedApiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedApiBackend")
            .field("model_id", &self.model_id)
            .field("base_url", &self.base_url)
            .field("has_api_key", &self.api_key.is_some())
            .finish()
    }
}

impl HostedApiBackend {
    /// Build from config. Fails with `Auth` when a required credential is unset.
    pub fn new(config: &ModelConfig) -> Result<Self, ModelError> {
        let base_url = config
            .base_url
            .as_deref()
            .ok_or_else(|| ModelError::Config {
                reason: format!("model '{}' has no base_url", config.id),
            })?
            .trim_end_matches('/')
            .to_string();

        let api_key = config
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());

        if config.requires_credential && api_key.is_none() {
            let var = config.api_key_env.as_deref().unwrap_or("<unset>");
            return Err(ModelError::Auth {
                model: config.id.clone(),
                reason: format!("credential not found in environment variable {var}"),
            });
        }

        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ModelError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            model_id: config.id.clone(),
            model_name: config.model_name.clone().unwrap_or_else(|| config.id.clone()),
            base_url,
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.request_timeout_secs,
        })
    }

    async fn chat(
        &self,
        prompt: &str,
        system_prompt: &str,
        json_mode: bool,
    ) -> Result<String, ModelError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model_name,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            response_format: json_mode.then_some(ResponseFormat {
                r#type: "json_object",
            }),
        };

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::from_reqwest(e, &url, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(classify_status(&self.model_id, status.as_u16(), detail));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::from_reqwest(e, &url, self.timeout_secs))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::debug!(
            model = %self.model_id,
            json_mode,
            chars = text.len(),
            "hosted completion received"
        );
        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for HostedApiBackend {
    async fn generate(&self, prompt: &str, system_prompt: &str) -> Result<String, ModelError> {
        self.chat(prompt, system_prompt, false).await
    }

    async fn generate_json(
        &self,
        prompt: &str,
        system_prompt: &str,
    ) -> Result<String, ModelError> {
        self.chat(prompt, system_prompt, true).await
    }
}

/// Map a non-2xx status to the gateway taxonomy.
pub fn classify_status(model: &str, status: u16, detail: String) -> ModelError {
    let detail: String = detail.chars().take(MAX_ERROR_DETAIL).collect();
    match status {
        401 | 403 => ModelError::Auth {
            model: model.to_string(),
            reason: format!("HTTP {status}: {detail}"),
        },
        429 => ModelError::RateLimited {
            model: model.to_string(),
            detail,
        },
        _ => ModelError::Remote { status, detail },
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::test_support::{mock_server, Route};
    use crate::gateway::types::ModelKind;

    const COMPLETION: &str =
        r#"{"choices":[{"message":{"role":"assistant","content":"{\"answer\": 42}"}}]}"#;

    /// Config pointing at a loopback server, with the key taken from `key_var`.
    fn loopback_config(base_url: &str, key_var: &str) -> ModelConfig {
        let mut config = ModelConfig::new("gpt-loopback", ModelKind::HostedApi);
        config.base_url = Some(format!("{base_url}/v1"));
        config.model_name = Some("gpt-4o-mini".into());
        config.api_key_env = Some(key_var.into());
        config
    }

    fn hosted_config() -> ModelConfig {
        let mut config = ModelConfig::new("gpt-test", ModelKind::HostedApi);
        config.base_url = Some("http://127.0.0.1:9/v1/".into());
        config
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status("m", 401, String::new()),
            ModelError::Auth { .. }
        ));
        assert!(matches!(
            classify_status("m", 403, String::new()),
            ModelError::Auth { .. }
        ));
        assert!(matches!(
            classify_status("m", 429, String::new()),
            ModelError::RateLimited { .. }
        ));
        match classify_status("m", 500, "boom".into()) {
            ModelError::Remote { status, detail } => {
                assert_eq!(status, 500);
                assert_eq!(detail, "boom");
            }
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_status_truncates_detail() {
        let long = "x".repeat(2_000);
        match classify_status("m", 502, long) {
            ModelError::Remote { detail, .. } => assert_eq!(detail.len(), MAX_ERROR_DETAIL),
            other => panic!("expected Remote, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_credential_is_auth_error() {
        let mut config = hosted_config();
        config.requires_credential = true;
        config.api_key_env = Some("__TOOLWEAVE_MISSING_KEY__".into());
        std::env::remove_var("__TOOLWEAVE_MISSING_KEY__");
        let err = HostedApiBackend::new(&config).unwrap_err();
        assert!(matches!(err, ModelError::Auth { .. }));
    }

    #[test]
    fn test_missing_base_url_is_config_error() {
        let config = ModelConfig::new("no-url", ModelKind::HostedApi);
        assert!(matches!(
            HostedApiBackend::new(&config).unwrap_err(),
            ModelError::Config { .. }
        ));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = HostedApiBackend::new(&hosted_config()).unwrap();
        assert_eq!(backend.base_url, "http://127.0.0.1:9/v1");
        assert_eq!(backend.model_name, "gpt-test");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_service_unavailable() {
        let backend = HostedApiBackend::new(&hosted_config()).unwrap();
        let err = backend.generate("hi", "sys").await.unwrap_err();
        assert!(matches!(err, ModelError::ServiceUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_generate_json_sends_response_format() {
        let server = mock_server(vec![Route::new("/v1/chat/completions", 200, COMPLETION)]).await;
        std::env::set_var("__TOOLWEAVE_TEST_KEY_JSON__", "sk-loopback");
        let backend =
            HostedApiBackend::new(&loopback_config(&server.base_url, "__TOOLWEAVE_TEST_KEY_JSON__"))
                .unwrap();

        let text = backend.generate_json("plan this", "you plan").await.unwrap();
        assert_eq!(text, r#"{"answer": 42}"#);

        let body: serde_json::Value = serde_json::from_str(&server.bodies()[0]).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["response_format"], serde_json::json!({"type": "json_object"}));
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "you plan");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "plan this");
    }

    #[tokio::test]
    async fn test_generate_sends_bearer_and_reads_first_choice() {
        let reply = r#"{"choices":[{"message":{"content":"first"}},{"message":{"content":"second"}}]}"#;
        let server = mock_server(vec![Route::new("/v1/chat/completions", 200, reply)]).await;
        std::env::set_var("__TOOLWEAVE_TEST_KEY_PLAIN__", "sk-loopback");
        let backend = HostedApiBackend::new(&loopback_config(
            &server.base_url,
            "__TOOLWEAVE_TEST_KEY_PLAIN__",
        ))
        .unwrap();

        assert_eq!(backend.generate("hi", "sys").await.unwrap(), "first");

        assert_eq!(server.hits(), vec!["/v1/chat/completions".to_string()]);
        let body: serde_json::Value = serde_json::from_str(&server.bodies()[0]).unwrap();
        assert!(body.get("response_format").is_none());
        let headers = &server.headers()[0];
        assert!(
            headers
                .iter()
                .any(|h| h.eq_ignore_ascii_case("authorization: Bearer sk-loopback")),
            "missing bearer header in {headers:?}"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_status_is_classified() {
        let server =
            mock_server(vec![Route::new("/v1/chat/completions", 429, "slow down")]).await;
        let backend =
            HostedApiBackend::new(&loopback_config(&server.base_url, "__TOOLWEAVE_UNSET_KEY__"))
                .unwrap();
        let err = backend.generate("hi", "sys").await.unwrap_err();
        assert!(matches!(err, ModelError::RateLimited { .. }));
    }
}
