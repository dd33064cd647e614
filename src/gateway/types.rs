//! Model catalogue types.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Backend family. Selects the `TextGenerator` implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// OpenAI-compatible chat completions over HTTP.
    HostedApi,
    /// Long-lived worker process speaking line-delimited JSON on stdio.
    LocalProcess,
}

/// Static catalogue entry, without backend wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDescriptor {
    pub id: String,
    pub kind: ModelKind,
    pub capabilities: BTreeSet<String>,
    pub supports_structured_orchestration: bool,
    pub requires_credential: bool,
}

/// One entry in the `models:` config section.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub id: String,
    pub kind: ModelKind,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub supports_structured_orchestration: bool,
    #[serde(default)]
    pub requires_credential: bool,

    // hosted_api
    #[serde(default)]
    pub base_url: Option<String>,
    /// Model name sent in the request body. Defaults to `id`.
    #[serde(default)]
    pub model_name: Option<String>,
    /// Environment variable holding the bearer token.
    #[serde(default)]
    pub api_key_env: Option<String>,

    // local_process
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Line the worker prints once it accepts requests.
    #[serde(default = "default_ready_token")]
    pub ready_token: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
}

fn default_ready_token() -> String {
    "READY".into()
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_temperature() -> f32 {
    0.3
}
fn default_request_timeout_secs() -> u64 {
    60
}
fn default_startup_timeout_secs() -> u64 {
    30
}

impl ModelConfig {
    /// Minimal config for a kind, with every other field defaulted.
    pub fn new(id: &str, kind: ModelKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            capabilities: BTreeSet::new(),
            supports_structured_orchestration: false,
            requires_credential: false,
            base_url: None,
            model_name: None,
            api_key_env: None,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            ready_token: default_ready_token(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
        }
    }

    pub fn descriptor(&self) -> ModelDescriptor {
        ModelDescriptor {
            id: self.id.clone(),
            kind: self.kind,
            capabilities: self.capabilities.clone(),
            supports_structured_orchestration: self.supports_structured_orchestration,
            requires_credential: self.requires_credential,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_defaults() {
        let yaml = "id: local\nkind: local_process\ncommand: python3\n";
        let config: ModelConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.ready_token, "READY");
        assert_eq!(config.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.startup_timeout(), Duration::from_secs(30));
        assert!(!config.descriptor().supports_structured_orchestration);
    }

    #[test]
    fn test_descriptor_serializes_camel_case() {
        let mut config = ModelConfig::new("gpt", ModelKind::HostedApi);
        config.supports_structured_orchestration = true;
        let json = serde_json::to_value(config.descriptor()).unwrap();
        assert_eq!(json["supportsStructuredOrchestration"], true);
        assert_eq!(json["kind"], "hosted_api");
    }
}
