//! Configuration loading and validation.
//!
//! Reads `config/toolweave.yaml` and resolves environment variables. Config is
//! the single source of truth for the model catalogue, tool catalogue,
//! transport endpoints, retry policy, and prompt templates. Every section has
//! defaults, so a minimal file works.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Deserialize;
use thiserror::Error;

use crate::dispatcher::types::{CapabilityServerConfig, ContainerSettings};
use crate::gateway::types::ModelConfig;
use crate::registry::types::ToolDescriptor;

/// Config file location relative to a project root.
const CONFIG_RELATIVE_PATH: &str = "config/toolweave.yaml";

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Errors raised while locating, reading, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config not found: {reason}")]
    NotFound { reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {reason}")]
    Parse { reason: String },

    #[error("invalid config: {reason}")]
    Invalid { reason: String },
}

// ─── Public Types ───────────────────────────────────────────────────────────

/// Top-level configuration (mirrors `config/toolweave.yaml`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Model id activated at startup. Defaults to the first catalogue entry.
    #[serde(default)]
    pub active_model: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelConfig>,
    #[serde(default)]
    pub container: ContainerSettings,
    /// Capability servers keyed by server name.
    #[serde(default)]
    pub capability_servers: HashMap<String, CapabilityServerConfig>,
    /// Tool catalogue. When empty, the built-in catalogue is used.
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default)]
    pub orchestration: OrchestrationSettings,
    #[serde(default)]
    pub uploads: UploadSettings,
    #[serde(default)]
    pub templates: TemplateOverrides,
}

/// Pipeline tuning: retry policy, timeouts, concurrency, context sizes.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestrationSettings {
    /// Retries after the first failed dispatcher call (default: 2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base backoff delay in milliseconds, doubled per retry (default: 1000).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// Per-call bound on tool execution, in seconds (default: 60).
    #[serde(default = "default_tool_selection_timeout_secs")]
    pub tool_selection_timeout_secs: u64,
    /// Maximum tools in flight at once; 1 runs the plan strictly sequentially.
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
    /// Prior turns shown to planning and synthesis prompts (default: 3).
    #[serde(default = "default_context_turns")]
    pub context_turns: usize,
    /// Turns retained per conversation (default: 20).
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

fn default_max_retries() -> u32 {
    2
}
fn default_retry_base_delay_ms() -> u64 {
    1_000
}
fn default_tool_selection_timeout_secs() -> u64 {
    60
}
fn default_max_concurrent_tools() -> usize {
    3
}
fn default_context_turns() -> usize {
    3
}
fn default_max_history_turns() -> usize {
    20
}

impl Default for OrchestrationSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            tool_selection_timeout_secs: default_tool_selection_timeout_secs(),
            max_concurrent_tools: default_max_concurrent_tools(),
            context_turns: default_context_turns(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

impl OrchestrationSettings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_selection_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

/// Limits applied to uploads before planning.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
    /// MIME patterns accepted (`image/*` wildcards allowed). Empty accepts all.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

fn default_max_file_size_bytes() -> u64 {
    100 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    [
        "application/pdf",
        "text/*",
        "image/*",
        "audio/*",
        "video/*",
        "application/json",
        "application/msword",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

/// Optional replacements for the built-in prompt templates.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateOverrides {
    #[serde(default)]
    pub tool_selection: Option<String>,
    #[serde(default)]
    pub response_synthesis: Option<String>,
}

// ─── Loading ────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// Checks `TOOLWEAVE_CONFIG` (an explicit file), then `TOOLWEAVE_ROOT` (a
/// project root), then walks upward from `start` looking for
/// `config/toolweave.yaml`.
pub fn find_config_path(start: &Path) -> Result<PathBuf, ConfigError> {
    if let Ok(file) = std::env::var("TOOLWEAVE_CONFIG") {
        let candidate = PathBuf::from(file);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    if let Ok(root) = std::env::var("TOOLWEAVE_ROOT") {
        let candidate = PathBuf::from(root).join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Ok(candidate);
        }
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_RELATIVE_PATH);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            break;
        }
    }

    Err(ConfigError::NotFound {
        reason: format!("could not find {CONFIG_RELATIVE_PATH}"),
    })
}

/// Load, interpolate, parse, and validate the config file.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let config = parse_config(&raw)?;
    tracing::info!(
        path = %path.display(),
        models = config.models.len(),
        tools = config.tools.len(),
        servers = config.capability_servers.len(),
        "loaded configuration"
    );
    Ok(config)
}

/// Parse config text. `${VAR}` and `${VAR:-default}` are interpolated first.
pub fn parse_config(raw: &str) -> Result<AppConfig, ConfigError> {
    let interpolated = interpolate_env_vars(raw);

    let config: AppConfig = serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;

    config.validate()?;
    Ok(config)
}

impl AppConfig {
    /// Structural checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.id.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate model id '{}'", model.id),
                });
            }
        }

        if let Some(active) = &self.active_model {
            if !self.models.iter().any(|m| &m.id == active) {
                return Err(ConfigError::Invalid {
                    reason: format!("active model '{active}' is not in the model catalogue"),
                });
            }
        }

        if self.orchestration.max_concurrent_tools == 0 {
            return Err(ConfigError::Invalid {
                reason: "orchestration.max_concurrent_tools must be at least 1".into(),
            });
        }

        Ok(())
    }

    /// The model to activate at startup: `active_model`, else the first entry.
    pub fn startup_model_id(&self) -> Option<&str> {
        self.active_model
            .as_deref()
            .or_else(|| self.models.first().map(|m| m.id.as_str()))
    }
}

// ─── Env-var interpolation ──────────────────────────────────────────────────

fn env_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env reference pattern must compile")
    })
}

/// Replace `${VAR}` and `${VAR:-default}` references.
///
/// An unset or empty variable takes the default (with `~` expanded), or the
/// empty string when there is none. Text that is not a well-formed reference
/// passes through untouched.
fn interpolate_env_vars(input: &str) -> String {
    env_reference_regex()
        .replace_all(input, |caps: &Captures<'_>| {
            let value = std::env::var(&caps[1]).ok().filter(|v| !v.is_empty());
            match (value, caps.get(2)) {
                (Some(value), _) => value,
                (None, Some(default)) => home_relative(default.as_str()),
                (None, None) => String::new(),
            }
        })
        .into_owned()
}

/// `~/x` becomes `<home>/x`; anything else is returned as-is.
fn home_relative(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            format!("{}{rest}", home.display())
        }
        _ => path.to_string(),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
