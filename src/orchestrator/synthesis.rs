//! Synthesizing phase: turn tool results into the user-facing answer.

use super::prompts::{render, PromptTemplates, SYNTHESIS_SYSTEM_PROMPT};
use super::types::ConversationTurn;
use crate::dispatcher::ToolResult;
use crate::gateway::{ModelHandle, RESPONSE_SYNTHESIS_CAPABILITY};

/// Payload characters kept per result in the fallback rendering.
const FALLBACK_PAYLOAD_CHARS: usize = 200;

pub const NO_TOOLS_APOLOGY: &str = "I'm sorry, I couldn't find a suitable tool for this \
request. Try uploading a supported file or rephrasing your question.";

/// Produce the response text. Never fails.
pub async fn synthesize(
    model: Option<&ModelHandle>,
    templates: &PromptTemplates,
    user_request: &str,
    results: &[ToolResult],
    history: &[ConversationTurn],
) -> String {
    if results.is_empty() {
        return NO_TOOLS_APOLOGY.to_string();
    }
    if !results.iter().any(|r| r.success) {
        return failure_apology(results);
    }
    let Some(model) = model else {
        return bullet_fallback(results);
    };

    let prompt = if model.has_capability(RESPONSE_SYNTHESIS_CAPABILITY) {
        dedicated_prompt(user_request, results, history)
    } else {
        template_prompt(templates, user_request, results, history)
    };

    match model.generate(&prompt, SYNTHESIS_SYSTEM_PROMPT).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            tracing::warn!(model = %model.id(), "synthesis returned empty text, using fallback");
            bullet_fallback(results)
        }
        Err(e) => {
            tracing::warn!(model = %model.id(), error = %e, "synthesis failed, using fallback");
            bullet_fallback(results)
        }
    }
}

/// Deterministic apology listing `toolId: error` for each failure.
pub fn failure_apology(results: &[ToolResult]) -> String {
    let mut out = String::from(
        "I'm sorry, I wasn't able to complete your request. The following tools failed:",
    );
    for r in results.iter().filter(|r| !r.success) {
        out.push_str(&format!("\n- {}: {}", r.tool_id, r.error_message()));
    }
    out
}

/// Bullet list of successful payloads (truncated), plus a note of failures.
pub fn bullet_fallback(results: &[ToolResult]) -> String {
    let mut out = String::from("Here is what I found:");
    for r in results.iter().filter(|r| r.success) {
        let payload = r.result.as_ref().map(payload_text).unwrap_or_default();
        out.push_str(&format!("\n- {}: {}", r.tool_id, truncate_chars(&payload, FALLBACK_PAYLOAD_CHARS)));
    }

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| r.tool_id.as_str())
        .collect();
    if !failed.is_empty() {
        out.push_str(&format!("\n\nThese tools failed: {}.", failed.join(", ")));
    }
    out
}

fn payload_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    }
}

fn successful_results_json(results: &[ToolResult]) -> serde_json::Value {
    results
        .iter()
        .filter(|r| r.success)
        .map(|r| serde_json::json!({ "tool": r.tool_id, "result": r.result }))
        .collect()
}

fn context_json(history: &[ConversationTurn]) -> serde_json::Value {
    history.iter().map(ConversationTurn::prompt_entry).collect()
}

fn dedicated_prompt(user_request: &str, results: &[ToolResult], history: &[ConversationTurn]) -> String {
    serde_json::json!({
        "task": "response_synthesis",
        "user_request": user_request,
        "tool_results": successful_results_json(results),
        "failed_tools": results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.tool_id.as_str())
            .collect::<Vec<_>>(),
        "recent_conversation": context_json(history),
    })
    .to_string()
}

fn template_prompt(
    templates: &PromptTemplates,
    user_request: &str,
    results: &[ToolResult],
    history: &[ConversationTurn],
) -> String {
    let results_json = successful_results_json(results).to_string();
    let context = context_json(history).to_string();
    render(
        &templates.response_synthesis,
        &[
            ("user_request", user_request),
            ("tool_results", &results_json),
            ("conversation_context", &context),
        ],
    )
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatchError;
    use crate::gateway::{ModelConfig, ModelError, ModelKind, TextGenerator};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct Echo {
        reply: Result<String, ()>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for Echo {
        async fn generate(&self, prompt: &str, _system: &str) -> Result<String, ModelError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.reply
                .clone()
                .map_err(|_| ModelError::Remote {
                    status: 500,
                    detail: "down".into(),
                })
        }
    }

    fn model(reply: Result<&str, ()>, dedicated: bool) -> (ModelHandle, Arc<Echo>) {
        let backend = Arc::new(Echo {
            reply: reply.map(str::to_string),
            prompts: Mutex::new(Vec::new()),
        });
        let mut config = ModelConfig::new("synth", ModelKind::HostedApi);
        if dedicated {
            config.capabilities.insert(RESPONSE_SYNTHESIS_CAPABILITY.into());
        }
        (ModelHandle::new(config.descriptor(), backend.clone()), backend)
    }

    fn ok(tool: &str, payload: serde_json::Value) -> ToolResult {
        ToolResult::succeeded(tool, payload)
    }

    fn failed(tool: &str, reason: &str) -> ToolResult {
        ToolResult::failed(
            tool,
            &DispatchError::ServiceUnavailable {
                target: "http://x".into(),
                reason: reason.into(),
            },
        )
    }

    #[tokio::test]
    async fn test_no_tools_apology() {
        let text = synthesize(None, &PromptTemplates::default(), "hi", &[], &[]).await;
        assert_eq!(text, NO_TOOLS_APOLOGY);
    }

    #[tokio::test]
    async fn test_all_failed_lists_each_failure() {
        let (handle, backend) = model(Ok("should not be used"), false);
        let results = vec![failed("pdf_full_extraction", "refused"), failed("image_analysis", "down")];
        let text = synthesize(Some(&handle), &PromptTemplates::default(), "go", &results, &[]).await;
        assert!(text.contains("pdf_full_extraction: service unavailable at http://x: refused"));
        assert!(text.contains("image_analysis: service unavailable at http://x: down"));
        assert!(backend.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_template_synthesis() {
        let (handle, backend) = model(Ok("  The PDF has 3 pages.  "), false);
        let results = vec![ok("pdf_full_extraction", serde_json::json!({"pages": 3}))];
        let text = synthesize(Some(&handle), &PromptTemplates::default(), "how long?", &results, &[]).await;
        assert_eq!(text, "The PDF has 3 pages.");
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("how long?"));
        assert!(prompt.contains("\"pages\":3"));
    }

    #[tokio::test]
    async fn test_dedicated_synthesis_prompt() {
        let (handle, backend) = model(Ok("answer"), true);
        let results = vec![ok("a", serde_json::json!("x")), failed("b", "down")];
        synthesize(Some(&handle), &PromptTemplates::default(), "q", &results, &[]).await;
        let prompt = backend.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("\"task\":\"response_synthesis\""));
        assert!(prompt.contains("\"failed_tools\":[\"b\"]"));
    }

    #[tokio::test]
    async fn test_model_failure_uses_bullet_fallback() {
        let (handle, _) = model(Err(()), false);
        let long = "y".repeat(500);
        let results = vec![ok("a", serde_json::json!(long)), failed("b", "down")];
        let text = synthesize(Some(&handle), &PromptTemplates::default(), "q", &results, &[]).await;
        assert!(text.starts_with("Here is what I found:"));
        assert!(text.contains(&format!("- a: {}...", "y".repeat(200))));
        assert!(!text.contains(&"y".repeat(201)));
        assert!(text.ends_with("These tools failed: b."));
    }
}
