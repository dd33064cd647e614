//! Prompt templates for planning and synthesis.
//!
//! Templates use `{placeholder}` substitution. Either can be replaced from
//! the `templates:` config section.

use crate::config::TemplateOverrides;

pub const PLANNER_SYSTEM_PROMPT: &str = "You are a tool-selection planner for a document \
analysis assistant. Choose only tools from the catalogue you are given, and only the \
tools needed to answer the request.";

pub const SYNTHESIS_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user \
using only the tool results provided. If a tool failed, say so plainly. Never invent results.";

const DEFAULT_TOOL_SELECTION: &str = "\
User request:
{user_request}

Uploaded files (name, type, size):
{file_manifest}

Available tools:
{tool_catalogue}

Recent conversation:
{conversation_context}

Select the tools needed for this request. Reply with a JSON object:
{\"selected_tools\": [tool ids], \"reasoning\": string, \"execution_order\": [tool ids], \
\"tool_parameters\": {tool id: {name: value}}, \"file_requirements\": {tool id: [file names]}}";

const DEFAULT_RESPONSE_SYNTHESIS: &str = "\
User request:
{user_request}

Tool results:
{tool_results}

Recent conversation:
{conversation_context}

Write a clear, concise answer to the user based on these results.";

/// The two templates the pipeline renders.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    pub tool_selection: String,
    pub response_synthesis: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            tool_selection: DEFAULT_TOOL_SELECTION.to_string(),
            response_synthesis: DEFAULT_RESPONSE_SYNTHESIS.to_string(),
        }
    }
}

impl PromptTemplates {
    pub fn from_overrides(overrides: &TemplateOverrides) -> Self {
        let defaults = Self::default();
        Self {
            tool_selection: overrides
                .tool_selection
                .clone()
                .unwrap_or(defaults.tool_selection),
            response_synthesis: overrides
                .response_synthesis
                .clone()
                .unwrap_or(defaults.response_synthesis),
        }
    }
}

/// Substitute `{name}` placeholders in one pass, so substituted text is never
/// re-expanded. Unknown placeholders are left as-is.
pub fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let replacement = tail[1..].find('}').and_then(|end| {
            let name = &tail[1..1 + end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end + 2))
        });
        match replacement {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_and_keeps_unknown() {
        let out = render("{a} and {b} and {c}", &[("a", "1"), ("b", "2")]);
        assert_eq!(out, "1 and 2 and {c}");
    }

    #[test]
    fn test_render_does_not_reexpand_values() {
        let out = render("{a}|{b}", &[("a", "{b}"), ("b", "x")]);
        assert_eq!(out, "{b}|x");
    }

    #[test]
    fn test_default_tool_selection_placeholders() {
        let out = render(
            &PromptTemplates::default().tool_selection,
            &[
                ("user_request", "summarize"),
                ("file_manifest", "[]"),
                ("tool_catalogue", "[]"),
                ("conversation_context", "[]"),
            ],
        );
        assert!(out.contains("summarize"));
        assert!(!out.contains("{user_request}"));
        assert!(out.contains("selected_tools"));
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let overrides = TemplateOverrides {
            tool_selection: Some("pick for {user_request}".into()),
            response_synthesis: None,
        };
        let templates = PromptTemplates::from_overrides(&overrides);
        assert_eq!(templates.tool_selection, "pick for {user_request}");
        assert_eq!(
            templates.response_synthesis,
            PromptTemplates::default().response_synthesis
        );
    }
}
