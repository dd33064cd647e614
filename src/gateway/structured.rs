//! Structured (JSON) output handling.
//!
//! Models wrap JSON in prose and code fences more often than not. Parsing is
//! layered: strict parse of the fence-stripped text, then the first balanced
//! `{...}` span.

use super::errors::ModelError;

/// Appended to the system prompt for structured calls.
pub const JSON_SYSTEM_SUFFIX: &str =
    "\n\nYou must respond with a single valid JSON object and nothing else.";

/// Appended to the user prompt for structured calls.
pub const JSON_PROMPT_SUFFIX: &str = "\n\nRespond in JSON only.";

/// Canonical liveness prompt.
pub const HEALTH_PROMPT: &str = "Respond with exactly OK";

/// Expected token in a health reply, compared case-insensitively.
const HEALTH_TOKEN: &str = "ok";

/// Add JSON-only framing to a prompt pair.
pub fn frame_for_json(prompt: &str, system_prompt: &str) -> (String, String) {
    (
        format!("{prompt}{JSON_PROMPT_SUFFIX}"),
        format!("{system_prompt}{JSON_SYSTEM_SUFFIX}"),
    )
}

/// Parse a model reply into a JSON value.
pub fn parse_structured(text: &str) -> Result<serde_json::Value, ModelError> {
    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(stripped) {
        return Ok(value);
    }

    let span = extract_first_object(text).ok_or_else(|| ModelError::MalformedStructuredResponse {
        reason: "no JSON object found in response".into(),
        raw: text.to_string(),
    })?;

    serde_json::from_str(span).map_err(|e| ModelError::MalformedStructuredResponse {
        reason: e.to_string(),
        raw: text.to_string(),
    })
}

/// Strip a surrounding markdown code fence (with optional language tag).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line.
    let body = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// The first balanced `{...}` span. Braces inside JSON strings are ignored.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Whether a health-check reply carries the expected token.
pub fn is_healthy_reply(reply: &str) -> bool {
    reply.to_lowercase().contains(HEALTH_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let value = parse_structured(r#"{"selected_tools": ["a"]}"#).unwrap();
        assert_eq!(value["selected_tools"][0], "a");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"reasoning\": \"pdf\"}\n```";
        let value = parse_structured(text).unwrap();
        assert_eq!(value["reasoning"], "pdf");
    }

    #[test]
    fn test_parse_json_wrapped_in_prose() {
        let text = r#"Sure! Here is the plan: {"selected_tools": ["pdf_full_extraction"], "reasoning": "a {pdf}"} Let me know."#;
        let value = parse_structured(text).unwrap();
        assert_eq!(value["selected_tools"][0], "pdf_full_extraction");
        assert_eq!(value["reasoning"], "a {pdf}");
    }

    #[test]
    fn test_extract_ignores_braces_in_strings() {
        let text = r#"x {"a": "}{", "b": {"c": "\"}"}} y"#;
        assert_eq!(
            extract_first_object(text),
            Some(r#"{"a": "}{", "b": {"c": "\"}"}}"#)
        );
    }

    #[test]
    fn test_unbalanced_is_malformed() {
        let err = parse_structured("I think {\"a\": 1").unwrap_err();
        assert!(matches!(err, ModelError::MalformedStructuredResponse { .. }));
    }

    #[test]
    fn test_no_object_is_malformed() {
        let err = parse_structured("no json here").unwrap_err();
        match err {
            ModelError::MalformedStructuredResponse { raw, .. } => assert_eq!(raw, "no json here"),
            other => panic!("expected MalformedStructuredResponse, got {other:?}"),
        }
    }

    #[test]
    fn test_frame_for_json() {
        let (prompt, system) = frame_for_json("plan", "you plan");
        assert!(prompt.ends_with(JSON_PROMPT_SUFFIX));
        assert!(system.starts_with("you plan"));
    }

    #[test]
    fn test_is_healthy_reply() {
        assert!(is_healthy_reply("OK"));
        assert!(is_healthy_reply("ok."));
        assert!(!is_healthy_reply("error"));
    }
}
