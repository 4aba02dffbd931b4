//! C8 — Format Inference.
//!
//! Asks the LLM gateway to describe a problem's input grammar as a
//! [`FormatSchema`], at low temperature to suppress hallucination. Never
//! raises: any parse or validation failure falls back to
//! `FormatSchema::fallback()`, grounded in `gemini_service.py`'s
//! `infer_input_format` returning `_default_schema()` on every error path,
//! and its `_parse_gemini_response`'s three-strategy JSON recovery.

use crate::llm::{GenerationRequest, LlmGateway};
use crate::prompts::{self, PromptManager, PromptStore};
use crate::types::{FormatSchema, PromptVars};
use tracing::warn;

const INFERENCE_TEMPERATURE: f64 = 0.0;

pub async fn infer_format<S: PromptStore>(
    gateway: &dyn LlmGateway,
    prompts: &PromptManager<S>,
    statement: &str,
    example_input: Option<&str>,
    constraints: Option<&str>,
) -> FormatSchema {
    let mut vars: PromptVars = PromptVars::new();
    vars.insert("statement".to_string(), statement.to_string());
    vars.insert(
        "example_input".to_string(),
        example_input.unwrap_or("(none provided)").to_string(),
    );
    vars.insert(
        "constraints".to_string(),
        constraints.unwrap_or("(none provided)").to_string(),
    );

    let prompt = match prompts.render(prompts::FORMAT_INFERENCE, &vars) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "could not render format inference prompt, using fallback schema");
            return FormatSchema::fallback();
        }
    };

    let request = GenerationRequest::new(prompt).with_temperature(INFERENCE_TEMPERATURE);
    let response = match gateway.generate(request).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "format inference LLM call failed, using fallback schema");
            return FormatSchema::fallback();
        }
    };

    match parse_schema_response(&response) {
        Some(schema) => match schema.validate() {
            Ok(()) => schema,
            Err(reason) => {
                warn!(reason, "inferred schema failed validation, using fallback schema");
                FormatSchema::fallback()
            }
        },
        None => {
            warn!("no valid JSON schema found in LLM response, using fallback schema");
            FormatSchema::fallback()
        }
    }
}

/// Four-strategy decoder, in priority order: parse the whole (fence-stripped)
/// response directly; parse the first fenced ```json block; scan for the
/// first balanced top-level `{...}` object; fall through to a loose regex.
fn parse_schema_response(raw: &str) -> Option<FormatSchema> {
    let stripped = strip_fences(raw);

    if let Ok(schema) = serde_json::from_str::<FormatSchema>(&stripped) {
        return Some(schema);
    }

    if let Some(fenced) = extract_fenced_json(raw) {
        if let Ok(schema) = serde_json::from_str::<FormatSchema>(&fenced) {
            return Some(schema);
        }
    }

    if let Some(balanced) = extract_first_balanced_object(&stripped) {
        if let Ok(schema) = serde_json::from_str::<FormatSchema>(&balanced) {
            return Some(schema);
        }
    }

    if let Some(regexed) = extract_via_regex(&stripped) {
        if let Ok(schema) = serde_json::from_str::<FormatSchema>(&regexed) {
            return Some(schema);
        }
    }

    None
}

fn strip_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

fn extract_fenced_json(raw: &str) -> Option<String> {
    let start_marker = "```json";
    let start = raw.find(start_marker)? + start_marker.len();
    let rest = &raw[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

fn extract_first_balanced_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(text[start..start + offset + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn extract_via_regex(text: &str) -> Option<String> {
    let re = regex::Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").ok()?;
    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema_json() -> &'static str {
        r#"{
            "has_test_count": false,
            "test_count_variable": null,
            "input_structure": {
                "lines": [
                    {"line_number": 1, "kind": "integer", "count_expr": null, "variable_names": ["n"], "constraints": []}
                ],
                "total_lines": 1,
                "is_variable_length": false
            },
            "semantic_constraints": {"graph": null, "permutation": false},
            "algorithm_type": "simple"
        }"#
    }

    #[test]
    fn parses_direct_json_response() {
        let schema = parse_schema_response(sample_schema_json()).unwrap();
        assert_eq!(schema.algorithm_type, "simple");
    }

    #[test]
    fn parses_fenced_json_block() {
        let wrapped = format!("Here is the schema:\n```json\n{}\n```\nThanks.", sample_schema_json());
        let schema = parse_schema_response(&wrapped).unwrap();
        assert_eq!(schema.algorithm_type, "simple");
    }

    #[test]
    fn parses_balanced_object_amid_prose() {
        let wrapped = format!("Sure, analyzing the statement... {} That's the schema.", sample_schema_json());
        let schema = parse_schema_response(&wrapped).unwrap();
        assert_eq!(schema.algorithm_type, "simple");
    }

    #[test]
    fn returns_none_for_garbage() {
        assert!(parse_schema_response("not json at all").is_none());
    }
}
