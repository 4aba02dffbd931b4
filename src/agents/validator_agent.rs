//! C10 — Validator Agent.
//!
//! Asks the LLM gateway for a validator program, then runs a fixed
//! post-processing chain grounded in `validator_agent_service.py`: strip
//! instructional prose the model sometimes inlines as comments, insert a
//! missing `registerValidation` call, replace the nonexistent
//! `quitf(_ok, ...)` success path with `return 0;`, remove calls to
//! `curLine()` (not part of testlib), complete bare `return` statements, and
//! balance braces. Also provides `generate_minimal_validator_code`, the
//! sample-derived validator the Supervisor falls back to after repeated
//! validator crashes or sample rejections.

use crate::error::ExtractionError;
use crate::extractor;
use crate::llm::{GenerationRequest, LlmGateway};
use crate::prompts::{self, PromptManager, PromptStore};
use crate::types::{FormatSchema, ProgramRole, PromptVars, ValidatorProgram};
use regex::Regex;
use std::sync::OnceLock;
use tracing::warn;

const GENERATION_TEMPERATURE: f64 = 0.3;

const SUSPICIOUS_COMMENT_KEYWORDS: &[&str] = &[
    "critical", "important", "note", "fix", "corrected", "based on",
];

fn quitf_ok_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"quitf\(_ok\s*,[^;]*\);?").unwrap())
}

pub async fn generate_validator_program<S: PromptStore>(
    gateway: &dyn LlmGateway,
    prompts: &PromptManager<S>,
    statement: &str,
    format_schema: &FormatSchema,
) -> Result<ValidatorProgram, ExtractionError> {
    let mut vars: PromptVars = PromptVars::new();
    vars.insert("statement".to_string(), statement.to_string());
    vars.insert(
        "format_schema".to_string(),
        serde_json::to_string_pretty(format_schema).unwrap_or_default(),
    );

    let prompt = prompts
        .render(prompts::VALIDATOR_INITIAL, &vars)
        .map_err(|_| ExtractionError::ExtractionFailure)?;
    let request = GenerationRequest::new(prompt).with_temperature(GENERATION_TEMPERATURE);
    let response = gateway
        .generate(request)
        .await
        .map_err(|_| ExtractionError::ExtractionFailure)?;

    build_program_from_response(&response)
}

pub async fn revise_validator_program<S: PromptStore>(
    gateway: &dyn LlmGateway,
    prompts: &PromptManager<S>,
    previous_source: &str,
    diagnostics: &str,
) -> Result<ValidatorProgram, ExtractionError> {
    let mut vars: PromptVars = PromptVars::new();
    vars.insert("previous_source".to_string(), previous_source.to_string());
    vars.insert("diagnostics".to_string(), diagnostics.to_string());

    let prompt = prompts
        .render(prompts::VALIDATOR_REVISION, &vars)
        .map_err(|_| ExtractionError::ExtractionFailure)?;
    let request = GenerationRequest::new(prompt).with_temperature(GENERATION_TEMPERATURE);
    let response = gateway
        .generate(request)
        .await
        .map_err(|_| ExtractionError::ExtractionFailure)?;

    build_program_from_response(&response)
}

fn build_program_from_response(response: &str) -> Result<ValidatorProgram, ExtractionError> {
    let raw_code = extractor::extract_cpp_code(response)?;
    let code = post_process(&raw_code);

    let (complete, missing) = extractor::validate_code_completeness(&code, ProgramRole::Validator);
    if !complete {
        return Err(ExtractionError::IncompleteSource(missing));
    }

    Ok(ValidatorProgram { source: code })
}

fn post_process(code: &str) -> String {
    let code = remove_inline_instructions(code);
    let code = fix_incomplete_returns(&code);
    let code = ensure_register_validation(&code);
    let code = balance_braces(&code);
    let code = replace_quitf_ok(&code);
    let code = remove_curline(&code);
    ensure_return_after_eof(&code)
}

/// Strips comments whose text opens with a suspicious instructional keyword
/// (the model sometimes leaves itself "CRITICAL: ..." notes inline), and
/// drops trailing prose appended after a statement's closing semicolon.
fn remove_inline_instructions(code: &str) -> String {
    let prose_tail = Regex::new(r"(?i)\b(use|the|for|to|is|are|will|must|should|can|was|were|only)\b").unwrap();
    let mut cleaned = Vec::with_capacity(code.lines().count());

    for line in code.lines() {
        if let Some(comment_start) = line.find("//") {
            let comment = line[comment_start..].to_lowercase();
            if SUSPICIOUS_COMMENT_KEYWORDS.iter().any(|k| comment.contains(k)) {
                let code_before = line[..comment_start].trim_end();
                if !code_before.is_empty() {
                    cleaned.push(code_before.to_string());
                }
                continue;
            }
        }

        let mut line_owned = line.to_string();
        if let Some(semi_idx) = line.find(';') {
            if !line[..semi_idx].contains("//") {
                if let Some(last_semi) = line.rfind(';') {
                    let tail = line[last_semi + 1..].trim();
                    if !tail.is_empty()
                        && !tail.starts_with("//")
                        && !tail.starts_with("/*")
                        && tail != "}"
                        && tail.contains(' ')
                        && prose_tail.is_match(tail)
                    {
                        line_owned = format!("{};", &line[..last_semi]);
                    }
                }
            }
        }
        cleaned.push(line_owned);
    }

    cleaned.join("\n")
}

fn fix_incomplete_returns(code: &str) -> String {
    let lines: Vec<&str> = code.lines().collect();
    let mut result = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let stripped = lines[i].trim();
        let is_bare_return = stripped == "return" || (stripped.starts_with("return") && !stripped.ends_with(';'));
        if is_bare_return {
            if let Some(next) = lines.get(i + 1) {
                let next_stripped = next.trim();
                if next_stripped == "}" || next_stripped.starts_with('}') {
                    let indent: String = lines[i].chars().take_while(|c| c.is_whitespace()).collect();
                    result.push(format!("{}return 0;", indent));
                    i += 1;
                    continue;
                }
            }
        }
        result.push(lines[i].to_string());
        i += 1;
    }
    result.join("\n")
}

/// Missing `registerValidation` is a guaranteed crash; insert it right after
/// the opening brace of `main` if it isn't already present.
fn ensure_register_validation(code: &str) -> String {
    if code.contains("registerValidation") {
        return code.to_string();
    }
    warn!("validator source is missing registerValidation, inserting it after main()'s opening brace");

    let lines: Vec<&str> = code.lines().collect();
    let mut main_line = None;
    for (i, line) in lines.iter().enumerate() {
        if line.contains("int main") || line.contains("main(") {
            main_line = Some(i);
            break;
        }
    }
    let Some(main_idx) = main_line else {
        return code.to_string();
    };
    for j in main_idx..lines.len().min(main_idx + 10) {
        if lines[j].contains('{') {
            let indent = lines[j].len() - lines[j].trim_start().len();
            let mut new_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
            new_lines.insert(
                j + 1,
                format!("{}registerValidation(argc, argv);", " ".repeat(indent + 4)),
            );
            return new_lines.join("\n");
        }
    }
    code.to_string()
}

fn balance_braces(code: &str) -> String {
    let mut balanced = String::with_capacity(code.len());
    let mut open_count: i32 = 0;
    for ch in code.chars() {
        match ch {
            '{' => {
                open_count += 1;
                balanced.push(ch);
            }
            '}' => {
                if open_count == 0 {
                    continue;
                }
                open_count -= 1;
                balanced.push(ch);
            }
            _ => balanced.push(ch),
        }
    }
    if open_count > 0 {
        balanced.push('\n');
        balanced.push_str(&"}".repeat(open_count as usize));
    }
    balanced
}

/// `quitf(_ok, ...)` can return the wrong exit code from a validator;
/// testlib validators must signal success by simply returning 0.
fn replace_quitf_ok(code: &str) -> String {
    if !code.contains("quitf(_ok") {
        return code.to_string();
    }
    quitf_ok_regex().replace_all(code, "return 0;").into_owned()
}

/// `curLine()` isn't part of testlib; replace any reference with a named
/// placeholder and seed a manual counter right after registration.
fn remove_curline(code: &str) -> String {
    if !code.contains("curLine") {
        return code.to_string();
    }
    warn!("validator source calls curLine(), which does not exist in testlib; removing it");
    let mut code = code
        .replace("inf.curLine()", "line_number_hint")
        .replace("curLine()", "line_number_hint");
    if !code.contains("int line_number_hint") {
        code = code.replace(
            "registerValidation(argc, argv);",
            "registerValidation(argc, argv);\n    int line_number_hint = 1;",
        );
    }
    code
}

/// Every `inf.readEof()` call must be immediately followed by a successful
/// return, or the process falls through without exiting 0.
fn ensure_return_after_eof(code: &str) -> String {
    if !code.contains("readEof") {
        return code.to_string();
    }
    if let Some(after) = code.split("readEof").nth(1) {
        if after.contains("return 0") {
            return code.to_string();
        }
    }
    code.replace("inf.readEof()", "inf.readEof();\n    return 0;")
}

/// The fallback validator the Supervisor reaches for after repeated
/// validator crashes or rejections of known-valid examples. Built directly
/// from the worked-example inputs (spec.md §4.C10): for each sample line it
/// reads and discards exactly the number of whitespace-delimited tokens
/// that line has, so it still rejects malformed token counts and missing
/// lines instead of accepting anything non-empty. When no sample input is
/// available it degenerates to draining the stream, since there is nothing
/// to derive a line shape from.
pub fn generate_minimal_validator_code(sample_inputs: &[String]) -> ValidatorProgram {
    let reference = sample_inputs.iter().find(|s| !s.trim().is_empty());
    let body = match reference {
        Some(sample) => {
            let mut reads = String::new();
            for line in sample.lines() {
                let token_count = line.split_whitespace().count().max(1);
                for _ in 0..token_count {
                    reads.push_str("        inf.readToken();\n");
                }
                reads.push_str("        inf.readEoln();\n");
            }
            reads
        }
        None => "        while (!inf.seekEof()) {\n            inf.readChar();\n        }\n".to_string(),
    };

    ValidatorProgram {
        source: format!(
            r#"#include "testlib.h"
#include <bits/stdc++.h>
using namespace std;

int main(int argc, char* argv[]) {{
    registerValidation(argc, argv);
{body}    inf.readEof();
    return 0;
}}
"#
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_suspicious_inline_comment_entirely_when_no_code_precedes() {
        let code = "// CRITICAL: must read n first\nint n;";
        let cleaned = remove_inline_instructions(code);
        assert!(!cleaned.contains("CRITICAL"));
        assert!(cleaned.contains("int n;"));
    }

    #[test]
    fn fixes_bare_return_before_closing_brace() {
        let code = "int main() {\n  return\n}";
        let fixed = fix_incomplete_returns(code);
        assert!(fixed.contains("return 0;"));
    }

    #[test]
    fn inserts_register_validation_when_missing() {
        let code = "#include \"testlib.h\"\nint main(int argc, char* argv[]) {\n    return 0;\n}";
        let fixed = ensure_register_validation(code);
        assert!(fixed.contains("registerValidation(argc, argv);"));
    }

    #[test]
    fn leaves_register_validation_untouched_when_present() {
        let code = "int main() {\n registerValidation(argc, argv);\n return 0;\n}";
        assert_eq!(ensure_register_validation(code), code);
    }

    #[test]
    fn replaces_quitf_ok_with_return_zero() {
        let code = r#"inf.readEof(); quitf(_ok, "valid");"#;
        let fixed = replace_quitf_ok(code);
        assert!(!fixed.contains("quitf(_ok"));
        assert!(fixed.contains("return 0;"));
    }

    #[test]
    fn removes_curline_and_seeds_counter() {
        let code = "registerValidation(argc, argv);\nint x = inf.curLine();";
        let fixed = remove_curline(code);
        assert!(!fixed.contains("curLine()"));
        assert!(fixed.contains("int line_number_hint = 1;"));
    }

    #[test]
    fn appends_return_zero_after_bare_read_eof() {
        let code = "inf.readEof();\n}";
        let fixed = ensure_return_after_eof(code);
        assert!(fixed.contains("return 0;"));
    }

    #[test]
    fn minimal_validator_reads_token_count_from_sample_lines() {
        let samples = vec!["3\n1 2 3\n".to_string()];
        let program = generate_minimal_validator_code(&samples);
        assert!(program.source.contains("registerValidation"));
        // first line: one token ("3"); second line: three tokens.
        assert_eq!(program.source.matches("inf.readToken();").count(), 4);
        assert_eq!(program.source.matches("inf.readEoln();").count(), 2);
        assert!(program.source.contains("inf.readEof();"));
    }

    #[test]
    fn minimal_validator_degenerates_without_any_sample() {
        let program = generate_minimal_validator_code(&[]);
        assert!(program.source.contains("registerValidation"));
        assert!(program.source.contains("seekEof"));
    }
}
