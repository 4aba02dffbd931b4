//! C5 — Code Extractor.
//!
//! Pulls a C++ source body out of a raw LLM completion. LLMs wrap code in
//! varying amounts of prose and markdown fencing, so extraction runs a
//! priority-ordered chain of strategies and falls through to the next one
//! whenever a strategy's output looks too thin to be real source, grounded in
//! `code_extraction_service.py`'s `extract_cpp_code`.

use crate::error::ExtractionError;
use crate::types::ProgramRole;
use regex::Regex;
use std::sync::OnceLock;

fn strict_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<<CODE>>\s*(.*?)\s*<<ENDCODE>>").unwrap())
}

fn commands_block_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*\s*COMMANDS:(.*?)\*/").unwrap())
}

const MARKDOWN_LANG_TAGS: &[&str] = &["cpp", "c++", "c", ""];

/// Extract C++ source from a raw completion, trying strategies in priority
/// order: the strict `<<CODE>>...<<ENDCODE>>` delimiter, a ```cpp fenced
/// block, a ```c++ fenced block, any fenced block, then a heuristic scan.
pub fn extract_cpp_code(response: &str) -> Result<String, ExtractionError> {
    if let Some(code) = extract_strict(response) {
        return Ok(code);
    }
    if let Some(code) = extract_markdown(response, Some("cpp")) {
        return Ok(code);
    }
    if let Some(code) = extract_markdown(response, Some("c++")) {
        return Ok(code);
    }
    if let Some(code) = extract_markdown(response, None) {
        return Ok(code);
    }
    if let Some(code) = extract_heuristic(response) {
        return Ok(code);
    }
    Err(ExtractionError::ExtractionFailure)
}

fn extract_strict(response: &str) -> Option<String> {
    let caps = strict_block_regex().captures(response)?;
    let code = caps.get(1)?.as_str().trim();
    if code.is_empty() {
        None
    } else {
        Some(code.to_string())
    }
}

fn extract_markdown(response: &str, language: Option<&str>) -> Option<String> {
    let marker = match language {
        Some(lang) => format!("```{}", lang),
        None => "```".to_string(),
    };
    if !response.contains(&marker) {
        return None;
    }
    let mut parts = response.splitn(2, marker.as_str());
    parts.next()?;
    let rest = parts.next()?;
    let code_part = rest.split("```").next()?.trim();

    let mut lines: Vec<&str> = code_part.lines().collect();
    if let Some(first) = lines.first() {
        let trimmed = first.trim();
        let matches_tag = MARKDOWN_LANG_TAGS.contains(&trimmed)
            || language.map(|l| trimmed == l).unwrap_or(false);
        if matches_tag {
            lines.remove(0);
        }
    }
    let code = lines.join("\n").trim().to_string();

    if code.lines().count() < 3 {
        return None;
    }
    Some(code)
}

fn extract_heuristic(response: &str) -> Option<String> {
    const ENTRY_MARKERS: &[&str] = &[
        "#include",
        "int main",
        "void main",
        "using namespace std;",
        "/*",
        "//",
    ];

    let mut code_lines: Vec<&str> = Vec::new();
    let mut in_code_block = false;

    for line in response.lines() {
        let stripped = line.trim();
        if !in_code_block && ENTRY_MARKERS.iter().any(|m| stripped.starts_with(m)) {
            in_code_block = true;
            code_lines.push(line);
            continue;
        }
        if !in_code_block {
            continue;
        }

        if stripped.is_empty() {
            if let Some(last) = code_lines.last() {
                if last.trim().is_empty() && code_lines.len() >= 2 {
                    break;
                }
            }
        }

        let looks_like_prose = stripped.split_whitespace().count() > 5
            && !(stripped.ends_with(';')
                || stripped.ends_with('{')
                || stripped.ends_with('}')
                || stripped.starts_with('#')
                || stripped.starts_with("//")
                || stripped.starts_with("/*")
                || stripped.ends_with("*/"));
        if looks_like_prose {
            break;
        }

        code_lines.push(line);
    }

    let code = code_lines.join("\n").trim().to_string();
    if code.lines().count() < 5 || !(code.contains("int main") || code.contains("main(")) {
        return None;
    }
    Some(code)
}

/// Extract generator CLI commands from a `/* COMMANDS: ... */` block, or
/// fall back to scanning every line that begins with `./gen`.
pub fn extract_commands(code: &str) -> Vec<String> {
    if let Some(caps) = commands_block_regex().captures(code) {
        let commands: Vec<String> = caps
            .get(1)
            .map(|m| m.as_str())
            .unwrap_or("")
            .lines()
            .map(|l| l.trim())
            .filter(|l| l.starts_with("./gen"))
            .map(|l| l.to_string())
            .collect();
        if !commands.is_empty() {
            return commands;
        }
    }
    code.lines()
        .map(|l| l.trim())
        .filter(|l| l.starts_with("./gen"))
        .map(|l| l.to_string())
        .collect()
}

/// Completeness check: includes, an entry point, balanced braces, and the
/// role-specific `testlib` registration call.
pub fn validate_code_completeness(code: &str, role: ProgramRole) -> (bool, Vec<String>) {
    let mut missing = Vec::new();

    if !code.contains("#include") {
        missing.push("has_includes".to_string());
    }
    if !(code.contains("int main") || code.contains("main(")) {
        missing.push("has_main".to_string());
    }
    let open = code.matches('{').count();
    let close = code.matches('}').count();
    if open == 0 || close == 0 || open != close {
        missing.push("has_balanced_braces".to_string());
    }
    match role {
        ProgramRole::Generator => {
            if !code.contains("registerGen") {
                missing.push("has_registerGen".to_string());
            }
        }
        ProgramRole::Validator => {
            if !code.contains("registerValidation") {
                missing.push("has_registerValidation".to_string());
            }
        }
        ProgramRole::Checker => {}
    }

    (missing.is_empty(), missing)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_strict_delimited_block() {
        let response = "Here you go:\n<<CODE>>\nint main() { return 0; }\n<<ENDCODE>>\nDone.";
        let code = extract_cpp_code(response).unwrap();
        assert_eq!(code, "int main() { return 0; }");
    }

    #[test]
    fn extracts_cpp_fenced_block_and_strips_language_tag() {
        let response = "Sure:\n```cpp\n#include <bits/stdc++.h>\nint main() {\n  return 0;\n}\n```\n";
        let code = extract_cpp_code(response).unwrap();
        assert!(code.starts_with("#include"));
        assert!(!code.starts_with("cpp"));
    }

    #[test]
    fn rejects_generic_fence_with_too_few_lines() {
        let response = "```\nx\n```";
        assert!(matches!(
            extract_cpp_code(response),
            Err(ExtractionError::ExtractionFailure)
        ));
    }

    #[test]
    fn falls_back_to_heuristic_scan() {
        let response = "#include <bits/stdc++.h>\nusing namespace std;\nint main() {\n  int n;\n  cin >> n;\n  return 0;\n}\nThanks for reading this generated solution which explains everything.";
        let code = extract_cpp_code(response).unwrap();
        assert!(code.contains("int main"));
    }

    #[test]
    fn extracts_commands_from_comment_block() {
        let code = "/* COMMANDS:\n./gen -n 10\n./gen -n 100 -type tree\n*/\nint main(){}";
        let commands = extract_commands(code);
        assert_eq!(commands, vec!["./gen -n 10", "./gen -n 100 -type tree"]);
    }

    #[test]
    fn extracts_commands_via_line_scan_fallback() {
        let code = "// ./gen -n 5\nint main(){}";
        let commands = extract_commands(code);
        assert_eq!(commands, vec!["./gen -n 5"]);
    }

    #[test]
    fn completeness_check_flags_missing_registration_call() {
        let code = "#include <testlib.h>\nint main() { return 0; }";
        let (ok, missing) = validate_code_completeness(code, ProgramRole::Generator);
        assert!(!ok);
        assert!(missing.contains(&"has_registerGen".to_string()));
    }

    #[test]
    fn completeness_check_passes_well_formed_validator() {
        let code = "#include <testlib.h>\nint main() { registerValidation(); return 0; }";
        let (ok, _) = validate_code_completeness(code, ProgramRole::Validator);
        assert!(ok);
    }
}
