//! C12 — Checker Agent.
//!
//! A keyword heuristic decides whether a statement plausibly has more than
//! one correct answer (topological order, spanning tree, matching, ...); if
//! so, the LLM gateway is asked to synthesize a custom `testlib` checker,
//! else the default whole-token comparison checker (`wcmp`) is used.
//! Grounded in `checker_agent_service.py`. Unlike the other two agents, the
//! checker is never invoked from inside the supervision loop — it is an
//! on-demand entry point a caller reaches for separately once a suite exists.

use crate::llm::{GenerationRequest, LlmGateway};
use crate::prompts::{self, PromptManager, PromptStore};
use crate::types::PromptVars;

const GENERATION_TEMPERATURE: f64 = 0.3;

const MULTI_ANSWER_KEYWORDS: &[&str] = &[
    "any valid",
    "any correct",
    "multiple",
    "topological",
    "spanning tree",
    "matching",
    "partition",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckerDecision {
    /// The default whole-token comparison checker suffices.
    DefaultComparison,
    /// A custom checker was synthesized.
    Custom(String),
}

/// Cheap pre-LLM heuristic: scan the statement for phrasing that usually
/// signals more than one correct output is acceptable.
pub fn needs_custom_checker(statement: &str) -> bool {
    let lower = statement.to_lowercase();
    MULTI_ANSWER_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

pub async fn generate_checker_program<S: PromptStore>(
    gateway: &dyn LlmGateway,
    prompts: &PromptManager<S>,
    statement: &str,
) -> CheckerDecision {
    if !needs_custom_checker(statement) {
        return CheckerDecision::DefaultComparison;
    }

    let mut vars: PromptVars = PromptVars::new();
    vars.insert("statement".to_string(), statement.to_string());
    vars.insert(
        "rationale".to_string(),
        "statement phrasing suggests more than one output may be accepted".to_string(),
    );

    let Ok(prompt) = prompts.render(prompts::CHECKER_INITIAL, &vars) else {
        return CheckerDecision::DefaultComparison;
    };
    let request = GenerationRequest::new(prompt).with_temperature(GENERATION_TEMPERATURE);
    let Ok(response) = gateway.generate(request).await else {
        return CheckerDecision::DefaultComparison;
    };

    match extract_checker_code(&response) {
        Some(code) => CheckerDecision::Custom(code),
        None => CheckerDecision::DefaultComparison,
    }
}

pub async fn revise_checker_program<S: PromptStore>(
    gateway: &dyn LlmGateway,
    prompts: &PromptManager<S>,
    previous_source: &str,
    diagnostics: &str,
) -> CheckerDecision {
    let mut vars: PromptVars = PromptVars::new();
    vars.insert("previous_source".to_string(), previous_source.to_string());
    vars.insert("diagnostics".to_string(), diagnostics.to_string());

    let Ok(prompt) = prompts.render(prompts::CHECKER_REVISION, &vars) else {
        return CheckerDecision::DefaultComparison;
    };
    let request = GenerationRequest::new(prompt).with_temperature(GENERATION_TEMPERATURE);
    let Ok(response) = gateway.generate(request).await else {
        return CheckerDecision::DefaultComparison;
    };

    match extract_checker_code(&response) {
        Some(code) => CheckerDecision::Custom(code),
        None => CheckerDecision::DefaultComparison,
    }
}

fn extract_checker_code(response: &str) -> Option<String> {
    if response.contains("CHECKER_TYPE: wcmp") || response.contains("CHECKER_TYPE:wcmp") {
        return None;
    }

    let code = if let Some(rest) = response.split("```cpp").nth(1) {
        rest.split("```").next()?.trim().to_string()
    } else if let Some(rest) = response.split("```c++").nth(1) {
        rest.split("```").next()?.trim().to_string()
    } else if let Some(rest) = response.splitn(2, "```").nth(1) {
        rest.split("```").next()?.trim().to_string()
    } else {
        String::new()
    };

    if code.is_empty() {
        None
    } else {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_topological_order_statement() {
        assert!(needs_custom_checker("Output any valid topological order of the graph."));
    }

    #[test]
    fn does_not_flag_single_answer_statement() {
        assert!(!needs_custom_checker("Output the sum of the two integers."));
    }

    #[test]
    fn extracts_cpp_fenced_checker_code() {
        let response = "Here:\n```cpp\nint main(){registerTestlibCmd(argc,argv);}\n```\n";
        let code = extract_checker_code(response).unwrap();
        assert!(code.contains("registerTestlibCmd"));
    }

    #[test]
    fn wcmp_marker_yields_no_custom_code() {
        let response = "CHECKER_TYPE: wcmp\nNo custom checker needed.";
        assert!(extract_checker_code(response).is_none());
    }
}
