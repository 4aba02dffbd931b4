//! DATA MODEL (spec.md §3): the structs and enums every component exchanges.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A worked example from the problem statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkedExample {
    pub input: String,
    pub output: String,
}

/// The oracle's source language. Only scripting-language oracles are in
/// scope (spec.md §1); the tag is carried through but not validated against
/// a closed set so new languages can be supported without a core change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OracleLanguage(pub String);

impl OracleLanguage {
    pub fn python() -> Self {
        Self("python".to_string())
    }
}

/// Caller-supplied input to the whole system (spec.md §3 "ProblemBundle").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemBundle {
    pub statement: String,
    pub examples: Vec<WorkedExample>,
    pub oracle_source: String,
    pub oracle_language: OracleLanguage,
    pub constraints: Option<String>,
    pub target_count: usize,
}

impl ProblemBundle {
    pub fn new(statement: impl Into<String>, oracle_source: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            examples: Vec::new(),
            oracle_source: oracle_source.into(),
            oracle_language: OracleLanguage::python(),
            constraints: None,
            target_count: 20,
        }
    }
}

/// Closed set of line kinds a [`FormatSchema`] can describe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputLineKind {
    Integer,
    TwoIntegers,
    ThreeIntegers,
    Array,
    String,
    Matrix,
    Edge,
    GraphEdges,
    Custom,
}

/// One logical line of the inferred input grammar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputLine {
    /// 1-based.
    pub line_number: u32,
    pub kind: InputLineKind,
    /// e.g. `"n"`, `"n-1"`, `"m"`.
    pub count_expr: Option<String>,
    pub variable_names: Vec<String>,
    pub constraints: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphConstraints {
    pub num_nodes_var: Option<String>,
    pub num_edges_var: Option<String>,
    pub directed: bool,
    pub acyclic: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SemanticConstraints {
    pub graph: Option<GraphConstraints>,
    pub permutation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputStructure {
    pub lines: Vec<InputLine>,
    pub total_lines: u32,
    pub is_variable_length: bool,
}

/// A tagged description of the input grammar (C8's output, spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatSchema {
    pub has_test_count: bool,
    pub test_count_variable: Option<String>,
    pub input_structure: InputStructure,
    pub semantic_constraints: SemanticConstraints,
    pub algorithm_type: String,
}

impl FormatSchema {
    /// The degraded fallback schema C8 returns when inference fails: a
    /// single integer line, never raises.
    pub fn fallback() -> Self {
        Self {
            has_test_count: false,
            test_count_variable: None,
            input_structure: InputStructure {
                lines: vec![InputLine {
                    line_number: 1,
                    kind: InputLineKind::Integer,
                    count_expr: None,
                    variable_names: vec!["n".to_string()],
                    constraints: Vec::new(),
                }],
                total_lines: 1,
                is_variable_length: false,
            },
            semantic_constraints: SemanticConstraints::default(),
            algorithm_type: "unknown".to_string(),
        }
    }

    /// Validate the invariants from spec.md §3: non-empty lines, and if
    /// `has_test_count` then `test_count_variable` is set, and if graph
    /// constraints are present then both node/edge variables are declared.
    pub fn validate(&self) -> Result<(), String> {
        if self.input_structure.lines.is_empty() {
            return Err("input_structure.lines must be non-empty".to_string());
        }
        if self.has_test_count && self.test_count_variable.is_none() {
            return Err("has_test_count is set but test_count_variable is missing".to_string());
        }
        if let Some(graph) = &self.semantic_constraints.graph {
            if graph.num_nodes_var.is_none() || graph.num_edges_var.is_none() {
                return Err(
                    "graph constraints present but num_nodes_var/num_edges_var missing"
                        .to_string(),
                );
            }
        }
        Ok(())
    }
}

/// A single CLI invocation of a compiled generator, e.g.
/// `./gen -n 10 -type tree`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GeneratorCommand(pub String);

impl GeneratorCommand {
    /// Whitespace-tokenized flags, excluding the leading program marker.
    pub fn flags(&self) -> Vec<&str> {
        self.0
            .split_whitespace()
            .skip(1)
            .filter(|tok| tok.starts_with('-'))
            .collect()
    }
}

/// Native source + CLI command list produced by the Generator Agent (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorProgram {
    pub source: String,
    pub commands: Vec<GeneratorCommand>,
}

/// Native source produced by the Validator Agent (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorProgram {
    pub source: String,
}

/// A byte string produced by the Generator Runner (C3). Constructing one
/// enforces the non-empty / single-trailing-newline invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate(String);

impl Candidate {
    /// Normalize raw generator stdout: strip trailing whitespace, then
    /// append exactly one newline. Returns `None` if nothing remains after
    /// stripping (the `EmptyGeneration` case, handled by the caller).
    pub fn normalize(raw: &str) -> Option<Self> {
        let trimmed = raw.trim_end();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(format!("{}\n", trimmed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The one-shot normalization retry from step 8: flip trailing-newline
    /// presence.
    pub fn toggled_newline(&self) -> String {
        if self.0.ends_with('\n') {
            self.0.trim_end_matches('\n').to_string()
        } else {
            format!("{}\n", self.0)
        }
    }
}

/// Outcome of running a candidate (or worked example) through the Validator
/// Runner (C4).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Rejected {
        error_line: Option<u32>,
        error_message: String,
    },
    /// A platform-specific crash (segfault / access violation), tagged
    /// distinctly from an ordinary semantic rejection per spec.md §4.C4.
    Crashed { signal_or_code: String },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// `{ input, output }`, both newline-normalized (spec.md §3 "TestCase").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCase {
    pub input: String,
    pub output: String,
}

/// The result of `Supervisor::synthesize_suite`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub suite: Vec<TestCase>,
    pub iterations: u32,
    pub generator_source: Option<String>,
    pub validator_source: Option<String>,
    /// `true` when the wall-clock/iteration budget was exhausted before
    /// `target_count` was reached; `suite.len() < target_count` in that case.
    pub partial: bool,
    /// Set when `partial` and the cause is known, e.g. `"BudgetExhausted"`.
    pub partial_reason: Option<String>,
}

/// Per-run compiled-executable handle. `role` drives which toolchain flags
/// apply (see `platform`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramRole {
    Generator,
    Validator,
    Checker,
}

/// Mutable per-invocation state the Supervisor owns exclusively
/// (spec.md §3 "LoopState").
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub iteration: u32,
    pub generator_source: Option<String>,
    pub generator_commands: Vec<GeneratorCommand>,
    pub validator_source: Option<String>,
    pub last_validation_errors: Vec<String>,
    pub last_compile_errors: Option<String>,
    pub accumulated_candidates: Vec<String>,
}

/// Identifying metadata for a reserved-identifier check (C9 post-processing):
/// names that collide with the `testlib` convention's stream names.
pub fn reserved_testlib_identifiers() -> &'static [&'static str] {
    &["inf", "ouf", "ans", "rnd", "tout"]
}

/// Free-form key/value context threaded through prompt rendering.
pub type PromptVars = HashMap<String, String>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_normalizes_to_single_trailing_newline() {
        let c = Candidate::normalize("3\n1 -2 5\n\n\n").unwrap();
        assert_eq!(c.as_str(), "3\n1 -2 5\n");
    }

    #[test]
    fn candidate_rejects_empty_after_strip() {
        assert!(Candidate::normalize("   \n\n").is_none());
    }

    #[test]
    fn toggled_newline_round_trips() {
        let c = Candidate::normalize("5 6").unwrap();
        assert_eq!(c.as_str(), "5 6\n");
        let toggled = c.toggled_newline();
        assert_eq!(toggled, "5 6");
    }

    #[test]
    fn fallback_schema_is_valid() {
        assert!(FormatSchema::fallback().validate().is_ok());
    }

    #[test]
    fn schema_requires_test_count_variable_when_flagged() {
        let mut schema = FormatSchema::fallback();
        schema.has_test_count = true;
        assert!(schema.validate().is_err());
    }

    #[test]
    fn generator_command_flags_exclude_program_marker() {
        let cmd = GeneratorCommand("./gen -n 10 -type tree".to_string());
        assert_eq!(cmd.flags(), vec!["-n", "-type"]);
    }
}
