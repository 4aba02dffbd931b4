//! Error taxonomy for the synthesis core.
//!
//! Every variant maps to a row of the ERROR HANDLING DESIGN table: most are
//! recoverable within the Supervisor loop and only ever surface as a log line
//! and structured feedback for the next iteration. `SynthesisError` is what
//! `Supervisor::synthesize_suite` can actually return — the terminal subset.

use thiserror::Error;

/// Errors raised by the Sandboxed Code Runner (C1).
#[derive(Debug, Error, Clone)]
pub enum OracleError {
    #[error("oracle exceeded its time budget")]
    Timeout,
    #[error("oracle stdout exceeded the {cap_bytes} byte cap")]
    OutputOverflow { cap_bytes: usize },
    #[error("oracle exited with status {code:?}: {stderr}")]
    RuntimeFailure {
        code: Option<i32>,
        stderr: String,
    },
    #[error("failed to spawn oracle interpreter: {0}")]
    SpawnFailure(String),
}

/// Errors raised by the Native Compiler (C2).
#[derive(Debug, Error, Clone)]
pub enum CompileError {
    #[error("no C++ toolchain detected on this platform")]
    ToolchainMissing,
    #[error("compilation failed:\n{diagnostics}")]
    CompileFailed { diagnostics: String },
    #[error("compilation exceeded its time budget")]
    Timeout,
}

/// Errors raised by the Generator Runner (C3).
#[derive(Debug, Error, Clone)]
pub enum GeneratorRunError {
    #[error("generator command `{command}` produced empty output")]
    EmptyGeneration { command: String },
    #[error("generator exited with status {code:?}: {stderr}")]
    RuntimeFailure { command: String, code: Option<i32>, stderr: String },
    #[error("generator exceeded its time budget")]
    Timeout { command: String },
}

/// Errors raised by the Code Extractor (C5).
#[derive(Debug, Error, Clone)]
pub enum ExtractionError {
    #[error("no source block found in LLM response using any known strategy")]
    ExtractionFailure,
    #[error("extracted source failed completeness check: {0:?}")]
    IncompleteSource(Vec<String>),
}

/// Errors raised by the Prompt Builder (C7).
#[derive(Debug, Error, Clone)]
pub enum PromptError {
    #[error("no template sections found for {id}/{version} under {base_dir}")]
    TemplateNotFound {
        id: String,
        version: String,
        base_dir: String,
    },
    #[error("failed to read prompt section {section} for {id}/{version}: {cause}")]
    SectionUnreadable {
        id: String,
        version: String,
        section: String,
        cause: String,
    },
}

/// Errors raised by the LLM Gateway (C6).
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("every configured backend failed; last error: {0}")]
    AllBackendsFailed(String),
    #[error("rate limit exhausted on all configured API keys")]
    RateLimitExhausted,
    #[error("backend returned a response that could not be parsed: {0}")]
    MalformedResponse(String),
}

/// Terminal failures the Supervisor (C11) can return from `synthesize_suite`.
/// Everything else in the taxonomy is recovered internally and becomes
/// feedback for the next iteration.
#[derive(Debug, Error, Clone)]
pub enum SynthesisError {
    #[error("no C++ toolchain available")]
    ToolchainMissing,

    #[error("every LLM backend failed: {0}")]
    AllBackendsFailed(String),

    #[error("no candidate inputs survived validation before the budget was exhausted")]
    NoCandidates,

    #[error("every surviving candidate broke the oracle")]
    OracleAllFailed,
}

impl From<LlmError> for SynthesisError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::AllBackendsFailed(msg) => SynthesisError::AllBackendsFailed(msg),
            LlmError::RateLimitExhausted => {
                SynthesisError::AllBackendsFailed("rate limit exhausted".to_string())
            }
            LlmError::MalformedResponse(msg) => SynthesisError::AllBackendsFailed(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_error_messages_are_human_readable() {
        let e = OracleError::RuntimeFailure {
            code: Some(1),
            stderr: "boom".to_string(),
        };
        assert!(e.to_string().contains("boom"));
    }

    #[test]
    fn llm_error_converts_to_terminal_synthesis_error() {
        let e: SynthesisError = LlmError::RateLimitExhausted.into();
        assert!(matches!(e, SynthesisError::AllBackendsFailed(_)));
    }
}
