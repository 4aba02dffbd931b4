//! C11 — Supervisor, the heart of the system.
//!
//! Orchestrates the full Generator-Validator supervision loop: compile,
//! validate worked examples, generate candidates, filter them, run the
//! oracle, enforce the diversity floor, and decide when to revise an agent's
//! source versus proceed. Every blocking step (compile, run generator, run
//! validator, run oracle, call the LLM) is awaited sequentially — within one
//! invocation no two child processes run concurrently (spec.md §5).
//!
//! Grounded in `generator_validator_supervision_service.py`'s main loop and,
//! for the overall "own state, drive collaborators, log each step" shape, in
//! `ccos::orchestrator::Orchestrator::execute_plan`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use crate::agents::{generator_agent, validator_agent};
use crate::compiler::{summarize_diagnostics, CompileOutcome, NativeCompiler};
use crate::config::{SynthesisOptions, CANDIDATE_OVERSAMPLE_FACTOR, MINIMAL_VALIDATOR_FORCE_ITERATIONS};
use crate::error::{CompileError, SynthesisError};
use crate::format_inference;
use crate::generator_runner::GeneratorRunner;
use crate::llm::LlmGateway;
use crate::oracle::OracleRunner;
use crate::prompts::{PromptManager, PromptStore};
use crate::types::{FormatSchema, LoopState, ProblemBundle, ProgramRole, TestCase, ValidationResult};
use crate::validator_runner::ValidatorRunner;

const GENERATOR_BIN_NAME: &str = "gen";
const VALIDATOR_BIN_NAME: &str = "val";

/// Sentinel carried in a [`CompileOutcome`]'s diagnostics to signal that the
/// underlying failure was `ToolchainMissing`, which the Supervisor treats as
/// terminal rather than feeding back to an agent for revision.
const TOOLCHAIN_MISSING_SENTINEL: &str = "__TOOLCHAIN_MISSING__";

/// Everything the Supervisor needs injected (spec.md §9 DESIGN NOTES: agents
/// are constructed with injectable collaborators so the loop is testable
/// without a real toolchain or network access).
pub struct Supervisor<S: PromptStore> {
    compiler: Arc<dyn NativeCompiler>,
    generator_runner: Arc<dyn GeneratorRunner>,
    validator_runner: Arc<dyn ValidatorRunner>,
    oracle_runner: Arc<dyn OracleRunner>,
    gateway: Arc<dyn LlmGateway>,
    prompts: Arc<PromptManager<S>>,
}

impl<S: PromptStore> Supervisor<S> {
    pub fn new(
        compiler: Arc<dyn NativeCompiler>,
        generator_runner: Arc<dyn GeneratorRunner>,
        validator_runner: Arc<dyn ValidatorRunner>,
        oracle_runner: Arc<dyn OracleRunner>,
        gateway: Arc<dyn LlmGateway>,
        prompts: Arc<PromptManager<S>>,
    ) -> Self {
        Self {
            compiler,
            generator_runner,
            validator_runner,
            oracle_runner,
            gateway,
            prompts,
        }
    }

    /// `synthesize_suite(bundle, target_count) -> { suite, iterations,
    /// generator_source, validator_source }` (spec.md §4.C11).
    #[instrument(skip_all, fields(target_count = bundle.target_count))]
    pub async fn synthesize_suite(
        &self,
        bundle: &ProblemBundle,
        options: &SynthesisOptions,
    ) -> Result<crate::types::SynthesisResult, SynthesisError> {
        // Boundary: target_count = 0 returns an empty suite without
        // invoking any agent (spec.md §8).
        if bundle.target_count == 0 {
            return Ok(crate::types::SynthesisResult {
                suite: Vec::new(),
                iterations: 0,
                generator_source: None,
                validator_source: None,
                partial: false,
                partial_reason: None,
            });
        }

        let format_schema = if options.use_format_inference {
            format_inference::infer_format(
                self.gateway.as_ref(),
                self.prompts.as_ref(),
                &bundle.statement,
                bundle.examples.first().map(|e| e.input.as_str()),
                bundle.constraints.as_deref(),
            )
            .await
        } else {
            FormatSchema::fallback()
        };

        let mut state = LoopState::default();
        let start = Instant::now();

        // Separate feedback logs (SPEC_FULL.md §3): the generator is revised
        // on candidate-filtering rejections and diversity violations; the
        // validator is revised on worked-example sanity failures, tracked in
        // `state.last_validation_errors` (spec.md §3's LoopState).
        let mut generator_feedback: Vec<String> = Vec::new();
        let mut sample_rejection_streak: u32 = 0;
        let mut generator_exe: Option<std::path::PathBuf> = None;
        let mut validator_exe: Option<std::path::PathBuf> = None;

        loop {
            // --- Step 1: budget check ---
            if start.elapsed() >= options.wall_clock || state.iteration >= options.iteration_cap {
                warn!(
                    iteration = state.iteration,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "budget exhausted, returning accumulated candidates"
                );
                return match self
                    .finalize(
                        bundle,
                        &state.accumulated_candidates,
                        state.iteration,
                        state.generator_source.clone(),
                        state.validator_source.clone(),
                        true,
                        Some("BudgetExhausted".to_string()),
                    )
                    .await?
                {
                    FinalizeOutcome::Suite(result) => Ok(result),
                    // No iterations remain to act on feedback; the budget
                    // path truncates to a single entry instead, which
                    // trivially satisfies the diversity floor (spec.md §8
                    // property 4 only applies when len >= 2).
                    FinalizeOutcome::DiversityViolation(_) => self
                        .finalize(
                            bundle,
                            &state.accumulated_candidates[..1],
                            state.iteration,
                            state.generator_source.clone(),
                            state.validator_source.clone(),
                            true,
                            Some("DiversityFloorViolation".to_string()),
                        )
                        .await
                        .map(|outcome| match outcome {
                            FinalizeOutcome::Suite(result) => result,
                            FinalizeOutcome::DiversityViolation(_) => unreachable!(
                                "a single-candidate batch can never violate the diversity floor"
                            ),
                        }),
                };
            }
            state.iteration += 1;
            info!(
                iteration = state.iteration,
                accumulated = state.accumulated_candidates.len(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "starting supervision iteration"
            );

            // --- Steps 2-3: generator synthesis + compile with auto-fix ---
            if state.generator_source.is_none() || !generator_feedback.is_empty() {
                let synthesis = if let Some(prev) = &state.generator_source {
                    generator_agent::revise_generator_program(
                        self.gateway.as_ref(),
                        self.prompts.as_ref(),
                        prev,
                        &generator_feedback.join("\n"),
                    )
                    .await
                } else {
                    generator_agent::generate_generator_program(
                        self.gateway.as_ref(),
                        self.prompts.as_ref(),
                        &bundle.statement,
                        &format_schema,
                        bundle.target_count,
                    )
                    .await
                };
                generator_feedback.clear();

                let program = match synthesis {
                    Ok(program) => program,
                    Err(e) => {
                        warn!(error = ?e, "generator agent could not produce a usable program, skipping iteration");
                        continue;
                    }
                };
                state.generator_commands = program.commands;

                let (outcome, final_source) = self
                    .compile_with_auto_fix(
                        ProgramRole::Generator,
                        GENERATOR_BIN_NAME,
                        program.source,
                        options.compile_fix_attempts,
                        |src, diagnostics| async move {
                            generator_agent::revise_generator_program(
                                self.gateway.as_ref(),
                                self.prompts.as_ref(),
                                &src,
                                &diagnostics,
                            )
                            .await
                            .ok()
                            .map(|program| program.source)
                        },
                    )
                    .await;

                // A revision made inside the auto-fix loop may have changed
                // the command list too; re-derive it defensively so step 7
                // never runs commands against flags the final source
                // doesn't declare.
                state.generator_source = Some(final_source.clone());
                if let Some(refreshed) = extract_commands_if_changed(&final_source) {
                    state.generator_commands = refreshed;
                }

                if !outcome.success {
                    if outcome.diagnostics == TOOLCHAIN_MISSING_SENTINEL {
                        return Err(SynthesisError::ToolchainMissing);
                    }
                    state.last_compile_errors = Some(outcome.diagnostics.clone());
                    generator_feedback.push(format!(
                        "compilation failed after {} attempts:\n{}",
                        options.compile_fix_attempts,
                        summarize_diagnostics(&outcome.diagnostics)
                    ));
                    continue;
                }
                generator_exe = outcome.executable_path;
            }

            // --- Steps 4-5: validator synthesis + compile, with a
            // minimal-validator fallback after one failed attempt ---
            if state.validator_source.is_none() || !state.last_validation_errors.is_empty() {
                let synthesis = if let Some(prev) = &state.validator_source {
                    validator_agent::revise_validator_program(
                        self.gateway.as_ref(),
                        self.prompts.as_ref(),
                        prev,
                        &state.last_validation_errors.join("\n"),
                    )
                    .await
                } else {
                    validator_agent::generate_validator_program(
                        self.gateway.as_ref(),
                        self.prompts.as_ref(),
                        &bundle.statement,
                        &format_schema,
                    )
                    .await
                };
                state.last_validation_errors.clear();

                let sample_inputs: Vec<String> = bundle.examples.iter().map(|e| e.input.clone()).collect();
                let source = match synthesis {
                    Ok(program) => program.source,
                    Err(e) => {
                        warn!(error = ?e, "validator agent could not produce a usable program, falling back to minimal validator");
                        validator_agent::generate_minimal_validator_code(&sample_inputs).source
                    }
                };

                // Step 5: a single compile attempt through the shared
                // auto-fix routine (no revise callback — the validator's
                // fallback on failure is the minimal validator, not K more
                // LLM revision rounds, per spec.md §4.C11 step 5).
                let (first_outcome, attempted_source) = self
                    .compile_with_auto_fix(
                        ProgramRole::Validator,
                        VALIDATOR_BIN_NAME,
                        source,
                        1,
                        |_src, _diag| async { None },
                    )
                    .await;

                let (outcome, final_source) = if first_outcome.success {
                    (first_outcome, attempted_source)
                } else if first_outcome.diagnostics == TOOLCHAIN_MISSING_SENTINEL {
                    return Err(SynthesisError::ToolchainMissing);
                } else {
                    warn!("validator compile failed on first attempt, falling back to the minimal validator");
                    let minimal = validator_agent::generate_minimal_validator_code(&sample_inputs).source;
                    self.compile_with_auto_fix(
                        ProgramRole::Validator,
                        VALIDATOR_BIN_NAME,
                        minimal,
                        1,
                        |_src, _diag| async { None },
                    )
                    .await
                };

                state.validator_source = Some(final_source);
                if !outcome.success {
                    if outcome.diagnostics == TOOLCHAIN_MISSING_SENTINEL {
                        return Err(SynthesisError::ToolchainMissing);
                    }
                    state.last_compile_errors = Some(outcome.diagnostics.clone());
                    continue;
                }
                validator_exe = outcome.executable_path;
            }

            let (Some(gen_exe), Some(val_exe_ref)) = (&generator_exe, &validator_exe) else {
                continue;
            };

            // --- Step 6: validator sanity check on worked examples ---
            if !bundle.examples.is_empty() {
                let sample_inputs: Vec<String> = bundle.examples.iter().map(|e| e.input.clone()).collect();
                let results = self.validator_runner.validate_batch(val_exe_ref, &sample_inputs).await;

                let mut any_crash = false;
                let mut any_rejected = false;
                state.last_validation_errors.clear();
                for (example, result) in bundle.examples.iter().zip(results.iter()) {
                    match result {
                        ValidationResult::Valid => {}
                        ValidationResult::Crashed { signal_or_code } => {
                            any_crash = true;
                            state.last_validation_errors.push(format!(
                                "validator crashed ({}) on worked example input:\n{}",
                                signal_or_code, example.input
                            ));
                        }
                        ValidationResult::Rejected { error_line, error_message } => {
                            any_rejected = true;
                            state.last_validation_errors.push(sample_rejection_diagnostics(
                                &example.input,
                                *error_line,
                                error_message,
                            ));
                        }
                    }
                }

                sample_rejection_streak = if any_crash || any_rejected { sample_rejection_streak + 1 } else { 0 };

                // A crash escalates to the minimal validator sooner than the
                // ordinary 3-iteration threshold (SPEC_FULL.md §3 item 5).
                if any_crash || sample_rejection_streak >= MINIMAL_VALIDATOR_FORCE_ITERATIONS {
                    warn!(
                        streak = sample_rejection_streak,
                        crashed = any_crash,
                        "forcing the minimal validator after persistent sample rejection"
                    );
                    let minimal = validator_agent::generate_minimal_validator_code(&sample_inputs).source;
                    match self.compiler.compile(&minimal, VALIDATOR_BIN_NAME, ProgramRole::Validator).await {
                        Ok(o) if o.success => {
                            state.validator_source = Some(minimal);
                            validator_exe = o.executable_path;
                            state.last_validation_errors.clear();
                            sample_rejection_streak = 0;
                        }
                        Err(CompileError::ToolchainMissing) => return Err(SynthesisError::ToolchainMissing),
                        _ => {
                            warn!("minimal validator also failed to compile; continuing with the current validator");
                        }
                    }
                }
            }

            let gen_exe = gen_exe.clone();
            let val_exe = match &validator_exe {
                Some(p) => p.clone(),
                None => continue,
            };

            // --- Step 7: candidate generation ---
            let max_candidates = bundle.target_count * CANDIDATE_OVERSAMPLE_FACTOR;
            let generation_outcomes = self
                .generator_runner
                .run_batch(&gen_exe, &state.generator_commands, max_candidates)
                .await;
            let generated: Vec<String> = generation_outcomes.iter().filter_map(|o| o.input.clone()).collect();

            // --- Step 8: candidate filtering, with a one-shot normalization
            // retry restricted to EOLN/Expected diagnostics (SPEC_FULL.md
            // §4's "safer policy" decision). ---
            let validations = self.validator_runner.validate_batch(&val_exe, &generated).await;
            let mut any_rejected_this_iteration = false;

            for (candidate, result) in generated.iter().zip(validations.iter()) {
                match result {
                    ValidationResult::Valid => {
                        state.accumulated_candidates.push(candidate.clone());
                    }
                    ValidationResult::Rejected { error_message, .. } => {
                        any_rejected_this_iteration = true;
                        if mentions_eoln(error_message) {
                            if let Some(retried) = self.retry_normalized(&val_exe, candidate).await {
                                state.accumulated_candidates.push(retried);
                                continue;
                            }
                        }
                        generator_feedback.push(format!(
                            "candidate rejected by validator: {}\ninput was:\n{}",
                            error_message, candidate
                        ));
                    }
                    ValidationResult::Crashed { signal_or_code } => {
                        any_rejected_this_iteration = true;
                        generator_feedback.push(format!(
                            "validator crashed ({}) on generated candidate:\n{}",
                            signal_or_code, candidate
                        ));
                    }
                }
            }

            // --- Step 9: progress decision ---
            if state.accumulated_candidates.len() >= bundle.target_count {
                match self
                    .finalize(
                        bundle,
                        &state.accumulated_candidates,
                        state.iteration,
                        state.generator_source.clone(),
                        state.validator_source.clone(),
                        false,
                        None,
                    )
                    .await?
                {
                    FinalizeOutcome::Suite(result) => return Ok(result),
                    FinalizeOutcome::DiversityViolation(feedback) => {
                        // Step 11: reject the whole accumulator and return to
                        // generator revision rather than terminating
                        // (SPEC_FULL.md §3 item 6) — only the terminal budget
                        // path below is allowed to keep a degenerate suite.
                        state.accumulated_candidates.clear();
                        generator_feedback.push(feedback);
                        continue;
                    }
                }
            }

            if !any_rejected_this_iteration {
                generator_feedback.clear();
            }
            // Otherwise loop with the updated generator feedback already
            // queued above; next iteration's generator step will revise.
        }
    }

    /// The compile-with-auto-fix routine (SPEC_FULL.md §3 item 1): compile,
    /// and on an ordinary (non-toolchain) failure feed summarized
    /// diagnostics back into `revise` up to `max_attempts` times. Both the
    /// generator and validator compile paths route through this.
    async fn compile_with_auto_fix<F, Fut>(
        &self,
        role: ProgramRole,
        target_name: &str,
        initial_source: String,
        max_attempts: u32,
        mut revise: F,
    ) -> (CompileOutcome, String)
    where
        F: FnMut(String, String) -> Fut,
        Fut: Future<Output = Option<String>>,
    {
        let mut source = initial_source;
        let mut last_outcome = CompileOutcome {
            success: false,
            executable_path: None,
            diagnostics: "no compile attempts made".to_string(),
        };

        for attempt in 1..=max_attempts.max(1) {
            let attempt_outcome = match self.compiler.compile(&source, target_name, role).await {
                Ok(outcome) => outcome,
                Err(CompileError::ToolchainMissing) => {
                    return (
                        CompileOutcome {
                            success: false,
                            executable_path: None,
                            diagnostics: TOOLCHAIN_MISSING_SENTINEL.to_string(),
                        },
                        source,
                    )
                }
                Err(CompileError::Timeout) => CompileOutcome {
                    success: false,
                    executable_path: None,
                    diagnostics: "compilation exceeded its time budget".to_string(),
                },
                Err(CompileError::CompileFailed { diagnostics }) => {
                    CompileOutcome { success: false, executable_path: None, diagnostics }
                }
            };

            if attempt_outcome.success {
                return (attempt_outcome, source);
            }
            last_outcome = attempt_outcome;

            if attempt < max_attempts.max(1) {
                let diagnostics = summarize_diagnostics(&last_outcome.diagnostics);
                match revise(source.clone(), diagnostics).await {
                    Some(new_source) => source = new_source,
                    None => break,
                }
            }
        }
        (last_outcome, source)
    }

    /// One-shot normalization retry (step 8): toggle trailing-newline
    /// presence on a rejected candidate and re-validate it.
    async fn retry_normalized(&self, validator_exe: &std::path::Path, candidate: &str) -> Option<String> {
        let toggled = if candidate.ends_with('\n') {
            candidate.trim_end_matches('\n').to_string()
        } else {
            format!("{}\n", candidate)
        };
        let result = self
            .validator_runner
            .validate_batch(validator_exe, std::slice::from_ref(&toggled))
            .await;
        match result.first() {
            Some(ValidationResult::Valid) => Some(toggled),
            _ => None,
        }
    }

    /// Steps 10-12: run the oracle over the accumulated candidates (in
    /// generator-insertion order, up to `target_count`), enforce the
    /// diversity floor, and assemble the final result.
    #[allow(clippy::too_many_arguments)]
    async fn finalize(
        &self,
        bundle: &ProblemBundle,
        accumulated: &[String],
        iterations: u32,
        generator_source: Option<String>,
        validator_source: Option<String>,
        partial: bool,
        partial_reason: Option<String>,
    ) -> Result<FinalizeOutcome, SynthesisError> {
        if accumulated.is_empty() {
            return Err(SynthesisError::NoCandidates);
        }

        let mut suite = Vec::new();
        for candidate in accumulated.iter().take(bundle.target_count) {
            let outcome = self
                .oracle_runner
                .run(&bundle.oracle_source, &bundle.oracle_language.0, candidate)
                .await;
            if outcome.success {
                suite.push(TestCase {
                    input: candidate.clone(),
                    output: normalize_output(&outcome.stdout),
                });
            } else {
                warn!(error = ?outcome.error, "oracle run failed on a surviving candidate, dropping it");
            }
        }

        if suite.is_empty() {
            return Err(SynthesisError::OracleAllFailed);
        }

        // Step 11: diversity floor. A single distinct output across >= 2
        // entries rejects the whole batch and hands feedback back to the
        // caller for generator revision (spec.md §4.C11 step 11 and the
        // ERROR HANDLING DESIGN taxonomy: DiversityFloorViolation is
        // recovered as "forced generator revision", never a terminal error).
        // A low but non-degenerate ratio is accepted with a warning.
        if suite.len() >= 2 {
            let distinct: std::collections::HashSet<&str> = suite.iter().map(|c| c.output.trim_end()).collect();
            if distinct.len() == 1 {
                let repeated = suite[0].output.trim_end().to_string();
                warn!(repeated_output = %repeated, "diversity floor violated, rejecting accumulator");
                return Ok(FinalizeOutcome::DiversityViolation(format!(
                    "insufficient diversity: all {} candidates produced the same output {:?}; \
                     cover more of the input space (e.g. both branches of any case split)",
                    suite.len(),
                    repeated
                )));
            }
            let ratio = distinct.len() as f64 / suite.len() as f64;
            if ratio < crate::config::DIVERSITY_WARN_THRESHOLD {
                warn!(ratio, "low output diversity, accepting suite with a warning");
            }
        }

        let is_partial = partial || suite.len() < bundle.target_count;
        Ok(FinalizeOutcome::Suite(crate::types::SynthesisResult {
            suite,
            iterations,
            generator_source,
            validator_source,
            partial: is_partial,
            partial_reason: if is_partial { partial_reason.or(Some("PartialSuite".to_string())) } else { None },
        }))
    }
}

/// Outcome of [`Supervisor::finalize`]: either a completed (possibly partial)
/// result, or a diversity-floor violation carrying the feedback the caller
/// should feed back into generator revision before looping again.
enum FinalizeOutcome {
    Suite(crate::types::SynthesisResult),
    DiversityViolation(String),
}

/// Whether a validator diagnostic plausibly indicates a newline/EOF mismatch
/// rather than a genuine semantic rejection — gates the normalization retry
/// (SPEC_FULL.md §4's "safer policy" decision).
fn mentions_eoln(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("eoln") || lower.contains("expected")
}

/// Per-sample diagnostic detail fed to `ValidatorAgent::revise` on a sanity
/// failure (SPEC_FULL.md §3 item 3): literal input, escaped representation,
/// line count, and per-line contents, alongside the validator's own message.
fn sample_rejection_diagnostics(input: &str, error_line: Option<u32>, error_message: &str) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let mut detail = String::new();
    detail.push_str("worked example rejected by validator:\n");
    detail.push_str(&format!("  message: {}\n", error_message));
    if let Some(line) = error_line {
        detail.push_str(&format!("  reported error line: {}\n", line));
    }
    detail.push_str(&format!("  literal input: {:?}\n", input));
    detail.push_str(&format!("  escaped: {:?}\n", input.escape_debug().to_string()));
    detail.push_str(&format!("  line count: {}\n", lines.len()));
    for (i, line) in lines.iter().enumerate() {
        detail.push_str(&format!("  line {}: {:?}\n", i + 1, line));
    }
    detail
}

/// Normalize oracle stdout the same way candidates are normalized: strip
/// trailing whitespace, append exactly one newline (TestCase.output is
/// newline-normalized per spec.md §3).
fn normalize_output(raw: &str) -> String {
    format!("{}\n", raw.trim_end())
}

/// Re-derive a generator's command list from a (possibly LLM-revised)
/// source body if it still declares a `/* COMMANDS: ... */` block or
/// `./gen` lines; returns `None` when nothing new is found, in which case
/// the caller keeps whatever command list it already had.
fn extract_commands_if_changed(source: &str) -> Option<Vec<crate::types::GeneratorCommand>> {
    let commands = crate::extractor::extract_commands(source);
    if commands.is_empty() {
        None
    } else {
        Some(commands.into_iter().map(crate::types::GeneratorCommand).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::StubCompiler;
    use crate::error::LlmError;
    use crate::generator_runner::{GeneratorRunOutcome, GeneratorRunner};
    use crate::llm::{GenerationRequest, LlmGateway};
    use crate::oracle::{OracleOutcome, OracleRunner};
    use crate::prompts::{FilePromptStore, PromptManager};
    use crate::types::{GeneratorCommand, OracleLanguage, WorkedExample};
    use crate::validator_runner::ValidatorRunner;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};

    struct StubGeneratorRunner;
    #[async_trait]
    impl GeneratorRunner for StubGeneratorRunner {
        async fn run_batch(
            &self,
            _executable: &Path,
            commands: &[GeneratorCommand],
            max_candidates: usize,
        ) -> Vec<GeneratorRunOutcome> {
            commands
                .iter()
                .take(max_candidates)
                .enumerate()
                .map(|(i, _)| GeneratorRunOutcome {
                    success: true,
                    input: Some(format!("{}\n", i + 1)),
                    error: None,
                    elapsed_ms: 0,
                })
                .collect()
        }
    }

    struct AcceptAllValidatorRunner;
    #[async_trait]
    impl ValidatorRunner for AcceptAllValidatorRunner {
        async fn validate_batch(&self, _executable: &Path, candidates: &[String]) -> Vec<ValidationResult> {
            candidates.iter().map(|_| ValidationResult::Valid).collect()
        }
    }

    struct EchoOracleRunner;
    #[async_trait]
    impl OracleRunner for EchoOracleRunner {
        async fn run(&self, _source: &str, _language: &str, stdin: &str) -> OracleOutcome {
            OracleOutcome {
                success: true,
                stdout: format!("out-{}", stdin.trim()),
                stderr: String::new(),
                elapsed_ms: 0,
                error: None,
            }
        }
    }

    struct ConstantOracleRunner;
    #[async_trait]
    impl OracleRunner for ConstantOracleRunner {
        async fn run(&self, _source: &str, _language: &str, _stdin: &str) -> OracleOutcome {
            OracleOutcome {
                success: true,
                stdout: "YES".to_string(),
                stderr: String::new(),
                elapsed_ms: 0,
                error: None,
            }
        }
    }

    /// Mirrors spec.md scenario S4: the first full pass over the accumulator
    /// is degenerate (constant output), forcing a diversity-floor violation;
    /// a later pass (after the accumulator is cleared and re-filled) becomes
    /// diverse, so the suite eventually succeeds only if the Supervisor
    /// actually re-entered generator revision rather than terminating.
    struct DiverseAfterFirstPassOracleRunner {
        calls: std::sync::atomic::AtomicUsize,
    }
    #[async_trait]
    impl OracleRunner for DiverseAfterFirstPassOracleRunner {
        async fn run(&self, _source: &str, _language: &str, stdin: &str) -> OracleOutcome {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let stdout = if call < 3 {
                "YES".to_string()
            } else {
                format!("out-{}", stdin.trim())
            };
            OracleOutcome {
                success: true,
                stdout,
                stderr: String::new(),
                elapsed_ms: 0,
                error: None,
            }
        }
    }

    struct AlwaysFailsOracleRunner;
    #[async_trait]
    impl OracleRunner for AlwaysFailsOracleRunner {
        async fn run(&self, _source: &str, _language: &str, _stdin: &str) -> OracleOutcome {
            OracleOutcome {
                success: false,
                stdout: String::new(),
                stderr: "boom".to_string(),
                elapsed_ms: 0,
                error: Some(crate::error::OracleError::RuntimeFailure {
                    code: Some(1),
                    stderr: "boom".to_string(),
                }),
            }
        }
    }

    /// Stub LLM backend that always returns a fixed, complete generator or
    /// validator source so the loop can run end to end without a network.
    struct StubGateway;
    #[async_trait]
    impl LlmGateway for StubGateway {
        async fn generate(&self, request: GenerationRequest) -> Result<String, LlmError> {
            if request.prompt.contains("registerValidation") || request.prompt.contains("validator") {
                Ok(stub_validator_source())
            } else {
                Ok(stub_generator_source())
            }
        }
    }

    struct AlwaysFailsGateway;
    #[async_trait]
    impl LlmGateway for AlwaysFailsGateway {
        async fn generate(&self, _request: GenerationRequest) -> Result<String, LlmError> {
            Err(LlmError::AllBackendsFailed("no backend configured".to_string()))
        }
    }

    struct AlwaysMissingCompiler {
        work_dir: PathBuf,
    }
    #[async_trait]
    impl NativeCompiler for AlwaysMissingCompiler {
        async fn compile(
            &self,
            _source: &str,
            _target_name: &str,
            _role: ProgramRole,
        ) -> Result<CompileOutcome, CompileError> {
            let _ = &self.work_dir;
            Err(CompileError::ToolchainMissing)
        }
    }

    fn stub_generator_source() -> String {
        r#"```cpp
#include "testlib.h"
int main(int argc, char* argv[]) {
    registerGen(argc, argv, 1);
    printf("1\n");
    return 0;
}
```
/* COMMANDS:
./gen -n 1
./gen -n 2
./gen -n 3
./gen -n 4
./gen -n 5
*/"#
            .to_string()
    }

    fn stub_validator_source() -> String {
        r#"```cpp
#include "testlib.h"
int main(int argc, char* argv[]) {
    registerValidation(argc, argv);
    inf.readInt();
    inf.readEoln();
    inf.readEof();
    return 0;
}
```"#
            .to_string()
    }

    fn test_prompts() -> Arc<PromptManager<FilePromptStore>> {
        Arc::new(PromptManager::new(FilePromptStore::new("assets/prompts/testsynth")))
    }

    fn sum_bundle() -> ProblemBundle {
        ProblemBundle {
            statement: "read two integers a,b and print their sum".to_string(),
            examples: vec![WorkedExample {
                input: "2 3\n".to_string(),
                output: "5\n".to_string(),
            }],
            oracle_source: "a,b=map(int,input().split());print(a+b)".to_string(),
            oracle_language: OracleLanguage::python(),
            constraints: None,
            target_count: 3,
        }
    }

    #[tokio::test]
    async fn target_count_zero_returns_empty_suite_without_invoking_agents() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::always_fails(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(EchoOracleRunner),
            Arc::new(AlwaysFailsGateway),
            test_prompts(),
        );
        let mut bundle = sum_bundle();
        bundle.target_count = 0;
        let options = SynthesisOptions::default();
        let result = supervisor.synthesize_suite(&bundle, &options).await.unwrap();
        assert!(result.suite.is_empty());
        assert_eq!(result.iterations, 0);
        assert!(!result.partial);
    }

    #[tokio::test]
    async fn toolchain_missing_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(AlwaysMissingCompiler { work_dir: dir.path().to_path_buf() }),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(EchoOracleRunner),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let bundle = sum_bundle();
        let options = SynthesisOptions::default();
        let result = supervisor.synthesize_suite(&bundle, &options).await;
        assert!(matches!(result, Err(SynthesisError::ToolchainMissing)));
    }

    #[tokio::test]
    async fn happy_path_reaches_target_count_with_diverse_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::new(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(EchoOracleRunner),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let bundle = sum_bundle();
        let options = SynthesisOptions::default();
        let result = supervisor.synthesize_suite(&bundle, &options).await.unwrap();
        assert_eq!(result.suite.len(), bundle.target_count);
        assert!(!result.partial);
        let distinct: std::collections::HashSet<_> = result.suite.iter().map(|c| c.output.clone()).collect();
        assert!(distinct.len() >= 2);
    }

    #[tokio::test]
    async fn diversity_floor_violation_is_reported_as_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::new(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(ConstantOracleRunner),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let mut bundle = sum_bundle();
        bundle.target_count = 3;
        let mut options = SynthesisOptions::default();
        options.iteration_cap = 1;
        let result = supervisor.synthesize_suite(&bundle, &options).await;
        assert!(matches!(result, Err(SynthesisError::NoCandidates)));
    }

    #[tokio::test]
    async fn diversity_violation_clears_accumulator_and_reenters_generator_revision() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::new(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(DiverseAfterFirstPassOracleRunner { calls: Default::default() }),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let mut bundle = sum_bundle();
        bundle.target_count = 3;
        let mut options = SynthesisOptions::default();
        options.iteration_cap = 5;
        let result = supervisor.synthesize_suite(&bundle, &options).await.unwrap();
        assert_eq!(result.suite.len(), 3);
        assert!(
            result.iterations >= 2,
            "expected the loop to re-enter generator revision after a diversity violation, got {} iteration(s)",
            result.iterations
        );
        let distinct: std::collections::HashSet<_> = result.suite.iter().map(|c| c.output.clone()).collect();
        assert!(distinct.len() >= 2);
    }

    #[tokio::test]
    async fn oracle_failing_on_every_candidate_is_terminal() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::new(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(AlwaysFailsOracleRunner),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let mut bundle = sum_bundle();
        bundle.target_count = 2;
        let mut options = SynthesisOptions::default();
        options.iteration_cap = 1;
        let result = supervisor.synthesize_suite(&bundle, &options).await;
        assert!(matches!(result, Err(SynthesisError::OracleAllFailed)));
    }

    #[tokio::test]
    async fn budget_exhaustion_without_any_candidate_is_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        let supervisor = Supervisor::new(
            Arc::new(StubCompiler::always_fails(dir.path().to_path_buf())),
            Arc::new(StubGeneratorRunner),
            Arc::new(AcceptAllValidatorRunner),
            Arc::new(EchoOracleRunner),
            Arc::new(StubGateway),
            test_prompts(),
        );
        let bundle = sum_bundle();
        let mut options = SynthesisOptions::default();
        options.iteration_cap = 2;
        options.compile_fix_attempts = 1;
        let result = supervisor.synthesize_suite(&bundle, &options).await;
        assert!(matches!(result, Err(SynthesisError::NoCandidates)));
    }

    #[test]
    fn mentions_eoln_matches_case_insensitively() {
        assert!(mentions_eoln("EOLN expected but EOF found"));
        assert!(mentions_eoln("Expected integer"));
        assert!(!mentions_eoln("n is out of range"));
    }

    #[test]
    fn sample_diagnostics_include_per_line_content() {
        let detail = sample_rejection_diagnostics("3\n1 2 3\n", Some(2), "too many tokens");
        assert!(detail.contains("line 1: \"3\""));
        assert!(detail.contains("line 2: \"1 2 3\""));
        assert!(detail.contains("too many tokens"));
    }
}
