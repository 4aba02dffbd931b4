//! C4 — Validator Runner.
//!
//! Pipes a candidate input into a compiled validator's stdin and interprets
//! its exit status: `0` means valid, any other ordinary status means
//! rejected with a diagnostic line, and a crash exit code (segfault / access
//! violation) is tagged distinctly so the Supervisor can treat it as a
//! program defect rather than routine rejection feedback.

use crate::config::Timeouts;
use crate::platform::{self, ExitClassification};
use crate::types::ValidationResult;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

fn error_line_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)line\s+(\d+)").unwrap())
}

#[async_trait]
pub trait ValidatorRunner: Send + Sync {
    async fn validate_batch(&self, executable: &Path, candidates: &[String]) -> Vec<ValidationResult>;
}

pub struct SubprocessValidatorRunner {
    timeouts: Timeouts,
}

impl SubprocessValidatorRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

impl Default for SubprocessValidatorRunner {
    fn default() -> Self {
        Self::new(Timeouts::default())
    }
}

#[async_trait]
impl ValidatorRunner for SubprocessValidatorRunner {
    async fn validate_batch(&self, executable: &Path, candidates: &[String]) -> Vec<ValidationResult> {
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            results.push(self.validate_one(executable, candidate).await);
        }
        results
    }
}

impl SubprocessValidatorRunner {
    async fn validate_one(&self, executable: &Path, candidate: &str) -> ValidationResult {
        let mut child = match Command::new(executable)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return ValidationResult::Rejected {
                    error_line: None,
                    error_message: format!("failed to spawn validator: {}", e),
                }
            }
        };

        if let Some(mut stdin) = child.stdin.take() {
            let _ = stdin.write_all(candidate.as_bytes()).await;
        }

        let outcome = match timeout(self.timeouts.validator_run, child.wait_with_output()).await {
            Err(_) => {
                return ValidationResult::Rejected {
                    error_line: None,
                    error_message: "validator exceeded its time budget".to_string(),
                }
            }
            Ok(Err(e)) => {
                return ValidationResult::Rejected {
                    error_line: None,
                    error_message: format!("failed to wait on validator: {}", e),
                }
            }
            Ok(Ok(o)) => o,
        };

        match platform::classify_exit_status(outcome.status.code()) {
            ExitClassification::Success => ValidationResult::Valid,
            ExitClassification::Crashed(reason) => ValidationResult::Crashed {
                signal_or_code: reason,
            },
            ExitClassification::Rejected(_) => {
                let stderr = String::from_utf8_lossy(&outcome.stderr);
                let error_line = error_line_regex()
                    .captures(&stderr)
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok());
                let error_message = stderr.trim().to_string();
                let error_message = if error_message.is_empty() {
                    "validator rejected the input without a diagnostic message".to_string()
                } else {
                    error_message
                };
                ValidationResult::Rejected {
                    error_line,
                    error_message,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_line_number_from_testlib_style_message() {
        let stderr = "FAIL 3rd lines differ - expected: 'n <= 100', found at line 4";
        let caps = error_line_regex().captures(stderr);
        assert!(caps.is_some());
        assert_eq!(&caps.unwrap()[1], "4");
    }

    #[test]
    fn no_line_number_present_is_handled_gracefully() {
        let stderr = "n is too large";
        assert!(error_line_regex().captures(stderr).is_none());
    }
}
