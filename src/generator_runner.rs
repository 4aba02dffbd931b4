//! C3 — Generator Runner.
//!
//! Invokes a compiled generator with CLI arguments and captures stdout as a
//! candidate input, normalizing to exactly one trailing newline. Batch
//! execution is capped at a maximum number of produced candidates.

use crate::config::Timeouts;
use crate::error::GeneratorRunError;
use crate::types::{Candidate, GeneratorCommand};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct GeneratorRunOutcome {
    pub success: bool,
    pub input: Option<String>,
    pub error: Option<GeneratorRunError>,
    pub elapsed_ms: u128,
}

#[async_trait]
pub trait GeneratorRunner: Send + Sync {
    async fn run_batch(
        &self,
        executable: &Path,
        commands: &[GeneratorCommand],
        max_candidates: usize,
    ) -> Vec<GeneratorRunOutcome>;
}

/// Deterministic seed derived from a command string: a stable hash so that
/// re-running the same command line reproduces the same candidate
/// byte-for-byte (TESTABLE PROPERTIES, "Round-trip / idempotence").
pub fn stable_seed(command: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(command.as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

pub struct SubprocessGeneratorRunner {
    timeouts: Timeouts,
}

impl SubprocessGeneratorRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

impl Default for SubprocessGeneratorRunner {
    fn default() -> Self {
        Self::new(Timeouts::default())
    }
}

#[async_trait]
impl GeneratorRunner for SubprocessGeneratorRunner {
    async fn run_batch(
        &self,
        executable: &Path,
        commands: &[GeneratorCommand],
        max_candidates: usize,
    ) -> Vec<GeneratorRunOutcome> {
        let mut results = Vec::with_capacity(commands.len().min(max_candidates));
        for command in commands.iter().take(max_candidates) {
            results.push(self.run_one(executable, command).await);
        }
        results
    }
}

impl SubprocessGeneratorRunner {
    async fn run_one(
        &self,
        executable: &Path,
        command: &GeneratorCommand,
    ) -> GeneratorRunOutcome {
        let start = std::time::Instant::now();
        let args: Vec<&str> = command.0.split_whitespace().skip(1).collect();
        let seed = stable_seed(&command.0);

        let mut cmd = Command::new(executable);
        cmd.args(&args)
            .env("TESTSYNTH_SEED", seed.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawned = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                return GeneratorRunOutcome {
                    success: false,
                    input: None,
                    error: Some(GeneratorRunError::RuntimeFailure {
                        command: command.0.clone(),
                        code: None,
                        stderr: format!("failed to spawn generator: {}", e),
                    }),
                    elapsed_ms: start.elapsed().as_millis(),
                }
            }
        };

        match timeout(self.timeouts.generator_run, spawned.wait_with_output()).await {
            Err(_) => GeneratorRunOutcome {
                success: false,
                input: None,
                error: Some(GeneratorRunError::Timeout {
                    command: command.0.clone(),
                }),
                elapsed_ms: start.elapsed().as_millis(),
            },
            Ok(Err(e)) => GeneratorRunOutcome {
                success: false,
                input: None,
                error: Some(GeneratorRunError::RuntimeFailure {
                    command: command.0.clone(),
                    code: None,
                    stderr: e.to_string(),
                }),
                elapsed_ms: start.elapsed().as_millis(),
            },
            Ok(Ok(output)) => {
                if !output.status.success() {
                    return GeneratorRunOutcome {
                        success: false,
                        input: None,
                        error: Some(GeneratorRunError::RuntimeFailure {
                            command: command.0.clone(),
                            code: output.status.code(),
                            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                        }),
                        elapsed_ms: start.elapsed().as_millis(),
                    };
                }
                let raw = String::from_utf8_lossy(&output.stdout);
                match Candidate::normalize(&raw) {
                    Some(candidate) => GeneratorRunOutcome {
                        success: true,
                        input: Some(candidate.into_string()),
                        error: None,
                        elapsed_ms: start.elapsed().as_millis(),
                    },
                    None => GeneratorRunOutcome {
                        success: false,
                        input: None,
                        error: Some(GeneratorRunError::EmptyGeneration {
                            command: command.0.clone(),
                        }),
                        elapsed_ms: start.elapsed().as_millis(),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_seed_is_deterministic() {
        let a = stable_seed("./gen -n 10 -type tree");
        let b = stable_seed("./gen -n 10 -type tree");
        let c = stable_seed("./gen -n 11 -type tree");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
