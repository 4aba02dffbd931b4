//! C2 — Native Compiler.
//!
//! Compiles generator/validator/checker source into a native executable
//! using a detected C++ toolchain, bounded by a compile timeout. Detects a
//! `testlib`-style header and injects its include path when present.

use crate::config::Timeouts;
use crate::error::CompileError;
use crate::platform;
use crate::types::ProgramRole;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Clone)]
pub struct CompileOutcome {
    pub success: bool,
    pub executable_path: Option<PathBuf>,
    pub diagnostics: String,
}

#[async_trait]
pub trait NativeCompiler: Send + Sync {
    async fn compile(
        &self,
        source: &str,
        target_name: &str,
        role: ProgramRole,
    ) -> Result<CompileOutcome, CompileError>;
}

pub struct CxxCompiler {
    timeouts: Timeouts,
    work_dir: PathBuf,
    testlib_search_dir: Option<PathBuf>,
}

impl CxxCompiler {
    pub fn new(timeouts: Timeouts, work_dir: PathBuf) -> Self {
        let testlib_search_dir = platform::find_testlib_header(&work_dir).map(|_| work_dir.clone());
        Self {
            timeouts,
            work_dir,
            testlib_search_dir,
        }
    }

    async fn toolchain_available(&self) -> bool {
        Command::new(platform::cxx_command())
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl NativeCompiler for CxxCompiler {
    async fn compile(
        &self,
        source: &str,
        target_name: &str,
        role: ProgramRole,
    ) -> Result<CompileOutcome, CompileError> {
        if !self.toolchain_available().await {
            return Err(CompileError::ToolchainMissing);
        }

        let src_path = self.work_dir.join(format!("{}.cpp", target_name));
        let exe_path = self.work_dir.join(target_name);
        std::fs::write(&src_path, source)
            .map_err(|e| CompileError::CompileFailed { diagnostics: format!("failed to write source: {}", e) })?;

        let mut cmd = Command::new(platform::cxx_command());
        cmd.arg("-std=gnu++17").arg("-O2");
        if platform::detects_testlib_header(source) {
            if let Some(dir) = &self.testlib_search_dir {
                cmd.arg("-I").arg(dir);
            }
        }
        for flag in platform::extra_compile_flags() {
            cmd.arg(flag);
        }
        cmd.arg("-o").arg(&exe_path).arg(&src_path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let _ = role; // role currently only affects downstream invocation, not compile flags

        let output = match timeout(self.timeouts.compile, cmd.output()).await {
            Err(_) => return Err(CompileError::Timeout),
            Ok(Err(e)) => {
                return Err(CompileError::CompileFailed {
                    diagnostics: format!("failed to spawn compiler: {}", e),
                })
            }
            Ok(Ok(o)) => o,
        };

        let diagnostics = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        if output.status.success() {
            Ok(CompileOutcome {
                success: true,
                executable_path: Some(exe_path),
                diagnostics,
            })
        } else {
            Ok(CompileOutcome {
                success: false,
                executable_path: None,
                diagnostics,
            })
        }
    }
}

/// Trims raw compiler diagnostics to the lines an LLM revision prompt
/// actually needs: `error:`/`warning:` markers, file/line markers, and a
/// handful of common clang/gcc phrases. Caps at 20 lines with a trailing
/// "omitted" marker, per the original `_extract_compilation_error_info`.
pub fn summarize_diagnostics(raw: &str) -> String {
    const KEEP_MARKERS: &[&str] = &[
        "error:",
        "warning:",
        ".cpp:",
        "in function",
        "required from",
        "no member named",
        "has no member",
        "expected",
        "undefined",
    ];
    let mut kept: Vec<&str> = raw
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter(|l| {
            let lower = l.to_lowercase();
            KEEP_MARKERS.iter().any(|m| lower.contains(m))
        })
        .collect();

    if kept.len() > 20 {
        kept.truncate(20);
        kept.push("... (more errors omitted)");
        kept.join("\n")
    } else {
        kept.join("\n")
    }
}

/// Stub compiler for tests and for environments without a toolchain: always
/// "succeeds" by writing a marker file instead of invoking `c++`.
pub struct StubCompiler {
    pub work_dir: PathBuf,
    pub fail_until_attempt: u32,
    attempts: std::sync::atomic::AtomicU32,
}

impl StubCompiler {
    pub fn new(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            fail_until_attempt: 0,
            attempts: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn always_fails(work_dir: PathBuf) -> Self {
        Self {
            work_dir,
            fail_until_attempt: u32::MAX,
            attempts: std::sync::atomic::AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl NativeCompiler for StubCompiler {
    async fn compile(
        &self,
        _source: &str,
        target_name: &str,
        _role: ProgramRole,
    ) -> Result<CompileOutcome, CompileError> {
        let attempt = self
            .attempts
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if attempt <= self.fail_until_attempt {
            return Ok(CompileOutcome {
                success: false,
                executable_path: None,
                diagnostics: "stub: simulated compile failure".to_string(),
            });
        }
        let exe_path = self.work_dir.join(target_name);
        std::fs::write(&exe_path, b"stub-executable").ok();
        Ok(CompileOutcome {
            success: true,
            executable_path: Some(exe_path),
            diagnostics: String::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_keeps_only_relevant_lines() {
        let raw = "In file included from a.cpp:1:\nfoo.cpp:10:5: error: expected ';'\nnote: candidate is\nbar.cpp: warning: unused variable";
        let summary = summarize_diagnostics(raw);
        assert!(summary.contains("error:"));
        assert!(summary.contains("warning:"));
        assert!(!summary.contains("note:"));
    }

    #[test]
    fn summarize_caps_at_twenty_lines() {
        let mut raw = String::new();
        for i in 0..30 {
            raw.push_str(&format!("file.cpp:{}: error: bad thing {}\n", i, i));
        }
        let summary = summarize_diagnostics(&raw);
        assert_eq!(summary.lines().count(), 21);
        assert!(summary.ends_with("(more errors omitted)"));
    }

    #[tokio::test]
    async fn stub_compiler_fails_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let compiler = StubCompiler {
            work_dir: dir.path().to_path_buf(),
            fail_until_attempt: 1,
            attempts: std::sync::atomic::AtomicU32::new(0),
        };
        let first = compiler.compile("", "gen", ProgramRole::Generator).await.unwrap();
        assert!(!first.success);
        let second = compiler.compile("", "gen", ProgramRole::Generator).await.unwrap();
        assert!(second.success);
    }
}
