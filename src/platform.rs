//! The "platform seam" DESIGN NOTES call for: everything that differs
//! between a Linux/macOS toolchain and a Windows one lives here so the rest
//! of the core (C2 Native Compiler, C4 Validator Runner) stays portable.

use std::path::Path;

/// Extra compiler flags to append after `-std=gnu++17 -O2 [-I headers]`.
/// Static linking and the console subsystem are both Windows-only concerns;
/// a bare `-static` elsewhere commonly fails to link for lack of a static
/// libc (e.g. macOS).
pub fn extra_compile_flags() -> Vec<&'static str> {
    if cfg!(target_os = "windows") {
        vec!["-static", "-Wl,--subsystem,console"]
    } else {
        vec![]
    }
}

/// The `cxx` invocation discovered per platform (EXTERNAL INTERFACES §6).
pub fn cxx_command() -> &'static str {
    if cfg!(target_os = "windows") {
        "g++"
    } else {
        "c++"
    }
}

/// The oracle interpreter command, discovered per platform and per language
/// tag (`interp source_file <stdin>`, EXTERNAL INTERFACES §6).
pub fn interpreter_command(language: &str) -> &'static str {
    match language {
        "python" | "python3" => "python3",
        "node" | "javascript" => "node",
        "ruby" => "ruby",
        _ => "python3",
    }
}

/// Classify an exit status as an ordinary failure or a platform-specific
/// crash (segfault / access violation), per spec.md §4.C4.
pub fn classify_exit_status(code: Option<i32>) -> ExitClassification {
    match code {
        None => ExitClassification::Crashed("terminated by signal".to_string()),
        Some(0) => ExitClassification::Success,
        Some(c) if is_crash_code(c) => ExitClassification::Crashed(format!("exit code {}", c)),
        Some(c) => ExitClassification::Rejected(c),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitClassification {
    Success,
    Rejected(i32),
    Crashed(String),
}

/// Well-known crash exit codes: POSIX 128+signal (SIGSEGV=11, SIGABRT=6,
/// SIGBUS=7) and the Windows STATUS_ACCESS_VIOLATION value observed by the
/// original implementation (0xC0000005 as a signed 32-bit int).
fn is_crash_code(code: i32) -> bool {
    const WINDOWS_ACCESS_VIOLATION: i32 = -1073741819; // 0xC0000005 as i32
    matches!(code, 139 | 134 | 135 | WINDOWS_ACCESS_VIOLATION)
}

/// Detect a `testlib`-style header in a source body: presence matters for
/// whether the Native Compiler injects include search paths (C2).
pub fn detects_testlib_header(source: &str) -> bool {
    source.contains("testlib.h")
}

/// Whether a bundled `testlib.h` is available at a conventional location
/// next to the compiler's working directory.
pub fn find_testlib_header(search_root: &Path) -> Option<std::path::PathBuf> {
    let candidate = search_root.join("testlib.h");
    if candidate.exists() {
        Some(candidate)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_segfault_as_crash() {
        assert_eq!(
            classify_exit_status(Some(139)),
            ExitClassification::Crashed("exit code 139".to_string())
        );
    }

    #[test]
    fn classifies_ordinary_nonzero_as_rejected() {
        assert_eq!(classify_exit_status(Some(1)), ExitClassification::Rejected(1));
    }

    #[test]
    fn classifies_zero_as_success() {
        assert_eq!(classify_exit_status(Some(0)), ExitClassification::Success);
    }

    #[test]
    fn detects_testlib_by_include() {
        assert!(detects_testlib_header("#include \"testlib.h\"\nint main(){}"));
        assert!(!detects_testlib_header("int main(){}"));
    }
}
