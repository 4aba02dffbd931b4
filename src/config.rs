//! Tunables for the synthesis loop, with environment-variable overrides
//! layered over struct defaults the way `ccos`'s config types do.

use std::time::Duration;

/// `options` from EXTERNAL INTERFACES §6.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub use_format_inference: bool,
    pub compile_fix_attempts: u32,
    pub iteration_cap: u32,
    pub wall_clock: Duration,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            use_format_inference: true,
            compile_fix_attempts: 3,
            iteration_cap: 100,
            wall_clock: Duration::from_secs(600),
        }
    }
}

impl SynthesisOptions {
    /// Layer `TESTSYNTH_*` environment overrides over the defaults. Invalid
    /// values are ignored (the default wins) rather than raising, matching
    /// the "never panic on config" posture used throughout the core.
    pub fn from_env() -> Self {
        let mut opts = Self::default();
        if let Ok(v) = std::env::var("TESTSYNTH_WALL_CLOCK_SECONDS") {
            if let Ok(secs) = v.parse::<u64>() {
                opts.wall_clock = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("TESTSYNTH_ITERATION_CAP") {
            if let Ok(n) = v.parse::<u32>() {
                opts.iteration_cap = n;
            }
        }
        if let Ok(v) = std::env::var("TESTSYNTH_COMPILE_FIX_ATTEMPTS") {
            if let Ok(n) = v.parse::<u32>() {
                opts.compile_fix_attempts = n;
            }
        }
        if let Ok(v) = std::env::var("TESTSYNTH_USE_FORMAT_INFERENCE") {
            opts.use_format_inference = v != "0" && v.to_lowercase() != "false";
        }
        opts
    }
}

/// Per-subsystem timeouts, §5 of SPEC_FULL / §5 of spec.md.
#[derive(Debug, Clone)]
pub struct Timeouts {
    pub oracle_run: Duration,
    pub generator_run: Duration,
    pub validator_run: Duration,
    pub compile: Duration,
    pub llm_request: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            oracle_run: Duration::from_secs(5),
            generator_run: Duration::from_secs(10),
            validator_run: Duration::from_secs(5),
            compile: Duration::from_secs(60),
            llm_request: Duration::from_secs(180),
        }
    }
}

/// Hard cap on oracle stdout, C1.
pub const ORACLE_OUTPUT_CAP_BYTES: usize = 10 * 1024 * 1024;

/// Candidates-per-iteration multiplier used by step 7 (`2 * N`).
pub const CANDIDATE_OVERSAMPLE_FACTOR: usize = 2;

/// Iterations of persistent sample-rejection before the minimal validator is
/// forced (step 6).
pub const MINIMAL_VALIDATOR_FORCE_ITERATIONS: u32 = 3;

/// Diversity ratio below which the suite is accepted with a warning rather
/// than rejected outright (step 11).
pub const DIVERSITY_WARN_THRESHOLD: f64 = 0.2;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = SynthesisOptions::default();
        assert_eq!(opts.iteration_cap, 100);
        assert_eq!(opts.compile_fix_attempts, 3);
        assert_eq!(opts.wall_clock, Duration::from_secs(600));
        assert!(opts.use_format_inference);
    }
}
