//! Generator-Validator supervision loop for synthesizing competitive
//! programming test suites from a problem statement, worked examples, and a
//! reference oracle solution.
//!
//! `supervisor::Supervisor::synthesize_suite` is the single public entry
//! point; everything else is a component it orchestrates (C1-C10, C12).

pub mod agents;
pub mod compiler;
pub mod config;
pub mod error;
pub mod extractor;
pub mod format_inference;
pub mod generator_runner;
pub mod llm;
pub mod oracle;
pub mod platform;
pub mod prompts;
pub mod supervisor;
pub mod types;
pub mod validator_runner;
