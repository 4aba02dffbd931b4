//! C9, C10, C12 — the three LLM-backed agents the Supervisor orchestrates
//! (generator, validator) or that run standalone (checker).

pub mod checker_agent;
pub mod generator_agent;
pub mod validator_agent;
