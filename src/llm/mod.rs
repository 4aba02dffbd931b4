//! C6 — LLM Gateway.
//!
//! A uniform `generate()` interface in front of two concrete backends: a
//! hosted Vertex-style endpoint and a plain REST completion endpoint, with
//! fallback between them, API-key rotation on rate limiting, and exponential
//! backoff on transient server errors. Grounded in
//! `ccos::arbiter::llm_provider::OpenAILlmProvider`'s request/retry shape and
//! in `gemini_service.py`'s Vertex-first-then-REST fallback order.

pub mod gateway;
pub mod rest;
pub mod vertex;

pub use gateway::{GenerationRequest, LlmGateway};
