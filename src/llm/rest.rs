//! Plain REST completion backend — a generic "one JSON request, one JSON
//! response" provider, grounded in
//! `ccos::arbiter::llm_provider::OpenAILlmProvider::make_request` (request
//! body shape, Bearer auth, prompt hashing) and in the REST path
//! `gemini_service.py` falls back to when its SDK client isn't configured.

use super::gateway::{BackendError, GenerationRequest, LlmBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Serialize)]
struct RestRequest {
    model: String,
    messages: Vec<RestMessage>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize, Deserialize)]
struct RestMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct RestResponse {
    choices: Vec<RestChoice>,
}

#[derive(Deserialize)]
struct RestChoice {
    message: RestMessage,
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_keys: Vec<String>,
    key_index: AtomicUsize,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_keys: Vec<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            api_keys,
            key_index: AtomicUsize::new(0),
        }
    }

    fn current_key(&self) -> Option<&str> {
        self.api_keys
            .get(self.key_index.load(Ordering::Relaxed))
            .map(|s| s.as_str())
    }
}

#[async_trait]
impl LlmBackend for RestBackend {
    fn name(&self) -> &'static str {
        "rest"
    }

    fn rotate_key(&self) -> bool {
        let next = self.key_index.load(Ordering::Relaxed) + 1;
        if next < self.api_keys.len() {
            self.key_index.store(next, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let api_key = self
            .current_key()
            .ok_or_else(|| BackendError::Network("no API key configured".to_string()))?;

        let body = RestRequest {
            model: self.model.clone(),
            messages: vec![RestMessage {
                role: "user".to_string(),
                content: request.prompt.clone(),
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };
        let payload = serde_json::to_vec(&body)
            .map_err(|e| BackendError::Network(format!("failed to serialize request: {}", e)))?;
        debug!(prompt_hash = %sha256_hex(&payload), "sending REST completion request");

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(BackendError::RateLimited);
        }
        if status.is_server_error() {
            return Err(BackendError::ServerError(format!("status {}", status)));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Malformed(format!(
                "status {}: {}",
                status, text
            )));
        }

        let text = response
            .text()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;
        let parsed: RestResponse = serde_json::from_str(&text)
            .map_err(|e| BackendError::Malformed(format!("invalid JSON body: {}", e)))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| BackendError::Malformed("empty choices array".to_string()))
    }
}
