//! Hosted Vertex-style backend: project/location-addressed endpoint,
//! bearer token from the ambient environment rather than a request body key,
//! grounded in `gemini_service.py`'s `USE_VERTEX_AI` / `generate_content`
//! path (tried first, before the REST fallback).

use super::gateway::{BackendError, GenerationRequest, LlmBackend};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Serialize)]
struct VertexRequest {
    contents: Vec<VertexContent>,
    #[serde(rename = "generationConfig")]
    generation_config: VertexGenerationConfig,
}

#[derive(Serialize)]
struct VertexContent {
    role: String,
    parts: Vec<VertexPart>,
}

#[derive(Serialize, Deserialize)]
struct VertexPart {
    text: String,
}

#[derive(Serialize)]
struct VertexGenerationConfig {
    temperature: f64,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct VertexResponse {
    candidates: Vec<VertexCandidate>,
}

#[derive(Deserialize)]
struct VertexCandidate {
    content: VertexResponseContent,
}

#[derive(Deserialize)]
struct VertexResponseContent {
    parts: Vec<VertexPart>,
}

pub struct VertexBackend {
    client: reqwest::Client,
    project_id: String,
    location: String,
    model: String,
    access_token: String,
}

impl VertexBackend {
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        model: impl Into<String>,
        access_token: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            project_id: project_id.into(),
            location: location.into(),
            model: model.into(),
            access_token: access_token.into(),
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "https://{loc}-aiplatform.googleapis.com/v1/projects/{proj}/locations/{loc}/publishers/google/models/{model}:generateContent",
            loc = self.location,
            proj = self.project_id,
            model = self.model,
        )
    }
}

#[async_trait]
impl LlmBackend for VertexBackend {
    fn name(&self) -> &'static str {
        "vertex"
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String, BackendError> {
        let body = VertexRequest {
            contents: vec![VertexContent {
                role: "user".to_string(),
                parts: vec![VertexPart {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: VertexGenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.access_token)
            .json(&body)
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

        let parsed: VertexResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("invalid JSON body: {}", e)))?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| BackendError::Malformed("empty candidates array".to_string()))
    }
}
