//! Local model backend over the Ollama HTTP API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Responder;
use crate::{Error, Result};

/// Request body for `/api/generate`
#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

/// Non-streaming `/api/generate` response
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Talks to a locally running Ollama server
pub struct OllamaResponder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    system: String,
}

impl OllamaResponder {
    /// Create a responder for `model` served at `base_url`
    #[must_use]
    pub fn new(base_url: &str, model: &str, system: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system,
        }
    }

    /// Model name sent with each request
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Responder for OllamaResponder {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt: question,
            system: &self.system,
            stream: false,
        };

        tracing::debug!(url = %url, model = %self.model, "sending Ollama request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Ollama request failed");
                Error::Responder(format!("cannot reach Ollama at {}: {e}", self.base_url))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Ollama API error");
            return Err(Error::Responder(format!("Ollama error {status}: {body}")));
        }

        let result: GenerateResponse = response.json().await?;
        tracing::debug!(chars = result.response.len(), "Ollama response received");
        Ok(result.response)
    }
}
