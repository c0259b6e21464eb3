//! Cloud model backend over the Gemini `generateContent` API

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::Responder;
use crate::{Error, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

/// Calls Google's Gemini API; needs an API key
pub struct GeminiResponder {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    model: String,
    system: String,
}

impl GeminiResponder {
    /// Create a Gemini responder; without a key every ask fails
    #[must_use]
    pub fn new(api_key: Option<SecretString>, model: &str, system: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model: model.to_string(),
            system,
        }
    }
}

#[async_trait]
impl Responder for GeminiResponder {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let Some(api_key) = &self.api_key else {
            return Err(Error::Config(
                "GEMINI_API_KEY required for the Gemini model".to_string(),
            ));
        };

        let url = format!("{API_BASE}/{}:generateContent", self.model);
        let request = GenerateContentRequest {
            system_instruction: Content {
                parts: vec![Part { text: &self.system }],
            },
            contents: vec![Content {
                parts: vec![Part { text: question }],
            }],
        };

        tracing::debug!(model = %self.model, "sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(Error::Responder(format!("Gemini error {status}: {body}")));
        }

        let result: GenerateContentResponse = response.json().await?;
        Ok(extract_text(result))
    }
}

fn extract_text(response: GenerateContentResponse) -> String {
    response
        .candidates
        .into_iter()
        .next()
        .map(|c| {
            c.content
                .parts
                .into_iter()
                .map(|p| p.text)
                .collect::<String>()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_is_config_error() {
        let responder = GeminiResponder::new(None, "gemini-1.5-flash", String::new());
        assert!(matches!(responder.ask("hi").await, Err(Error::Config(_))));
    }

    #[test]
    fn test_extract_text() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Lima"},{"text":" is the capital."}]}}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(extract_text(response), "Lima is the capital.");

        let empty: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(extract_text(empty), "");
    }

    #[test]
    fn test_request_uses_camel_case() {
        let request = GenerateContentRequest {
            system_instruction: Content {
                parts: vec![Part { text: "sys" }],
            },
            contents: vec![],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
    }
}
