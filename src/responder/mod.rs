//! Query responders and the named model registry
//!
//! A [`Responder`] turns a question into an answer. The session controller
//! only ever talks to one, usually a [`ModelRegistry`] that answers a few
//! fixed utterances locally and routes everything else to the active backend.

mod canned;
mod gemini;
mod ollama;

use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::config::ResponderConfig;
use crate::{Error, Result};

pub use canned::canned_reply;
pub use gemini::GeminiResponder;
pub use ollama::OllamaResponder;

/// Spoken when a backend returns nothing
pub const EMPTY_RESPONSE: &str = "I'm sorry, I didn't get a response from the AI model.";

/// Answers free-form questions
#[async_trait]
pub trait Responder: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Ask a question and wait for the full answer
    ///
    /// # Errors
    ///
    /// Returns error on transport or backend failure
    async fn ask(&self, question: &str) -> Result<String>;
}

/// System prompt describing the assistant persona
#[must_use]
pub fn persona_prompt(assistant_name: &str) -> String {
    format!(
        "You are {assistant_name}, a smart and efficient AI voice assistant. \
         Your answers are spoken aloud, so keep them short: one or two sentences, \
         no lists, no markdown. Be helpful, direct and friendly. For math, just give \
         the answer."
    )
}

/// Named set of backends with one active at a time
pub struct ModelRegistry {
    backends: Vec<(String, Arc<dyn Responder>)>,
    active: RwLock<String>,
    assistant_name: String,
}

impl ModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new(assistant_name: impl Into<String>) -> Self {
        Self {
            backends: Vec::new(),
            active: RwLock::new(String::new()),
            assistant_name: assistant_name.into(),
        }
    }

    /// Build the standard registry: `Ollama` and `Gemini`
    ///
    /// # Errors
    ///
    /// Returns error if the configured default model is not one of them
    pub fn from_config(config: &ResponderConfig, assistant_name: &str) -> Result<Self> {
        let system = persona_prompt(assistant_name);
        let registry = Self::new(assistant_name)
            .with_backend(
                "Ollama",
                Arc::new(OllamaResponder::new(
                    &config.ollama_url,
                    &config.ollama_model,
                    system.clone(),
                )),
            )
            .with_backend(
                "Gemini",
                Arc::new(GeminiResponder::new(
                    config.gemini_api_key.clone(),
                    &config.gemini_model,
                    system,
                )),
            );
        registry.set_active(&config.default_model)?;
        Ok(registry)
    }

    /// Register a backend; the first one registered becomes active
    #[must_use]
    pub fn with_backend(mut self, name: impl Into<String>, backend: Arc<dyn Responder>) -> Self {
        let name = name.into();
        if self.backends.is_empty() {
            *self.active.get_mut().unwrap_or_else(std::sync::PoisonError::into_inner) =
                name.clone();
        }
        self.backends.push((name, backend));
        self
    }

    /// Switch the active backend
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownModel` if no backend has that name
    pub fn set_active(&self, name: &str) -> Result<()> {
        if !self.backends.iter().any(|(n, _)| n == name) {
            return Err(Error::UnknownModel(name.to_string()));
        }
        *self
            .active
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = name.to_string();
        tracing::info!(model = name, "active model changed");
        Ok(())
    }

    /// Name of the active backend
    #[must_use]
    pub fn active(&self) -> String {
        self.active
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Registered names in insertion order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.backends.iter().map(|(n, _)| n.clone()).collect()
    }

    fn active_backend(&self) -> Result<Arc<dyn Responder>> {
        let active = self.active();
        self.backends
            .iter()
            .find(|(n, _)| *n == active)
            .map(|(_, b)| Arc::clone(b))
            .ok_or(Error::UnknownModel(active))
    }
}

#[async_trait]
impl Responder for ModelRegistry {
    fn name(&self) -> &str {
        "registry"
    }

    async fn ask(&self, question: &str) -> Result<String> {
        let active = self.active();
        if let Some(reply) = canned_reply(question, &self.assistant_name, &active) {
            tracing::debug!(question, "answered locally");
            return Ok(reply);
        }

        let backend = self.active_backend()?;
        tracing::info!(model = %active, backend = backend.name(), "querying model");

        let answer = backend.ask(question).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            tracing::warn!(model = %active, "model returned an empty response");
            return Ok(EMPTY_RESPONSE.to_string());
        }
        Ok(answer.to_string())
    }
}
