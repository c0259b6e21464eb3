//! TOML configuration file loading
//!
//! Supports `~/.config/ryo/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RyoConfigFile {
    #[serde(default)]
    pub assistant: AssistantFileConfig,

    #[serde(default)]
    pub session: SessionFileConfig,

    #[serde(default)]
    pub device: DeviceFileConfig,

    #[serde(default)]
    pub responder: ResponderFileConfig,

    #[serde(default)]
    pub voice: VoiceFileConfig,

    #[serde(default)]
    pub tasks: TasksFileConfig,
}

/// Assistant identity
#[derive(Debug, Default, Deserialize)]
pub struct AssistantFileConfig {
    /// Name used in greetings and the model persona
    pub name: Option<String>,

    /// Phrase that arms a session (e.g. "hey ryo")
    pub wake_phrase: Option<String>,
}

/// Session timing
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub timeout_secs: Option<u64>,
    pub capture_window_secs: Option<u64>,
    pub interrupt_window_secs: Option<u64>,
    pub handoff_delay_ms: Option<u64>,
    pub query_timeout_secs: Option<u64>,
}

/// Microphone contention policy
#[derive(Debug, Default, Deserialize)]
pub struct DeviceFileConfig {
    pub settle_delay_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
    pub force_restart_delay_ms: Option<u64>,
}

/// Model backends
#[derive(Debug, Default, Deserialize)]
pub struct ResponderFileConfig {
    /// Registry name of the backend active at startup ("Ollama", "Gemini")
    pub default_model: Option<String>,
    pub ollama_url: Option<String>,
    pub ollama_model: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_api_key: Option<String>,
}

/// Speech-to-text and text-to-speech
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    pub openai_api_key: Option<String>,
}

/// Task list storage
#[derive(Debug, Default, Deserialize)]
pub struct TasksFileConfig {
    pub path: Option<PathBuf>,

    /// Minimum word overlap for spoken removals
    pub match_threshold: Option<f64>,
}

/// Load a TOML config file
///
/// A missing file yields the empty overlay.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn load_config_file(path: &Path) -> Result<RyoConfigFile> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(RyoConfigFile::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/ryo/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ryo").join("config.toml"))
}
