//! Configuration management for the Ryo assistant
//!
//! Three layers, later ones winning: compiled defaults, the TOML file
//! (see [`file`]), then environment variables.

pub mod file;

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;

use crate::intent::DEFAULT_MATCH_THRESHOLD;
use crate::{Error, Result};
use file::RyoConfigFile;

/// Assistant configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub session: SessionConfig,
    pub device: DeviceConfig,
    pub responder: ResponderConfig,
    pub voice: VoiceConfig,
    pub tasks: TasksConfig,
}

/// Assistant identity
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Name used in greetings and the model persona
    pub name: String,

    /// Lowercase phrase that arms a session and interrupts playback
    pub wake_phrase: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "Ryo".to_string(),
            wake_phrase: "hey ryo".to_string(),
        }
    }
}

/// Session controller timing
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Inactivity limit before a session is forced back to idle
    pub timeout: Duration,

    /// How long each capture window records
    pub capture_window: Duration,

    /// Length of the barge-in capture that runs during playback
    pub interrupt_window: Duration,

    /// Pause between releasing the wake source and opening the capture
    pub handoff_delay: Duration,

    /// Upper bound on a single model query
    pub query_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            capture_window: Duration::from_secs(5),
            interrupt_window: Duration::from_secs(3),
            handoff_delay: Duration::from_millis(200),
            query_timeout: Duration::from_secs(60),
        }
    }
}

/// Microphone contention policy
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Wait after releasing the microphone before the wake source reacquires it
    pub settle_delay: Duration,

    /// Wake source start attempts before giving up
    pub max_retries: u32,

    /// Wait between busy-device retries
    pub retry_delay: Duration,

    /// Pause between stop and start in a forced restart
    pub force_restart_delay: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(1500),
            max_retries: 3,
            retry_delay: Duration::from_secs(5),
            force_restart_delay: Duration::from_millis(500),
        }
    }
}

/// Model backends
#[derive(Debug, Clone)]
pub struct ResponderConfig {
    /// Registry name active at startup
    pub default_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub gemini_model: String,
    pub gemini_api_key: Option<SecretString>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            default_model: "Ollama".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "mistral".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_api_key: None,
        }
    }
}

/// Speech-to-text and text-to-speech
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// `OpenAI` API key (for Whisper and TTS)
    pub openai_api_key: Option<SecretString>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            openai_api_key: None,
        }
    }
}

/// Task list storage
#[derive(Debug, Clone)]
pub struct TasksConfig {
    /// JSON file holding the list
    pub path: PathBuf,

    /// Minimum word overlap for spoken removals
    pub match_threshold: f64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            path: default_tasks_path(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }
}

/// `<data dir>/ryo/tasks.json`, or `./tasks.json` without a home directory
fn default_tasks_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "ryo").map_or_else(
        || PathBuf::from("tasks.json"),
        |dirs| dirs.data_dir().join("tasks.json"),
    )
}

impl Config {
    /// Load configuration from the given file (or the default path) and the
    /// process environment
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be parsed or a value is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => file::load_config_file(p)?,
            None => match file::config_file_path() {
                Some(p) => file::load_config_file(&p)?,
                None => RyoConfigFile::default(),
            },
        };

        Self::from_layers(file, |key| std::env::var(key).ok())
    }

    /// Merge a file overlay and an environment lookup onto the defaults
    ///
    /// # Errors
    ///
    /// Returns error if a merged value is out of range
    pub fn from_layers(file: RyoConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let assistant = AssistantConfig {
            name: file.assistant.name.unwrap_or(defaults.assistant.name),
            wake_phrase: env("RYO_WAKE_PHRASE")
                .or(file.assistant.wake_phrase)
                .map_or(defaults.assistant.wake_phrase, |p| p.trim().to_lowercase()),
        };

        let s = file.session;
        let session = SessionConfig {
            timeout: s
                .timeout_secs
                .map_or(defaults.session.timeout, Duration::from_secs),
            capture_window: s
                .capture_window_secs
                .map_or(defaults.session.capture_window, Duration::from_secs),
            interrupt_window: s
                .interrupt_window_secs
                .map_or(defaults.session.interrupt_window, Duration::from_secs),
            handoff_delay: s
                .handoff_delay_ms
                .map_or(defaults.session.handoff_delay, Duration::from_millis),
            query_timeout: s
                .query_timeout_secs
                .map_or(defaults.session.query_timeout, Duration::from_secs),
        };

        let d = file.device;
        let device = DeviceConfig {
            settle_delay: d
                .settle_delay_ms
                .map_or(defaults.device.settle_delay, Duration::from_millis),
            max_retries: d.max_retries.unwrap_or(defaults.device.max_retries),
            retry_delay: d
                .retry_delay_secs
                .map_or(defaults.device.retry_delay, Duration::from_secs),
            force_restart_delay: d
                .force_restart_delay_ms
                .map_or(defaults.device.force_restart_delay, Duration::from_millis),
        };

        let r = file.responder;
        let responder = ResponderConfig {
            default_model: env("DEFAULT_MODEL")
                .or(r.default_model)
                .unwrap_or(defaults.responder.default_model),
            ollama_url: env("OLLAMA_URL")
                .or(r.ollama_url)
                .unwrap_or(defaults.responder.ollama_url),
            ollama_model: env("OLLAMA_MODEL")
                .or(r.ollama_model)
                .unwrap_or(defaults.responder.ollama_model),
            gemini_model: r.gemini_model.unwrap_or(defaults.responder.gemini_model),
            gemini_api_key: env("GEMINI_API_KEY")
                .or(r.gemini_api_key)
                .map(SecretString::from),
        };

        let v = file.voice;
        let voice = VoiceConfig {
            stt_model: v.stt_model.unwrap_or(defaults.voice.stt_model),
            tts_model: v.tts_model.unwrap_or(defaults.voice.tts_model),
            tts_voice: v.tts_voice.unwrap_or(defaults.voice.tts_voice),
            tts_speed: v.tts_speed.unwrap_or(defaults.voice.tts_speed),
            openai_api_key: env("OPENAI_API_KEY")
                .or(v.openai_api_key)
                .map(SecretString::from),
        };

        let tasks = TasksConfig {
            path: env("RYO_TASKS_PATH")
                .map(PathBuf::from)
                .or(file.tasks.path)
                .unwrap_or(defaults.tasks.path),
            match_threshold: file
                .tasks
                .match_threshold
                .unwrap_or(defaults.tasks.match_threshold),
        };

        let config = Self {
            assistant,
            session,
            device,
            responder,
            voice,
            tasks,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.assistant.wake_phrase.is_empty() {
            return Err(Error::Config("wake phrase must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.tasks.match_threshold) {
            return Err(Error::Config(format!(
                "tasks.match_threshold must be within 0.0..=1.0, got {}",
                self.tasks.match_threshold
            )));
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "voice.tts_speed must be within 0.25..=4.0, got {}",
                self.voice.tts_speed
            )));
        }
        if self.device.max_retries == 0 {
            return Err(Error::Config("device.max_retries must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_layers(RyoConfigFile::default(), no_env).unwrap();
        assert_eq!(config.assistant.wake_phrase, "hey ryo");
        assert_eq!(config.session.timeout, Duration::from_secs(20));
        assert_eq!(config.session.capture_window, Duration::from_secs(5));
        assert_eq!(config.device.settle_delay, Duration::from_millis(1500));
        assert_eq!(config.device.max_retries, 3);
        assert_eq!(config.responder.default_model, "Ollama");
        assert!(config.responder.gemini_api_key.is_none());
        assert!(config.tasks.path.ends_with("tasks.json"));
    }

    #[test]
    fn test_env_beats_file() {
        let file: RyoConfigFile = toml::from_str(
            r#"
            [assistant]
            wake_phrase = "computer"

            [responder]
            default_model = "Gemini"
            ollama_model = "llama3"
            "#,
        )
        .unwrap();

        let config = Config::from_layers(file, |key| match key {
            "RYO_WAKE_PHRASE" => Some("  Hey Jarvis ".to_string()),
            "GEMINI_API_KEY" => Some("secret".to_string()),
            "OLLAMA_MODEL" => Some(String::new()),
            _ => None,
        })
        .unwrap();

        assert_eq!(config.assistant.wake_phrase, "hey jarvis");
        assert_eq!(config.responder.default_model, "Gemini");
        // blank env values do not override
        assert_eq!(config.responder.ollama_model, "llama3");
        assert_eq!(
            config
                .responder
                .gemini_api_key
                .as_ref()
                .map(|key| key.expose_secret()),
            Some("secret")
        );
    }

    #[test]
    fn test_secret_not_in_debug() {
        let config = Config::from_layers(RyoConfigFile::default(), |key| {
            (key == "OPENAI_API_KEY").then(|| "sk-do-not-print".to_string())
        })
        .unwrap();
        assert!(!format!("{config:?}").contains("sk-do-not-print"));
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let file: RyoConfigFile = toml::from_str("[tasks]\nmatch_threshold = 1.5").unwrap();
        assert!(matches!(
            Config::from_layers(file, no_env),
            Err(Error::Config(_))
        ));
    }
}
