//! Error types for the Ryo assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Substrings that OS audio drivers put in "device in use" failures.
///
/// `10863` is CoreAudio's `kAudioUnitErr_CannotDoInCurrentContext`, surfaced
/// while another app (a call, a recorder) holds the microphone.
const BUSY_MARKERS: &[&str] = &[
    "busy",
    "10863",
    "cannot do in current context",
    "resource temporarily unavailable",
    "ebusy",
];

/// Errors that can occur in the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio error
    #[error("audio error: {0}")]
    Audio(String),

    /// Audio device is held by another component or process
    #[error("audio device busy: {0}")]
    DeviceBusy(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Wake word detection error
    #[error("wake word error: {0}")]
    WakeWord(String),

    /// Query responder backend error
    #[error("responder error: {0}")]
    Responder(String),

    /// Model name not present in the registry
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// Operation exceeded its deadline
    #[error("timed out: {0}")]
    Timeout(String),

    /// Task store error
    #[error("task error: {0}")]
    Task(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error means the audio device is transiently held elsewhere
    ///
    /// Drivers rarely use a dedicated error kind for this, so besides
    /// [`Error::DeviceBusy`] the rendered message is matched against known
    /// contention markers.
    #[must_use]
    pub fn is_device_busy(&self) -> bool {
        match self {
            Self::DeviceBusy(_) => true,
            other => is_busy_message(&other.to_string()),
        }
    }
}

/// Check an error message for audio-device contention markers
#[must_use]
pub fn is_busy_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    BUSY_MARKERS.iter().any(|marker| lower.contains(marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_busy_variant() {
        assert!(Error::DeviceBusy("mic".to_string()).is_device_busy());
    }

    #[test]
    fn test_busy_markers_in_audio_errors() {
        assert!(Error::Audio("Device or resource busy".to_string()).is_device_busy());
        assert!(Error::Audio("OSStatus error -10863".to_string()).is_device_busy());
        assert!(
            Error::Audio("AUHAL: cannot do in current context".to_string()).is_device_busy()
        );
        assert!(!Error::Audio("no input device available".to_string()).is_device_busy());
        assert!(!Error::Config("missing key".to_string()).is_device_busy());
    }
}
