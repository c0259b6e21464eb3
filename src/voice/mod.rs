//! Voice capabilities
//!
//! The session controller sees the microphone and speaker only through the
//! traits here: a [`WakeWordSource`] that fires once per detection, a
//! [`Recorder`] for command capture, and a [`SpeechOutput`] for replies.
//! Both the wake source and the recorder need exclusive use of the
//! microphone; [`WakeSupervisor`] owns the wake source's start/stop/retry
//! lifecycle around that contention.
//!
//! With the `audio` feature, cpal/Whisper/OpenAI TTS implementations are
//! provided as well.

mod cancel;
mod speaker;
mod supervisor;

#[cfg(feature = "audio")]
mod capture;
#[cfg(feature = "audio")]
mod playback;
#[cfg(feature = "audio")]
mod recorder;
#[cfg(feature = "audio")]
mod source;
#[cfg(feature = "audio")]
mod stt;
#[cfg(feature = "audio")]
mod tts;
#[cfg(feature = "audio")]
mod wake_word;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;

pub use cancel::CancelToken;
pub use speaker::{Speaker, VoiceBackend};
pub use supervisor::{RetryPolicy, WakeSupervisor};

#[cfg(feature = "audio")]
pub use capture::{MicStream, SAMPLE_RATE, rms, samples_to_wav};
#[cfg(feature = "audio")]
pub use playback::CloudVoice;
#[cfg(feature = "audio")]
pub use recorder::MicRecorder;
#[cfg(feature = "audio")]
pub use source::MicWakeSource;
#[cfg(feature = "audio")]
pub use stt::SpeechToText;
#[cfg(feature = "audio")]
pub use tts::TextToSpeech;
#[cfg(feature = "audio")]
pub use wake_word::{DetectorState, WakeWordDetector};

/// Invoked once per wake phrase detection
pub type WakeCallback = Arc<dyn Fn() + Send + Sync>;

/// Listens for the wake phrase
///
/// After firing the callback the source halts itself; `start` must be
/// called again to re-arm it.
#[async_trait]
pub trait WakeWordSource: Send + Sync {
    /// Acquire the microphone and begin listening
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened; a busy device is
    /// reported so that [`crate::Error::is_device_busy`] recognizes it
    async fn start(&self, on_wake: WakeCallback) -> Result<()>;

    /// Stop listening and release the microphone; idempotent
    fn stop(&self);

    /// Whether the source currently holds the microphone
    fn is_running(&self) -> bool;
}

/// Records a voice command and turns it into text
#[async_trait]
pub trait Recorder: Send + Sync {
    /// Acquire the microphone and start buffering audio
    ///
    /// # Errors
    ///
    /// Returns error if the microphone cannot be opened
    async fn start_listening(&self) -> Result<()>;

    /// Stop recording and transcribe what was captured
    ///
    /// Returns an empty string when nothing was being recorded or nothing
    /// intelligible was heard.
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn stop_and_transcribe(&self) -> Result<String>;

    /// Abandon any recording in progress without transcribing; idempotent
    fn stop(&self);

    /// Whether audio is currently being buffered
    fn is_recording(&self) -> bool;
}

/// How a call to [`SpeechOutput::speak`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    /// Played to the end
    Finished,
    /// Cut short by [`SpeechOutput::stop`]
    Interrupted,
    /// Nothing played because output is muted
    Muted,
}

impl fmt::Display for PlaybackOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Finished => "finished",
            Self::Interrupted => "interrupted",
            Self::Muted => "muted",
        };
        f.write_str(s)
    }
}

/// Speaks replies aloud
#[async_trait]
pub trait SpeechOutput: Send + Sync {
    /// Render and play `text`, returning when playback ends
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or the audio device fails
    async fn speak(&self, text: &str) -> Result<PlaybackOutcome>;

    /// Cut off the current utterance; safe when nothing is playing
    fn stop(&self);

    /// Flip the mute flag and return the new value
    ///
    /// Unmuting replays the last utterance.
    fn toggle_mute(&self) -> bool;

    /// Whether output is muted
    fn is_muted(&self) -> bool;
}
