//! Microphone command recorder

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{MicStream, Recorder, SpeechToText, rms, samples_to_wav};
use crate::{Error, Result};

/// Below this RMS the recording is treated as silence and not transcribed
const SILENCE_RMS: f32 = 0.01;

/// Recordings shorter than this many milliseconds are discarded
const MIN_RECORDING_MS: usize = 250;

/// Records from the default microphone and transcribes with Whisper
pub struct MicRecorder {
    stt: Arc<SpeechToText>,
    stream: Mutex<Option<MicStream>>,
}

impl MicRecorder {
    #[must_use]
    pub const fn new(stt: Arc<SpeechToText>) -> Self {
        Self {
            stt,
            stream: Mutex::new(None),
        }
    }

    fn take_stream(&self) -> Option<MicStream> {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[async_trait]
impl Recorder for MicRecorder {
    async fn start_listening(&self) -> Result<()> {
        if self.is_recording() {
            return Ok(());
        }

        let stream = tokio::task::spawn_blocking(MicStream::open)
            .await
            .map_err(|e| Error::Audio(format!("capture task failed: {e}")))??;

        let previous = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(stream);
        drop(previous);

        tracing::info!("recording started");
        Ok(())
    }

    async fn stop_and_transcribe(&self) -> Result<String> {
        let Some(stream) = self.take_stream() else {
            tracing::debug!("not recording, nothing to transcribe");
            return Ok(String::new());
        };

        let sample_rate = stream.sample_rate();
        let samples = tokio::task::spawn_blocking(move || stream.close())
            .await
            .map_err(|e| Error::Audio(format!("capture task failed: {e}")))?;

        let min_samples = MIN_RECORDING_MS * sample_rate as usize / 1000;
        let level = rms(&samples);
        if samples.len() < min_samples || level < SILENCE_RMS {
            tracing::debug!(samples = samples.len(), level, "recording is silent, skipping STT");
            return Ok(String::new());
        }

        tracing::info!(samples = samples.len(), level, "recording stopped, transcribing");
        let wav = samples_to_wav(&samples, sample_rate)?;
        self.stt.transcribe(&wav).await
    }

    fn stop(&self) {
        if self.take_stream().is_some() {
            tracing::debug!("recording abandoned");
        }
    }

    fn is_recording(&self) -> bool {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
