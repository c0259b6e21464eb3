//! Microphone wake phrase source

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    MicStream, SpeechToText, WakeCallback, WakeWordDetector, WakeWordSource, samples_to_wav,
};
use crate::{Error, Result};

/// How often buffered audio is fed to the detector
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Listens on the default microphone for the wake phrase
///
/// Holds the microphone while running. On detection it releases the device,
/// marks itself stopped, then fires the callback.
pub struct MicWakeSource {
    inner: Arc<Inner>,
}

struct Inner {
    stt: Arc<SpeechToText>,
    wake_phrase: String,
    running: AtomicBool,
    generation: AtomicU64,
    stream: Mutex<Option<MicStream>>,
}

impl MicWakeSource {
    #[must_use]
    pub fn new(stt: Arc<SpeechToText>, wake_phrase: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                stt,
                wake_phrase: wake_phrase.to_string(),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                stream: Mutex::new(None),
            }),
        }
    }
}

impl Inner {
    fn release(&self) {
        self.running.store(false, Ordering::SeqCst);
        let stream = self
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(stream);
    }

    fn take_audio(&self) -> Option<Vec<f32>> {
        self.stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(MicStream::take_buffer)
    }

    /// Feed audio to the detector until the wake phrase is heard or the
    /// generation changes
    async fn listen(self: Arc<Self>, generation: u64, sample_rate: u32, on_wake: WakeCallback) {
        let mut detector = WakeWordDetector::new(&self.wake_phrase, sample_rate);
        let mut ticker = tokio::time::interval(POLL_INTERVAL);

        loop {
            ticker.tick().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!("wake listener stopped");
                return;
            }

            let Some(chunk) = self.take_audio() else {
                return;
            };
            if !detector.process(&chunk) {
                continue;
            }

            let segment = detector.take_speech_buffer();
            let transcript = match samples_to_wav(&segment, sample_rate) {
                Ok(wav) => self.stt.transcribe(&wav).await,
                Err(e) => Err(e),
            };

            match transcript {
                Ok(text) if detector.check_wake_word(&text) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        return;
                    }
                    self.release();
                    on_wake();
                    return;
                }
                Ok(text) => tracing::debug!(transcript = %text, "no wake phrase in segment"),
                Err(e) => {
                    tracing::warn!(error = %e, "wake segment transcription failed");
                    detector.reset();
                }
            }
        }
    }
}

#[async_trait]
impl WakeWordSource for MicWakeSource {
    async fn start(&self, on_wake: WakeCallback) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }

        let stream = tokio::task::spawn_blocking(MicStream::open)
            .await
            .map_err(|e| Error::WakeWord(format!("capture task failed: {e}")))??;
        let sample_rate = stream.sample_rate();

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self
            .inner
            .stream
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(stream);
        self.inner.running.store(true, Ordering::SeqCst);

        tokio::spawn(Arc::clone(&self.inner).listen(generation, sample_rate, on_wake));

        tracing::info!(wake_phrase = %self.inner.wake_phrase, "listening for wake phrase");
        Ok(())
    }

    fn stop(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if self.inner.running.load(Ordering::SeqCst) {
            tracing::debug!("wake source stopping");
        }
        self.inner.release();
    }

    fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
}
