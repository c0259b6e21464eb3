//! Speech output with mute and replay

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CancelToken, PlaybackOutcome, SpeechOutput};
use crate::Result;

/// Renders text to audio and plays it
#[async_trait]
pub trait VoiceBackend: Send + Sync + 'static {
    /// Synthesize and play `text`, returning early once `cancel` fires
    ///
    /// # Errors
    ///
    /// Returns error if synthesis or playback fails
    async fn play(&self, text: &str, cancel: &CancelToken) -> Result<()>;
}

/// [`SpeechOutput`] over any [`VoiceBackend`]
///
/// Each utterance gets its own [`CancelToken`]; starting a new utterance or
/// calling `stop` cancels the previous one. The last text is remembered even
/// while muted so unmuting can replay it.
pub struct Speaker<B> {
    inner: Arc<Inner<B>>,
}

struct Inner<B> {
    backend: B,
    muted: AtomicBool,
    last_text: Mutex<Option<String>>,
    current: Mutex<CancelToken>,
}

impl<B: VoiceBackend> Speaker<B> {
    #[must_use]
    pub fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                muted: AtomicBool::new(false),
                last_text: Mutex::new(None),
                current: Mutex::new(CancelToken::new()),
            }),
        }
    }

    /// Last text passed to `speak`
    #[must_use]
    pub fn last_text(&self) -> Option<String> {
        self.inner
            .last_text
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<B: VoiceBackend> Inner<B> {
    /// Cancel the running utterance and install a fresh token
    fn next_token(&self) -> CancelToken {
        let token = CancelToken::new();
        let previous = std::mem::replace(
            &mut *self.current.lock().unwrap_or_else(PoisonError::into_inner),
            token.clone(),
        );
        previous.cancel();
        token
    }

    fn cancel_current(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    async fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        *self.last_text.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_string());

        if self.muted.load(Ordering::SeqCst) {
            tracing::debug!("muted, not speaking");
            return Ok(PlaybackOutcome::Muted);
        }

        let token = self.next_token();
        tracing::debug!(chars = text.len(), "speaking");
        self.backend.play(text, &token).await?;

        if token.is_cancelled() {
            tracing::debug!("speech interrupted");
            Ok(PlaybackOutcome::Interrupted)
        } else {
            Ok(PlaybackOutcome::Finished)
        }
    }
}

#[async_trait]
impl<B: VoiceBackend> SpeechOutput for Speaker<B> {
    async fn speak(&self, text: &str) -> Result<PlaybackOutcome> {
        self.inner.speak(text).await
    }

    fn stop(&self) {
        self.inner.cancel_current();
    }

    fn toggle_mute(&self) -> bool {
        let muted = !self.inner.muted.fetch_xor(true, Ordering::SeqCst);
        tracing::info!(muted, "speech output mute toggled");

        if muted {
            self.inner.cancel_current();
            return true;
        }

        if let Some(text) = self.last_text() {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let inner = Arc::clone(&self.inner);
                    handle.spawn(async move {
                        if let Err(e) = inner.speak(&text).await {
                            tracing::warn!(error = %e, "replay after unmute failed");
                        }
                    });
                }
                Err(_) => tracing::debug!("no runtime, skipping replay after unmute"),
            }
        }
        false
    }

    fn is_muted(&self) -> bool {
        self.inner.muted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use super::*;

    /// Plays for a fixed time unless cancelled
    struct Timed {
        duration: Duration,
        plays: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl VoiceBackend for Timed {
        async fn play(&self, _text: &str, cancel: &CancelToken) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            tokio::select! {
                () = tokio::time::sleep(self.duration) => {}
                () = cancel.cancelled() => {}
            }
            Ok(())
        }
    }

    fn speaker(duration: Duration) -> (Arc<Speaker<Timed>>, Arc<AtomicUsize>) {
        let plays = Arc::new(AtomicUsize::new(0));
        let speaker = Speaker::new(Timed {
            duration,
            plays: Arc::clone(&plays),
        });
        (Arc::new(speaker), plays)
    }

    #[tokio::test(start_paused = true)]
    async fn test_speak_finishes() {
        let (speaker, plays) = speaker(Duration::from_secs(2));
        assert_eq!(speaker.speak("hello").await.unwrap(), PlaybackOutcome::Finished);
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_interrupts() {
        let (speaker, _) = speaker(Duration::from_secs(30));
        let task = {
            let speaker = Arc::clone(&speaker);
            tokio::spawn(async move { speaker.speak("a long answer").await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        speaker.stop();

        assert_eq!(task.await.unwrap().unwrap(), PlaybackOutcome::Interrupted);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_harmless() {
        let (speaker, _) = speaker(Duration::from_millis(1));
        speaker.stop();
        speaker.stop();
        assert_eq!(speaker.speak("hi").await.unwrap(), PlaybackOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mute_remembers_and_replays() {
        let (speaker, plays) = speaker(Duration::from_millis(10));

        assert!(speaker.toggle_mute());
        assert_eq!(speaker.speak("remember me").await.unwrap(), PlaybackOutcome::Muted);
        assert_eq!(plays.load(Ordering::SeqCst), 0);
        assert_eq!(speaker.last_text().as_deref(), Some("remember me"));

        assert!(!speaker.toggle_mute());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }
}
