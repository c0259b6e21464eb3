//! Wake phrase detection
//!
//! Two stages: a local energy gate cuts the microphone stream into speech
//! segments, then each segment's transcript is checked for the wake phrase.

use super::rms;
use crate::intent::normalize;

/// Minimum audio energy to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum speech length worth transcribing, in milliseconds
const MIN_SPEECH_MS: usize = 300;

/// Trailing silence that ends a segment, in milliseconds
const SILENCE_MS: usize = 500;

/// Longest segment kept before it is forced out, in milliseconds
const MAX_SEGMENT_MS: usize = 4000;

/// State of the wake phrase detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    /// Waiting for speech
    Idle,
    /// Speech detected, accumulating a segment
    Listening,
    /// Wake phrase confirmed in a transcript
    Triggered,
}

/// Segments speech and matches transcripts against the wake phrase
pub struct WakeWordDetector {
    wake_phrase: String,
    state: DetectorState,
    speech_buffer: Vec<f32>,
    speech_samples: usize,
    silence_counter: usize,
    min_speech: usize,
    silence_limit: usize,
    max_segment: usize,
}

impl WakeWordDetector {
    /// Create a detector for `wake_phrase` on audio at `sample_rate`
    #[must_use]
    pub fn new(wake_phrase: &str, sample_rate: u32) -> Self {
        let per_ms = sample_rate as usize / 1000;
        let wake_phrase = normalize(wake_phrase);

        tracing::debug!(wake_phrase = %wake_phrase, sample_rate, "wake word detector initialized");

        Self {
            wake_phrase,
            state: DetectorState::Idle,
            speech_buffer: Vec::new(),
            speech_samples: 0,
            silence_counter: 0,
            min_speech: MIN_SPEECH_MS * per_ms,
            silence_limit: SILENCE_MS * per_ms,
            max_segment: MAX_SEGMENT_MS * per_ms,
        }
    }

    /// Feed a block of samples
    ///
    /// Returns true when a complete speech segment is ready in
    /// [`WakeWordDetector::take_speech_buffer`].
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            DetectorState::Idle => {
                if is_speech {
                    self.state = DetectorState::Listening;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.speech_samples = samples.len();
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected, listening");
                }
            }
            DetectorState::Listening => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.speech_samples += samples.len();
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                tracing::trace!(
                    buffer_len = self.speech_buffer.len(),
                    silence = self.silence_counter,
                    is_speech,
                    energy,
                    "listening state"
                );

                let long_enough = self.speech_samples > self.min_speech;
                if long_enough
                    && (self.silence_counter > self.silence_limit
                        || self.speech_buffer.len() > self.max_segment)
                {
                    tracing::debug!(samples = self.speech_buffer.len(), "speech segment complete");
                    return true;
                }

                // Too much silence without enough speech
                if self.silence_counter > self.silence_limit * 2 {
                    tracing::trace!("timeout - resetting");
                    self.reset();
                }
            }
            DetectorState::Triggered => {}
        }

        false
    }

    /// Check a segment transcript for the wake phrase
    ///
    /// Matches on normalized words, so "Hey, Ryo!" matches "hey ryo". A miss
    /// resets the detector for the next segment.
    pub fn check_wake_word(&mut self, transcript: &str) -> bool {
        let heard = format!(" {} ", normalize(transcript));
        if !self.wake_phrase.is_empty() && heard.contains(&format!(" {} ", self.wake_phrase)) {
            tracing::info!(wake_phrase = %self.wake_phrase, transcript, "wake word detected");
            self.state = DetectorState::Triggered;
            return true;
        }

        self.reset();
        false
    }

    /// Take the speech buffer, clearing it
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        std::mem::take(&mut self.speech_buffer)
    }

    /// Reset detector to idle state
    pub fn reset(&mut self) {
        self.state = DetectorState::Idle;
        self.speech_buffer.clear();
        self.speech_samples = 0;
        self.silence_counter = 0;
    }

    /// Get current state
    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::SAMPLE_RATE;

    #[test]
    fn test_wake_word_detection() {
        let mut detector = WakeWordDetector::new("Hey Ryo", SAMPLE_RATE);

        assert!(!detector.check_wake_word("hello world"));
        assert_eq!(detector.state(), DetectorState::Idle);

        assert!(!detector.check_wake_word("they ryota"));

        assert!(detector.check_wake_word("Hey, Ryo! What's up?"));
        assert_eq!(detector.state(), DetectorState::Triggered);
    }

    #[test]
    fn test_segment_after_silence() {
        let mut detector = WakeWordDetector::new("hey ryo", SAMPLE_RATE);
        let speech = vec![0.2f32; 1600];
        let silence = vec![0.0f32; 1600];

        // 0.5s of speech
        for _ in 0..5 {
            assert!(!detector.process(&speech));
        }
        assert_eq!(detector.state(), DetectorState::Listening);

        // silence until the segment closes
        let closed = (0..10).any(|_| detector.process(&silence));
        assert!(closed);
        assert!(detector.take_speech_buffer().len() > 8000);
    }

    #[test]
    fn test_short_noise_resets() {
        let mut detector = WakeWordDetector::new("hey ryo", SAMPLE_RATE);
        detector.process(&[0.2f32; 800]);
        for _ in 0..20 {
            assert!(!detector.process(&[0.0f32; 1600]));
        }
        assert_eq!(detector.state(), DetectorState::Idle);
    }
}
