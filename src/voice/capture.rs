//! Audio capture from microphone
//!
//! cpal streams are not `Send`, so each [`MicStream`] owns a dedicated thread
//! that opens the device, keeps the stream alive and drops it on close. The
//! open result is handed back over a channel, which lets a busy device
//! surface as an error from [`MicStream::open`].

use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use cpal::SampleRate;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::is_busy_message;
use crate::{Error, Result};

/// Preferred sample rate for capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// An open microphone stream buffering mono f32 samples
pub struct MicStream {
    buffer: Arc<Mutex<Vec<f32>>>,
    sample_rate: u32,
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl MicStream {
    /// Open the default input device and start buffering
    ///
    /// Blocks until the device is open; call from `spawn_blocking` in async
    /// code.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceBusy` if the driver reports contention, or
    /// `Error::Audio` for any other failure
    pub fn open() -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();

        let thread_buffer = Arc::clone(&buffer);
        let thread = std::thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let stream = match build_stream(thread_buffer) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Sender dropped or stop requested
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| Error::Audio("capture thread exited during open".to_string()))??;

        tracing::debug!(sample_rate, "audio capture started");
        Ok(Self {
            buffer,
            sample_rate,
            stop_tx,
            thread: Some(thread),
        })
    }

    /// Sample rate of the buffered audio
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Take the samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of samples waiting in the buffer
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Release the device, returning whatever was still buffered
    ///
    /// Blocks until the capture thread has dropped the stream.
    #[must_use]
    pub fn close(mut self) -> Vec<f32> {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        self.take_buffer()
    }
}

impl Drop for MicStream {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Open the input stream, preferring mono at [`SAMPLE_RATE`]
fn build_stream(buffer: Arc<Mutex<Vec<f32>>>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    let preferred = device
        .supported_input_configs()
        .map_err(device_error)?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)));

    // Fall back to the device default and downmix
    let supported = match preferred {
        Some(config) => config,
        None => device.default_input_config().map_err(device_error)?,
    };
    let config = supported.config();
    let channels = usize::from(config.channels.max(1));
    let sample_rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "audio capture initialized"
    );

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                if channels == 1 {
                    buf.extend_from_slice(data);
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    buf.extend(
                        data.chunks(channels)
                            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
                    );
                }
            },
            |err| {
                tracing::error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(device_error)?;

    stream.play().map_err(device_error)?;
    Ok((stream, sample_rate))
}

/// Classify a cpal error, keeping busy-device failures distinguishable
fn device_error(e: impl std::fmt::Display) -> Error {
    let message = e.to_string();
    if is_busy_message(&message) || message.contains("not available") {
        Error::DeviceBusy(message)
    } else {
        Error::Audio(message)
    }
}

/// RMS level of a block of samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        assert!(rms(&[0.0; 100]) < 0.001);
        assert!(rms(&[0.5; 100]) > 0.4);
        assert!(rms(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_wav_header() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5, 1.0], SAMPLE_RATE).unwrap();
        assert_eq!(&wav[..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 4 samples * 2 bytes
        assert_eq!(wav.len(), 52);
    }

    #[test]
    fn test_busy_classification() {
        assert!(matches!(
            device_error("The requested device is no longer available"),
            Error::DeviceBusy(_)
        ));
        assert!(matches!(device_error("Device or resource busy"), Error::DeviceBusy(_)));
        assert!(matches!(device_error("invalid argument"), Error::Audio(_)));
    }
}
