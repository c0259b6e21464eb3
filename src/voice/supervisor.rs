//! Wake source lifecycle under microphone contention
//!
//! Audio drivers often report the microphone as busy for a moment after
//! another stream released it. Starting the wake source therefore goes
//! through a bounded retry loop that only retries busy-device failures.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::{WakeCallback, WakeWordSource};
use crate::config::DeviceConfig;

/// Retry policy for starting the wake source
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total start attempts, including the first
    pub max_attempts: u32,
    /// Wait between attempts after a busy failure
    pub retry_delay: Duration,
    /// Pause between stop and start in [`WakeSupervisor::force_restart`]
    pub force_restart_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeviceConfig::default())
    }
}

impl From<&DeviceConfig> for RetryPolicy {
    fn from(config: &DeviceConfig) -> Self {
        Self {
            max_attempts: config.max_retries,
            retry_delay: config.retry_delay,
            force_restart_delay: config.force_restart_delay,
        }
    }
}

/// Starts, stops and retries a [`WakeWordSource`]
///
/// `stop` bumps a generation counter, so a retry loop that is sleeping
/// between attempts gives up instead of grabbing the microphone from the
/// session that just stopped it.
pub struct WakeSupervisor {
    source: Arc<dyn WakeWordSource>,
    policy: RetryPolicy,
    generation: AtomicU64,
}

impl WakeSupervisor {
    #[must_use]
    pub fn new(source: Arc<dyn WakeWordSource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            generation: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Whether the wake source is listening
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.source.is_running()
    }

    /// Start the wake source, retrying while the microphone is busy
    ///
    /// Returns whether the source ended up running. Exhausting the attempts
    /// leaves the assistant without wake-word capability until the next
    /// restart; a failure that is not device contention ends the loop at
    /// once, since waiting will not fix it. Never panics and never returns
    /// an error.
    pub async fn start_with_retry(&self, on_wake: WakeCallback) -> bool {
        let generation = self.generation.load(Ordering::SeqCst);
        let max = self.policy.max_attempts.max(1);

        for attempt in 1..=max {
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(attempt, "wake source start cancelled");
                return false;
            }
            if self.source.is_running() {
                tracing::debug!("wake source already running");
                return true;
            }

            match self.source.start(Arc::clone(&on_wake)).await {
                Ok(()) => {
                    if self.generation.load(Ordering::SeqCst) != generation {
                        // stopped while we were starting
                        self.source.stop();
                        return false;
                    }
                    tracing::info!(attempt, "wake word detection started");
                    return true;
                }
                Err(e) if e.is_device_busy() => {
                    if attempt < max {
                        tracing::info!(
                            attempt,
                            max_attempts = max,
                            delay_secs = self.policy.retry_delay.as_secs_f32(),
                            error = %e,
                            "microphone busy, retrying wake word start"
                        );
                        tokio::time::sleep(self.policy.retry_delay).await;
                    } else {
                        tracing::debug!(attempt, error = %e, "microphone busy on last attempt");
                    }
                }
                Err(e) => {
                    tracing::error!(attempt, error = %e, "wake word detection failed to start");
                    return false;
                }
            }
        }

        tracing::warn!(
            attempts = max,
            "microphone still busy, wake word detection disabled until restart"
        );
        false
    }

    /// Stop the wake source and cancel any pending retry loop; idempotent
    pub fn stop(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.source.stop();
    }

    /// Stop unconditionally, pause, then start again
    pub async fn force_restart(&self, on_wake: WakeCallback) -> bool {
        tracing::info!("force restarting wake word detection");
        self.stop();
        tokio::time::sleep(self.policy.force_restart_delay).await;
        self.start_with_retry(on_wake).await
    }
}
