//! Voice session controller
//!
//! A session starts with the wake phrase (or a manual activation), runs one
//! or more listen → think → speak exchanges and ends back in
//! [`SessionState::Idle`] with the wake source re-armed.
//!
//! Every external trigger is a message on one command queue consumed by a
//! single task, so state, timers and the continuation flag have exactly one
//! writer. Background work (capture windows, transcription, model queries,
//! playback, timers) runs in spawned tasks that post their result back as a
//! command tagged with the counter value it was started under; a result
//! whose tag is stale is dropped.

pub mod classify;
mod controller;
mod state;

use std::sync::Arc;
use std::time::Duration;

pub use controller::SessionController;
pub use state::SessionState;

use crate::config::Config;
use crate::responder::Responder;
use crate::tasks::TaskStore;
use crate::voice::{Recorder, SpeechOutput, WakeSupervisor};

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Phase changed
    Status(SessionState),
    /// What the user said
    Transcript(String),
    /// Text shown (and usually spoken) in reply
    Response(String),
    /// The task list was modified by a voice command
    TasksChanged,
    /// Speech output mute flag changed
    Muted(bool),
}

/// Capabilities the controller drives
pub struct Collaborators {
    pub supervisor: Arc<WakeSupervisor>,
    pub recorder: Arc<dyn Recorder>,
    pub speaker: Arc<dyn SpeechOutput>,
    pub responder: Arc<dyn Responder>,
    pub tasks: Arc<TaskStore>,
}

/// Timing and matching parameters
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Phrase that counts as a barge-in during playback
    pub wake_phrase: String,
    /// Inactivity limit before the session is forced idle
    pub timeout: Duration,
    pub capture_window: Duration,
    pub interrupt_window: Duration,
    /// Pause before a capture window opens
    pub handoff_delay: Duration,
    pub query_timeout: Duration,
    /// Pause before the microphone is reopened after a release: re-arming
    /// the wake source on idle, or an interrupt window
    pub settle_delay: Duration,
    /// Minimum word overlap for spoken task removal
    pub match_threshold: f64,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            wake_phrase: config.assistant.wake_phrase.clone(),
            timeout: config.session.timeout,
            capture_window: config.session.capture_window,
            interrupt_window: config.session.interrupt_window,
            handoff_delay: config.session.handoff_delay,
            query_timeout: config.session.query_timeout,
            settle_delay: config.device.settle_delay,
            match_threshold: config.tasks.match_threshold,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}
