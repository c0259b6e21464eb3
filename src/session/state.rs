//! Session phases

use std::fmt;

/// Current phase of the voice session
///
/// Exactly one phase is active at a time; every change goes through the
/// controller's command loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Waiting for the wake phrase
    #[default]
    Idle,
    /// Recording a command
    ListeningActive,
    /// Transcribing or waiting on a response
    Thinking,
    /// Playing a reply
    Speaking,
}

impl SessionState {
    /// Status text shown to the user
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ListeningActive => "Listening (Active)",
            Self::Thinking => "Thinking",
            Self::Speaking => "Speaking",
        }
    }

    /// Whether a session is in progress
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
