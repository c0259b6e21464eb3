//! Ryo - voice-activated desktop assistant
//!
//! This library provides the core of the assistant:
//! - Session control (wake → listen → think → speak, with barge-in)
//! - Intent parsing for spoken task commands
//! - A persistent task list with fuzzy spoken removal
//! - Pluggable language model backends
//! - Voice capabilities (wake word, capture, STT, TTS) behind feature `audio`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 Presentation / CLI                   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ SessionEvent / commands
//! ┌────────────────────▼────────────────────────────────┐
//! │               Session Controller                     │
//! │   Intent Parser  │  Task Store  │  Model Registry   │
//! └────────────────────┬────────────────────────────────┘
//!                      │ capability traits
//! ┌────────────────────▼────────────────────────────────┐
//! │   Wake Supervisor │ Recorder │ Speech Output        │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod intent;
pub mod responder;
pub mod session;
pub mod tasks;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use intent::{Intent, TaskCommand};
pub use responder::{ModelRegistry, Responder};
pub use session::{Collaborators, SessionController, SessionEvent, SessionSettings, SessionState};
pub use tasks::{Priority, Task, TaskStore};
