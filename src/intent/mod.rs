//! Voice-command intent parsing for the task list
//!
//! Maps a raw transcript to a [`TaskCommand`] using a fixed, ordered keyword
//! table. Nothing here is learned: the rules are phrase heuristics tuned for
//! short spoken commands such as "add buy milk to my to-do list".
//!
//! Classification runs on [`normalize`]d text and matches keywords on word
//! boundaries, so "address" never reads as "add" and "output" never as "put".

mod extract;
mod matching;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

pub use extract::extract_task;
pub use matching::{DEFAULT_MATCH_THRESHOLD, best_match};

static PUNCTUATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Task-list nouns, in normalized form ("to-do" becomes "to do")
const TASK_NOUNS: &[&str] = &[
    "todo", "todos", "to do", "to dos", "task", "tasks", "task list",
];

/// Action verbs accepted by the prefilter
const ACTION_VERBS: &[&str] = &[
    "add", "put", "remind me to", "remove", "delete", "take off", "cross off", "list", "show",
    "clear",
];

const ADD_KEYWORDS: &[&str] = &["remind me to", "add", "put"];

const REMOVE_KEYWORDS: &[&str] = &["remove", "delete", "take off", "cross off"];

/// List verbs only count when a task-list noun is also present
const LIST_KEYWORDS: &[&str] = &[
    "list",
    "show",
    "read",
    "what",
    "whats on my",
    "what is on my",
    "what are my",
    "whats in my",
];

const CLEAR_KEYWORDS: &[&str] = &["clear completed", "clear done", "clear finished", "clear"];

/// Classified purpose of an utterance with respect to the task list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    /// Add a new task
    Add,
    /// Remove an existing task
    Remove,
    /// Read the task list back
    List,
    /// Delete every completed task
    Clear,
    /// Not a task-list command
    None,
}

impl Intent {
    /// Lowercase name used in logs and CLI output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::List => "list",
            Self::Clear => "clear",
            Self::None => "none",
        }
    }

    /// Whether the command carries task text
    #[must_use]
    pub const fn takes_text(self) -> bool {
        matches!(self, Self::Add | Self::Remove)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured result of parsing an utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    /// Classified intent
    pub intent: Intent,
    /// Extracted task text; empty for list/clear/none or when nothing was left
    pub task_text: String,
}

impl TaskCommand {
    /// A command that does not touch the task list
    #[must_use]
    pub const fn none() -> Self {
        Self {
            intent: Intent::None,
            task_text: String::new(),
        }
    }

    /// Whether this utterance should be handled as a task-list command
    #[must_use]
    pub fn is_task_command(&self) -> bool {
        self.intent != Intent::None
    }

    /// An add/remove command whose task text could not be recovered
    ///
    /// The caller should ask the user to repeat rather than act.
    #[must_use]
    pub fn needs_clarification(&self) -> bool {
        self.intent.takes_text() && self.task_text.is_empty()
    }
}

/// Parse a transcript into a task command
#[must_use]
pub fn parse(text: &str) -> TaskCommand {
    let intent = classify(text);
    let task_text = if intent.takes_text() {
        extract_task(text, intent)
    } else {
        String::new()
    };

    tracing::debug!(%intent, task = %task_text, "parsed utterance");
    TaskCommand { intent, task_text }
}

/// Classify a transcript against the ordered keyword groups
///
/// Groups are checked add → remove → list → clear and the first match wins.
#[must_use]
pub fn classify(text: &str) -> Intent {
    let normalized = normalize(text);
    if normalized.is_empty() {
        return Intent::None;
    }

    let has_noun = contains_any(&normalized, TASK_NOUNS);
    if !has_noun && !contains_any(&normalized, ACTION_VERBS) {
        return Intent::None;
    }

    if contains_any(&normalized, ADD_KEYWORDS) {
        Intent::Add
    } else if contains_any(&normalized, REMOVE_KEYWORDS) {
        Intent::Remove
    } else if has_noun && contains_any(&normalized, LIST_KEYWORDS) {
        Intent::List
    } else if contains_any(&normalized, CLEAR_KEYWORDS) {
        Intent::Clear
    } else {
        Intent::None
    }
}

/// Lowercase, turn dashes into spaces, drop punctuation, collapse whitespace
#[must_use]
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase().replace(['-', '\u{2013}', '\u{2014}'], " ");
    let stripped = PUNCTUATION.replace_all(&lower, "");
    WHITESPACE.replace_all(stripped.trim(), " ").into_owned()
}

/// Find a phrase in normalized text on word boundaries, returning its byte offset
pub(crate) fn find_phrase(normalized: &str, phrase: &str) -> Option<usize> {
    let padded = format!(" {normalized} ");
    padded.find(&format!(" {phrase} "))
}

fn contains_any(normalized: &str, phrases: &[&str]) -> bool {
    phrases
        .iter()
        .any(|phrase| find_phrase(normalized, phrase).is_some())
}
