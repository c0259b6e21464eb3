//! Spoken replies for voice-driven task commands

use super::{Task, TaskStore};
use crate::Result;
use crate::intent::{Intent, TaskCommand};

/// Pending tasks read aloud before the summary stops listing them
const MAX_SPOKEN_PENDING: usize = 5;

/// Summarize the list for speech
#[must_use]
pub fn summarize(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "You have no tasks in your todo list.".to_string();
    }

    let pending: Vec<&str> = tasks
        .iter()
        .filter(|t| !t.completed)
        .map(|t| t.text.as_str())
        .collect();
    let completed = tasks.len() - pending.len();

    let mut reply = format!("You have {} tasks total.", tasks.len());
    if !pending.is_empty() {
        let shown = &pending[..pending.len().min(MAX_SPOKEN_PENDING)];
        reply.push_str(&format!(" {} pending: {}", pending.len(), shown.join(", ")));
    }
    match (pending.is_empty(), completed) {
        (_, 0) => reply.push('.'),
        (true, n) => reply.push_str(&format!(" {n} completed tasks.")),
        (false, n) => reply.push_str(&format!(" and {n} completed tasks.")),
    }
    reply
}

/// Outcome of a voice task command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReply {
    /// Confirmation or clarification to speak
    pub text: String,
    /// Whether the stored list was modified
    pub changed: bool,
}

impl TaskReply {
    fn unchanged(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            changed: false,
        }
    }

    fn changed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            changed: true,
        }
    }
}

/// Execute a parsed task command and return the reply to speak
///
/// Add/remove commands with no recoverable text produce a clarification
/// request instead of touching the store.
///
/// # Errors
///
/// Returns error if the store cannot be saved
pub fn apply_command(store: &TaskStore, command: &TaskCommand, threshold: f64) -> Result<TaskReply> {
    let text = command.task_text.as_str();
    let reply = match command.intent {
        Intent::Add if text.is_empty() => {
            TaskReply::unchanged("I didn't catch what to add. Please try again.")
        }
        Intent::Add => {
            let task = store.add(text)?;
            TaskReply::changed(format!("Added task: {}", task.text))
        }
        Intent::Remove if text.is_empty() => {
            TaskReply::unchanged("I didn't catch what to remove. Please try again.")
        }
        Intent::Remove => match store.remove_matching(text, threshold)? {
            Some(task) => TaskReply::changed(format!("Removed task: {}", task.text)),
            None => TaskReply::unchanged(format!("Couldn't find task: {text}")),
        },
        Intent::List => TaskReply::unchanged(summarize(&store.list())),
        Intent::Clear => {
            let removed = store.clear_completed()?;
            TaskReply {
                text: format!("Cleared {removed} completed tasks"),
                changed: removed > 0,
            }
        }
        Intent::None => TaskReply::unchanged(String::new()),
    };
    Ok(reply)
}
