//! Persistent task list
//!
//! The store keeps an ordered list of [`Task`] records behind a mutex so the
//! voice pipeline and the CLI can mutate it concurrently. Every mutation
//! rewrites the whole JSON document (temp file + rename).

mod speech;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::intent::best_match;
use crate::{Error, Result};

pub use speech::{TaskReply, apply_command, summarize};

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl std::str::FromStr for Priority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "medium" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(Error::Task(format!("unknown priority: {other}"))),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        };
        f.write_str(s)
    }
}

/// A single task record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub created: DateTime<Local>,
    #[serde(default)]
    pub priority: Priority,
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.completed { '✓' } else { '○' };
        let marker = if self.priority == Priority::High {
            '⚡'
        } else {
            '●'
        };
        write!(f, "{status} {marker} {}", self.text)
    }
}

/// Aggregate counts over the task list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percentage of completed tasks, 0.0 when the list is empty
    pub completion_rate: f64,
}

/// On-disk document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TaskDocument {
    next_id: u64,
    tasks: Vec<Task>,
}

/// Accepts both the current document and a bare array of tasks
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredTasks {
    Document(TaskDocument),
    Legacy(Vec<Task>),
}

/// Thread-safe, file-backed task list
///
/// Ids come from a counter persisted with the list, so a deleted id is never
/// handed out again.
#[derive(Debug)]
pub struct TaskStore {
    path: Option<PathBuf>,
    inner: Mutex<TaskDocument>,
}

impl TaskStore {
    /// Open the store at `path`, creating an empty list if the file is missing
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            parse_document(&contents)?
        } else {
            TaskDocument {
                next_id: 1,
                tasks: Vec::new(),
            }
        };

        tracing::debug!(
            path = %path.display(),
            tasks = doc.tasks.len(),
            next_id = doc.next_id,
            "task store opened"
        );

        Ok(Self {
            path: Some(path),
            inner: Mutex::new(doc),
        })
    }

    /// A store that never touches the filesystem
    #[must_use]
    pub const fn in_memory() -> Self {
        Self {
            path: None,
            inner: Mutex::new(TaskDocument {
                next_id: 1,
                tasks: Vec::new(),
            }),
        }
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append a new pending task
    ///
    /// # Errors
    ///
    /// Returns error if the text is blank or the list cannot be saved
    pub fn add(&self, text: &str) -> Result<Task> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::Task("task text is empty".to_string()));
        }

        let task = self.commit(|doc| {
            let task = Task {
                id: doc.next_id,
                text: text.to_string(),
                completed: false,
                created: Local::now(),
                priority: Priority::Normal,
            };
            doc.next_id += 1;
            doc.tasks.push(task.clone());
            Some(task)
        })?
        .ok_or_else(|| Error::Task("task was not added".to_string()))?;

        tracing::info!(id = task.id, text = %task.text, "task added");
        Ok(task)
    }

    /// Delete a task by id, returning it if it existed
    ///
    /// # Errors
    ///
    /// Returns error if the list cannot be saved
    pub fn delete(&self, id: u64) -> Result<Option<Task>> {
        let removed = self.commit(|doc| {
            let idx = doc.tasks.iter().position(|t| t.id == id)?;
            Some(doc.tasks.remove(idx))
        })?;

        if let Some(task) = &removed {
            tracing::info!(id, text = %task.text, "task deleted");
        }
        Ok(removed)
    }

    /// Flip a task's completion flag, returning the new value
    ///
    /// # Errors
    ///
    /// Returns error if the list cannot be saved
    pub fn toggle(&self, id: u64) -> Result<Option<bool>> {
        let completed = self.commit(|doc| {
            let task = doc.tasks.iter_mut().find(|t| t.id == id)?;
            task.completed = !task.completed;
            Some(task.completed)
        })?;

        if let Some(completed) = completed {
            tracing::info!(id, completed, "task toggled");
        }
        Ok(completed)
    }

    /// Change a task's priority; returns false if the id is unknown
    ///
    /// # Errors
    ///
    /// Returns error if the list cannot be saved
    pub fn set_priority(&self, id: u64, priority: Priority) -> Result<bool> {
        let changed = self
            .commit(|doc| {
                let task = doc.tasks.iter_mut().find(|t| t.id == id)?;
                task.priority = priority;
                Some(())
            })?
            .is_some();

        if changed {
            tracing::info!(id, %priority, "task priority changed");
        }
        Ok(changed)
    }

    /// Snapshot of all tasks in insertion order
    #[must_use]
    pub fn list(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// Delete every completed task, returning how many were removed
    ///
    /// Calling it again with nothing completed is a no-op and does not
    /// rewrite the file.
    ///
    /// # Errors
    ///
    /// Returns error if the list cannot be saved
    pub fn clear_completed(&self) -> Result<usize> {
        let removed = self
            .commit(|doc| {
                let before = doc.tasks.len();
                doc.tasks.retain(|t| !t.completed);
                let removed = before - doc.tasks.len();
                (removed > 0).then_some(removed)
            })?
            .unwrap_or(0);

        if removed > 0 {
            tracing::info!(removed, "cleared completed tasks");
        }
        Ok(removed)
    }

    /// Delete the task that best matches a spoken description
    ///
    /// See [`best_match`] for the matching tiers.
    ///
    /// # Errors
    ///
    /// Returns error if the list cannot be saved
    pub fn remove_matching(&self, spoken: &str, threshold: f64) -> Result<Option<Task>> {
        let removed = self.commit(|doc| {
            let texts: Vec<&str> = doc.tasks.iter().map(|t| t.text.as_str()).collect();
            let idx = best_match(&texts, spoken, threshold)?;
            Some(doc.tasks.remove(idx))
        })?;

        match &removed {
            Some(task) => {
                tracing::info!(id = task.id, text = %task.text, spoken, "task removed by match");
            }
            None => tracing::debug!(spoken, "no task matched"),
        }
        Ok(removed)
    }

    /// Number of completed tasks
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.lock().tasks.iter().filter(|t| t.completed).count()
    }

    /// Number of pending tasks
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().tasks.iter().filter(|t| !t.completed).count()
    }

    /// Totals and completion percentage
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> TaskStats {
        let doc = self.lock();
        let total = doc.tasks.len();
        let completed = doc.tasks.iter().filter(|t| t.completed).count();
        let completion_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64 * 100.0
        };

        TaskStats {
            total,
            completed,
            pending: total - completed,
            completion_rate,
        }
    }

    /// Apply `change` to a copy of the document and keep it once saved
    ///
    /// `None` from `change` means nothing changed and nothing is written. A
    /// failed save leaves the in-memory list untouched.
    fn commit<T>(&self, change: impl FnOnce(&mut TaskDocument) -> Option<T>) -> Result<Option<T>> {
        let mut doc = self.lock();
        let mut next = doc.clone();
        let Some(out) = change(&mut next) else {
            return Ok(None);
        };
        self.save(&next)?;
        *doc = next;
        Ok(Some(out))
    }

    fn lock(&self) -> MutexGuard<'_, TaskDocument> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Rewrite the whole document atomically
    fn save(&self, doc: &TaskDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(doc)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;

        tracing::trace!(path = %path.display(), tasks = doc.tasks.len(), "task list saved");
        Ok(())
    }
}

fn parse_document(contents: &str) -> Result<TaskDocument> {
    if contents.trim().is_empty() {
        return Ok(TaskDocument {
            next_id: 1,
            tasks: Vec::new(),
        });
    }

    let doc = match serde_json::from_str::<StoredTasks>(contents)? {
        StoredTasks::Document(doc) => doc,
        StoredTasks::Legacy(tasks) => TaskDocument { next_id: 0, tasks },
    };

    // Never hand out an id at or below one already in the list
    let floor = doc.tasks.iter().map(|t| t.id).max().unwrap_or(0) + 1;
    Ok(TaskDocument {
        next_id: doc.next_id.max(floor),
        tasks: doc.tasks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_rejects_blank() {
        let store = TaskStore::in_memory();
        assert!(store.add("   ").is_err());
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_ids_never_reused() {
        let store = TaskStore::in_memory();
        store.add("one").unwrap();
        let two = store.add("two").unwrap();
        store.add("three").unwrap();
        store.delete(two.id).unwrap();

        let four = store.add("four").unwrap();
        assert_eq!(four.id, 4);
    }

    #[test]
    fn test_toggle_unknown_id() {
        let store = TaskStore::in_memory();
        assert_eq!(store.toggle(42).unwrap(), None);
        assert!(store.delete(42).unwrap().is_none());
        assert!(!store.set_priority(42, Priority::High).unwrap());
    }

    #[test]
    fn test_stats() {
        let store = TaskStore::in_memory();
        assert!(store.stats().completion_rate.abs() < f64::EPSILON);

        let a = store.add("a").unwrap();
        store.add("b").unwrap();
        store.add("c").unwrap();
        store.add("d").unwrap();
        store.toggle(a.id).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 3);
        assert!((stats.completion_rate - 25.0).abs() < f64::EPSILON);
        assert_eq!(store.completed_count(), 1);
        assert_eq!(store.pending_count(), 3);
    }

    #[test]
    fn test_display() {
        let mut task = Task {
            id: 1,
            text: "Buy milk".to_string(),
            completed: false,
            created: Local::now(),
            priority: Priority::Normal,
        };
        assert_eq!(task.to_string(), "○ ● Buy milk");

        task.completed = true;
        task.priority = Priority::High;
        assert_eq!(task.to_string(), "✓ ⚡ Buy milk");
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!("medium".parse::<Priority>().unwrap(), Priority::Normal);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_legacy_array_accepted() {
        let json = r#"[
            {"id": 3, "text": "Call mom", "completed": false, "created": "2024-05-01T10:00:00+00:00"},
            {"id": 7, "text": "Buy milk", "completed": true, "created": "2024-05-01T10:05:00+00:00", "priority": "high"}
        ]"#;
        let doc = parse_document(json).unwrap();
        assert_eq!(doc.tasks.len(), 2);
        assert_eq!(doc.next_id, 8);
        assert_eq!(doc.tasks[0].priority, Priority::Normal);
        assert_eq!(doc.tasks[1].priority, Priority::High);
    }

    #[test]
    fn test_counter_never_below_existing_ids() {
        let json = r#"{"next_id": 2, "tasks": [
            {"id": 5, "text": "x", "completed": false, "created": "2024-05-01T10:00:00+00:00", "priority": "low"}
        ]}"#;
        assert_eq!(parse_document(json).unwrap().next_id, 6);
        assert_eq!(parse_document("").unwrap().next_id, 1);
    }
}
