//! Task text extraction from add/remove commands

use std::sync::LazyLock;

use super::{ADD_KEYWORDS, Intent, REMOVE_KEYWORDS, find_phrase, normalize};

/// Prepositions that tie a phrase to the list ("to my list", "from the todo")
const LIST_PREPOSITIONS: &[&str] = &["to", "from", "on", "onto", "off", "in", "into"];

const LIST_DETERMINERS: &[&str] = &["my ", "the ", ""];

const LIST_NOUNS: &[&str] = &[
    "to do list",
    "todo list",
    "task list",
    "to do",
    "todo",
    "tasks",
    "list",
];

/// Politeness fillers that may wrap a command
const FILLERS: &[&str] = &["please", "can you", "could you", "would you", "for me"];

/// Stand-alone words that never belong to a task description
const GENERIC_WORDS: &[&str] = &["todo", "todos", "task", "tasks", "list", "item", "items"];

/// List-membership phrases, longest first
static MEMBERSHIP_PHRASES: LazyLock<Vec<String>> = LazyLock::new(|| {
    let mut phrases = Vec::new();
    for noun in LIST_NOUNS {
        for det in LIST_DETERMINERS {
            for prep in LIST_PREPOSITIONS {
                phrases.push(format!("{prep} {det}{noun}"));
            }
            if !det.is_empty() {
                phrases.push(format!("{det}{noun}"));
            }
        }
    }
    phrases.extend(FILLERS.iter().map(|f| (*f).to_string()));
    phrases.sort_by_key(|p| std::cmp::Reverse(p.len()));
    phrases.dedup();
    phrases
});

/// Extract the task description from an add/remove command
///
/// The verb and everything before it is dropped, then list-membership
/// phrases ("to my to do list", "from the todo") and fillers are peeled off
/// both ends until none match, then generic list words are removed token by
/// token. Returns an empty string when nothing is left; the caller should ask
/// the user to repeat.
#[must_use]
pub fn extract_task(text: &str, intent: Intent) -> String {
    let normalized = normalize(text);

    let verbs = match intent {
        Intent::Add => ADD_KEYWORDS,
        Intent::Remove => REMOVE_KEYWORDS,
        Intent::List | Intent::Clear | Intent::None => return String::new(),
    };

    let mut task = after_first_verb(&normalized, verbs).to_string();

    while let Some(rest) = strip_one_prefix(&task) {
        task = rest;
    }
    while let Some(rest) = strip_one_suffix(&task) {
        task = rest;
    }

    let words: Vec<&str> = task
        .split_whitespace()
        .filter(|word| !GENERIC_WORDS.contains(word))
        .collect();

    let extracted = words.join(" ");
    tracing::trace!(%intent, task = %extracted, "extracted task text");
    extracted
}

/// Drop everything up to and including the earliest verb occurrence
fn after_first_verb<'a>(normalized: &'a str, verbs: &[&str]) -> &'a str {
    verbs
        .iter()
        .filter_map(|verb| find_phrase(normalized, verb).map(|pos| (pos, verb.len())))
        .min_by_key(|&(pos, _)| pos)
        .map_or(normalized, |(pos, len)| normalized[pos + len..].trim_start())
}

fn strip_one_prefix(task: &str) -> Option<String> {
    MEMBERSHIP_PHRASES.iter().find_map(|phrase| {
        let rest = task.strip_prefix(phrase.as_str())?;
        (rest.is_empty() || rest.starts_with(' ')).then(|| rest.trim().to_string())
    })
}

fn strip_one_suffix(task: &str) -> Option<String> {
    MEMBERSHIP_PHRASES.iter().find_map(|phrase| {
        let rest = task.strip_suffix(phrase.as_str())?;
        (rest.is_empty() || rest.ends_with(' ')).then(|| rest.trim().to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_with_list_suffix() {
        assert_eq!(
            extract_task("add buy groceries to my to-do list", Intent::Add),
            "buy groceries"
        );
        assert_eq!(extract_task("Add groceries to my to-do list", Intent::Add), "groceries");
        assert_eq!(extract_task("add buy milk to my todo list", Intent::Add), "buy milk");
    }

    #[test]
    fn test_remove_with_list_suffix() {
        assert_eq!(
            extract_task("remove call the doctor from my todo list", Intent::Remove),
            "call the doctor"
        );
        assert_eq!(
            extract_task("take off study for exam from my todo", Intent::Remove),
            "study for exam"
        );
    }

    #[test]
    fn test_membership_phrase_before_task() {
        assert_eq!(extract_task("add to my todo buy milk", Intent::Add), "buy milk");
        assert_eq!(extract_task("add to the todo list call mom", Intent::Add), "call mom");
        assert_eq!(
            extract_task("remove from my todo list buy groceries", Intent::Remove),
            "buy groceries"
        );
    }

    #[test]
    fn test_other_verbs_and_fillers() {
        assert_eq!(extract_task("remind me to finish project", Intent::Add), "finish project");
        assert_eq!(extract_task("put clean room on my todo", Intent::Add), "clean room");
        assert_eq!(
            extract_task("can you add eggs to my list please", Intent::Add),
            "eggs"
        );
        assert_eq!(extract_task("Add groceries.", Intent::Add), "groceries");
    }

    #[test]
    fn test_nothing_left() {
        assert_eq!(extract_task("add", Intent::Add), "");
        assert_eq!(extract_task("add to my to-do list", Intent::Add), "");
        assert_eq!(extract_task("remove", Intent::Remove), "");
    }

    #[test]
    fn test_non_text_intents_extract_nothing() {
        assert_eq!(extract_task("list my todos", Intent::List), "");
        assert_eq!(extract_task("clear completed", Intent::Clear), "");
    }

    #[test]
    fn test_membership_phrases_sorted_longest_first() {
        let lengths: Vec<usize> = MEMBERSHIP_PHRASES.iter().map(String::len).collect();
        assert!(lengths.windows(2).all(|w| w[0] >= w[1]));
    }
}
