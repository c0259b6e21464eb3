//! Utterance and response classification for session flow

use crate::intent::normalize;

/// Utterances that end the session outright
const CANCEL_PHRASES: &[&str] = &["stop", "cancel", "nevermind", "never mind"];

/// Questions about the assistant itself; answered without a model call
const META_PHRASES: &[&str] = &[
    "what can you do",
    "help",
    "who are you",
    "what are you",
    "how do you work",
    "what is this",
    "what can i say",
];

/// Replies that hand the turn back to the user
const PROMPTING_PHRASES: &[&str] = &[
    "how can i help",
    "what would you like to do",
    "is there anything else",
    "can i help with anything else",
    "what can i do for you",
];

/// Short questions at or below this many words count as prompting
const MAX_PROMPTING_QUESTION_WORDS: usize = 10;

/// Shown after a meta query
pub const HELP_TEXT: &str = "Say the wake phrase, then a command. You can add, remove or \
     list tasks, for example \"add buy milk to my to-do list\", or ask any question. \
     Say \"stop\" while I'm talking to interrupt.";

/// Cancel phrase, ignoring case and trailing punctuation
#[must_use]
pub fn is_cancel(text: &str) -> bool {
    CANCEL_PHRASES.contains(&strip_trailing(text).as_str())
}

/// Meta/help query, matched exactly after stripping trailing `?!.`
#[must_use]
pub fn is_meta_query(text: &str) -> bool {
    META_PHRASES.contains(&strip_trailing(text).as_str())
}

/// Whether a reply asks the user something, ending the session after playback
#[must_use]
pub fn is_prompting_response(response: &str) -> bool {
    let lower = response.trim().to_lowercase();
    if PROMPTING_PHRASES.iter().any(|p| lower.contains(p)) {
        return true;
    }
    lower.ends_with('?') && lower.split_whitespace().count() <= MAX_PROMPTING_QUESTION_WORDS
}

/// Barge-in: "stop" or the wake phrase, heard on its own
#[must_use]
pub fn is_interrupt(text: &str, wake_phrase: &str) -> bool {
    let heard = normalize(text);
    !heard.is_empty() && (heard == "stop" || heard == normalize(wake_phrase))
}

fn strip_trailing(text: &str) -> String {
    text.trim()
        .trim_end_matches(['?', '!', '.', ','])
        .trim()
        .to_lowercase()
}
