//! Fixed replies answered without calling a model

use chrono::Local;

use crate::intent::normalize;

const TIME_QUERIES: &[&str] = &["what time is it", "whats the time", "time"];

const DATE_QUERIES: &[&str] = &["what date is it", "whats the date", "date", "what day is it"];

const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "greetings",
    "good morning",
    "good afternoon",
    "good evening",
];

const WELLBEING_QUERIES: &[&str] = &["how are you", "how are you doing"];

const HELP_QUERIES: &[&str] = &["help", "what can you do", "what can you help with"];

const IDENTITY_QUERIES: &[&str] = &[
    "what model am i using",
    "what model am i using right now",
    "which model am i using",
    "what ai model am i using",
    "what model are you",
];

/// Reply to a fixed utterance, or `None` if the model should answer
///
/// Matching is exact on normalized text, except for weather questions which
/// only need the word "weather" plus "what" or "how".
#[must_use]
pub fn canned_reply(question: &str, assistant_name: &str, active_model: &str) -> Option<String> {
    let q = normalize(question);
    let is = |set: &[&str]| set.contains(&q.as_str());

    let reply = if is(TIME_QUERIES) {
        format!("The current time is {}", Local::now().format("%H:%M"))
    } else if is(DATE_QUERIES) {
        format!("Today's date is {}", Local::now().format("%B %-d, %Y"))
    } else if is_weather_question(&q) {
        "I don't have access to real-time weather data, but you can check your local \
         weather app or website."
            .to_string()
    } else if is(GREETINGS) {
        format!("Hello! I'm {assistant_name}, your AI assistant. How can I help you today?")
    } else if is(WELLBEING_QUERIES) {
        "I'm doing well, thank you for asking! I'm ready to help you with tasks and questions."
            .to_string()
    } else if is(HELP_QUERIES) {
        "I can manage your to-do list, tell you the time and date, and answer general \
         questions. Try saying: add groceries to my list, or, what time is it."
            .to_string()
    } else if is(IDENTITY_QUERIES) {
        format!("You are currently using the {active_model} model.")
    } else {
        return None;
    };

    Some(reply)
}

fn is_weather_question(q: &str) -> bool {
    let words: Vec<&str> = q.split_whitespace().collect();
    words.contains(&"weather") && (words.contains(&"what") || words.contains(&"how"))
}
