//! Fuzzy matching of spoken task text against stored tasks

use std::collections::HashSet;

use super::normalize;

/// Minimum word-overlap score accepted by [`best_match`]
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.3;

/// Find the candidate that best matches a spoken description
///
/// Tiers, in order, all on normalized text:
/// 1. exact match
/// 2. substring match in either direction ("groceries" / "buy groceries")
/// 3. highest Jaccard word overlap at or above `threshold`
///
/// Within a tier the first candidate wins ties. Returns the index into
/// `candidates`, or `None` when nothing qualifies.
#[must_use]
pub fn best_match<S: AsRef<str>>(candidates: &[S], spoken: &str, threshold: f64) -> Option<usize> {
    let target = normalize(spoken);
    if target.is_empty() {
        return None;
    }

    let normalized: Vec<String> = candidates.iter().map(|c| normalize(c.as_ref())).collect();

    if let Some(idx) = normalized.iter().position(|c| *c == target) {
        return Some(idx);
    }

    if let Some(idx) = normalized
        .iter()
        .position(|c| !c.is_empty() && (c.contains(&target) || target.contains(c.as_str())))
    {
        return Some(idx);
    }

    let target_words: HashSet<&str> = target.split_whitespace().collect();
    let mut best: Option<(usize, f64)> = None;
    for (idx, candidate) in normalized.iter().enumerate() {
        let score = jaccard(&target_words, &candidate.split_whitespace().collect());
        if score >= threshold && best.is_none_or(|(_, top)| score > top) {
            best = Some((idx, score));
        }
    }

    best.map(|(idx, _)| idx)
}

/// Word-set overlap: |A ∩ B| / |A ∪ B|
#[allow(clippy::cast_precision_loss)]
fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASKS: &[&str] = &["Buy groceries", "Call the doctor", "Finish project report"];

    #[test]
    fn test_exact_match() {
        assert_eq!(best_match(TASKS, "call the doctor", DEFAULT_MATCH_THRESHOLD), Some(1));
    }

    #[test]
    fn test_substring_either_direction() {
        assert_eq!(best_match(TASKS, "groceries", DEFAULT_MATCH_THRESHOLD), Some(0));
        assert_eq!(
            best_match(TASKS, "finish project report today", DEFAULT_MATCH_THRESHOLD),
            Some(2)
        );
    }

    #[test]
    fn test_word_overlap() {
        // {finish, the, report} vs {finish, project, report}: 2/4
        assert_eq!(best_match(TASKS, "finish the report", DEFAULT_MATCH_THRESHOLD), Some(2));
    }

    #[test]
    fn test_below_threshold() {
        assert_eq!(best_match(TASKS, "walk the dog", DEFAULT_MATCH_THRESHOLD), None);
        assert_eq!(best_match(TASKS, "walk the dog", 0.0), Some(1));
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(best_match(TASKS, "", DEFAULT_MATCH_THRESHOLD), None);
        assert_eq!(best_match::<&str>(&[], "milk", DEFAULT_MATCH_THRESHOLD), None);
        assert_eq!(best_match(&["", "milk"], "milk", DEFAULT_MATCH_THRESHOLD), Some(1));
    }

    #[test]
    fn test_first_wins_ties() {
        let tasks = ["buy milk", "buy milk"];
        assert_eq!(best_match(&tasks, "buy milk", DEFAULT_MATCH_THRESHOLD), Some(0));
    }
}
