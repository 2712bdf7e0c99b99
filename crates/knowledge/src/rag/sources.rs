//! Citation extraction.

use std::collections::BTreeSet;

/// Labels from `labels` that the answer references, compared case-insensitively.
///
/// A mention must not run into surrounding letters or digits, and a mention
/// covered by a longer label's mention belongs to the longer label only, so
/// `weather:12` does not also cite `weather:1`.
pub fn extract_citations<'a, I>(text: &str, labels: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let haystack = text.to_lowercase();
    let mut mentions: Vec<(usize, usize, &String)> = Vec::new();
    for label in labels {
        let needle = label.trim().to_lowercase();
        if needle.is_empty() {
            continue;
        }
        for (start, _) in haystack.match_indices(&needle) {
            let end = start + needle.len();
            if at_word_boundary(&haystack, start, end) {
                mentions.push((start, end, label));
            }
        }
    }

    mentions
        .iter()
        .filter(|(start, end, _)| {
            !mentions.iter().any(|(other_start, other_end, _)| {
                other_start <= start && end <= other_end && other_end - other_start > end - start
            })
        })
        .map(|(_, _, label)| (*label).clone())
        .collect()
}

fn at_word_boundary(haystack: &str, start: usize, end: usize) -> bool {
    let before = haystack[..start].chars().next_back();
    let after = haystack[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

/// Normalize a provider-reported citation list: trimmed, non-empty, deduplicated.
pub fn reported_citations(reported: &[String]) -> BTreeSet<String> {
    reported
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
