//! Fuzzy course-title matching.
//!
//! Resolving a partial course name ("MCP", "Intro") to a catalog title is a
//! pluggable strategy; this module pins one deterministic algorithm so the
//! behavior is stable across runs and covered by tests:
//!
//! 1. Case-insensitive exact match.
//! 2. Case-insensitive substring containment.
//! 3. Highest character-bigram Dice similarity, if it clears
//!    [`MIN_SIMILARITY`].
//!
//! Ties at every stage break lexicographically on the original title
//! (ascending byte order).

/// Similarity floor for the Dice fallback. Below this the name is treated
/// as unresolved.
pub const MIN_SIMILARITY: f64 = 0.3;

/// Resolve `needle` against candidate titles.
///
/// Returns the matched title, or `None` when nothing clears the strategy.
pub fn best_match<'a>(needle: &str, candidates: &'a [String]) -> Option<&'a str> {
    if needle.trim().is_empty() || candidates.is_empty() {
        return None;
    }

    let mut sorted: Vec<&String> = candidates.iter().collect();
    sorted.sort();

    let needle_lower = needle.to_lowercase();

    if let Some(found) = sorted
        .iter()
        .find(|title| title.to_lowercase() == needle_lower)
    {
        return Some(found.as_str());
    }

    if let Some(found) = sorted
        .iter()
        .find(|title| title.to_lowercase().contains(&needle_lower))
    {
        return Some(found.as_str());
    }

    let mut best: Option<(&str, f64)> = None;
    for title in &sorted {
        let score = dice_similarity(&needle_lower, &title.to_lowercase());
        // Strictly-greater keeps the lexicographically smaller title on ties,
        // because candidates are visited in sorted order.
        if score >= MIN_SIMILARITY && best.map(|(_, s)| score > s).unwrap_or(true) {
            best = Some((title.as_str(), score));
        }
    }

    best.map(|(title, _)| title)
}

/// Sørensen–Dice coefficient over character bigram multisets.
///
/// Returns a value in `[0, 1]`; `1.0` for identical strings. Strings with
/// fewer than two characters only match exactly.
pub fn dice_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let bigrams_a = bigrams(a);
    let bigrams_b = bigrams(b);
    if bigrams_a.is_empty() || bigrams_b.is_empty() {
        return 0.0;
    }

    let mut counts = std::collections::HashMap::new();
    for bg in &bigrams_a {
        *counts.entry(*bg).or_insert(0usize) += 1;
    }

    let mut overlap = 0usize;
    for bg in &bigrams_b {
        if let Some(count) = counts.get_mut(bg) {
            if *count > 0 {
                *count -= 1;
                overlap += 1;
            }
        }
    }

    (2.0 * overlap as f64) / (bigrams_a.len() + bigrams_b.len()) as f64
}

fn bigrams(s: &str) -> Vec<(char, char)> {
    let chars: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}
