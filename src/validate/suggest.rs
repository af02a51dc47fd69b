//! "Did you mean" suggestions.

/// Minimum similarity for a candidate to be offered as a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Lexically closest candidate to `target`, if any is close enough.
///
/// Similarity is case-insensitive Jaro; ties keep the earlier candidate so
/// suggestions are deterministic for a given schema ordering.
pub fn closest_match(target: &str, candidates: &[&str]) -> Option<String> {
    let target_lower = target.to_ascii_lowercase();
    let mut best: Option<(&str, f64)> = None;

    for candidate in candidates {
        let score = strsim::jaro(&target_lower, &candidate.to_ascii_lowercase());
        if score >= SUGGESTION_THRESHOLD && best.map_or(true, |(_, s)| score > s) {
            best = Some((candidate, score));
        }
    }

    best.map(|(name, _)| name.to_string())
}
