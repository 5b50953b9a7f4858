//! Word-set similarity between summaries.

use std::collections::HashSet;

/// Split text into its set of lowercase word tokens.
///
/// Any character that is not alphanumeric delimits tokens, so
/// punctuation and whitespace are treated alike.
#[must_use]
pub fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard index of the word sets of `a` and `b`, in `[0, 1]`.
///
/// Two texts with no tokens at all are identical (1.0); one empty and one
/// non-empty text share nothing (0.0).
///
/// # Example
///
/// ```
/// use bizloop::stagnation::similarity;
///
/// assert_eq!(similarity("a b c", "A, b; c!"), 1.0);
/// assert_eq!(similarity("a b", "b c"), 1.0 / 3.0);
/// assert_eq!(similarity("", ""), 1.0);
/// ```
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    jaccard(&tokens_a, &tokens_b)
}

/// Jaccard index of two pre-tokenized sets.
#[must_use]
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
