// Short-Circuit Detector
// Skips the model call entirely when the two texts are near-identical
//
// Pure and side-effect free. The threshold is deliberately conservative:
// a short-circuit must never suppress a genuine change.

use crate::models::DiffResponse;
use tracing::info;

/// Similarity ratio in [0, 1]: `2*M / (len_a + len_b)` where M is the
/// longest common subsequence over whitespace-delimited tokens.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let ta: Vec<&str> = a.split_whitespace().collect();
    let tb: Vec<&str> = b.split_whitespace().collect();
    let total = ta.len() + tb.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * lcs_len(&ta, &tb) as f64 / total as f64
}

/// LCS length with a two-row rolling table, O(min) memory.
fn lcs_len(a: &[&str], b: &[&str]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let mut prev = vec![0usize; short.len() + 1];
    let mut curr = vec![0usize; short.len() + 1];
    for &lw in long {
        for (j, &sw) in short.iter().enumerate() {
            curr[j + 1] = if lw == sw {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[short.len()]
}

/// Return the zero-risk response without invoking the model when the two
/// texts clear the similarity threshold; `None` means run the pipeline.
pub fn maybe_short_circuit(
    original: &str,
    generated: &str,
    threshold: f64,
) -> Option<DiffResponse> {
    if original == generated {
        info!("[SHORT_CIRCUIT] texts identical, skipping model call");
        return Some(DiffResponse::no_changes());
    }

    let ta: Vec<&str> = original.split_whitespace().collect();
    let tb: Vec<&str> = generated.split_whitespace().collect();
    let total = ta.len() + tb.len();
    if total == 0 {
        return Some(DiffResponse::no_changes());
    }

    // Cheap upper bound: the LCS can never exceed the shorter token list,
    // so skip the quadratic pass when the threshold is unreachable.
    let upper_bound = 2.0 * ta.len().min(tb.len()) as f64 / total as f64;
    if upper_bound <= threshold {
        return None;
    }

    let ratio = 2.0 * lcs_len(&ta, &tb) as f64 / total as f64;
    if ratio > threshold {
        info!(
            "[SHORT_CIRCUIT] similarity {:.4} > {:.2}, skipping model call",
            ratio, threshold
        );
        return Some(DiffResponse::no_changes());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_score_one() {
        assert_eq!(similarity_ratio("same text here", "same text here"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        assert_eq!(similarity_ratio("alpha beta", "gamma delta"), 0.0);
        assert_eq!(similarity_ratio("something", ""), 0.0);
    }

    #[test]
    fn test_partial_overlap_ratio() {
        // LCS("a b c d", "a b x d") = 3 tokens, ratio = 6/8
        let ratio = similarity_ratio("a b c d", "a b x d");
        assert!((ratio - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_short_circuit_identical() {
        let response = maybe_short_circuit("The offer stands.", "The offer stands.", 0.99)
            .expect("identical texts must short-circuit");
        assert!(response.summary.is_safe);
        assert_eq!(response.summary.risk_score, 0);
        assert!(response.changes.is_empty());
    }

    #[test]
    fn test_short_circuit_declines_real_changes() {
        // One word changed out of a short sentence: far below threshold
        assert!(maybe_short_circuit(
            "The dose is 5mg twice daily.",
            "The dose is 50mg twice daily.",
            0.99
        )
        .is_none());
    }

    #[test]
    fn test_upper_bound_skips_hopeless_pairs() {
        // Length mismatch alone caps the ratio below the threshold
        let original = "one two three four five six seven eight nine ten";
        let generated = "one two";
        assert!(maybe_short_circuit(original, generated, 0.99).is_none());
    }
}
