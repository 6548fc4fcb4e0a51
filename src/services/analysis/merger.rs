// Result Merger
// Combines per-chunk analyses into one globally offset-correct response
//
// Spans are rewritten from chunk-local to global coordinates using each
// side's own chunk offset. The merged risk score is the maximum across
// chunks: one severe chunk dominates the verdict regardless of how many
// clean chunks surround it.

use super::chunker::ChunkPair;
use crate::models::{ChangeSeverity, DiffResponse, DiffSummary, SemanticChangeLevel};
use tracing::info;

/// Merge chunk results, in chunk order, into a single response.
///
/// `results` and `pairs` are index-aligned; the caller preserves input
/// order across the concurrent dispatch.
pub fn merge_chunk_results(
    results: Vec<DiffResponse>,
    pairs: &[ChunkPair],
    safety_threshold: u8,
) -> DiffResponse {
    let mut all_changes = Vec::new();
    let mut risk_score: u8 = 0;
    let mut change_level = SemanticChangeLevel::None;

    for (result, pair) in results.into_iter().zip(pairs) {
        for mut change in result.changes {
            change.original_span.start += pair.original.offset;
            change.original_span.end += pair.original.offset;
            change.generated_span.start += pair.generated.offset;
            change.generated_span.end += pair.generated.offset;
            all_changes.push(change);
        }

        risk_score = risk_score.max(result.summary.risk_score);
        change_level = change_level.max(result.summary.semantic_change_level);
    }

    let has_critical = all_changes
        .iter()
        .any(|c| c.severity == ChangeSeverity::Critical);
    let is_safe = !has_critical && risk_score < safety_threshold;

    info!(
        "[MERGER] merged {} chunks: changes={} risk={} level={:?} safe={}",
        pairs.len(),
        all_changes.len(),
        risk_score,
        change_level,
        is_safe
    );

    DiffResponse {
        summary: DiffSummary {
            is_safe,
            risk_score,
            semantic_change_level: change_level,
        },
        changes: all_changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeType, SemanticChange, TextSpan};
    use crate::services::analysis::chunker::Chunk;
    use uuid::Uuid;

    fn pair(original_offset: usize, generated_offset: usize) -> ChunkPair {
        ChunkPair {
            original: Chunk {
                text: String::new(),
                offset: original_offset,
            },
            generated: Chunk {
                text: String::new(),
                offset: generated_offset,
            },
        }
    }

    fn span(text: &str, start: usize) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            start,
            end: start + text.len(),
            context_before: String::new(),
            context_after: String::new(),
        }
    }

    fn change(severity: ChangeSeverity, original: TextSpan, generated: TextSpan) -> SemanticChange {
        SemanticChange {
            id: Uuid::new_v4(),
            change_type: ChangeType::Factual,
            severity,
            description: "d".to_string(),
            original_span: original,
            generated_span: generated,
            reasoning: "r".to_string(),
        }
    }

    fn response(
        risk: u8,
        level: SemanticChangeLevel,
        changes: Vec<SemanticChange>,
    ) -> DiffResponse {
        DiffResponse {
            summary: DiffSummary {
                is_safe: true,
                risk_score: risk,
                semantic_change_level: level,
            },
            changes,
        }
    }

    #[test]
    fn test_spans_rewritten_with_per_side_offsets() {
        let pairs = vec![pair(0, 0), pair(3000, 2800)];
        let results = vec![
            response(10, SemanticChangeLevel::Minor, vec![]),
            response(
                20,
                SemanticChangeLevel::Minor,
                vec![change(
                    ChangeSeverity::Warning,
                    span("alpha", 40),
                    span("beta", 55),
                )],
            ),
        ];

        let merged = merge_chunk_results(results, &pairs, 50);
        let c = &merged.changes[0];
        assert_eq!(c.original_span.start, 3040);
        assert_eq!(c.original_span.end, 3045);
        assert_eq!(c.generated_span.start, 2855);
        assert_eq!(c.generated_span.end, 2859);
    }

    #[test]
    fn test_risk_score_is_maximum_not_average() {
        let pairs = vec![pair(0, 0), pair(100, 100), pair(200, 200)];
        let results = vec![
            response(5, SemanticChangeLevel::None, vec![]),
            response(80, SemanticChangeLevel::Critical, vec![]),
            response(5, SemanticChangeLevel::None, vec![]),
        ];

        let merged = merge_chunk_results(results, &pairs, 50);
        assert_eq!(merged.summary.risk_score, 80);
        assert_eq!(
            merged.summary.semantic_change_level,
            SemanticChangeLevel::Critical
        );
        assert!(!merged.summary.is_safe);
    }

    #[test]
    fn test_safe_when_low_risk_and_no_critical() {
        let pairs = vec![pair(0, 0), pair(100, 100)];
        let results = vec![
            response(
                20,
                SemanticChangeLevel::Minor,
                vec![change(ChangeSeverity::Info, span("a", 0), span("b", 0))],
            ),
            response(30, SemanticChangeLevel::Minor, vec![]),
        ];

        let merged = merge_chunk_results(results, &pairs, 50);
        assert_eq!(merged.summary.risk_score, 30);
        assert!(merged.summary.is_safe);
    }

    #[test]
    fn test_single_critical_change_breaks_safety() {
        let pairs = vec![pair(0, 0)];
        let results = vec![response(
            10,
            SemanticChangeLevel::Minor,
            vec![change(ChangeSeverity::Critical, span("a", 0), span("b", 0))],
        )];

        let merged = merge_chunk_results(results, &pairs, 50);
        assert!(!merged.summary.is_safe);
    }

    #[test]
    fn test_changes_preserve_chunk_order() {
        let pairs = vec![pair(0, 0), pair(500, 500)];
        let results = vec![
            response(
                10,
                SemanticChangeLevel::Minor,
                vec![change(ChangeSeverity::Info, span("first", 5), span("first", 5))],
            ),
            response(
                10,
                SemanticChangeLevel::Minor,
                vec![change(ChangeSeverity::Info, span("second", 5), span("second", 5))],
            ),
        ];

        let merged = merge_chunk_results(results, &pairs, 50);
        assert_eq!(merged.changes.len(), 2);
        assert!(merged.changes[0].original_span.start < merged.changes[1].original_span.start);
    }

    #[test]
    fn test_empty_results_merge_to_no_changes() {
        let merged = merge_chunk_results(vec![], &[], 50);
        assert!(merged.summary.is_safe);
        assert_eq!(merged.summary.risk_score, 0);
        assert!(merged.changes.is_empty());
    }

    #[test]
    fn test_chunk_local_spans_become_valid_global_spans() {
        use crate::services::analysis::chunker::pair_chunks;

        let original = format!(
            "{}\n\n{}",
            vec!["alpha"; 60].join(" "),
            "The dose is 5mg twice daily."
        );
        let generated = format!(
            "{}\n\n{}",
            vec!["alpha"; 60].join(" "),
            "The dose is 50mg twice daily."
        );
        let pairs = pair_chunks(&original, &generated, 300);
        assert!(pairs.len() >= 2);

        // A change in the last chunk, with spans valid chunk-locally
        let last = pairs.len() - 1;
        let o_local = pairs[last].original.text.find("5mg").unwrap();
        let g_local = pairs[last].generated.text.find("50mg").unwrap();

        let mut results: Vec<DiffResponse> = pairs
            .iter()
            .map(|_| response(0, SemanticChangeLevel::None, vec![]))
            .collect();
        results[last] = response(
            45,
            SemanticChangeLevel::Moderate,
            vec![change(
                ChangeSeverity::Warning,
                span("5mg", o_local),
                span("50mg", g_local),
            )],
        );

        let merged = merge_chunk_results(results, &pairs, 50);
        let c = &merged.changes[0];
        assert_eq!(
            &original[c.original_span.start..c.original_span.end],
            "5mg"
        );
        assert_eq!(
            &generated[c.generated_span.start..c.generated_span.end],
            "50mg"
        );
        assert!(c.original_span.end <= original.len());
        assert!(c.generated_span.end <= generated.len());
    }
}
