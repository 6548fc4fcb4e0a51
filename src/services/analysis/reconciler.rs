// Span Reconciler
// Verifies or repairs model-claimed spans against the literal source text
//
// Ordered phases per span: exact match, context-fingerprint match,
// proximity search around the claimed position, global first occurrence.
// A span that survives none of them marks the whole change as a
// hallucination and the change is dropped: a recoverable warning, never
// an error. Every span that leaves this module satisfies
// `source[start..end] == text`.

use super::parser::{RawDiffDocument, RawSpan};
use crate::services::text_processor::get_context;
use tracing::{debug, info, warn};

/// Byte radius for the proximity search around the claimed position.
const PROXIMITY_RADIUS: usize = 50;
/// Characters of surrounding context recorded on corrected spans.
const CONTEXT_CHARS: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct ReconcileStats {
    pub corrected: usize,
    pub removed: usize,
}

/// Reconcile every change in the document against the two source texts.
pub fn reconcile(
    doc: &mut RawDiffDocument,
    original_text: &str,
    generated_text: &str,
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    doc.changes.retain_mut(|change| {
        let mut valid = true;

        if let Some(span) = change.original_span.as_mut() {
            match validate_span(span, original_text, "original") {
                SpanOutcome::Exact => {}
                SpanOutcome::Corrected => stats.corrected += 1,
                SpanOutcome::Unverifiable => valid = false,
            }
        }

        if valid {
            if let Some(span) = change.generated_span.as_mut() {
                match validate_span(span, generated_text, "generated") {
                    SpanOutcome::Exact => {}
                    SpanOutcome::Corrected => stats.corrected += 1,
                    SpanOutcome::Unverifiable => valid = false,
                }
            }
        }

        if !valid {
            stats.removed += 1;
            warn!(
                "[RECONCILER] dropping hallucinated change: {:?}",
                change.description
            );
        }
        valid
    });

    if stats.corrected > 0 {
        info!("[RECONCILER] auto-corrected {} span indices", stats.corrected);
    }
    if stats.removed > 0 {
        warn!("[RECONCILER] removed {} hallucinated changes", stats.removed);
    }

    stats
}

enum SpanOutcome {
    Exact,
    Corrected,
    Unverifiable,
}

fn validate_span(span: &mut RawSpan, source: &str, span_kind: &str) -> SpanOutcome {
    // Empty spans carry no claim to verify (e.g. pure omissions)
    if span.text.is_empty() {
        return SpanOutcome::Exact;
    }

    let claimed_start = span.start.max(0) as usize;
    let claimed_end = span.end.max(0) as usize;

    // Phase 1: exact match at the claimed position. `get` returns None for
    // out-of-range or non-boundary indices, which simply fails the phase.
    if claimed_end >= claimed_start
        && source.get(claimed_start..claimed_end) == Some(span.text.as_str())
    {
        debug!(
            "[RECONCILER] {} span exact match at [{}:{}]",
            span_kind, claimed_start, claimed_end
        );
        return SpanOutcome::Exact;
    }

    // Phase 2: context fingerprint. Surrounding characters disambiguate
    // repeated phrases that a plain find would resolve arbitrarily.
    if !span.context_before.is_empty() || !span.context_after.is_empty() {
        let fingerprint = format!("{}{}{}", span.context_before, span.text, span.context_after);
        if let Some(found) = source.find(&fingerprint) {
            let new_start = found + span.context_before.len();
            let new_end = new_start + span.text.len();
            info!(
                "[RECONCILER] context fingerprint match for {} span: [{}:{}] -> [{}:{}]",
                span_kind, claimed_start, claimed_end, new_start, new_end
            );
            rewrite_span(span, source, new_start, new_end);
            return SpanOutcome::Corrected;
        }
    }

    // Phase 3: proximity search around the claimed position
    let mut search_start = claimed_start.saturating_sub(PROXIMITY_RADIUS).min(source.len());
    while !source.is_char_boundary(search_start) {
        search_start -= 1;
    }
    let mut search_end = claimed_end.saturating_add(PROXIMITY_RADIUS).min(source.len());
    while !source.is_char_boundary(search_end) {
        search_end -= 1;
    }
    if search_start < search_end {
        if let Some(local) = source[search_start..search_end].find(&span.text) {
            let new_start = search_start + local;
            let new_end = new_start + span.text.len();
            info!(
                "[RECONCILER] proximity match for {} span: [{}:{}] -> [{}:{}]",
                span_kind, claimed_start, claimed_end, new_start, new_end
            );
            rewrite_span(span, source, new_start, new_end);
            return SpanOutcome::Corrected;
        }
    }

    // Phase 4: global first occurrence. Position resolves ties, not
    // semantic relevance, so this match may pick the wrong instance of a
    // repeated phrase.
    if let Some(found) = source.find(&span.text) {
        let new_end = found + span.text.len();
        warn!(
            "[RECONCILER] global fallback match for {} span: [{}:{}] -> [{}:{}]",
            span_kind, claimed_start, claimed_end, found, new_end
        );
        rewrite_span(span, source, found, new_end);
        return SpanOutcome::Corrected;
    }

    warn!(
        "[RECONCILER] {} span text not found: {:?} with context {:?}..{:?}",
        span_kind,
        span.text.chars().take(50).collect::<String>(),
        span.context_before,
        span.context_after
    );
    SpanOutcome::Unverifiable
}

/// Point the span at its verified position and refresh the surrounding
/// context so the returned fingerprint matches the corrected location.
fn rewrite_span(span: &mut RawSpan, source: &str, start: usize, end: usize) {
    span.start = start as i64;
    span.end = end as i64;
    let (before, after) = get_context(source, start, end, CONTEXT_CHARS);
    span.context_before = before;
    span.context_after = after;
}
