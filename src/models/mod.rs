// ContextDiff Data Models
// Wire-level request/response types for semantic diff analysis

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============ Enums ============

/// Analysis sensitivity: controls how minor a change must be to get reported.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SensitivityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SensitivityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Category of a detected semantic change.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Factual,
    Tone,
    Omission,
    Addition,
    Formatting,
}

/// Severity of a detected change.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSeverity {
    Info,
    Warning,
    Critical,
}

/// Overall semantic change classification.
/// Declaration order is severity order; `Ord` is used for most-severe aggregation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticChangeLevel {
    #[default]
    None,
    Minor,
    Moderate,
    Critical,
    Fatal,
}

// ============ Spans & Changes ============

/// A span of text with its position and surrounding context.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    /// Literal text content of the span.
    pub text: String,
    /// Byte offset (0-based) into the sanitized source text.
    pub start: usize,
    /// Byte offset (0-based, end-exclusive) into the sanitized source text.
    pub end: usize,
    /// Up to 5 characters before the span; disambiguation fingerprint.
    #[serde(default)]
    pub context_before: String,
    /// Up to 5 characters after the span; disambiguation fingerprint.
    #[serde(default)]
    pub context_after: String,
}

/// A single semantic change detected between the two texts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticChange {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub severity: ChangeSeverity,
    pub description: String,
    pub original_span: TextSpan,
    pub generated_span: TextSpan,
    pub reasoning: String,
}

// ============ Summary & Response ============

/// High-level verdict of the analysis.
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub is_safe: bool,
    /// Risk score from 0 (identical) to 100 (fundamentally different).
    pub risk_score: u8,
    pub semantic_change_level: SemanticChangeLevel,
}

impl DiffSummary {
    /// Summary for texts with no reportable differences.
    pub fn no_risk() -> Self {
        Self {
            is_safe: true,
            risk_score: 0,
            semantic_change_level: SemanticChangeLevel::None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResponse {
    pub summary: DiffSummary,
    #[serde(default)]
    pub changes: Vec<SemanticChange>,
}

impl DiffResponse {
    /// Safe response with an empty change list (short-circuit, failed chunk).
    pub fn no_changes() -> Self {
        Self {
            summary: DiffSummary::no_risk(),
            changes: vec![],
        }
    }
}

// ============ Request ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    /// The original/reference text.
    pub original_text: String,
    /// The generated text to compare against the original.
    pub generated_text: String,
    #[serde(default)]
    pub sensitivity: SensitivityLevel,
    /// Use the premium model for higher accuracy.
    #[serde(default)]
    pub premium_mode: bool,
}

// ============ Rate Limiting ============

/// Remaining admission budget for one caller, for transport-level headers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_after_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(
            serde_json::to_string(&ChangeType::Factual).unwrap(),
            "\"FACTUAL\""
        );
        assert_eq!(
            serde_json::to_string(&ChangeSeverity::Warning).unwrap(),
            "\"warning\""
        );
        assert_eq!(
            serde_json::to_string(&SemanticChangeLevel::Moderate).unwrap(),
            "\"MODERATE\""
        );
        assert_eq!(
            serde_json::to_string(&SensitivityLevel::High).unwrap(),
            "\"high\""
        );
    }

    #[test]
    fn test_change_level_ordering() {
        assert!(SemanticChangeLevel::Fatal > SemanticChangeLevel::Critical);
        assert!(SemanticChangeLevel::Minor > SemanticChangeLevel::None);
        assert_eq!(
            SemanticChangeLevel::Moderate.max(SemanticChangeLevel::Minor),
            SemanticChangeLevel::Moderate
        );
    }

    #[test]
    fn test_request_defaults() {
        let req: CompareRequest =
            serde_json::from_str(r#"{"original_text": "a", "generated_text": "b"}"#).unwrap();
        assert_eq!(req.sensitivity, SensitivityLevel::Medium);
        assert!(!req.premium_mode);
    }

    #[test]
    fn test_span_context_defaults() {
        let span: TextSpan =
            serde_json::from_str(r#"{"text": "will", "start": 4, "end": 8}"#).unwrap();
        assert_eq!(span.context_before, "");
        assert_eq!(span.context_after, "");
    }
}
