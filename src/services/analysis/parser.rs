// Response Parser
// Lenient parsing of the raw model document, tolerant of the case and
// vocabulary drift models produce, followed by conversion into the typed
// wire response

use crate::models::{
    ChangeSeverity, ChangeType, DiffResponse, DiffSummary, SemanticChange, SemanticChangeLevel,
    TextSpan,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("no JSON in model response")]
    NoJson,
    #[error("invalid JSON from model: {0}")]
    InvalidJson(String),
}

// ============ Raw (pre-reconciliation) document ============

#[derive(Debug, Deserialize, Default)]
pub struct RawDiffDocument {
    #[serde(default)]
    pub summary: RawSummary,
    #[serde(default)]
    pub changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize, Default)]
pub struct RawSummary {
    #[serde(default)]
    pub is_safe: bool,
    #[serde(default)]
    pub risk_score: i64,
    #[serde(default)]
    pub semantic_change_level: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawChange {
    #[serde(default)]
    pub id: String,
    #[serde(default, rename = "type")]
    pub change_type: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub description: String,
    pub original_span: Option<RawSpan>,
    pub generated_span: Option<RawSpan>,
    #[serde(default)]
    pub reasoning: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSpan {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
    #[serde(default)]
    pub context_before: String,
    #[serde(default)]
    pub context_after: String,
}

// ============ Extraction & parsing ============

/// Extract the JSON object from response content that may carry prose or
/// markdown fences around it.
pub fn extract_json(content: &str) -> Result<&str, ParseError> {
    let content = content.trim();
    if content.starts_with('{') && content.ends_with('}') {
        return Ok(content);
    }
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&content[start..=end]),
        _ => Err(ParseError::NoJson),
    }
}

/// Parse raw model output into the lenient document form.
pub fn parse_document(content: &str) -> Result<RawDiffDocument, ParseError> {
    let json = extract_json(content)?;
    serde_json::from_str(json).map_err(|e| ParseError::InvalidJson(e.to_string()))
}

// ============ Normalization ============

fn normalize_change_type(raw: &str) -> Option<ChangeType> {
    match raw.trim().to_uppercase().as_str() {
        "FACTUAL" => Some(ChangeType::Factual),
        "TONE" => Some(ChangeType::Tone),
        "OMISSION" => Some(ChangeType::Omission),
        "ADDITION" => Some(ChangeType::Addition),
        "FORMATTING" => Some(ChangeType::Formatting),
        _ => None,
    }
}

/// Map model vocabulary drift onto the three severity levels.
fn normalize_severity(raw: &str) -> ChangeSeverity {
    match raw.trim().to_lowercase().as_str() {
        "info" | "minor" | "low" | "none" => ChangeSeverity::Info,
        "critical" | "high" | "fatal" | "severe" => ChangeSeverity::Critical,
        // "warning", "moderate", "medium", and anything unrecognized
        _ => ChangeSeverity::Warning,
    }
}

fn normalize_level(raw: &str) -> Option<SemanticChangeLevel> {
    match raw.trim().to_uppercase().as_str() {
        "NONE" => Some(SemanticChangeLevel::None),
        "MINOR" => Some(SemanticChangeLevel::Minor),
        "MODERATE" => Some(SemanticChangeLevel::Moderate),
        "CRITICAL" => Some(SemanticChangeLevel::Critical),
        "FATAL" => Some(SemanticChangeLevel::Fatal),
        _ => None,
    }
}

/// Change level implied by a risk score, per the prompt's bands. Used when
/// the model omits or mangles the level field.
pub fn level_for_risk(risk_score: u8) -> SemanticChangeLevel {
    match risk_score {
        0..=10 => SemanticChangeLevel::None,
        11..=30 => SemanticChangeLevel::Minor,
        31..=55 => SemanticChangeLevel::Moderate,
        56..=80 => SemanticChangeLevel::Critical,
        _ => SemanticChangeLevel::Fatal,
    }
}

fn typed_span(raw: &RawSpan) -> TextSpan {
    TextSpan {
        text: raw.text.clone(),
        start: raw.start.max(0) as usize,
        end: raw.end.max(0) as usize,
        context_before: raw.context_before.clone(),
        context_after: raw.context_after.clone(),
    }
}

// ============ Finalization ============

/// Convert a reconciled raw document into the typed response.
///
/// Changes missing a span object or carrying an unrecognized type are
/// dropped with a warning rather than failing the whole document. The
/// is_safe flag is forced to false (never to true) when the change list
/// or risk score contradicts it.
pub fn finalize(doc: RawDiffDocument, safety_threshold: u8) -> DiffResponse {
    let risk_score = doc.summary.risk_score.clamp(0, 100) as u8;
    let semantic_change_level = normalize_level(&doc.summary.semantic_change_level)
        .unwrap_or_else(|| level_for_risk(risk_score));

    let mut changes = Vec::with_capacity(doc.changes.len());
    for raw in doc.changes {
        let (original_span, generated_span) = match (&raw.original_span, &raw.generated_span) {
            (Some(o), Some(g)) => (typed_span(o), typed_span(g)),
            _ => {
                warn!("[PARSER] dropping change without both spans: {:?}", raw.description);
                continue;
            }
        };
        let change_type = match normalize_change_type(&raw.change_type) {
            Some(t) => t,
            None => {
                warn!(
                    "[PARSER] dropping change with unknown type {:?}",
                    raw.change_type
                );
                continue;
            }
        };

        changes.push(SemanticChange {
            id: Uuid::parse_str(raw.id.trim()).unwrap_or_else(|_| Uuid::new_v4()),
            change_type,
            severity: normalize_severity(&raw.severity),
            description: raw.description,
            original_span,
            generated_span,
            reasoning: raw.reasoning,
        });
    }

    let has_critical = changes
        .iter()
        .any(|c| c.severity == ChangeSeverity::Critical);
    let mut is_safe = doc.summary.is_safe;
    if is_safe && (has_critical || risk_score > safety_threshold) {
        warn!(
            "[PARSER] is_safe contradicted by changes (risk={}, critical={}), forcing false",
            risk_score, has_critical
        );
        is_safe = false;
    }

    DiffResponse {
        summary: DiffSummary {
            is_safe,
            risk_score,
            semantic_change_level,
        },
        changes,
    }
}
