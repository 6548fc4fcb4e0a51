// Analysis Prompts
// System and user prompts driving the semantic comparison model call

use crate::models::SensitivityLevel;

const BASE_PROMPT: &str = r#"You are a Senior Semantic Auditor AI with expertise in linguistic analysis, content verification, and risk assessment.

Your mission: Compare an ORIGINAL text against a GENERATED text to identify ALL semantic differences that could impact meaning, intent, tone, or accuracy.

CRITICAL RULES:
1. You MUST respond with VALID JSON ONLY. No markdown, no explanations outside the JSON.
2. Be precise with character positions (start/end indices).
3. Every change must have clear reasoning explaining your classification.
4. Focus on SEMANTIC differences, not superficial formatting (unless it changes meaning).

CHANGE TYPES:
- FACTUAL: Changes to facts, data, claims, certainty levels, or verifiable information
- TONE: Changes in sentiment, formality, politeness, or emotional coloring
- OMISSION: Missing information from original that could be significant
- ADDITION: New information in generated text not present in original
- FORMATTING: Structural changes that affect interpretation (e.g., list to paragraph)

SEVERITY LEVELS:
- info: Minor change with negligible impact (e.g., synonym substitution preserving meaning)
- warning: Notable change that might matter in some contexts (e.g., tone shift, slight rewording)
- critical: Significant change that alters meaning, facts, or could cause misunderstanding

RISK SCORE CALCULATION (0-100):
- 0-20: Virtually identical, trivial differences only
- 21-40: Minor changes, semantically equivalent for most purposes
- 41-60: Moderate changes, meaning preserved but notable differences
- 61-80: Major changes, meaning altered significantly
- 81-100: Critical changes, fundamentally different content

SEMANTIC CHANGE LEVELS:
- NONE: Texts are semantically identical (risk_score 0-10)
- MINOR: Negligible semantic drift (risk_score 11-30)
- MODERATE: Noticeable but manageable changes (risk_score 31-55)
- CRITICAL: Significant semantic divergence (risk_score 56-80)
- FATAL: Fundamental meaning altered or contradicted (risk_score 81-100)

IS_SAFE DETERMINATION:
- true: Generated text is semantically safe to use (risk_score <= 40 AND no critical severity changes)
- false: Generated text has concerning changes that warrant review"#;

const LOW_SENSITIVITY: &str = r#"SENSITIVITY MODE: LOW (Only flag critical issues)
- Ignore tone changes unless they completely flip the sentiment (positive <-> negative)
- Ignore minor rewordings, synonyms, or style variations
- Focus ONLY on factual errors, critical omissions, or meaning contradictions
- Aim to flag only changes that would cause real-world consequences
- Target: 0-3 changes for typical text pairs"#;

const MEDIUM_SENSITIVITY: &str = r#"SENSITIVITY MODE: MEDIUM (Balanced analysis)
- Flag factual changes and significant tone shifts
- Report omissions of important context or key details
- Notice additions that change scope or add substantial claims
- Ignore purely stylistic variations if meaning is preserved
- This is the default professional review standard
- Target: 2-8 changes for typical text pairs"#;

const HIGH_SENSITIVITY: &str = r#"SENSITIVITY MODE: HIGH (Maximum scrutiny)
- Flag ALL semantic differences, even subtle ones
- Report any tone variations (formal->casual, certain->hedging, etc.)
- Notice small omissions or additions of qualifying words
- Report formatting changes if they might affect interpretation
- Use this for legal, medical, or high-stakes content review
- Target: 5-15+ changes for typical text pairs"#;

const JSON_SCHEMA: &str = r#"OUTPUT FORMAT (STRICT JSON):
{
  "summary": {
    "is_safe": boolean,
    "risk_score": integer (0-100),
    "semantic_change_level": "NONE" | "MINOR" | "MODERATE" | "CRITICAL" | "FATAL"
  },
  "changes": [
    {
      "id": "uuid-v4-string",
      "type": "FACTUAL" | "TONE" | "OMISSION" | "ADDITION" | "FORMATTING",
      "severity": "info" | "warning" | "critical",
      "description": "Brief one-line explanation",
      "original_span": {
        "text": "exact text from original",
        "context_before": "up to 5 chars before text",
        "context_after": "up to 5 chars after text",
        "start": integer,
        "end": integer
      },
      "generated_span": {
        "text": "exact text from generated",
        "context_before": "up to 5 chars before text",
        "context_after": "up to 5 chars after text",
        "start": integer,
        "end": integer
      },
      "reasoning": "Detailed explanation of why this is classified this way"
    }
  ]
}

CRITICAL: For each span, include context_before and context_after fields:
- context_before: Extract up to 5 characters BEFORE the start of the target text
- context_after: Extract up to 5 characters AFTER the end of the target text
- These fields create a "fingerprint" to identify the exact occurrence when text appears multiple times
- Example: If "contract" appears 3 times, context helps identify which specific instance changed

If texts are semantically identical, return:
{
  "summary": {
    "is_safe": true,
    "risk_score": 0,
    "semantic_change_level": "NONE"
  },
  "changes": []
}"#;

/// Build the system prompt for the given sensitivity level.
pub fn system_prompt(sensitivity: SensitivityLevel) -> String {
    let sensitivity_instruction = match sensitivity {
        SensitivityLevel::Low => LOW_SENSITIVITY,
        SensitivityLevel::Medium => MEDIUM_SENSITIVITY,
        SensitivityLevel::High => HIGH_SENSITIVITY,
    };

    format!("{}\n\n{}\n\n{}", BASE_PROMPT, sensitivity_instruction, JSON_SCHEMA)
}

/// Build the user prompt carrying the two texts to compare.
pub fn user_prompt(original_text: &str, generated_text: &str) -> String {
    format!(
        "Analyze these two texts for semantic differences:\n\n\
         ORIGINAL TEXT:\n\"\"\"\n{}\n\"\"\"\n\n\
         GENERATED TEXT:\n\"\"\"\n{}\n\"\"\"\n\n\
         Perform a thorough semantic analysis and respond with the JSON structure as instructed.",
        original_text, generated_text
    )
}

/// One-line description of what each sensitivity level reports.
pub fn sensitivity_description(sensitivity: SensitivityLevel) -> &'static str {
    match sensitivity {
        SensitivityLevel::Low => "Only critical issues that could cause real-world consequences",
        SensitivityLevel::Medium => "Balanced analysis flagging significant semantic changes",
        SensitivityLevel::High => "Maximum scrutiny capturing all semantic differences",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_varies_by_sensitivity() {
        let low = system_prompt(SensitivityLevel::Low);
        let medium = system_prompt(SensitivityLevel::Medium);
        let high = system_prompt(SensitivityLevel::High);

        assert!(low.contains("SENSITIVITY MODE: LOW"));
        assert!(medium.contains("SENSITIVITY MODE: MEDIUM"));
        assert!(high.contains("SENSITIVITY MODE: HIGH"));
        // The shared contract appears in every variant
        for prompt in [&low, &medium, &high] {
            assert!(prompt.contains("VALID JSON ONLY"));
            assert!(prompt.contains("FACTUAL"));
            assert!(prompt.contains("context_before"));
        }
    }

    #[test]
    fn test_user_prompt_embeds_both_texts() {
        let prompt = user_prompt("the original", "the rewrite");
        assert!(prompt.contains("ORIGINAL TEXT:"));
        assert!(prompt.contains("the original"));
        assert!(prompt.contains("GENERATED TEXT:"));
        assert!(prompt.contains("the rewrite"));
    }

    #[test]
    fn test_prompt_mentions_json_for_response_format() {
        // json_object response format requires the word "json" in the prompt
        let prompt = system_prompt(SensitivityLevel::Medium);
        assert!(prompt.to_lowercase().contains("json"));
    }
}
