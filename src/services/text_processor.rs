// Text Processing Service
// Input sanitization and span context extraction
//
// Both texts pass through the same sanitizer before analysis so that the
// model, the reconciler, and the client all see identical byte offsets.

use regex::Regex;

/// Sanitize and normalize text to prevent index mismatches.
///
/// 1. Replace smart quotes / em dash / exotic spaces with ASCII equivalents
/// 2. Remove invisible characters (zero-width spaces, control characters)
/// 3. Standardize line breaks (CRLF and CR to LF)
/// 4. Collapse runs of spaces and excessive blank lines
pub fn sanitize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let mut s = text
        .replace('\u{201c}', "\"")
        .replace('\u{201d}', "\"")
        .replace('\u{2018}', "'")
        .replace('\u{2019}', "'")
        .replace('\u{2014}', "-")
        .replace('\u{3000}', " ")
        .replace('\u{00a0}', " ");

    // Line endings before control-character stripping so \r never survives
    s = s.replace("\r\n", "\n").replace('\r', "\n");

    // Drop control and format characters; keep tab and newline
    s = s
        .chars()
        .filter(|&c| c == '\t' || c == '\n' || (!c.is_control() && !is_format_char(c)))
        .collect();

    // Collapse runs of spaces; cap blank-line runs at one empty line
    let space_re = Regex::new(r" +").unwrap();
    s = space_re.replace_all(&s, " ").to_string();
    let newline_re = Regex::new(r"\n{3,}").unwrap();
    s = newline_re.replace_all(&s, "\n\n").to_string();

    s
}

/// Zero-width and joiner characters that survive `is_control` but break
/// byte-offset matching.
fn is_format_char(c: char) -> bool {
    matches!(
        c,
        '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{00ad}' | '\u{feff}' | '\u{2060}'
    )
}

/// Validate text length against the configured maximum (in characters).
pub fn validate_length(text: &str, max_chars: usize) -> Result<(), String> {
    let length = text.chars().count();
    if length > max_chars {
        return Err(format!(
            "Text length ({} characters) exceeds maximum limit of {} characters",
            length, max_chars
        ));
    }
    Ok(())
}

/// Extract up to `context_chars` characters before and after a byte span.
/// Used to build the fingerprint that disambiguates repeated phrases.
pub fn get_context(text: &str, start: usize, end: usize, context_chars: usize) -> (String, String) {
    if start > end {
        return (String::new(), String::new());
    }
    // `get` rejects out-of-range and non-boundary indices
    let (head, tail) = match (text.get(..start), text.get(end..)) {
        (Some(head), Some(tail)) => (head, tail),
        _ => return (String::new(), String::new()),
    };

    let before: String = head
        .chars()
        .rev()
        .take(context_chars)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let after: String = tail.chars().take(context_chars).collect();

    (before, after)
}
