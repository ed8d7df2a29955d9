//! Tolerant decision parsing.
//!
//! Oracle output is rarely the clean JSON object it was asked for: it
//! arrives wrapped in fenced code blocks, decorated with comments, with
//! backticks around URLs and stray control characters. The parser extracts
//! the most plausible JSON object from the raw text, scrubs the known
//! damage patterns, and only then hands it to serde.

use regex_lite::Regex;

use ironloop_core::error::OracleError;
use ironloop_core::Decision;

/// Parse a raw oracle response into a [`Decision`].
///
/// Extraction order: a fenced ```json block if present, else the largest
/// balanced `{...}` span that survives cleaning, else the whole response.
/// A final attempt parses the raw trimmed text before giving up.
pub fn parse_decision(text: &str) -> Result<Decision, OracleError> {
    if text.trim().is_empty() {
        return Err(OracleError::Parse("empty oracle response".into()));
    }

    let candidate = extract_fenced(text)
        .or_else(|| best_balanced_object(text))
        .unwrap_or_else(|| text.to_string());

    let cleaned = clean_json(&candidate);
    if let Ok(decision) = serde_json::from_str::<Decision>(&cleaned) {
        return Ok(decision);
    }

    // Last resort: maybe the raw text was valid all along.
    serde_json::from_str::<Decision>(text.trim())
        .map_err(|e| OracleError::Parse(format!("no valid decision object found: {e}")))
}

/// Contents of the first ```json fenced block, if any.
fn extract_fenced(text: &str) -> Option<String> {
    let re = Regex::new(r"```json\s*\n([\s\S]*?)\n\s*```").ok()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// The largest balanced `{...}` span that parses after cleaning.
fn best_balanced_object(text: &str) -> Option<String> {
    let mut candidates = balanced_spans(text);
    candidates.sort_by_key(|s| std::cmp::Reverse(s.len()));

    candidates.into_iter().find(|candidate| {
        serde_json::from_str::<serde_json::Value>(&clean_json(candidate)).is_ok()
    })
}

/// Every complete brace-balanced span starting at each `{` in the text.
fn balanced_spans(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for start in (0..bytes.len()).filter(|i| bytes[*i] == b'{') {
        let mut depth = 0i32;
        for (offset, b) in bytes[start..].iter().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(span) = text.get(start..start + offset + 1) {
                            spans.push(span.to_string());
                        }
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    spans
}

/// Scrub the damage patterns LLMs habitually introduce.
fn clean_json(input: &str) -> String {
    // Line-leading comments only, so "https://" inside strings survives.
    let mut cleaned = re_replace(input, r"(?m)^\s*//.*$", "");

    // "`https://example.com`" -> "https://example.com"
    cleaned = re_replace(&cleaned, r#""\s*`([^`]*)`\s*""#, "\"$1\"");
    // Backticks inside a quoted value.
    cleaned = re_replace(&cleaned, r#""([^"`]*)`([^`]*)`([^"]*?)""#, "\"$1$2$3\"");
    // Stray whitespace padding a quoted value after a colon.
    cleaned = re_replace(&cleaned, r##":\s*"\s+([^"]*?)\s+""##, ": \"$1\"");

    // Drop control characters that are not valid JSON whitespace.
    cleaned
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn re_replace(input: &str, pattern: &str, replacement: &str) -> String {
    match Regex::new(pattern) {
        Ok(re) => re.replace_all(input, replacement).into_owned(),
        Err(_) => input.to_string(),
    }
}
