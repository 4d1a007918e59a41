//! Best-effort extraction of the embedded JSON object from step output
//!
//! Backends are instructed to answer with one JSON object, but they wrap
//! it in prose more often than not. Extraction is tolerant and has an
//! explicit "nothing found" outcome; it is never allowed to fail a step.

use serde_json::{Map, Value};
use tracing::debug;

/// One raw finding as reported by the backend, before normalization
#[derive(Debug, Clone, PartialEq)]
pub struct RawFinding {
    pub summary: String,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub category: Option<String>,
    pub severity: Option<String>,
}

/// Parsed step output: verdict material plus step-specific extras
#[derive(Debug, Clone, Default)]
pub struct ParsedOutput {
    /// Backend's own summary, if present
    pub summary: Option<String>,
    /// Raw findings from the `issues` array
    pub findings: Vec<RawFinding>,
    /// All other top-level fields (metrics, suggestions, verdict flags)
    pub extras: Map<String, Value>,
}

/// Find the first `{` and return the span up to its matching `}`, parsed.
///
/// The scan is string- and escape-aware so braces inside JSON strings do
/// not terminate the span early. Returns `None` when no decodable object
/// is present.
pub fn extract_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let span = &text[start..start + offset + ch.len_utf8()];
                    return match serde_json::from_str(span) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            debug!("Embedded JSON span failed to decode: {}", e);
                            None
                        }
                    };
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse step output text into findings and extras.
///
/// Missing or undecodable JSON degrades to an empty `ParsedOutput`; the
/// caller keeps the raw text regardless.
pub fn parse_step_output(text: &str) -> ParsedOutput {
    let Some(Value::Object(object)) = extract_json_object(text) else {
        return ParsedOutput::default();
    };

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .map(str::to_string);

    let findings = object
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(raw_finding).collect())
        .unwrap_or_default();

    let extras: Map<String, Value> = object
        .into_iter()
        .filter(|(key, _)| key != "summary" && key != "issues")
        .collect();

    ParsedOutput {
        summary,
        findings,
        extras,
    }
}

fn raw_finding(item: &Value) -> Option<RawFinding> {
    let summary = item
        .get("summary")
        .or_else(|| item.get("description"))
        .or_else(|| item.get("issue"))
        .and_then(Value::as_str)?
        .to_string();

    let file = item
        .get("file")
        .or_else(|| item.get("path"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let line = item.get("line").and_then(|v| match v {
        Value::Number(n) => n.as_u64().map(|n| n as u32),
        Value::String(s) => s.parse().ok(),
        _ => None,
    });

    Some(RawFinding {
        summary,
        file,
        line,
        category: item
            .get("category")
            .and_then(Value::as_str)
            .map(str::to_string),
        severity: item
            .get("severity")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
