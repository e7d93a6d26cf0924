//! Recovery of structured values from generated text.
//!
//! Model output is supposed to hold one JSON value but routinely arrives
//! wrapped in prose, inside a fenced code block, or with trailing
//! commentary. [`extract`] tries progressively looser strategies, each
//! only when the stricter one failed:
//!
//! 1. the whole text parsed as JSON;
//! 2. the contents of each fenced code block, then any single line that is
//!    itself a braced object;
//! 3. the span from the first `{` to the last `}`.
//!
//! Only objects and arrays count as structured values. A bare string or
//! number is never accepted, so `"42"` in prose does not masquerade as a
//! result.

use serde_json::{Map, Value};
use thiserror::Error;

/// Failure to recover anything usable from model output.
///
/// Callers must treat this as "requires manual review", never as an empty
/// but valid result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("no structured value found in model output")]
    NoStructuredValue,

    #[error("model output held a structured value but not a JSON {expected}")]
    UnexpectedShape { expected: &'static str },

    #[error("model output was empty after cleanup")]
    EmptyOutput,
}

/// Recover the first structured value (object or array) from `text`.
pub fn extract(text: &str) -> Result<Value, ExtractionError> {
    if let Some(value) = parse_structured(text) {
        return Ok(value);
    }

    for candidate in line_candidates(text) {
        if let Some(value) = parse_structured(&candidate) {
            return Ok(value);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Some(value) = parse_structured(&text[start..=end]) {
                return Ok(value);
            }
        }
    }

    Err(ExtractionError::NoStructuredValue)
}

/// Like [`extract`], but the recovered value must be a JSON object.
pub fn extract_object(text: &str) -> Result<Map<String, Value>, ExtractionError> {
    match extract(text)? {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractionError::UnexpectedShape { expected: "object" }),
    }
}

fn parse_structured(candidate: &str) -> Option<Value> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ (Value::Object(_) | Value::Array(_))) => Some(value),
        _ => None,
    }
}

/// Candidate regions found by scanning line by line: every fenced block
/// in order of appearance, followed by every standalone `{...}` line
/// outside a fence.
fn line_candidates(text: &str) -> Vec<String> {
    let mut fenced = Vec::new();
    let mut standalone = Vec::new();
    let mut current: Option<Vec<&str>> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            match current.take() {
                Some(block) => fenced.push(block.join("\n")),
                None => current = Some(Vec::new()),
            }
            continue;
        }
        match current.as_mut() {
            Some(block) => block.push(line),
            None => {
                if trimmed.starts_with('{') && trimmed.ends_with('}') {
                    standalone.push(trimmed.to_string());
                }
            }
        }
    }

    // An unterminated fence still yields its body (truncated output).
    if let Some(block) = current {
        fenced.push(block.join("\n"));
    }

    fenced.extend(standalone);
    fenced
}
