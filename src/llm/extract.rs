//! JSON recovery from model responses.
//!
//! Models often wrap their JSON in fenced code blocks, sometimes next to
//! blocks in other languages. [`extract_json`] tries `json`-tagged fences
//! first, then the other fences, then the whole response and finally the
//! outermost `{...}` span. Anything still unparsable becomes an error object
//! carrying the raw text. It never fails, so callers always hold valid JSON.

use serde_json::{Value, json};

/// Parse the JSON payload of a model response.
pub fn extract_json(response: &str) -> Value {
    let blocks = fenced_blocks(response);
    let tagged = blocks
        .iter()
        .filter(|b| b.language.eq_ignore_ascii_case("json"));
    let untagged = blocks
        .iter()
        .filter(|b| !b.language.eq_ignore_ascii_case("json"));

    let mut first_error = None;
    let candidates = tagged
        .chain(untagged)
        .map(|b| b.body)
        .chain([response])
        .chain(embedded_object(response));
    for candidate in candidates {
        match serde_json::from_str::<Value>(candidate.trim()) {
            Ok(value) => return value,
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    let reason = first_error.map_or_else(|| String::from("empty response"), |e| e.to_string());
    error_object(
        format!("Failed to parse LLM response as JSON: {}", reason),
        Some(response)
    )
}

/// One fenced code block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FencedBlock<'a> {
    /// Language tag after the opening fence, empty when absent
    pub language: &'a str,
    pub body:     &'a str
}

/// Every closed fenced code block, in order of appearance.
///
/// The body may start on the fence line (`` ```json {"a": 1}``` ``).
pub fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_open = &rest[open + 3..];
        let Some(close) = after_open.find("```") else {
            break;
        };
        blocks.push(split_language(&after_open[..close]));
        rest = &after_open[close + 3..];
    }
    blocks
}

fn split_language(inner: &str) -> FencedBlock<'_> {
    let tag_end = inner
        .find(char::is_whitespace)
        .unwrap_or(inner.len());
    let tag = &inner[..tag_end];
    let is_tag = tag
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_'));
    if is_tag {
        FencedBlock {
            language: tag,
            body:     &inner[tag_end..]
        }
    } else {
        FencedBlock {
            language: "",
            body:     inner
        }
    }
}

/// Outermost `{...}` span of a response with prose around the object.
fn embedded_object(text: &str) -> Option<&str> {
    let open = text.find('{')?;
    let close = text.rfind('}')?;
    (close > open).then(|| &text[open..=close])
}

/// Error object surfaced in place of an analysis.
pub fn error_object(message: impl Into<String>, raw: Option<&str>) -> Value {
    match raw {
        Some(raw) => json!({
            "error": message.into(),
            "raw_content": raw
        }),
        None => json!({ "error": message.into() })
    }
}

/// Whether a value is an error object.
pub fn is_error_object(value: &Value) -> bool {
    value.get("error").is_some()
}
