//! Masking of redaction tokens in serialized output.
//!
//! Redaction is textual: a token is masked wherever its text shows up in the
//! serialized form, including inside unrelated strings and object keys. Log
//! consumers rely on this, so over-redaction is a known limitation rather than
//! something to narrow down to value boundaries.
//!
//! The mask is a fixed run of `*`, so a token that itself contains `*` can be
//! rebuilt by masking an adjacent token (`x*` reappears when `yz` is masked in
//! `xyz`).

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::responses::ApiGatewayResponse;

pub const MASK: &str = "****";

/// Redacts `value` by masking every token inside its serialized text.
///
/// When masking breaks the JSON (a token matched a number, literal or
/// structural text), every string leaf and key is masked instead, so this
/// never fails.
pub fn redact_value(value: &Value, tokens: &BTreeSet<String>) -> Value {
    let tokens = ordered_tokens(tokens);
    if tokens.is_empty() {
        return value.clone();
    }

    let patterns: Vec<String> = tokens
        .iter()
        .flat_map(|token| escaped_forms(token))
        .collect();
    let masked = mask_text(&value.to_string(), &patterns);

    match serde_json::from_str(&masked) {
        Ok(redacted) => redacted,
        Err(error) => {
            debug!(%error, "textual redaction produced invalid json, masking string leaves");
            mask_leaves(value, &tokens)
        }
    }
}

/// Redacts free text: the raw token as well as its JSON-escaped forms.
pub fn redact_text(text: &str, tokens: &BTreeSet<String>) -> String {
    let tokens = ordered_tokens(tokens);
    let mut patterns: Vec<String> = Vec::new();
    for token in &tokens {
        for pattern in std::iter::once(token.to_string()).chain(escaped_forms(token)) {
            if !patterns.contains(&pattern) {
                patterns.push(pattern);
            }
        }
    }
    mask_text(text, &patterns)
}

/// Redacts a response envelope. The status code is never touched. A JSON body
/// is redacted as a value and serialized again so it stays JSON; any other
/// body is redacted as free text.
pub fn redact_response(
    response: &ApiGatewayResponse,
    tokens: &BTreeSet<String>,
) -> ApiGatewayResponse {
    let body = match serde_json::from_str::<Value>(&response.body) {
        Ok(decoded) => redact_value(&decoded, tokens).to_string(),
        Err(_) => redact_text(&response.body, tokens),
    };
    ApiGatewayResponse {
        status_code: response.status_code,
        headers: redact_value(&response.headers, tokens),
        body,
    }
}

// Longest first so a shorter token cannot split a longer one.
fn ordered_tokens(tokens: &BTreeSet<String>) -> Vec<&str> {
    let mut ordered: Vec<&str> = tokens
        .iter()
        .map(String::as_str)
        .filter(|token| !token.is_empty())
        .collect();
    ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    ordered
}

/// The token as it appears inside a JSON string, and inside a JSON string that
/// is itself embedded in another JSON string.
fn escaped_forms(token: &str) -> Vec<String> {
    let once = escape(token);
    let twice = escape(&once);
    if once == twice {
        vec![once]
    } else {
        vec![once, twice]
    }
}

fn escape(text: &str) -> String {
    let quoted = Value::from(text).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

fn mask_text(text: &str, patterns: &[String]) -> String {
    patterns
        .iter()
        .fold(text.to_string(), |masked, pattern| masked.replace(pattern.as_str(), MASK))
}

fn mask_leaves(value: &Value, tokens: &[&str]) -> Value {
    let mask = |text: &str| {
        tokens
            .iter()
            .fold(text.to_string(), |masked, token| masked.replace(token, MASK))
    };

    match value {
        Value::String(text) => Value::String(mask(text)),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| mask_leaves(item, tokens)).collect())
        }
        Value::Object(object) => {
            let mut masked = Map::with_capacity(object.len());
            for (key, item) in object {
                masked.insert(mask(key), mask_leaves(item, tokens));
            }
            Value::Object(masked)
        }
        other => other.clone(),
    }
}
