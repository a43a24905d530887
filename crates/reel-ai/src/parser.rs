//! Turns raw analysis text into highlights.
//!
//! The model is asked for a JSON list of `{start, end, description}` with
//! `MM:SS` or `HH:MM:SS` timestamps, but replies are often wrapped in
//! markdown code fences. Unrecognized timestamp tokens become 0 rather
//! than failing the whole response.

use serde::Deserialize;
use serde_json::Value;

use reel_models::Highlight;

use crate::error::ParseError;

#[derive(Debug, Deserialize)]
struct RawHighlight {
    #[serde(default)]
    start: Value,
    #[serde(default)]
    end: Value,
    #[serde(default)]
    description: Option<String>,
}

/// Parse the analysis service's reply into highlights, in reply order.
pub fn parse_highlights(text: &str) -> Result<Vec<Highlight>, ParseError> {
    let body = strip_wrappers(text);
    if body.is_empty() {
        return Err(ParseError::Empty);
    }

    let value: Value = serde_json::from_str(body)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("highlights") {
            Some(Value::Array(items)) => items,
            _ => return Err(ParseError::Shape("object without a highlights list".into())),
        },
        other => return Err(ParseError::Shape(format!("expected a list, got {}", kind(&other)))),
    };

    items
        .into_iter()
        .map(|item| {
            let raw: RawHighlight = serde_json::from_value(item)?;
            Ok(Highlight {
                start: token_seconds(&raw.start),
                end: token_seconds(&raw.end),
                description: raw.description.unwrap_or_default(),
            })
        })
        .collect()
}

/// Remove surrounding whitespace and markdown code fences.
pub fn strip_wrappers(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```json") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```JSON") {
        body = rest;
    } else if let Some(rest) = body.strip_prefix("```") {
        body = rest;
    }
    if let Some(rest) = body.trim_end().strip_suffix("```") {
        body = rest;
    }
    body.trim()
}

/// Convert `MM:SS` or `HH:MM:SS` to whole seconds; anything else is 0.
///
/// # Examples
/// ```
/// use reel_ai::parser::time_to_seconds;
/// assert_eq!(time_to_seconds("02:05"), 125);
/// assert_eq!(time_to_seconds("01:02:03"), 3723);
/// assert_eq!(time_to_seconds("soon"), 0);
/// ```
pub fn time_to_seconds(token: &str) -> u32 {
    let parts: Option<Vec<u32>> = token.trim().split(':').map(component).collect();
    match parts.as_deref() {
        Some([m, s]) => m.saturating_mul(60).saturating_add(*s),
        Some([h, m, s]) => h
            .saturating_mul(3600)
            .saturating_add(m.saturating_mul(60))
            .saturating_add(*s),
        _ => 0,
    }
}

/// One clock component; fractional seconds are floored.
fn component(part: &str) -> Option<u32> {
    let part = part.trim();
    if part.is_empty() {
        return None;
    }
    if let Ok(v) = part.parse::<u32>() {
        return Some(v);
    }
    part.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(|v| v.floor() as u32)
}

fn token_seconds(value: &Value) -> u32 {
    match value {
        Value::String(s) => time_to_seconds(s),
        _ => 0,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
