//! Dotted-path access into JSON values.

use serde_json::Value;

/// Walk `value` along a dotted path (`a.b.0.c`).
///
/// Numeric segments index arrays. A missing step returns `None` — the caller
/// decides whether that surfaces as `undefined` text or JSON null.
#[must_use]
pub fn walk<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let idx: usize = segment.parse().ok()?;
                items.get(idx)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value the way it appears inside string interpolation.
///
/// Strings are inlined without quotes; everything else is compact JSON.
#[must_use]
pub fn to_inline_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
