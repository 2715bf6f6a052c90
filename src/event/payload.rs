//! Payload sanitization.
//!
//! Structured payloads from foreign producers may nest without bound (the
//! wire format documents a `"[Circular]"` sentinel where a producer detected
//! a cycle). Before serialization we deep-copy payloads with a depth guard:
//! any container past the guard depth collapses to the same sentinel, so
//! consumers observe one rule regardless of producer language.

use serde_json::Value;

/// Sentinel written in place of a node a producer could not serialize.
pub const CIRCULAR_SENTINEL: &str = "[Circular]";

/// Default guard depth for [`sanitize`].
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// Deep-copy `value`, replacing containers nested deeper than `max_depth`
/// with the [`CIRCULAR_SENTINEL`] string.
pub fn sanitize(value: &Value, max_depth: usize) -> Value {
    sanitize_at(value, max_depth, 0)
}

fn sanitize_at(value: &Value, max_depth: usize, depth: usize) -> Value {
    match value {
        Value::Array(items) => {
            if depth >= max_depth {
                return Value::String(CIRCULAR_SENTINEL.to_string());
            }
            Value::Array(
                items
                    .iter()
                    .map(|v| sanitize_at(v, max_depth, depth + 1))
                    .collect(),
            )
        }
        Value::Object(map) => {
            if depth >= max_depth {
                return Value::String(CIRCULAR_SENTINEL.to_string());
            }
            Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), sanitize_at(v, max_depth, depth + 1)))
                    .collect(),
            )
        }
        scalar => scalar.clone(),
    }
}
