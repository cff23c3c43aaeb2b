//! Default JSON-to-frame mapping and script result shape conversion.
//!
//! Flattening rule: nested objects flatten into dotted key paths
//! (`parent.child`); arrays are kept as single column values, never
//! exploded. Scalars map to a single `value` column.

use serde_json::{Map, Value};

use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::{ResultFrame, ResultRow};

/// Frame name used by the default mapping
pub const DEFAULT_FRAME_NAME: &str = "response";

/// Frame name used for script-produced results
pub const SCRIPT_FRAME_NAME: &str = "result";

/// Column name for scalar payloads and non-object array elements
pub const VALUE_COLUMN: &str = "value";

/// Upper bound on the payload preview carried by `MalformedPayload`
pub const PAYLOAD_PREVIEW_LIMIT: usize = 128;

/// Applies the default mapping to a raw message payload.
///
/// The payload must parse as JSON; objects become one flattened row,
/// arrays one row per element, scalars a single `value` row.
pub fn frame_from_payload(data: &[u8]) -> ExecutionResult<ResultFrame> {
    let value: Value =
        serde_json::from_slice(data).map_err(|_| malformed_payload(data))?;

    let mut frame = ResultFrame::new(DEFAULT_FRAME_NAME);
    match value {
        Value::Array(elements) => {
            for element in elements {
                frame.push_row(row_from_value(element));
            }
        }
        other => frame.push_row(row_from_value(other)),
    }
    Ok(frame)
}

/// Converts a script return value into frames.
///
/// Accepted shapes: a single row-shaped mapping, a sequence of row-shaped
/// mappings, or an already-built frame (handled by the sandbox before this
/// point). Anything else is `InvalidScriptResult`.
pub fn frames_from_script_value(value: Value) -> ExecutionResult<Vec<ResultFrame>> {
    let mut frame = ResultFrame::new(SCRIPT_FRAME_NAME);
    match value {
        Value::Object(map) => frame.push_row(row_from_object(map)),
        Value::Array(elements) => {
            for (index, element) in elements.into_iter().enumerate() {
                match element {
                    Value::Object(map) => frame.push_row(row_from_object(map)),
                    other => {
                        return Err(ExecutionError::InvalidScriptResult(format!(
                            "element {} is {}, expected a row map",
                            index,
                            type_name(&other)
                        )))
                    }
                }
            }
        }
        other => {
            return Err(ExecutionError::InvalidScriptResult(format!(
                "script returned {}, expected a row map, a sequence of row maps, or a frame",
                type_name(&other)
            )))
        }
    }
    Ok(vec![frame])
}

/// Builds a `MalformedPayload` error with a bounded preview
pub fn malformed_payload(data: &[u8]) -> ExecutionError {
    let text = String::from_utf8_lossy(data);
    let preview: String = text.chars().take(PAYLOAD_PREVIEW_LIMIT).collect();
    ExecutionError::MalformedPayload {
        size: data.len(),
        preview,
    }
}

/// Maps one JSON value to a row: objects flatten, everything else lands in
/// the `value` column.
fn row_from_value(value: Value) -> ResultRow {
    match value {
        Value::Object(map) => row_from_object(map),
        other => vec![(VALUE_COLUMN.to_string(), other)],
    }
}

/// Flattens a JSON object into dotted column paths
pub fn row_from_object(map: Map<String, Value>) -> ResultRow {
    let mut row = ResultRow::new();
    for (key, value) in map {
        flatten_into(&key, value, &mut row);
    }
    row
}

fn flatten_into(path: &str, value: Value, row: &mut ResultRow) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten_into(&format!("{path}.{key}"), nested, row);
            }
        }
        other => row.push((path.to_string(), other)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
