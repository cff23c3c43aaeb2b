//! Script return value conversion into result frames.

use rhai::Dynamic;
use serde_json::Value;

use crate::errors::{ExecutionError, ExecutionResult};
use crate::frame::{builder, ResultFrame};

/// Converts a script's final value into frames.
///
/// Accepted shapes: an already-built frame, a row map, or a sequence of row
/// maps. Everything else is `InvalidScriptResult`.
pub fn frames_from_dynamic(value: Dynamic) -> ExecutionResult<Vec<ResultFrame>> {
    if value.is::<ResultFrame>() {
        return Ok(vec![value.cast::<ResultFrame>()]);
    }

    let json: Value = rhai::serde::from_dynamic(&value).map_err(|_| {
        ExecutionError::InvalidScriptResult(format!(
            "script returned a value of type '{}'",
            value.type_name()
        ))
    })?;
    builder::frames_from_script_value(json)
}
