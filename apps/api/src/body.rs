use serde_json::{Map, Value};

use crate::errors::AppError;

pub const NO_DATA: &str = "No data provided";
pub const INVALID_JSON: &str = "Invalid JSON payload";

/// Parses a JSON request body that must be a non-empty object.
///
/// Empty bodies, `null` and `{}` all count as "no data"; anything that is not a JSON
/// object is invalid. Content-Type is not checked, since the sorting device does not
/// always send one.
pub fn json_object(body: &[u8]) -> Result<Map<String, Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(AppError::Validation(NO_DATA.to_string()));
    }
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) if map.is_empty() => Err(AppError::Validation(NO_DATA.to_string())),
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Err(AppError::Validation(NO_DATA.to_string())),
        Ok(_) | Err(_) => Err(AppError::Validation(INVALID_JSON.to_string())),
    }
}
