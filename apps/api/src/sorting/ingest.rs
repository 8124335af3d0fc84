//! Validation and server-side stamping of device reports.
//!
//! Checks run in a fixed order so the device always sees the first problem:
//! empty body, missing ripeness, unknown ripeness, then count and confidence.
//! The payload's `variety` is ignored; records always carry the operator's selection.

use chrono::{DateTime, Local, TimeZone};
use serde_json::{Map, Value};

use crate::body::json_object;
use crate::errors::AppError;
use crate::models::record::{label_list, Ripeness, SortingRecord, Variety};

const DEFAULT_COUNT: u32 = 1;
const DEFAULT_CONFIDENCE: f64 = 0.0;
const MAX_CONFIDENCE: f64 = 100.0;

/// The device-supplied part of a record, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub ripeness: Ripeness,
    pub count: u32,
    pub confidence: f64,
}

pub fn parse_reading(body: &[u8]) -> Result<Reading, AppError> {
    let payload = json_object(body)?;
    validate_reading(&payload)
}

fn validate_reading(payload: &Map<String, Value>) -> Result<Reading, AppError> {
    let ripeness = match payload.get("ripeness") {
        None | Some(Value::Null) => {
            return Err(AppError::Validation(
                "Missing required field: ripeness".to_string(),
            ))
        }
        Some(Value::String(s)) if s.is_empty() => {
            return Err(AppError::Validation(
                "Missing required field: ripeness".to_string(),
            ))
        }
        Some(value) => value
            .as_str()
            .and_then(|s| s.parse::<Ripeness>().ok())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Invalid ripeness. Must be one of: {}",
                    label_list(Ripeness::ALL.iter().map(Ripeness::as_str))
                ))
            })?,
    };

    let count = match payload.get("count") {
        None | Some(Value::Null) => DEFAULT_COUNT,
        Some(value) => value
            .as_u64()
            .filter(|c| *c >= 1)
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(|| {
                AppError::Validation("Invalid count. Must be a positive integer".to_string())
            })?,
    };

    let confidence = match payload.get("confidence") {
        None | Some(Value::Null) => DEFAULT_CONFIDENCE,
        Some(value) => value
            .as_f64()
            .filter(|c| (0.0..=MAX_CONFIDENCE).contains(c))
            .ok_or_else(|| {
                AppError::Validation(
                    "Invalid confidence. Must be a number between 0 and 100".to_string(),
                )
            })?,
    };

    Ok(Reading {
        ripeness,
        count,
        confidence,
    })
}

/// "March 7, 2025": full month name, unpadded day.
pub fn format_record_date<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%B %-d, %Y").to_string()
}

/// Completes a reading with the selected variety and the server's clock.
pub fn stamp(reading: Reading, variety: Variety, now: DateTime<Local>) -> SortingRecord {
    SortingRecord {
        date: format_record_date(&now),
        variety,
        ripeness: reading.ripeness,
        count: reading.count,
        confidence: reading.confidence,
        timestamp: now.timestamp_millis(),
    }
}
