//! Axum route handlers for the device-facing JSON API.

use std::net::IpAddr;

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chrono::Local;
use serde_json::{json, Value};
use tracing::info;

use crate::body::json_object;
use crate::errors::AppError;
use crate::models::record::{label_list, Variety};
use crate::sorting::ingest::{parse_reading, stamp};
use crate::state::AppState;

/// POST /api/sorting-data
pub async fn receive_sorting_data(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let reading = parse_reading(&body)?;
    let variety = state.registry.selected_variety().await;
    let record = stamp(reading, variety, Local::now());

    state
        .records
        .append(&record)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to save data: {e}")))?;

    info!(
        "Recorded {} x{} ({})",
        record.ripeness.as_str(),
        record.count,
        record.variety
    );
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Sorting data saved successfully",
            "data": record,
        })),
    ))
}

/// GET /api/get-latest-sorting-data
pub async fn get_latest_sorting_data(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let latest = state
        .records
        .latest()
        .await
        .map_err(|e| AppError::Storage(format!("Failed to fetch data: {e}")))?;

    Ok(Json(match latest {
        Some(record) => json!({ "success": true, "data": record }),
        None => json!({ "success": false, "message": "No sorting data found" }),
    }))
}

/// POST /api/set-camera-ip
pub async fn set_camera_ip(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = json_object(&body)?;
    let raw = payload
        .get("ip")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Validation("Missing required field: ip".to_string()))?;
    let ip: IpAddr = raw
        .parse()
        .map_err(|_| AppError::Validation(format!("Invalid IP address: {raw}")))?;

    state.registry.set_camera_ip(ip).await;
    info!("Camera announced at {ip}");
    Ok(Json(json!({ "success": true, "ip": ip.to_string() })))
}

/// GET /api/get-camera-ip
pub async fn get_camera_ip(State(state): State<AppState>) -> Json<Value> {
    let ip = state.registry.camera_ip().await.map(|ip| ip.to_string());
    Json(json!({ "success": true, "ip": ip }))
}

/// POST /api/set-variety
pub async fn set_variety(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = json_object(&body)?;
    let requested = payload
        .get("variety")
        .and_then(Value::as_str)
        .ok_or_else(|| AppError::Validation("Missing required field: variety".to_string()))?;
    let variety = Variety::SELECTABLE
        .into_iter()
        .find(|v| v.as_str() == requested)
        .ok_or_else(|| {
            AppError::Validation(format!(
                "Invalid variety. Must be one of: {}",
                label_list(Variety::SELECTABLE.iter().map(Variety::as_str))
            ))
        })?;

    state.registry.set_variety(variety).await;
    info!("Selected variety set to {variety}");
    Ok(Json(json!({ "success": true, "variety": variety })))
}

/// GET /api/get-variety
pub async fn get_variety(State(state): State<AppState>) -> Json<Value> {
    let variety = state.registry.selected_variety().await;
    Json(json!({ "success": true, "variety": variety }))
}

/// POST /api/sorting-control
pub async fn set_sorting_control(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let payload = json_object(&body)?;
    let active = payload
        .get("active")
        .and_then(Value::as_bool)
        .ok_or_else(|| AppError::Validation("Field 'active' must be true or false".to_string()))?;

    state.sorting_flag.set(active).await;
    Ok(Json(json!({ "success": true, "active": active })))
}

/// GET /api/sorting-control
pub async fn get_sorting_control(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "active": state.sorting_flag.get().await }))
}
