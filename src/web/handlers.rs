use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::Result;
use crate::hid::HidStatus;
use crate::state::AppState;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Get the effective configuration (file + command line)
pub async fn get_config(State(state): State<Arc<AppState>>) -> Json<AppConfig> {
    Json(state.config.clone())
}

/// Generic action response
#[derive(Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Get HID status
pub async fn hid_status(State(state): State<Arc<AppState>>) -> Json<HidStatus> {
    Json(state.hid.status().await)
}

/// Release all held keys
pub async fn hid_reset(State(state): State<Arc<AppState>>) -> Result<Json<ActionResponse>> {
    state.hid.reset().await?;
    state.hid.flush().await?;

    Ok(Json(ActionResponse {
        success: true,
        message: Some("HID state reset".to_string()),
    }))
}
