//! REST API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use plugsync_core::{Command, DeviceDescriptor, DeviceExtra};
use plugsync_registry::{RegistryError, Route};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

/// API error response
#[derive(Serialize)]
struct ApiError {
    error: String,
}

impl ApiError {
    fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}

/// Device as shown over the API, with the runtime-only fields included
#[derive(Serialize)]
pub struct DeviceView {
    #[serde(flatten)]
    device: DeviceDescriptor,
    host: Option<String>,
    available: bool,
    dispatched: bool,
    extra: DeviceExtra,
}

impl From<DeviceDescriptor> for DeviceView {
    fn from(mut device: DeviceDescriptor) -> Self {
        let extra = device.extra.clone().unwrap_or_else(|| device.derive_extra());
        if device.device_key.is_some() {
            device.device_key = Some("***".to_string());
        }
        Self {
            host: device.host.clone(),
            available: device.is_available(),
            dispatched: device.dispatched,
            extra,
            device,
        }
    }
}

/// List all known devices
pub async fn list_devices(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut devices: Vec<DeviceView> = state
        .registry
        .devices()
        .await
        .into_iter()
        .map(DeviceView::from)
        .collect();
    devices.sort_by(|a, b| a.device.id.as_str().cmp(b.device.id.as_str()));
    Json(devices)
}

/// Get a specific device by ID
pub async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.registry.get(&id).await {
        Some(device) => Json(DeviceView::from(device)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ApiError::new("Device not found")),
        )
            .into_response(),
    }
}

/// Command accepted by a transport
#[derive(Serialize)]
struct CommandAccepted {
    status: &'static str,
    device_id: String,
    route: &'static str,
}

/// Send a raw command to a device or camera
pub async fn send_command(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(command): Json<Command>,
) -> impl IntoResponse {
    info!(device = %id, "Command requested via API");

    match state.router.send(&id, &command).await {
        Ok(route) => {
            let route = match route {
                Route::Device => "device",
                Route::Camera => "camera",
            };
            Json(CommandAccepted {
                status: "sent",
                device_id: id,
                route,
            })
            .into_response()
        }
        Err(e) => {
            let status = match &e {
                RegistryError::InvalidIdentifier(_) => {
                    error!(device = %id, "Wrong deviceid");
                    StatusCode::BAD_REQUEST
                }
                RegistryError::UnknownDevice(_) => {
                    debug!(device = %id, "Command for unknown device");
                    StatusCode::NOT_FOUND
                }
                RegistryError::NoRoute(_) => {
                    warn!(device = %id, "Device is offline on every transport");
                    StatusCode::SERVICE_UNAVAILABLE
                }
                RegistryError::Transport(_) => {
                    warn!(device = %id, error = %e, "Transport failed to deliver command");
                    StatusCode::BAD_GATEWAY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(ApiError::new(e.to_string()))).into_response()
        }
    }
}

/// List dispatched entities
pub async fn list_entities(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.sink.entities())
}

/// Transport and registry status
pub async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "mode": state.config.mode,
        "cloud": state.registry.is_cloud_active(),
        "local": state.registry.is_local_active(),
        "degraded": state.startup.degraded,
        "cached": state.startup.cached,
        "devices": state.registry.len().await,
        "entities": state.sink.entities().len(),
    }))
}

/// Get current configuration, secrets redacted
pub async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.redacted())
}
