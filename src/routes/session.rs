//! Shared handler for the session-state routes.
//!
//! All `/api/session*` paths are bound to this single handler; dispatching
//! between the sub-resources happens here on the request path. MAC-addressed
//! sub-resources return 404 when the address is unknown.

use axum::{
    extract::State,
    http::Uri,
    response::Json,
};
use serde_json::Value;

use crate::error::RouteError;
use crate::state::AppState;

/// Render a snapshot of the session, or of one of its sub-resources.
pub async fn show(State(state): State<AppState>, uri: Uri) -> Result<Json<Value>, RouteError> {
    let session = &state.session;
    let snapshot = session.snapshot().await;

    let body = match uri.path() {
        "/api/session" => {
            let mut body = to_value(&*snapshot)?;
            if let Some(map) = body.as_object_mut() {
                map.insert("started_at".into(), to_value(&session.started_at())?);
            }
            body
        }
        "/api/session/interface" => to_value(&snapshot.interface)?,
        "/api/session/gateway" => to_value(&snapshot.gateway)?,
        "/api/session/env" => to_value(&snapshot.env)?,
        "/api/session/lan" => to_value(&snapshot.lan)?,
        "/api/session/wifi" => to_value(&snapshot.wifi)?,
        "/api/session/ble" => to_value(&snapshot.ble)?,
        "/api/session/packets" => to_value(&snapshot.packets)?,
        "/api/session/options" => to_value(&snapshot.options)?,
        "/api/session/started-at" => to_value(&session.started_at())?,
        path => {
            if let Some(mac) = path.strip_prefix("/api/session/lan/") {
                let host = snapshot
                    .lan
                    .iter()
                    .find(|host| host.mac.eq_ignore_ascii_case(mac))
                    .ok_or_else(|| {
                        RouteError::NotFound(format!("No LAN host with address {}", mac))
                    })?;
                to_value(host)?
            } else if let Some(mac) = path.strip_prefix("/api/session/wifi/") {
                let ap = snapshot
                    .wifi
                    .iter()
                    .find(|ap| ap.mac.eq_ignore_ascii_case(mac))
                    .ok_or_else(|| {
                        RouteError::NotFound(format!("No access point with address {}", mac))
                    })?;
                to_value(ap)?
            } else if let Some(mac) = path.strip_prefix("/api/session/ble/") {
                let dev = snapshot
                    .ble
                    .iter()
                    .find(|dev| dev.mac.eq_ignore_ascii_case(mac))
                    .ok_or_else(|| {
                        RouteError::NotFound(format!("No BLE device with address {}", mac))
                    })?;
                to_value(dev)?
            } else {
                return Err(RouteError::NotFound(format!("No such resource: {}", path)));
            }
        }
    };

    Ok(Json(body))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, RouteError> {
    serde_json::to_value(value)
        .map_err(|e| RouteError::Internal(format!("Failed to serialize session state: {}", e)))
}
