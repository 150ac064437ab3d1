//! HTTP route table for the control-plane API.
//!
//! The path set is a fixed, versionless contract: one events endpoint and a
//! family of session-state paths, all bound to two handlers. Dispatch among
//! the session sub-paths is the shared handler's own responsibility.
//!
//! Two concerns are applied uniformly rather than per-route: every response
//! carries the configured Access-Control-Allow-Origin header, and when
//! credentials are configured every route sits behind the Basic auth gate.
//! Request tracing is enabled via middleware that generates a unique request
//! ID for each incoming request.

pub mod events;
pub mod session;

use axum::{middleware, routing::get, Router};
use http::header::ACCESS_CONTROL_ALLOW_ORIGIN;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::middleware::{basic_auth_layer, request_id_layer};
use crate::state::AppState;

/// Creates the Axum router with all routes and cross-cutting layers.
///
/// The events delivery mode is a static branch fixed for the lifetime of
/// one activation.
pub fn create_router(state: AppState) -> Router {
    let allow_origin = state.config.allow_origin.clone();
    let events_route = if state.config.websocket {
        get(events::push)
    } else {
        get(events::poll)
    };

    Router::new()
        .route("/api/events", events_route)
        .route("/api/session", get(session::show))
        .route("/api/session/ble", get(session::show))
        .route("/api/session/ble/{mac}", get(session::show))
        .route("/api/session/env", get(session::show))
        .route("/api/session/gateway", get(session::show))
        .route("/api/session/interface", get(session::show))
        .route("/api/session/lan", get(session::show))
        .route("/api/session/lan/{mac}", get(session::show))
        .route("/api/session/options", get(session::show))
        .route("/api/session/packets", get(session::show))
        .route("/api/session/started-at", get(session::show))
        .route("/api/session/wifi", get(session::show))
        .route("/api/session/wifi/{mac}", get(session::show))
        .with_state(state.clone())
        // Credential gate - applied before the response header layers below
        // so even a 401 carries the CORS header.
        .layer(middleware::from_fn_with_state(state, basic_auth_layer))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            allow_origin,
        ))
        // Request ID middleware - creates root span with request_id for correlation
        .layer(middleware::from_fn(request_id_layer))
}
