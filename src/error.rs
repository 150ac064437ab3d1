use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use std::io;
use std::net::SocketAddr;

use crate::config::ConfigError;
use crate::tls::TlsError;

/// Errors surfaced by the API server lifecycle (`start`/`stop`/commands).
///
/// These are return values, never panics; only an accept-loop failure after
/// the listener is bound escalates outside this channel.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("API server already started")]
    AlreadyStarted,

    #[error("API server not running")]
    NotRunning,

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("Failed to bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
}

/// Per-request errors returned by route handlers.
///
/// Rendered as a JSON body; these never affect the server lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let status = match &self {
            RouteError::NotFound(_) => StatusCode::NOT_FOUND,
            RouteError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RouteError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, Json(body)).into_response()
    }
}
