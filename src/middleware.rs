//! Request ID and authentication middleware.
//!
//! `request_id_layer` generates a UUID v4 for each incoming request and
//! creates a tracing span that wraps the entire request lifecycle, so all
//! logs emitted during request processing carry the request_id field.
//!
//! `basic_auth_layer` is the credential gate: when a username and password
//! are configured, every route requires matching HTTP Basic credentials.

use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use tracing::Instrument;
use uuid::Uuid;

use crate::state::AppState;

/// Extension type for accessing request ID in handlers if needed.
#[derive(Clone, Debug)]
pub struct RequestId(pub Uuid);

/// Middleware that generates a request ID and creates a request span.
///
/// This should be the outermost middleware layer so the span wraps
/// all request processing, including other middleware and handlers.
pub async fn request_id_layer(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let path = uri.path();

    let span = tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        duration_ms = tracing::field::Empty,
    );

    let start = Instant::now();

    let mut request = request;
    request.extensions_mut().insert(RequestId(request_id));

    async move {
        let response = next.run(request).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        tracing::Span::current().record("duration_ms", duration_ms);
        tracing::info!(
            status = response.status().as_u16(),
            duration_ms,
            "Request completed"
        );

        response
    }
    .instrument(span)
    .await
}

/// Middleware enforcing HTTP Basic authentication on every route.
///
/// When credentials are not configured the gate is explicitly permissive
/// (the lifecycle controller logs a startup warning for that case). A
/// missing or mismatching Authorization header short-circuits with 401 and
/// no further processing.
pub async fn basic_auth_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some((username, password)) = state.config.credentials() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(decode_basic);

    match presented {
        Some((user, pass)) if user == username && pass == password => next.run(request).await,
        _ => unauthorized(),
    }
}

/// Decode an `Authorization: Basic <base64>` header into (user, password).
fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"spyglass\"")],
        "Unauthorized",
    )
        .into_response()
}
