//! Events route: websocket push or request/response polling.
//!
//! The delivery mode is fixed per activation by the `websocket` parameter;
//! the router binds exactly one of these handlers. In push mode clients
//! upgrade to a persistent channel and receive every state-change
//! notification as a JSON text frame; the connection is force-closed when
//! the server stops. In polling mode the same path returns the recorded
//! event log, honoring an optional `?n=` limit on the number of most
//! recent events.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{Json, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::session::Event;
use crate::state::AppState;

/// Read and write buffer size for upgraded websocket connections.
const WS_BUFFER_SIZE: usize = 1024;

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Limit the polling response to the n most recent events.
    pub n: Option<usize>,
}

/// Polling-mode handler: the recorded event log as JSON.
pub async fn poll(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Json<Vec<Event>> {
    Json(state.session.events(query.n).await)
}

/// Push-mode handler: upgrade the connection and stream events until the
/// client disconnects or the server shuts down.
pub async fn push(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade
        .read_buffer_size(WS_BUFFER_SIZE)
        .write_buffer_size(WS_BUFFER_SIZE)
        .on_upgrade(move |socket| push_events(socket, state))
}

async fn push_events(socket: WebSocket, state: AppState) {
    let mut events = state.session.subscribe();
    let mut quit = state.quit.clone();
    let (mut sink, mut stream) = socket.split();

    tracing::debug!("Websocket events client connected");

    loop {
        tokio::select! {
            // Server is stopping: force-close rather than wait for the
            // client to hang up.
            _ = quit.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to serialize event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Websocket client lagged behind event stream");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = stream.next() => match msg {
                // Inbound frames are ignored; the channel is push-only.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    tracing::debug!("Websocket events client disconnected");
}
