//! Shared application state for request handlers.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::ServerConfig;
use crate::session::Session;

/// Shared per-activation state, cloneable across handlers.
///
/// Built fresh on every server start from the resolved configuration; the
/// quit receiver is signalled once when the activation is being stopped so
/// long-lived connections (websockets) can drain promptly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub session: Session,
    pub quit: watch::Receiver<bool>,
}

impl AppState {
    /// Creates the state for one activation of the API server.
    pub fn new(config: ServerConfig, session: Session, quit: watch::Receiver<bool>) -> Self {
        Self {
            config: Arc::new(config),
            session,
            quit,
        }
    }
}
