//! Spyglass - HTTP(S)/WebSocket control plane for a running session daemon.
//!
//! Exposes the live state of a session-driven tool over a fixed REST
//! surface, with optional TLS (self-signed material is provisioned on
//! demand) and an events route that can run in polling or websocket-push
//! mode. The lifecycle controller in [`server`] owns the listener and the
//! start/stop state machine.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;
pub mod state;
pub mod tls;

pub use config::{ApiConfig, AppConfig, ServerConfig};
pub use error::ApiError;
pub use server::{ApiServer, LifecycleState};
pub use session::Session;
