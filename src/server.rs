//! API server lifecycle controller and transport selection.
//!
//! `ApiServer` owns the listener and the `Stopped -> Configuring -> Running`
//! state machine. `start` re-resolves the parameter store, provisions TLS
//! material if configured, builds the router, and binds the listener before
//! returning; the accept loop runs on its own task. `stop` drains in-flight
//! connections within a bounded deadline and always lands back in `Stopped`.
//!
//! Start and stop serialize through one mutex, so only a single transition
//! can be in flight at a time.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::config::{ApiConfig, ServerConfig};
use crate::error::ApiError;
use crate::routes::create_router;
use crate::session::Session;
use crate::state::AppState;
use crate::tls::{self, TlsError};

/// Ceiling on graceful shutdown: in-flight connections get this long to
/// drain before being force-closed. Exceeding it does not fail `stop`.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(60);

/// Lifecycle state of the API server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Configuring,
    Running,
}

/// Resources owned by one activation, created fresh on every start and
/// discarded (never reused) on stop.
struct Activation {
    handle: Handle,
    serve_task: JoinHandle<()>,
    quit: watch::Sender<bool>,
}

struct Inner {
    state: LifecycleState,
    activation: Option<Activation>,
}

/// The control-plane API server.
pub struct ApiServer {
    store: Arc<RwLock<ApiConfig>>,
    session: Session,
    inner: Mutex<Inner>,
}

impl ApiServer {
    /// Create a stopped server bound to a parameter store and a session.
    ///
    /// The store is read afresh on every `start`, so parameters changed
    /// between runs take effect without restarting the process.
    pub fn new(store: Arc<RwLock<ApiConfig>>, session: Session) -> Self {
        Self {
            store,
            session,
            inner: Mutex::new(Inner {
                state: LifecycleState::Stopped,
                activation: None,
            }),
        }
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> LifecycleState {
        self.inner.lock().await.state
    }

    /// Whether the server is currently accepting connections.
    pub async fn running(&self) -> bool {
        self.state().await == LifecycleState::Running
    }

    /// Dispatch a control command to the server.
    pub async fn handle_command(&self, command: &str) -> Result<(), ApiError> {
        match command.trim() {
            "api.rest on" => self.start().await,
            "api.rest off" => self.stop().await,
            other => Err(ApiError::UnknownCommand(other.to_string())),
        }
    }

    /// Start the server: resolve configuration, provision TLS if enabled,
    /// bind the listener, and spawn the accept loop.
    ///
    /// Returns once the listener is bound; configuration and bind failures
    /// are reported synchronously and leave the state at `Stopped`.
    pub async fn start(&self) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().await;
        if inner.state != LifecycleState::Stopped {
            return Err(ApiError::AlreadyStarted);
        }

        inner.state = LifecycleState::Configuring;
        match self.configure().await {
            Ok(activation) => {
                inner.activation = Some(activation);
                inner.state = LifecycleState::Running;
                Ok(())
            }
            Err(err) => {
                inner.state = LifecycleState::Stopped;
                Err(err)
            }
        }
    }

    /// Stop the server, draining in-flight connections for at most
    /// [`SHUTDOWN_DEADLINE`].
    ///
    /// The state is `Stopped` once this returns, regardless of whether the
    /// drain finished cleanly within the deadline.
    pub async fn stop(&self) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().await;
        let Some(activation) = inner.activation.take() else {
            return Err(ApiError::NotRunning);
        };

        // Release anything waiting on shutdown (websocket pushers in
        // particular); safe to fire with no subscribers.
        let _ = activation.quit.send(true);

        activation.handle.graceful_shutdown(Some(SHUTDOWN_DEADLINE));
        // serve() returns once connections drain or the deadline forces
        // them closed, so this wait is bounded.
        let _ = activation.serve_task.await;

        inner.state = LifecycleState::Stopped;
        tracing::info!("API server stopped");
        Ok(())
    }

    /// One activation's worth of configuration: store snapshot, resolve,
    /// provision, route, bind. First error wins and nothing is left bound.
    async fn configure(&self) -> Result<Activation, ApiError> {
        let params = self.store.read().await.clone();
        let config = ServerConfig::resolve(&params)?;

        let rustls_config = match &config.tls {
            Some(paths) => {
                // rustls needs a process-level crypto provider before any
                // server config is built; repeat installs are harmless.
                let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

                tls::provision(paths, &params.tls)?;
                let loaded = RustlsConfig::from_pem_file(&paths.certificate, &paths.key)
                    .await
                    .map_err(TlsError::Load)?;
                Some(loaded)
            }
            None => None,
        };

        if config.credentials().is_none() {
            tracing::warn!(
                "api.username and/or api.password are empty, authentication is disabled"
            );
        }

        let addr = config.socket_addr();
        let websocket = config.websocket;

        let (quit_tx, quit_rx) = watch::channel(false);
        let state = AppState::new(config, self.session.clone(), quit_rx);
        let router = create_router(state);

        let listener = TcpListener::bind(addr).map_err(|source| ApiError::Bind { addr, source })?;
        listener
            .set_nonblocking(true)
            .map_err(|source| ApiError::Bind { addr, source })?;

        let handle = Handle::new();
        let serve_task = match rustls_config {
            Some(rustls_config) => {
                tracing::info!(events_websocket = websocket, "API server starting on https://{}", addr);
                let server =
                    axum_server::from_tcp_rustls(listener, rustls_config).handle(handle.clone());
                tokio::spawn(async move {
                    escalate(server.serve(router.into_make_service()).await);
                })
            }
            None => {
                tracing::info!(events_websocket = websocket, "API server starting on http://{}", addr);
                let server = axum_server::from_tcp(listener).handle(handle.clone());
                tokio::spawn(async move {
                    escalate(server.serve(router.into_make_service()).await);
                })
            }
        };

        Ok(Activation {
            handle,
            serve_task,
            quit: quit_tx,
        })
    }
}

/// Accept-loop failures after a successful bind are unrecoverable: a
/// control plane that silently stops accepting connections is worse than a
/// loud failure, so terminate the process. Intentional shutdown returns
/// `Ok` and never reaches this path.
fn escalate(result: std::io::Result<()>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "API server terminated unexpectedly");
        std::process::exit(1);
    }
}
