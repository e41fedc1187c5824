//! Control surface - the local HTTP API the desktop UI talks to.

pub mod auth;
mod handlers;

use anyhow::Result;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::config::ConfigStore;
use crate::mode::AppMode;
use crate::remote::RemoteConnectionManager;
use crate::supervisor::{SidecarStatus, SidecarSupervisor, StatusCallbackHandle};

pub use auth::IpcAuth;

/// Header carrying the IPC token.
pub const TOKEN_HEADER: &str = "X-Mikrobot-Token";

/// IPC Server State
#[derive(Clone)]
pub struct IPCServer {
    pub supervisor: SidecarSupervisor,
    pub remote: Arc<RwLock<RemoteConnectionManager>>,
    pub config: Arc<Mutex<ConfigStore>>,
    /// Launch-resolved mode, replaced by `PUT /api/mode`.
    pub active_mode: Arc<RwLock<AppMode>>,
    pub auth: Arc<IpcAuth>,
    pub listen_addr: String,
    status_tx: broadcast::Sender<SidecarStatus>,
    shutdown: CancellationToken,
}

impl IPCServer {
    pub fn new(
        supervisor: SidecarSupervisor,
        remote: RemoteConnectionManager,
        config: ConfigStore,
        active_mode: AppMode,
        auth: IpcAuth,
        listen_addr: &str,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(64);
        Self {
            supervisor,
            remote: Arc::new(RwLock::new(remote)),
            config: Arc::new(Mutex::new(config)),
            active_mode: Arc::new(RwLock::new(active_mode)),
            auth: Arc::new(auth),
            listen_addr: listen_addr.to_string(),
            status_tx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Register as the supervisor's status observer so every transition is
    /// pushed to event-stream subscribers. Keep the handle to stay registered.
    pub fn forward_status_events(&self) -> StatusCallbackHandle {
        let tx = self.status_tx.clone();
        self.supervisor.set_status_callback(move |status| {
            // no subscribers is fine
            let _ = tx.send(status.clone());
        })
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<SidecarStatus> {
        self.status_tx.subscribe()
    }

    /// Cancelled when the server is told to stop; ends open event streams.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/api/sidecar/status", get(handlers::sidecar::status))
            .route("/api/sidecar/logs", get(handlers::sidecar::logs))
            .route("/api/sidecar/start", post(handlers::sidecar::start))
            .route("/api/sidecar/stop", post(handlers::sidecar::stop))
            .route(
                "/api/mode",
                get(handlers::mode::get_mode).put(handlers::mode::set_mode),
            )
            .route(
                "/api/config",
                get(handlers::config::get_config).patch(handlers::config::save_config),
            )
            .route(
                "/api/remote",
                get(handlers::remote::list).post(handlers::remote::add),
            )
            .route("/api/remote/verify", post(handlers::remote::verify))
            .route(
                "/api/remote/active",
                get(handlers::remote::get_active).put(handlers::remote::set_active),
            )
            .route("/api/remote/:id", delete(handlers::remote::remove))
            .route("/api/events", get(handlers::events::stream))
            .route_layer(middleware::from_fn_with_state(
                self.clone(),
                auth::auth_middleware,
            ));

        Router::new()
            .route("/health", get(handlers::health))
            .merge(api)
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    /// Bind `listen_addr` and serve until `shutdown()` is called.
    pub async fn start(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.listen_addr).await?;
        tracing::info!("IPC listening on http://{}", self.listen_addr);
        self.serve(listener).await
    }

    pub async fn serve(self, listener: tokio::net::TcpListener) -> Result<()> {
        let router = self.router();
        let token = self.shutdown.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await?;
        tracing::info!("IPC server stopped");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
