use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use mikrobot_desktop::config::{ConfigStore, ShellSettings};
use mikrobot_desktop::ipc::{auth, IPCServer, IpcAuth};
use mikrobot_desktop::mode;
use mikrobot_desktop::remote::{RemoteConnectionManager, RemoteVerifier};
use mikrobot_desktop::supervisor::SidecarSupervisor;

/// Upper bound on sidecar teardown at exit, on top of its own stop timeouts.
const SHUTDOWN_SLACK: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("Desktop shell core starting");

    let settings = ShellSettings::load().context("failed to load shell settings")?;
    let store = ConfigStore::open(ConfigStore::default_path()).context("failed to open app config")?;
    tracing::info!("App config at {}", store.path().display());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let active_mode = mode::resolve(&args, store.get().mode);
    tracing::info!("Running in {} mode", active_mode);

    let supervisor = SidecarSupervisor::spawn(&settings.supervisor);
    let remote = RemoteConnectionManager::with_connections(
        RemoteVerifier::new(settings.remote.verify_timeout()),
        store.get().remote_connections.clone(),
        store.get().active_connection_id.clone(),
    );
    let sidecar_path = store.get().sidecar_path.clone();

    let ipc_auth = if settings.ipc.auth_disabled {
        tracing::warn!("IPC authentication is disabled");
        IpcAuth::disabled()
    } else {
        IpcAuth::generate_and_save(&auth::token_file_path())?
    };

    let ipc_server = IPCServer::new(
        supervisor.clone(),
        remote,
        store,
        active_mode,
        ipc_auth,
        &settings.listen_addr,
    );
    let status_events = ipc_server.forward_status_events();

    if active_mode.auto_starts_sidecar() {
        let executable = sidecar_path.filter(|p| !p.trim().is_empty()).map(PathBuf::from);
        match supervisor.start(active_mode, executable).await {
            Ok(status) => tracing::info!("Sidecar auto-started (pid {:?})", status.pid),
            // the UI can still start it by hand
            Err(e) => tracing::error!("Sidecar auto-start failed: {}", e),
        }
    }

    let shutdown_server = ipc_server.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown signal received, cleaning up...");
        shutdown_server.shutdown();
    });

    let served = ipc_server.start().await;
    if let Err(e) = &served {
        tracing::error!("IPC server error: {}", e);
    }

    status_events.cancel();
    let limit = settings.supervisor.stop_grace() + settings.supervisor.kill_wait() + SHUTDOWN_SLACK;
    match tokio::time::timeout(limit, supervisor.shutdown()).await {
        Ok(status) => tracing::info!("Sidecar {:?} at exit", status.state),
        Err(_) => tracing::warn!("Sidecar teardown timed out"),
    }

    tracing::info!("Desktop shell core shut down");
    served
}
