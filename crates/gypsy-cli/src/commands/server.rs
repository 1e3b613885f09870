//! `gypsy server`: poller plus HTTP API over one store.

use anyhow::{Context, Result};
use gypsy_api::AppState;
use gypsy_config::{DispatchMode, ServerConfig};
use gypsy_scheduler::{
    Builder, Dispatcher, LocalDispatcher, NomadDispatcher, Poller, SourceRegistry, StoreBackend,
};
use gypsy_store::RedbStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

pub async fn run(config: ServerConfig) -> Result<()> {
    let addr = config.socket_addr()?;

    info!(db = %config.db_path().display(), "Opening store");
    let store = RedbStore::open(
        config.db_path(),
        config.artifact_dir(),
        config.artifact_storage,
    )
    .with_context(|| format!("Failed to open store at {}", config.db_path().display()))?;

    let dispatcher: Arc<dyn Dispatcher> = match config.dispatch {
        DispatchMode::Local => {
            let backend = Arc::new(StoreBackend::new(store.clone()));
            let builder = Builder::new(backend, super::sandbox_provider(&config)?);
            Arc::new(LocalDispatcher::new(Arc::new(builder)))
        }
        DispatchMode::Nomad => {
            info!(nomad = %config.nomad_addr, server_url = %config.public_url(), "Dispatching builds to Nomad");
            Arc::new(NomadDispatcher::new(
                config.nomad_addr.clone(),
                config.public_url(),
            ))
        }
    };

    let poller = Poller::new(
        Arc::new(store.clone()),
        SourceRegistry::standard(config.github_token.clone()),
        dispatcher,
        config.poll_interval(),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_task = tokio::spawn(poller.run(shutdown_rx));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Starting server on {}", addr);

    let app = gypsy_api::app(AppState::new(store));
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_task.await {
        error!(error = %e, "Poller task failed");
    }
    served.context("HTTP server failed")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
