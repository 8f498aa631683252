//! HTTP server wiring

use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use super::routes::{self, HostState};
use crate::catalog::VersionStore;
use crate::config::HostConfig;

/// Build the host router over `store`
pub fn router(store: VersionStore) -> Router {
    Router::new()
        .route("/versions", get(routes::versions))
        .route("/updates", get(routes::updates))
        .route("/health", get(routes::health))
        .with_state(HostState::new(store))
        .layer(TraceLayer::new_for_http())
}

/// Run the host until Ctrl-C
pub async fn serve(config: &HostConfig) -> std::io::Result<()> {
    let store = VersionStore::new(&config.packages_dir);
    if !store.root().is_dir() {
        tracing::warn!(
            "Package directory {} does not exist; catalog requests will fail until it does",
            store.root().display()
        );
    }

    let listener = TcpListener::bind(config.listen_addr()).await?;
    tracing::info!(
        "Serving packages from {} on http://{}",
        store.root().display(),
        listener.local_addr()?
    );

    axum::serve(listener, router(store))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Host stopped");
    Ok(())
}

/// Start the host on `addr` in a background task
///
/// Returns the bound address (useful with port 0) and the server task.
pub async fn start_on(
    addr: SocketAddr,
    store: VersionStore,
) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    let app = router(store);

    tracing::info!("Host listening on http://{}", local_addr);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Host server error: {}", e);
        }
    });

    Ok((local_addr, handle))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
