use tokio_util::sync::CancellationToken;

use crate::{
    CONFIG,
    api::{new_full_router, serve as serve_router},
    implementations::sqlite::CatalogState,
    service::{ApiContext, MetadataManager, StorageAccessor},
};

/// Connects the configured collaborators and serves until SIGINT.
pub async fn serve_default(bind_addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let catalog = CatalogState::connect(&CONFIG.database_url)
        .await
        .map_err(|e| anyhow::anyhow!(e).context("failed to connect to the catalog database"))?;
    catalog
        .migrate()
        .await
        .map_err(|e| anyhow::anyhow!(e).context("failed to migrate the catalog database"))?;

    let context = ApiContext::new(
        catalog,
        StorageAccessor::new(CONFIG.iceberg_warehouse_path.clone()),
        MetadataManager::new(),
    );
    let router = new_full_router(context);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!(e).context(format!("Failed to bind to address: {bind_addr}")))?;

    let cancellation_token = CancellationToken::new();
    let shutdown_token = cancellation_token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {e}");
        }
        shutdown_token.cancel();
    });

    serve_router(listener, router, cancellation_token).await
}
