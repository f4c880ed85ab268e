use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use vickrey_broker::{router, AppState, Rs256TokenIssuer};
use vickrey_core::config::Config;
use vickrey_core::store::DocumentStore;
use vickrey_pages::run_sync_worker;

use super::open_store;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
}

/// Run the broker and the sync worker until Ctrl-C.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.config;
    let store: Arc<dyn DocumentStore> = Arc::new(open_store(&config)?);
    let identity = Arc::new(
        Rs256TokenIssuer::from_config(&config.identity)
            .context("failed to set up token signing")?,
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let worker = tokio::spawn({
        let store = store.clone();
        let sync_config = config.sync.clone();
        async move {
            run_sync_worker(store, &sync_config, async {
                let _ = stop_rx.await;
            })
            .await
        }
    });

    let app = router(AppState::new(store, identity));
    let addr = format!("{}:{}", config.broker.host, config.broker.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(project_id = %config.project_id, "listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("broker server failed")?;

    let _ = stop_tx.send(());
    worker
        .await
        .context("sync worker task failed")?
        .context("sync worker failed")?;
    info!("shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
