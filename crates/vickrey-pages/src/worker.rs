// Background worker driving the synchronizer from the drafts change feed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use vickrey_core::config::SyncConfig;
use vickrey_core::paths::DRAFTS;
use vickrey_core::store::{ChangeEvent, ChangeFeed, DocumentStore, StoreError};

use crate::sync::{SyncOutcome, Synchronizer};

/// Name under which the worker's change-log position is saved.
pub const SYNC_CONSUMER: &str = "page-sync";

/// Follow changes to `drafts/*` until `shutdown` resolves, resuming from the
/// last saved position (or the start of the log on first run). The position
/// is saved after each event, so an event interrupted by a crash or restart
/// is handled again. A failed event is logged and skipped; the operator can
/// rerun it with `vickrey sync`.
pub async fn run_sync_worker(
    store: Arc<dyn DocumentStore>,
    config: &SyncConfig,
    shutdown: impl Future<Output = ()>,
) -> Result<(), StoreError> {
    let poll_interval = Duration::from_millis(config.poll_interval_ms);
    let mut feed = ChangeFeed::resume(store.clone(), SYNC_CONSUMER, DRAFTS, poll_interval)
        .await?
        .with_batch_size(config.batch_size);
    let synchronizer = Synchronizer::new(store);
    info!(cursor = feed.cursor(), "sync worker started");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(cursor = feed.cursor(), "sync worker stopping");
                return Ok(());
            }
            next = feed.next() => match next {
                Ok(event) => {
                    process(&synchronizer, event).await;
                    if let Err(e) = feed.checkpoint().await {
                        warn!(cursor = feed.cursor(), "failed to save sync position: {e}");
                    }
                }
                Err(e) => {
                    warn!("change feed poll failed: {e}");
                    tokio::time::sleep(poll_interval).await;
                }
            },
        }
    }
}

async fn process(synchronizer: &Synchronizer, event: ChangeEvent) {
    let synchronizer = synchronizer.clone();
    let seq = event.seq;
    let resource = event.resource.clone();
    let result = tokio::task::spawn_blocking(move || synchronizer.handle_change(&event)).await;

    match result {
        Ok(Ok(SyncOutcome::Synced(report))) => {
            info!(
                seq,
                draft_id = %report.draft_id,
                written = report.written,
                skipped_stale = report.skipped_stale,
                "draft change handled"
            );
        }
        Ok(Ok(SyncOutcome::Ignored)) => {}
        Ok(Err(e)) => error!(seq, resource = %resource, "page sync failed: {e}"),
        Err(e) => error!(seq, resource = %resource, "page sync task failed: {e}"),
    }
}
