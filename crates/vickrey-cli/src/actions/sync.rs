use std::sync::Arc;

use anyhow::{Context, Result};

use vickrey_core::config::Config;
use vickrey_pages::Synchronizer;

use super::open_store;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub draft_id: String,
}

/// One synchronization pass for a single draft.
pub async fn execute(args: Args) -> Result<()> {
    let store = Arc::new(open_store(&args.config)?);
    let synchronizer = Synchronizer::new(store);
    let draft_id = args.draft_id;

    let report = tokio::task::spawn_blocking(move || synchronizer.sync_draft(&draft_id))
        .await
        .context("sync task failed")?
        .context("page sync failed")?;

    println!(
        "{}: {} page(s) written, {} stale skipped",
        report.draft_id, report.written, report.skipped_stale
    );
    Ok(())
}
