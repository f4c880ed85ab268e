use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use vickrey_core::config::Config;
use vickrey_seed::seed::{seed_draft, SeedOptions};
use vickrey_seed::sources::SleeperClient;

use super::open_store;

#[derive(Debug)]
pub struct Args {
    pub config: Config,
    pub league_id: String,
    pub export_dir: Option<PathBuf>,
}

/// Build and store a new draft, then print its id.
pub async fn execute(args: Args) -> Result<()> {
    let store = open_store(&args.config)?;
    let sleeper = SleeperClient::from_config(&args.config.sources);
    let options = SeedOptions {
        league_id: args.league_id,
        players_cache: PathBuf::from(&args.config.sources.players_cache),
        export_dir: args.export_dir,
    };

    let report = seed_draft(&sleeper, &sleeper, &store, &options)
        .await
        .with_context(|| format!("failed to seed draft for league {}", options.league_id))?;

    info!(
        draft_id = %report.draft_id,
        participants = report.participants,
        players = report.players,
        "draft created"
    );
    println!("{}", report.draft_id);
    Ok(())
}
