//! What each subcommand does once its arguments are resolved.

pub mod seed;
pub mod serve;
pub mod sync;
pub mod teams;

use std::path::Path;

use anyhow::{Context, Result};

use vickrey_core::config::Config;
use vickrey_core::store::SqliteStore;

#[derive(Debug)]
pub enum Action {
    Seed(seed::Args),
    Serve(serve::Args),
    Sync(sync::Args),
    Teams(teams::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        match self {
            Action::Seed(args) => seed::execute(args).await,
            Action::Serve(args) => serve::execute(args).await,
            Action::Sync(args) => sync::execute(args).await,
            Action::Teams(args) => teams::execute(args),
        }
    }
}

/// Open the configured store, creating its directory on first use.
pub(crate) fn open_store(config: &Config) -> Result<SqliteStore> {
    let db_path = Path::new(&config.db_path);
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    SqliteStore::open(&config.db_path, config.project_id.clone())
        .with_context(|| format!("failed to open store at {}", config.db_path))
}
