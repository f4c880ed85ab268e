// One-shot seeding run: feeds -> draft snapshot -> store.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use vickrey_core::draft::{DraftSnapshot, Participant};
use vickrey_core::page::is_participant_page_key;
use vickrey_core::paths;
use vickrey_core::store::{DocumentStore, DocumentStoreExt, StoreError};

use crate::catalog::{filter_players, obtain_catalog, CatalogCache};
use crate::sources::{FetchError, LeagueUser, PlayerSource, RosterSource};

/// File name of the filtered player export.
pub const DRAFT_PLAYERS_FILE: &str = "draft_players.json";
/// File name of the snapshot export.
pub const GAME_STATE_FILE: &str = "game_state.json";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("league user {name:?} cannot join the draft: {reason}")]
    InvalidParticipant { name: String, reason: &'static str },

    #[error("failed to persist draft: {0}")]
    Store(#[from] StoreError),

    #[error("failed to write export {path}: {source}")]
    Export {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Inputs for one seeding run.
#[derive(Debug, Clone)]
pub struct SeedOptions {
    pub league_id: String,
    pub players_cache: PathBuf,
    /// When set, the filtered players and the snapshot are also written
    /// there as pretty-printed JSON.
    pub export_dir: Option<PathBuf>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub draft_id: String,
    pub participants: usize,
    pub players: usize,
}

/// Build a new draft from the feeds and persist it at `drafts/{new id}`.
///
/// Both feeds are read before anything is written, so a feed failure leaves
/// the store untouched. Each run allocates a fresh id; re-running after a
/// failure never clobbers an earlier draft.
pub async fn seed_draft(
    roster: &dyn RosterSource,
    players: &dyn PlayerSource,
    store: &dyn DocumentStore,
    options: &SeedOptions,
) -> Result<SeedReport, SeedError> {
    let users = roster.league_users(&options.league_id).await?;
    let participants = build_participants(users);
    validate_participants(&participants)?;
    info!(
        league_id = %options.league_id,
        participants = participants.len(),
        "loaded league users"
    );

    let cache = CatalogCache::new(&options.players_cache);
    let catalog = obtain_catalog(players, &cache).await?;
    let eligible = filter_players(catalog);
    info!(players = eligible.len(), "filtered draftable players");

    let snapshot = DraftSnapshot {
        league_id: options.league_id.clone(),
        created_at: Some(Utc::now()),
        users: participants,
        players: eligible,
    };

    if let Some(dir) = &options.export_dir {
        export(dir, &snapshot).await?;
    }

    let draft_id = new_draft_id();
    let path = paths::draft(&draft_id)?;
    store.create_from(&path, &snapshot)?;

    info!(draft_id = %draft_id, "draft state saved at {path}");

    Ok(SeedReport {
        draft_id,
        participants: snapshot.users.len(),
        players: snapshot.players.len(),
    })
}

/// Drop bot accounts and give every human a starting budget and empty
/// roster, keeping feed order.
pub fn build_participants(users: Vec<LeagueUser>) -> Vec<Participant> {
    users
        .into_iter()
        .filter(|u| !u.is_bot())
        .map(|u| Participant::new(u.display_name))
        .collect()
}

/// Every participant name becomes a page key, so it must be usable as one
/// and unique within the draft.
pub fn validate_participants(participants: &[Participant]) -> Result<(), SeedError> {
    let mut seen = HashSet::with_capacity(participants.len());
    for participant in participants {
        let name = participant.display_name.as_str();
        let reason = if !is_participant_page_key(name) {
            Some("name is empty, reserved, or contains `/`")
        } else if !seen.insert(name) {
            Some("another league user has the same name")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(SeedError::InvalidParticipant {
                name: name.to_string(),
                reason,
            });
        }
    }
    Ok(())
}

/// A fresh 128-bit random draft identifier.
pub fn new_draft_id() -> String {
    Uuid::new_v4().to_string()
}

async fn export(dir: &Path, snapshot: &DraftSnapshot) -> Result<(), SeedError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| SeedError::Export {
            path: dir.to_path_buf(),
            source,
        })?;
    write_json(&dir.join(DRAFT_PLAYERS_FILE), &snapshot.players).await?;
    write_json(&dir.join(GAME_STATE_FILE), snapshot).await?;
    Ok(())
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SeedError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| SeedError::Export {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    tokio::fs::write(path, text)
        .await
        .map_err(|source| SeedError::Export {
            path: path.to_path_buf(),
            source,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
