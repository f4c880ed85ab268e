//! Operator provisioning of team credential records.

use chrono::{DateTime, Utc};
use serde_json::{json, Map};
use tracing::info;

use vickrey_core::paths;
use vickrey_core::store::{DocumentStore, DocumentStoreExt, Precondition, StoreError};
use vickrey_core::team::TeamRecord;

/// One row of `teams list`.
#[derive(Debug, Clone, PartialEq)]
pub struct TeamSummary {
    pub username: String,
    pub enrolled: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Create an empty credential record. Returns `false` if the team already
/// exists; an existing record is left alone.
pub fn add_team(store: &dyn DocumentStore, username: &str) -> Result<bool, StoreError> {
    let path = paths::team(username)?;
    match store.create_from(&path, &TeamRecord::default()) {
        Ok(_) => {
            info!(username, "team provisioned");
            Ok(true)
        }
        Err(StoreError::AlreadyExists(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Clear a team's password so its next login enrolls a new one.
pub fn reset_team(store: &dyn DocumentStore, username: &str) -> Result<(), StoreError> {
    let path = paths::team(username)?;
    let mut fields = Map::new();
    fields.insert("passwordHash".into(), json!(null));
    fields.insert("updatedAt".into(), json!(Utc::now()));
    store.update(&path, fields, Precondition::None)?;
    info!(username, "team password cleared");
    Ok(())
}

/// All teams ordered by username.
pub fn list_teams(store: &dyn DocumentStore) -> Result<Vec<TeamSummary>, StoreError> {
    store
        .list(paths::TEAMS)?
        .into_iter()
        .map(|doc| -> Result<TeamSummary, StoreError> {
            let record: TeamRecord = doc.decode()?;
            Ok(TeamSummary {
                username: doc.path.id().to_string(),
                enrolled: record.is_enrolled(),
                updated_at: record.updated_at,
            })
        })
        .collect()
}
