// Credential record for one team, stored at `teams/{username}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored credential for a participant. A record with no hash is a team that
/// has been provisioned but has not logged in yet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    /// PHC-format password hash, written on first login.
    #[serde(
        rename = "passwordHash",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub password_hash: Option<String>,
    #[serde(rename = "updatedAt", default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl TeamRecord {
    pub fn is_enrolled(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}
