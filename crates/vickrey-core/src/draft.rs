// Draft snapshot model: the authoritative document for one draft session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Budget every human participant starts the auction with.
pub const STARTING_BUDGET: i64 = 100;

/// Players ranked at or beyond this are not draftable.
pub const MAX_SEARCH_RANK: i64 = 250;

/// Positions that make a player draft-eligible.
pub const ELIGIBLE_POSITIONS: [&str; 4] = ["QB", "RB", "WR", "TE"];

/// Name the catalog uses for retired/invalid player slots.
pub const PLACEHOLDER_NAME: &str = "Player Invalid";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// The complete state of one draft session, stored at `drafts/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftSnapshot {
    /// External league identifier. Never changes after creation.
    pub league_id: String,
    /// When the snapshot was created. Serialized as `created_dt` to match
    /// documents written by earlier tooling.
    #[serde(
        rename = "created_dt",
        alias = "created_at",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Participants, in league order.
    #[serde(default, deserialize_with = "null_as_default")]
    pub users: Vec<Participant>,
    /// Draftable players, ordered by ascending search rank.
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<Player>,
}

/// A human team in the draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// Unique within a snapshot; doubles as the participant's page key.
    pub display_name: String,
    #[serde(default)]
    pub current_budget: i64,
    /// Drafted players. Opaque to everything in this workspace; the auction
    /// logic owns the shape.
    #[serde(default, deserialize_with = "null_as_default")]
    pub roster: Vec<serde_json::Value>,
}

impl Participant {
    /// A fresh participant with the starting budget and an empty roster.
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            current_budget: STARTING_BUDGET,
            roster: Vec::new(),
        }
    }
}

/// A player from the catalog. Every field tolerates `null`, which the live
/// catalog uses liberally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Player {
    #[serde(default, deserialize_with = "null_as_default")]
    pub full_name: String,
    /// Popularity rank; lower is more notable. Zero means unranked.
    #[serde(default, deserialize_with = "null_as_default")]
    pub search_rank: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub injury_status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fantasy_positions: Vec<String>,
}

impl Player {
    /// Whether the player belongs in a draft snapshot: ranked inside
    /// `[1, MAX_SEARCH_RANK)`, a real name, and at least one eligible position.
    pub fn is_draft_eligible(&self) -> bool {
        if self.search_rank < 1 || self.search_rank >= MAX_SEARCH_RANK {
            return false;
        }
        if self.full_name.trim().is_empty() || self.full_name == PLACEHOLDER_NAME {
            return false;
        }
        self.fantasy_positions
            .iter()
            .any(|pos| ELIGIBLE_POSITIONS.contains(&pos.as_str()))
    }
}

/// Deserialize `null` the same as a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn player(name: &str, rank: i64, positions: &[&str]) -> Player {
        Player {
            full_name: name.to_string(),
            search_rank: rank,
            fantasy_positions: positions.iter().map(|p| p.to_string()).collect(),
            ..Player::default()
        }
    }

    #[test]
    fn participant_new_uses_starting_budget() {
        let p = Participant::new("Alice");
        assert_eq!(p.display_name, "Alice");
        assert_eq!(p.current_budget, 100);
        assert!(p.roster.is_empty());
    }

    #[test]
    fn eligible_player_passes() {
        assert!(player("Josh Allen", 1, &["QB"]).is_draft_eligible());
        assert!(player("Flex Guy", 249, &["K", "WR"]).is_draft_eligible());
    }

    #[test]
    fn rank_bounds_are_enforced() {
        assert!(!player("Unranked", 0, &["QB"]).is_draft_eligible());
        assert!(!player("Negative", -3, &["QB"]).is_draft_eligible());
        assert!(!player("Too Deep", 250, &["QB"]).is_draft_eligible());
    }

    #[test]
    fn placeholder_and_blank_names_rejected() {
        assert!(!player(PLACEHOLDER_NAME, 10, &["RB"]).is_draft_eligible());
        assert!(!player("", 10, &["RB"]).is_draft_eligible());
    }

    #[test]
    fn ineligible_positions_rejected() {
        assert!(!player("Kicker", 10, &["K"]).is_draft_eligible());
        assert!(!player("Defense", 10, &["DEF"]).is_draft_eligible());
        assert!(!player("Nobody", 10, &[]).is_draft_eligible());
    }

    #[test]
    fn player_deserializes_nulls_as_defaults() {
        let json = r#"{
            "full_name": null,
            "search_rank": null,
            "injury_status": null,
            "status": "Active",
            "fantasy_positions": null,
            "team": "BUF"
        }"#;
        let p: Player = serde_json::from_str(json).unwrap();
        assert_eq!(p.full_name, "");
        assert_eq!(p.search_rank, 0);
        assert_eq!(p.status, "Active");
        assert!(p.fantasy_positions.is_empty());
    }

    #[test]
    fn snapshot_accepts_minimal_document() {
        let json = r#"{
            "league_id": "L1",
            "users": [{"display_name": "A"}],
            "players": [{"full_name": "QB One", "search_rank": 5, "fantasy_positions": ["QB"]}]
        }"#;
        let snap: DraftSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snap.league_id, "L1");
        assert!(snap.created_at.is_none());
        assert_eq!(snap.users[0].display_name, "A");
        assert_eq!(snap.users[0].current_budget, 0);
        assert_eq!(snap.players[0].full_name, "QB One");
    }

    #[test]
    fn snapshot_serializes_created_dt() {
        let created = DateTime::parse_from_rfc3339("2025-08-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let snap = DraftSnapshot {
            league_id: "L1".into(),
            created_at: Some(created),
            users: vec![Participant::new("A")],
            players: vec![],
        };
        let value = serde_json::to_value(&snap).unwrap();
        assert!(value.get("created_dt").is_some());
        assert!(value.get("created_at").is_none());

        let back: DraftSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(back, snap);
    }
}
