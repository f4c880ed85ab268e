// External league/player feeds.
//
// The initializer talks to the feeds through the `RosterSource` and
// `PlayerSource` traits; `SleeperClient` is the HTTP implementation.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use vickrey_core::config::SourcesConfig;
use vickrey_core::draft::null_as_default;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// An external feed could not be reached or returned an unusable payload.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request { url: String, source: reqwest::Error },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to decode response from {url}: {source}")]
    Decode {
        url: String,
        source: serde_json::Error,
    },
}

// ---------------------------------------------------------------------------
// Feed types
// ---------------------------------------------------------------------------

/// One entry of the league users feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LeagueUser {
    #[serde(default, deserialize_with = "null_as_default")]
    pub display_name: String,
    /// `null` in the feed means a human account.
    #[serde(default)]
    pub is_bot: Option<bool>,
}

impl LeagueUser {
    pub fn is_bot(&self) -> bool {
        self.is_bot.unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RosterSource: Send + Sync {
    /// All user accounts in the league, in feed order.
    async fn league_users(&self, league_id: &str) -> Result<Vec<LeagueUser>, FetchError>;
}

#[async_trait]
pub trait PlayerSource: Send + Sync {
    /// The raw player catalog response body: a JSON object mapping player id
    /// to player. Returned unparsed so it can be cached verbatim.
    async fn player_catalog_raw(&self) -> Result<Vec<u8>, FetchError>;
}

// ---------------------------------------------------------------------------
// SleeperClient
// ---------------------------------------------------------------------------

/// HTTP client for the Sleeper public API (or anything serving the same
/// shapes at the configured URLs).
pub struct SleeperClient {
    http: reqwest::Client,
    roster_url: String,
    players_url: String,
}

impl SleeperClient {
    /// `roster_url` must contain a `{league_id}` placeholder.
    pub fn new(roster_url: impl Into<String>, players_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            roster_url: roster_url.into(),
            players_url: players_url.into(),
        }
    }

    pub fn from_config(config: &SourcesConfig) -> Self {
        Self::new(&config.roster_url, &config.players_url)
    }

    fn roster_url_for(&self, league_id: &str) -> String {
        self.roster_url.replace("{league_id}", league_id)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Request {
            url: url.to_string(),
            source,
        })?;
        debug!(url, bytes = body.len(), "fetched feed");
        Ok(body.to_vec())
    }
}

#[async_trait]
impl RosterSource for SleeperClient {
    async fn league_users(&self, league_id: &str) -> Result<Vec<LeagueUser>, FetchError> {
        let url = self.roster_url_for(league_id);
        let body = self.get_bytes(&url).await?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl PlayerSource for SleeperClient {
    async fn player_catalog_raw(&self) -> Result<Vec<u8>, FetchError> {
        self.get_bytes(&self.players_url).await
    }
}
