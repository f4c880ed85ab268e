// Player catalog: opportunistic on-disk cache of the raw feed response, and
// the filter that turns the catalog into the draftable player list.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use vickrey_core::draft::Player;

use crate::sources::{FetchError, PlayerSource};

/// The catalog as served by the feed: player id -> player.
pub type Catalog = HashMap<String, Player>;

/// Raw catalog bytes cached on disk between runs. The cache is never
/// authoritative: anything unreadable is treated as a miss.
#[derive(Debug, Clone)]
pub struct CatalogCache {
    path: PathBuf,
}

impl CatalogCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and parse the cached catalog. Missing, unreadable, or corrupt
    /// files return `None`.
    pub async fn load(&self) -> Option<Catalog> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), "player cache unreadable: {e}");
                return None;
            }
        };
        match serde_json::from_slice::<Catalog>(&raw) {
            Ok(catalog) => Some(catalog),
            Err(e) => {
                warn!(path = %self.path.display(), "player cache corrupt, refetching: {e}");
                None
            }
        }
    }

    /// Persist raw catalog bytes. Writes to a sibling temp file and renames
    /// it into place so readers never see a partial file.
    pub async fn store(&self, raw: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, raw).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

/// Get the player catalog, preferring the cache. On a miss the live feed is
/// fetched and its raw response cached for later runs; failing to write the
/// cache is logged and otherwise ignored.
pub async fn obtain_catalog(
    source: &dyn PlayerSource,
    cache: &CatalogCache,
) -> Result<Catalog, FetchError> {
    if let Some(catalog) = cache.load().await {
        info!(
            path = %cache.path().display(),
            players = catalog.len(),
            "using cached player catalog"
        );
        return Ok(catalog);
    }

    let raw = source.player_catalog_raw().await?;
    let catalog: Catalog =
        serde_json::from_slice(&raw).map_err(|source| FetchError::Decode {
            url: "player catalog".to_string(),
            source,
        })?;
    info!(players = catalog.len(), "fetched live player catalog");

    if let Err(e) = cache.store(&raw).await {
        warn!(path = %cache.path().display(), "failed to cache player catalog: {e}");
    }

    Ok(catalog)
}

/// Keep only draft-eligible players, ordered by ascending search rank. Ties
/// are broken by name and then id so output is stable across runs.
pub fn filter_players(catalog: Catalog) -> Vec<Player> {
    let mut eligible: Vec<(String, Player)> = catalog
        .into_iter()
        .filter(|(_, player)| player.is_draft_eligible())
        .collect();

    eligible.sort_by(|(a_id, a), (b_id, b)| {
        a.search_rank
            .cmp(&b.search_rank)
            .then_with(|| a.full_name.cmp(&b.full_name))
            .then_with(|| a_id.cmp(b_id))
    });

    eligible.into_iter().map(|(_, player)| player).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CATALOG_JSON: &str = r#"{
        "4984": {"full_name": "Josh Allen", "search_rank": 3, "fantasy_positions": ["QB"], "status": "Active", "injury_status": null},
        "6794": {"full_name": "Justin Jefferson", "search_rank": 1, "fantasy_positions": ["WR"], "status": "Active"},
        "1": {"full_name": "Player Invalid", "search_rank": 2, "fantasy_positions": ["RB"]},
        "BUF": {"full_name": null, "search_rank": 5, "fantasy_positions": ["DEF"]},
        "17": {"full_name": "Harrison Butker", "search_rank": 100, "fantasy_positions": ["K"]},
        "99": {"full_name": "Deep Sleeper", "search_rank": 9999999, "fantasy_positions": ["RB"]},
        "100": {"full_name": "Retired Guy", "search_rank": null, "fantasy_positions": ["TE"]},
        "7564": {"full_name": "Ja'Marr Chase", "search_rank": 249, "fantasy_positions": ["WR"]}
    }"#;

    struct FakePlayers {
        body: Vec<u8>,
        calls: AtomicUsize,
    }

    impl FakePlayers {
        fn new(body: &str) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PlayerSource for FakePlayers {
        async fn player_catalog_raw(&self) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.clone())
        }
    }

    fn temp_cache(name: &str) -> CatalogCache {
        let dir = std::env::temp_dir().join(format!(
            "vickrey_catalog_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        CatalogCache::new(dir.join("players_raw.json"))
    }

    #[test]
    fn filter_keeps_only_eligible_sorted_by_rank() {
        let catalog: Catalog = serde_json::from_str(CATALOG_JSON).unwrap();
        let players = filter_players(catalog);
        let names: Vec<&str> = players.iter().map(|p| p.full_name.as_str()).collect();
        assert_eq!(names, vec!["Justin Jefferson", "Josh Allen", "Ja'Marr Chase"]);
        assert!(players.windows(2).all(|w| w[0].search_rank <= w[1].search_rank));
    }

    #[test]
    fn filter_breaks_rank_ties_deterministically() {
        let catalog: Catalog = serde_json::from_str(
            r#"{
                "b": {"full_name": "Zed", "search_rank": 10, "fantasy_positions": ["RB"]},
                "a": {"full_name": "Amy", "search_rank": 10, "fantasy_positions": ["RB"]},
                "c": {"full_name": "Amy", "search_rank": 10, "fantasy_positions": ["WR"]}
            }"#,
        )
        .unwrap();
        let players = filter_players(catalog);
        assert_eq!(players[0].fantasy_positions, vec!["RB"]);
        assert_eq!(players[1].fantasy_positions, vec!["WR"]);
        assert_eq!(players[2].full_name, "Zed");
    }

    #[test]
    fn filter_of_empty_catalog_is_empty() {
        assert!(filter_players(Catalog::new()).is_empty());
    }

    #[tokio::test]
    async fn cache_miss_fetches_and_writes_cache() {
        let cache = temp_cache("miss");
        let source = FakePlayers::new(CATALOG_JSON);

        let catalog = obtain_catalog(&source, &cache).await.unwrap();
        assert_eq!(catalog.len(), 8);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(std::fs::read(cache.path()).unwrap(), CATALOG_JSON.as_bytes());

        // Second run is served from disk.
        let again = obtain_catalog(&source, &cache).await.unwrap();
        assert_eq!(again.len(), 8);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn corrupt_cache_falls_back_to_live_fetch() {
        let cache = temp_cache("corrupt");
        cache.store(br#"{"4984": {"full_name": "Josh Al"#).await.unwrap();
        let source = FakePlayers::new(CATALOG_JSON);

        let catalog = obtain_catalog(&source, &cache).await.unwrap();
        assert_eq!(catalog.len(), 8);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        // The corrupt file was replaced with the fresh response.
        assert!(cache.load().await.is_some());
    }

    #[tokio::test]
    async fn unparseable_live_response_is_a_fetch_error() {
        let cache = temp_cache("badlive");
        let source = FakePlayers::new("<html>rate limited</html>");

        let err = obtain_catalog(&source, &cache).await.unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
        assert!(!cache.path().exists());
    }
}
