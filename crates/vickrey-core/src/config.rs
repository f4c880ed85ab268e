// Configuration loading: an optional vickrey.toml plus environment overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "vickrey.toml";

pub const DEFAULT_PROJECT_ID: &str = "test-vickrey";

pub const DEFAULT_ROSTER_URL: &str = "https://api.sleeper.app/v1/league/{league_id}/users";
pub const DEFAULT_PLAYERS_URL: &str = "https://api.sleeper.app/v1/players/nfl";

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Store/project identifier used in resource names.
    pub project_id: String,
    /// Path of the SQLite database backing the document store.
    pub db_path: String,
    pub sources: SourcesConfig,
    pub broker: BrokerConfig,
    pub identity: IdentityConfig,
    pub sync: SyncConfig,
}

// ---------------------------------------------------------------------------
// vickrey.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the config file. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    project_id: Option<String>,
    store: StoreSection,
    sources: SourcesConfig,
    broker: BrokerConfig,
    identity: IdentityConfig,
    sync: SyncConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct StoreSection {
    path: Option<String>,
}

/// External data feeds used when seeding a draft.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourcesConfig {
    /// League users endpoint; `{league_id}` is substituted.
    pub roster_url: String,
    pub players_url: String,
    /// Where the raw player catalog response is cached between runs.
    pub players_cache: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            roster_url: DEFAULT_ROSTER_URL.to_string(),
            players_url: DEFAULT_PLAYERS_URL.to_string(),
            players_cache: "players_raw.json".to_string(),
        }
    }
}

/// HTTP surface of the access broker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Session token signing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IdentityConfig {
    /// PEM (PKCS#8 or PKCS#1) RSA private key used to sign session tokens.
    pub private_key_path: Option<String>,
    pub key_id: String,
    pub issuer: String,
    pub audience: String,
    pub token_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            private_key_path: None,
            key_id: "vickrey-1".to_string(),
            issuer: "vickrey-broker".to_string(),
            audience: "vickrey-draft".to_string(),
            token_ttl_secs: 3600,
        }
    }
}

/// Page synchronizer worker.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            batch_size: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load configuration.
///
/// With `path`, that file must exist. Without it, `vickrey.toml` in the
/// working directory is used if present and defaults otherwise. Environment
/// overrides are applied last, then the result is validated.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let file = match path {
        Some(path) => read_config_file(path)?,
        None => {
            let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_config_file(&default_path)?
            } else {
                ConfigFile::default()
            }
        }
    };

    let config = assemble(file, |key| std::env::var(key).ok());
    validate(&config)?;
    Ok(config)
}

/// Parse config text and apply overrides from `env`. Exposed for tests and
/// for callers that manage their own environment.
pub fn load_config_from_str(
    text: &str,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: PathBuf::from("<inline>"),
        source: e,
    })?;
    let config = assemble(file, env);
    validate(&config)?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Merge file values, environment overrides and defaults.
///
/// Project id precedence: `VICKREY_PROJECT`, the file, `GOOGLE_CLOUD_PROJECT`,
/// then [`DEFAULT_PROJECT_ID`].
fn assemble(file: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Config {
    let non_empty = |key: &str| env(key).filter(|v| !v.trim().is_empty());

    let project_id = non_empty("VICKREY_PROJECT")
        .or(file.project_id)
        .or_else(|| non_empty("GOOGLE_CLOUD_PROJECT"))
        .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string());

    let db_path = non_empty("VICKREY_DB_PATH")
        .or(file.store.path)
        .unwrap_or_else(default_db_path);

    let mut sources = file.sources;
    if let Some(cache) = non_empty("VICKREY_PLAYERS_CACHE") {
        sources.players_cache = cache;
    }

    let mut broker = file.broker;
    if let Some(port) = non_empty("VICKREY_PORT").and_then(|p| p.parse().ok()) {
        broker.port = port;
    }
    if non_empty("LOCAL_ONLY").is_some_and(|v| v == "true") {
        broker.host = "127.0.0.1".to_string();
    }

    let mut identity = file.identity;
    if let Some(key_path) = non_empty("VICKREY_TOKEN_KEY") {
        identity.private_key_path = Some(key_path);
    }

    Config {
        project_id,
        db_path,
        sources,
        broker,
        identity,
        sync: file.sync,
    }
}

/// `vickrey.db` under the platform data directory, or the working directory
/// when no home directory can be determined.
fn default_db_path() -> String {
    directories::ProjectDirs::from("", "", "vickrey")
        .map(|dirs| dirs.data_dir().join("vickrey.db"))
        .unwrap_or_else(|| PathBuf::from("vickrey.db"))
        .to_string_lossy()
        .into_owned()
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let non_empty_fields: &[(&str, &str)] = &[
        ("project_id", &config.project_id),
        ("store.path", &config.db_path),
        ("sources.roster_url", &config.sources.roster_url),
        ("sources.players_url", &config.sources.players_url),
        ("sources.players_cache", &config.sources.players_cache),
        ("broker.host", &config.broker.host),
        ("identity.key_id", &config.identity.key_id),
        ("identity.issuer", &config.identity.issuer),
        ("identity.audience", &config.identity.audience),
    ];
    for (name, value) in non_empty_fields {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must not be empty".into(),
            });
        }
    }

    if !config.sources.roster_url.contains("{league_id}") {
        return Err(ConfigError::ValidationError {
            field: "sources.roster_url".into(),
            message: "must contain the `{league_id}` placeholder".into(),
        });
    }

    if config.broker.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "broker.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.identity.token_ttl_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "identity.token_ttl_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.sync.poll_interval_ms == 0 || config.sync.batch_size == 0 {
        return Err(ConfigError::ValidationError {
            field: "sync".into(),
            message: "poll_interval_ms and batch_size must be greater than 0".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
