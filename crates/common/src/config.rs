//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Placeholder shipped in sample configs in place of a real database URL.
pub const PLACEHOLDER_DATABASE_URL: &str = "your_database_url_here";

/// Placeholder shipped in sample configs in place of a real Redis URL.
pub const PLACEHOLDER_REDIS_URL: &str = "your_redis_url_here";

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Remote (shared) vote storage.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Local (per-profile) vote storage.
    #[serde(default)]
    pub local: LocalConfig,
    /// Battle behaviour.
    #[serde(default)]
    pub battle: BattleConfig,
    /// Contender lookup service.
    #[serde(default)]
    pub lookup: LookupConfig,
}

/// Remote storage configuration.
///
/// The remote backend is only used when both URLs are present and valid,
/// see [`RemoteConfig::is_configured`].
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// `PostgreSQL` connection URL holding the shared vote table.
    #[serde(default)]
    pub database_url: Option<String>,
    /// Redis URL used for change notifications.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    /// Run pending migrations when connecting.
    #[serde(default = "default_true")]
    pub run_migrations: bool,
    /// Prefix for pub/sub channel names.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
}

/// Local storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    /// Directory holding the local store document.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// File name of the local store document.
    #[serde(default = "default_store_file")]
    pub file_name: String,
}

/// Battle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BattleConfig {
    /// Contender shown on side A of the default pairing.
    #[serde(default = "default_entity_a_id")]
    pub default_entity_a_id: i32,
    /// Contender shown on side B of the default pairing.
    #[serde(default = "default_entity_b_id")]
    pub default_entity_b_id: i32,
    /// Random pair draws before falling back to the default pairing.
    #[serde(default = "default_max_pairing_attempts")]
    pub max_pairing_attempts: u32,
    /// How long the duplicate-vote warning stays up after a rejected vote.
    #[serde(default = "default_duplicate_warning_secs")]
    pub duplicate_warning_secs: u64,
    /// How long the warning stays up when a returning voter loads a pairing.
    #[serde(default = "default_returning_voter_warning_secs")]
    pub returning_voter_warning_secs: u64,
}

/// Contender lookup configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LookupConfig {
    /// Base URL; contenders are fetched from `{base_url}/{id}`.
    #[serde(default = "default_lookup_base_url")]
    pub base_url: String,
    /// Random pairs are drawn from ids `1..=pool_size`.
    #[serde(default = "default_pool_size")]
    pub pool_size: i32,
    /// Request timeout in seconds.
    #[serde(default = "default_lookup_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

const fn default_true() -> bool {
    true
}

fn default_channel_prefix() -> String {
    "votebattle".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_store_file() -> String {
    "votebattle.json".to_string()
}

const fn default_entity_a_id() -> i32 {
    1
}

const fn default_entity_b_id() -> i32 {
    25
}

const fn default_max_pairing_attempts() -> u32 {
    5
}

const fn default_duplicate_warning_secs() -> u64 {
    3
}

const fn default_returning_voter_warning_secs() -> u64 {
    5
}

fn default_lookup_base_url() -> String {
    "https://pokeapi.co/api/v2/pokemon".to_string()
}

const fn default_pool_size() -> i32 {
    151
}

const fn default_lookup_timeout_secs() -> u64 {
    10
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            run_migrations: default_true(),
            channel_prefix: default_channel_prefix(),
        }
    }
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_store_file(),
        }
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            default_entity_a_id: default_entity_a_id(),
            default_entity_b_id: default_entity_b_id(),
            max_pairing_attempts: default_max_pairing_attempts(),
            duplicate_warning_secs: default_duplicate_warning_secs(),
            returning_voter_warning_secs: default_returning_voter_warning_secs(),
        }
    }
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            base_url: default_lookup_base_url(),
            pool_size: default_pool_size(),
            timeout_secs: default_lookup_timeout_secs(),
        }
    }
}

impl RemoteConfig {
    /// Whether remote credentials are present and syntactically valid.
    ///
    /// Empty values, the shipped placeholders and unparseable URLs all count
    /// as "not configured".
    #[must_use]
    pub fn is_configured(&self) -> bool {
        is_usable_url(self.database_url.as_deref(), PLACEHOLDER_DATABASE_URL)
            && is_usable_url(self.redis_url.as_deref(), PLACEHOLDER_REDIS_URL)
    }
}

fn is_usable_url(value: Option<&str>, placeholder: &str) -> bool {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() && v != placeholder => url::Url::parse(v).is_ok(),
        _ => false,
    }
}

impl LocalConfig {
    /// Full path of the local store document.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}

impl BattleConfig {
    /// The default pairing as `(side A, side B)`.
    #[must_use]
    pub const fn default_pairing(&self) -> (i32, i32) {
        (self.default_entity_a_id, self.default_entity_b_id)
    }
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `.env` (if present)
    /// 2. `config/default.toml`
    /// 3. `config/{environment}.toml` (based on `VOTEBATTLE_ENV`)
    /// 4. Environment variables with `VOTEBATTLE__` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let env = std::env::var("VOTEBATTLE_ENV").unwrap_or_else(|_| "development".to_string());
        tracing::debug!(environment = %env, "Loading configuration");

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("VOTEBATTLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("VOTEBATTLE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
