//! Configuration - figment による階層的な設定読み込み
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. TOML file (`spindle.toml` or an explicit path)
//! 3. `SPINDLE_*` environment variables
//!
//! Env keys map onto sections explicitly, so `SPINDLE_PUBLISH_RECENT_LIMIT`
//! becomes `publish.recent_limit` and never `publish.recent.limit`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{TableNameError, TableNames};
use crate::retry::RetryPolicy;

/// Sections an env key may address, in the order they are tried.
const ENV_SECTIONS: [&str; 6] = [
    "account",
    "publish",
    "relationships",
    "storage",
    "assets",
    "schedule",
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    TableNames(#[from] TableNameError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Top-level configuration for one agent operating one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SpindleConfig {
    pub account: AccountConfig,
    pub publish: PublishConfig,
    pub relationships: RelationshipsConfig,
    pub storage: StorageConfig,
    pub assets: AssetsConfig,
    pub schedule: ScheduleConfig,
    pub log_level: String,
}

impl Default for SpindleConfig {
    fn default() -> Self {
        Self {
            account: AccountConfig::default(),
            publish: PublishConfig::default(),
            relationships: RelationshipsConfig::default(),
            storage: StorageConfig::default(),
            assets: AssetsConfig::default(),
            schedule: ScheduleConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccountConfig {
    /// Account name, attached to every log line as `account`.
    pub screen_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    #[serde(default = "default_true")]
    pub tweet_enabled: bool,

    /// Size bound of the recency window.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,

    /// Minimum seconds between two publishes.
    #[serde(default = "default_tweet_timeout")]
    pub tweet_timeout: u64,

    #[serde(default = "default_attempts")]
    pub max_download_attempts: u32,

    #[serde(default = "default_attempts")]
    pub max_tweet_attempts: u32,

    /// Build a queue at start-up before the first publish tick.
    pub preload: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            tweet_enabled: true,
            recent_limit: default_recent_limit(),
            tweet_timeout: default_tweet_timeout(),
            max_download_attempts: default_attempts(),
            max_tweet_attempts: default_attempts(),
            preload: false,
        }
    }
}

impl PublishConfig {
    pub fn tweet_timeout(&self) -> Duration {
        Duration::from_secs(self.tweet_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelationshipsConfig {
    pub follow_back_enabled: bool,
    pub unfollow_enabled: bool,

    #[serde(default = "default_follower_retrieve_limit")]
    pub follower_retrieve_limit: usize,

    /// Successful unfollows per run before the rest is deferred.
    #[serde(default = "default_unfollow_cap")]
    pub unfollow_cap: usize,

    /// Seconds to wait after a full id page.
    #[serde(default = "default_page_pause")]
    pub page_pause: u64,
}

impl Default for RelationshipsConfig {
    fn default() -> Self {
        Self {
            follow_back_enabled: false,
            unfollow_enabled: false,
            follower_retrieve_limit: default_follower_retrieve_limit(),
            unfollow_cap: default_unfollow_cap(),
            page_pause: default_page_pause(),
        }
    }
}

impl RelationshipsConfig {
    pub fn page_pause(&self) -> Duration {
        Duration::from_secs(self.page_pause)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_queue_table")]
    pub queue_table: String,

    #[serde(default = "default_recent_table")]
    pub recent_table: String,

    #[serde(default = "default_request_table")]
    pub request_table: String,

    #[serde(default = "default_connect_max_attempts")]
    pub connect_max_attempts: u32,

    #[serde(default = "default_connect_base_delay_ms")]
    pub connect_base_delay_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            queue_table: default_queue_table(),
            recent_table: default_recent_table(),
            request_table: default_request_table(),
            connect_max_attempts: default_connect_max_attempts(),
            connect_base_delay_ms: default_connect_base_delay_ms(),
        }
    }
}

impl StorageConfig {
    pub fn table_names(&self) -> Result<TableNames, TableNameError> {
        TableNames::new(&self.queue_table, &self.recent_table, &self.request_table)
    }

    pub fn connect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_max_attempts,
            Duration::from_millis(self.connect_base_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    /// Root directory of the asset pool.
    #[serde(default = "default_bucket")]
    pub bucket: PathBuf,

    /// Key prefix listed on every queue build.
    pub namespace: String,

    /// Local staging directory; a key `k` is downloaded to `download_dir/k`.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            namespace: String::new(),
            download_dir: default_download_dir(),
        }
    }
}

/// Cadences in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default = "default_queue_interval")]
    pub queue_interval: u64,

    #[serde(default = "default_publish_interval")]
    pub publish_interval: u64,

    #[serde(default = "default_follow_back_interval")]
    pub follow_back_interval: u64,

    #[serde(default = "default_unfollow_interval")]
    pub unfollow_interval: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            queue_interval: default_queue_interval(),
            publish_interval: default_publish_interval(),
            follow_back_interval: default_follow_back_interval(),
            unfollow_interval: default_unfollow_interval(),
        }
    }
}

impl ScheduleConfig {
    pub fn queue_every(&self) -> Duration {
        Duration::from_secs(self.queue_interval)
    }

    pub fn publish_every(&self) -> Duration {
        Duration::from_secs(self.publish_interval)
    }

    pub fn follow_back_every(&self) -> Duration {
        Duration::from_secs(self.follow_back_interval)
    }

    pub fn unfollow_every(&self) -> Duration {
        Duration::from_secs(self.unfollow_interval)
    }
}

fn default_true() -> bool {
    true
}

fn default_recent_limit() -> usize {
    10
}

fn default_tweet_timeout() -> u64 {
    3600
}

fn default_attempts() -> u32 {
    3
}

fn default_follower_retrieve_limit() -> usize {
    100
}

fn default_unfollow_cap() -> usize {
    180
}

fn default_page_pause() -> u64 {
    60
}

fn default_database_path() -> PathBuf {
    PathBuf::from("spindle.db")
}

fn default_queue_table() -> String {
    "queue".to_string()
}

fn default_recent_table() -> String {
    "recent_queue".to_string()
}

fn default_request_table() -> String {
    "request_sent".to_string()
}

fn default_connect_max_attempts() -> u32 {
    5
}

fn default_connect_base_delay_ms() -> u64 {
    200
}

fn default_bucket() -> PathBuf {
    PathBuf::from("./assets")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_queue_interval() -> u64 {
    600
}

fn default_publish_interval() -> u64 {
    60
}

fn default_follow_back_interval() -> u64 {
    900
}

fn default_unfollow_interval() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl SpindleConfig {
    /// Reject settings the components cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.account.screen_name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "account.screen_name must not be empty".into(),
            ));
        }
        if self.publish.max_download_attempts == 0 {
            return Err(ConfigError::Invalid(
                "publish.max_download_attempts must be at least 1".into(),
            ));
        }
        if self.publish.max_tweet_attempts == 0 {
            return Err(ConfigError::Invalid(
                "publish.max_tweet_attempts must be at least 1".into(),
            ));
        }
        if self.storage.connect_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "storage.connect_max_attempts must be at least 1".into(),
            ));
        }
        let intervals = [
            ("schedule.queue_interval", self.schedule.queue_interval),
            ("schedule.publish_interval", self.schedule.publish_interval),
            ("schedule.follow_back_interval", self.schedule.follow_back_interval),
            ("schedule.unfollow_interval", self.schedule.unfollow_interval),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, secs)| *secs == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }
        self.storage.table_names()?;
        Ok(())
    }
}

/// Load `./spindle.toml` (if present) with env var overrides.
pub fn load_config() -> Result<SpindleConfig, ConfigError> {
    load_config_from_path(Path::new("spindle.toml"))
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SpindleConfig, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(SpindleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()?;
    Ok(config)
}

/// Load configuration from a TOML string only (no file, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<SpindleConfig, ConfigError> {
    let config = Figment::new()
        .merge(Serialized::defaults(SpindleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()?;
    Ok(config)
}

/// Load, then validate.
pub fn load_and_validate(path: &Path) -> Result<SpindleConfig, ConfigError> {
    let config = load_config_from_path(path)?;
    config.validate()?;
    Ok(config)
}

/// `SPINDLE_<SECTION>_<FIELD>` maps to `<section>.<field>`; anything else stays top-level.
fn env_provider() -> Env {
    Env::prefixed("SPINDLE_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    // figment hands over the key as written in the environment
    let key = key.to_ascii_lowercase();
    for section in ENV_SECTIONS {
        if let Some(field) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{field}");
        }
    }
    key
}
