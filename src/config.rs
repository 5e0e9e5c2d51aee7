use crate::core::DecisionPolicy;
use crate::models::ScoringWeights;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub appwrite: AppwriteSettings,
    pub collection: CollectionSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    #[serde(default)]
    pub matching: MatchingSettings,
    #[serde(default)]
    pub scoring: ScoringSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub workers: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppwriteSettings {
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
    pub database_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSettings {
    pub profiles: String,
    pub blocks: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout_secs: Option<u64>,
    pub idle_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    pub redis_url: String,
    /// Lifetime of a daily pick in Redis
    #[serde(default = "default_daily_pick_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_l1_cache_size")]
    pub l1_cache_size: u64,
    /// How long one instance may serve a pick without asking Redis
    #[serde(default = "default_l1_ttl")]
    pub l1_ttl_secs: u64,
}

fn default_daily_pick_ttl() -> u64 { 172_800 }
fn default_l1_cache_size() -> u64 { 10_000 }
fn default_l1_ttl() -> u64 { 30 }

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingSettings {
    #[serde(default = "default_limit")]
    pub default_limit: u16,
    #[serde(default = "default_max_limit")]
    pub max_limit: u16,
    #[serde(default = "default_undo_window")]
    pub undo_window_secs: i64,
    #[serde(default)]
    pub decision_policy: DecisionPolicy,
    /// Offset from UTC defining the calendar day for daily picks and like limits
    #[serde(default)]
    pub daily_pick_utc_offset_minutes: i32,
    /// Interval between purges of expired undo slots and old picks
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
    /// Likes per user per local day; 0 for unlimited
    #[serde(default = "default_daily_like_limit")]
    pub daily_like_limit: u32,
}

impl Default for MatchingSettings {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            undo_window_secs: default_undo_window(),
            decision_policy: DecisionPolicy::default(),
            daily_pick_utc_offset_minutes: 0,
            cleanup_interval_secs: default_cleanup_interval(),
            daily_like_limit: default_daily_like_limit(),
        }
    }
}

impl MatchingSettings {
    /// Clamp a requested page size into `1..=max_limit`
    pub fn clamp_limit(&self, requested: Option<u16>) -> usize {
        let limit = requested.unwrap_or(self.default_limit);
        limit.clamp(1, self.max_limit.max(1)) as usize
    }

    pub fn like_limit(&self) -> Option<u32> {
        (self.daily_like_limit > 0).then_some(self.daily_like_limit)
    }

    pub fn utc_offset(&self) -> Result<chrono::FixedOffset, ConfigError> {
        chrono::FixedOffset::east_opt(self.daily_pick_utc_offset_minutes * 60).ok_or_else(|| {
            ConfigError::Message(format!(
                "daily_pick_utc_offset_minutes out of range: {}",
                self.daily_pick_utc_offset_minutes
            ))
        })
    }
}

fn default_limit() -> u16 { 20 }
fn default_max_limit() -> u16 { 100 }
fn default_undo_window() -> i64 { 30 }
fn default_cleanup_interval() -> u64 { 60 }
fn default_daily_like_limit() -> u32 { 100 }

#[derive(Debug, Clone, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default = "default_age_tolerance")]
    pub age_tolerance_years: u8,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            age_tolerance_years: default_age_tolerance(),
        }
    }
}

fn default_age_tolerance() -> u8 { 2 }

#[derive(Debug, Clone, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "default_distance_weight")]
    pub distance: f64,
    #[serde(default = "default_interest_weight")]
    pub interest: f64,
    #[serde(default = "default_lifestyle_weight")]
    pub lifestyle: f64,
    #[serde(default = "default_age_weight")]
    pub age: f64,
    #[serde(default = "default_pace_weight")]
    pub pace: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            distance: default_distance_weight(),
            interest: default_interest_weight(),
            lifestyle: default_lifestyle_weight(),
            age: default_age_weight(),
            pace: default_pace_weight(),
        }
    }
}

impl WeightsConfig {
    pub fn to_weights(&self) -> ScoringWeights {
        ScoringWeights {
            distance: self.distance,
            interest: self.interest,
            lifestyle: self.lifestyle,
            age: self.age,
            pace: self.pace,
        }
    }
}

fn default_distance_weight() -> f64 { 0.15 }
fn default_interest_weight() -> f64 { 0.30 }
fn default_lifestyle_weight() -> f64 { 0.30 }
fn default_age_weight() -> f64 { 0.10 }
fn default_pace_weight() -> f64 { 0.15 }

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "json".to_string() }

impl Settings {
    /// Load configuration from file and environment variables
    ///
    /// Configuration is loaded in the following order (later overrides earlier):
    /// 1. Default values in the struct
    /// 2. Configuration file (config/default.toml)
    /// 3. Environment variables (prefixed with LUME_)
    pub fn load() -> Result<Self, ConfigError> {
        let mut settings = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            // Development overrides
            .add_source(File::with_name("config/local").required(false))
            // e.g., LUME__SERVER__PORT -> server.port
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings = substitute_env_vars(settings)?;

        settings.try_deserialize()
    }

    /// Load configuration from a custom path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("LUME")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        settings.try_deserialize()
    }
}

/// Apply the well-known connection variables on top of the layered config
fn substitute_env_vars(settings: Config) -> Result<Config, ConfigError> {
    use std::env;

    // DATABASE_URL wins over anything in the config files
    let database_url = env::var("DATABASE_URL").ok();
    let redis_url = env::var("REDIS_URL").ok();
    let appwrite_endpoint = env::var("APPWRITE_ENDPOINT").ok();
    let appwrite_api_key = env::var("APPWRITE_API_KEY").ok();

    let mut builder = Config::builder().add_source(settings);

    if let Some(url) = database_url {
        builder = builder.set_override("database.url", url)?;
    }
    if let Some(url) = redis_url {
        builder = builder.set_override("cache.redis_url", url)?;
    }
    if let Some(endpoint) = appwrite_endpoint {
        builder = builder.set_override("appwrite.endpoint", endpoint)?;
    }
    if let Some(api_key) = appwrite_api_key {
        builder = builder.set_override("appwrite.api_key", api_key)?;
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    const MINIMAL: &str = r#"
        [server]
        host = "127.0.0.1"
        port = 8080

        [appwrite]
        endpoint = "http://localhost/v1"
        api_key = "key"
        project_id = "project"
        database_id = "db"

        [collection]
        profiles = "profiles"
        blocks = "blocks"

        [database]
        url = "postgres://localhost/lume"

        [cache]
        redis_url = "redis://localhost:6379"
    "#;

    fn parse(toml: &str) -> Settings {
        Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_weights() {
        let weights = WeightsConfig::default().to_weights();
        assert_eq!(weights, ScoringWeights::default());
        assert!((weights.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_logging() {
        let logging = LoggingSettings::default();
        assert_eq!(logging.level, "info");
        assert_eq!(logging.format, "json");
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let settings = parse(MINIMAL);
        assert_eq!(settings.matching.undo_window_secs, 30);
        assert_eq!(settings.matching.decision_policy, DecisionPolicy::Reject);
        assert_eq!(settings.scoring.age_tolerance_years, 2);
        assert_eq!(settings.cache.ttl_secs, 172_800);
        assert_eq!(settings.cache.l1_ttl_secs, 30);
        assert_eq!(settings.matching.like_limit(), Some(100));
    }

    #[test]
    fn test_zero_like_limit_is_unlimited() {
        let toml = format!("{}\n[matching]\ndaily_like_limit = 0\n", MINIMAL);
        assert_eq!(parse(&toml).matching.like_limit(), None);
    }

    #[test]
    fn test_matching_overrides() {
        let toml = format!(
            "{}\n[matching]\ndecision_policy = \"overwrite\"\nmax_limit = 50\ndaily_pick_utc_offset_minutes = -300\n",
            MINIMAL
        );
        let settings = parse(&toml);
        assert_eq!(settings.matching.decision_policy, DecisionPolicy::Overwrite);
        assert_eq!(settings.matching.max_limit, 50);
        assert_eq!(settings.matching.utc_offset().unwrap().local_minus_utc(), -300 * 60);
    }

    #[test]
    fn test_clamp_limit() {
        let matching = MatchingSettings::default();
        assert_eq!(matching.clamp_limit(None), 20);
        assert_eq!(matching.clamp_limit(Some(0)), 1);
        assert_eq!(matching.clamp_limit(Some(500)), 100);
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let matching = MatchingSettings {
            daily_pick_utc_offset_minutes: 24 * 60,
            ..MatchingSettings::default()
        };
        assert!(matching.utc_offset().is_err());
    }
}
