//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SFC_QUEUE_*)
//! 2. TOML config file (if SFC_QUEUE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Batch size used when a run is started without an explicit limit.
pub const DEFAULT_BATCH_LIMIT: usize = 999;

/// How a run schedules the probes of its claimed entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStrategy {
    /// One entry at a time, in claim order.
    #[default]
    Sequential,
    /// Bounded worker pool with at most `max_in_flight` entries at once.
    Concurrent { max_in_flight: usize },
}

/// Queue worker configuration.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SFC_QUEUE_*)
/// 2. TOML config file (if SFC_QUEUE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Path to the queue database.
    ///
    /// Set via SFC_QUEUE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Path to the static cache index database.
    ///
    /// Set via SFC_QUEUE_CACHE_DB_PATH environment variable.
    #[serde(default = "default_cache_db_path")]
    pub cache_db_path: PathBuf,

    /// User-Agent sent with every probe.
    ///
    /// Set via SFC_QUEUE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Total per-probe timeout in milliseconds.
    ///
    /// Set via SFC_QUEUE_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Connect timeout in milliseconds.
    ///
    /// Set via SFC_QUEUE_CONNECT_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Maximum number of redirects a probe follows.
    ///
    /// Set via SFC_QUEUE_MAX_REDIRECTS environment variable.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Entries claimed per run when no limit is given.
    ///
    /// Set via SFC_QUEUE_BATCH_LIMIT environment variable.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Probes in flight at once; `1` runs sequentially.
    ///
    /// Set via SFC_QUEUE_MAX_CONCURRENCY environment variable.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Optional wall-clock budget for a whole run, in seconds.
    ///
    /// Set via SFC_QUEUE_RUN_DEADLINE_SECS environment variable.
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,

    /// Claims older than this are considered abandoned and released.
    ///
    /// Set via SFC_QUEUE_STALE_CLAIM_SECS environment variable.
    #[serde(default = "default_stale_claim_secs")]
    pub stale_claim_secs: u64,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./sfc-queue.sqlite")
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("./sfc-cache.sqlite")
}

fn default_user_agent() -> String {
    "Staticfilecache Crawler".into()
}

fn default_timeout_ms() -> u64 {
    2_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_batch_limit() -> usize {
    DEFAULT_BATCH_LIMIT
}

fn default_max_concurrency() -> usize {
    1
}

fn default_stale_claim_secs() -> u64 {
    3_600
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cache_db_path: default_cache_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            connect_timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            batch_limit: default_batch_limit(),
            max_concurrency: default_max_concurrency(),
            run_deadline_secs: None,
            stale_claim_secs: default_stale_claim_secs(),
        }
    }
}

impl WorkerConfig {
    /// Probe timeout as Duration for use with reqwest.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_secs.map(Duration::from_secs)
    }

    pub fn stale_claim_age(&self) -> Duration {
        Duration::from_secs(self.stale_claim_secs)
    }

    /// Scheduling strategy implied by `max_concurrency`.
    pub fn strategy(&self) -> RunStrategy {
        match self.max_concurrency {
            0 | 1 => RunStrategy::Sequential,
            n => RunStrategy::Concurrent { max_in_flight: n },
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered figment used by [`WorkerConfig::load`].
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SFC_QUEUE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("SFC_QUEUE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Extract and validate a configuration from `figment`.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
