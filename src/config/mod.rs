mod parser;
use crate::cache::{CacheSettings, CacheStep};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use parser::{apply_env_overrides, load_config, load_config_or_default, DATABASE_PATH_ENV};

/// Main configuration structure of the daemon and its producers
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    /// Task store settings
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Step cache location and default policy
    #[serde(default)]
    pub cache: CacheConfig,
    /// Polling loop timing
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Child process limits
    #[serde(default)]
    pub isolation: IsolationConfig,
    /// Research pipeline settings and collaborators
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Task store settings
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path of the SQLite file holding tasks and companies
    #[serde(default = "default_database_path")]
    pub path: String,
    /// Drop existing tasks on startup
    #[serde(default)]
    pub reset: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            reset: false,
        }
    }
}

/// Step cache location and default policy
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct CacheConfig {
    /// Path of the SQLite file holding cache entries
    #[serde(default = "default_cache_path")]
    pub path: String,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub cache_until: Option<CacheStep>,
    #[serde(default)]
    pub clear_cache: Vec<CacheStep>,
    #[serde(default)]
    pub clear_all_cache: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
            no_cache: false,
            cache_until: None,
            clear_cache: Vec::new(),
            clear_all_cache: false,
        }
    }
}

impl CacheConfig {
    /// Policy applied to every pipeline run
    pub fn settings(&self) -> CacheSettings {
        CacheSettings {
            no_cache: self.no_cache,
            clear_cache: self.clear_cache.clone(),
            cache_until: self.cache_until,
            clear_all_cache: self.clear_all_cache,
        }
    }
}

/// Polling loop timing
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct DaemonConfig {
    /// Sleep between polls when no task is pending
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Sleep after a store failure
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
        }
    }
}

impl DaemonConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Child process limits
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct IsolationConfig {
    /// Wall-clock budget of one isolated call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Time a terminated child gets before SIGKILL
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Program speaking the child protocol; the current executable when unset
    #[serde(default)]
    pub worker_program: Option<String>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_period_ms: default_grace_period_ms(),
            worker_program: None,
        }
    }
}

impl IsolationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }
}

/// An external program reading JSON on stdin and printing JSON on stdout
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct ExternalCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Research pipeline settings and collaborators
#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
pub struct PipelineConfig {
    /// Model name handed to the research collaborator
    #[serde(default = "default_model")]
    pub model: String,
    /// Number of contacts kept as possible referrals
    #[serde(default = "default_max_referrals")]
    pub max_referrals: usize,
    /// Company research collaborator
    #[serde(default)]
    pub research: Option<ExternalCommand>,
    /// Equivalent job levels collaborator
    #[serde(default)]
    pub levels: Option<ExternalCommand>,
    /// Salary data collaborator
    #[serde(default)]
    pub salary: Option<ExternalCommand>,
    /// Contact search collaborator
    #[serde(default)]
    pub linkedin: Option<ExternalCommand>,
    /// Reply drafting collaborator
    #[serde(default)]
    pub reply: Option<ExternalCommand>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_referrals: default_max_referrals(),
            research: None,
            levels: None,
            salary: None,
            linkedin: None,
            reply: None,
        }
    }
}

fn default_database_path() -> String {
    "data/tasks.db".to_string()
}

fn default_cache_path() -> String {
    ".cache/steps.db".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_error_backoff_ms() -> u64 {
    5000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_grace_period_ms() -> u64 {
    500
}

fn default_model() -> String {
    "claude-3-5-sonnet-latest".to_string()
}

fn default_max_referrals() -> usize {
    4
}
