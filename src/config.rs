use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub relgraph: RelgraphConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub service: ServiceConfig,
}

/// Storage location and logging
#[derive(Debug, Clone, Deserialize)]
pub struct RelgraphConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Relation cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            capacity: default_cache_capacity(),
        }
    }
}

/// Graph traversal limits
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    /// Watchdog bound for one query, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Traversals allowed to run at once; further queries wait for a slot.
    #[serde(default = "default_max_concurrent_queries")]
    pub max_concurrent_queries: usize,
    /// Edge fetches in flight per BFS level. 1 drains each level in order.
    #[serde(default = "default_fetch_parallelism")]
    pub fetch_parallelism: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent_queries: default_max_concurrent_queries(),
            fetch_parallelism: default_fetch_parallelism(),
        }
    }
}

/// Façade tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_path_query_results")]
    pub max_path_query_results: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_path_query_results: default_max_path_query_results(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    100_000
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_concurrent_queries() -> usize {
    16
}

fn default_fetch_parallelism() -> usize {
    1
}

fn default_batch_size() -> usize {
    1024
}

fn default_max_path_query_results() -> usize {
    100
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in RELGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("RELGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::load_from(&config_path)
    }

    /// Load and validate a specific config file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&config_str)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.relgraph.db_path.as_os_str().is_empty() {
            anyhow::bail!("relgraph.db_path must not be empty");
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be greater than 0 when the cache is enabled");
        }

        if self.traversal.timeout_ms == 0 {
            anyhow::bail!("traversal.timeout_ms must be greater than 0");
        }

        if self.traversal.max_concurrent_queries == 0 {
            anyhow::bail!("traversal.max_concurrent_queries must be greater than 0");
        }

        if self.traversal.fetch_parallelism == 0 {
            anyhow::bail!("traversal.fetch_parallelism must be greater than 0");
        }

        if self.service.batch_size == 0 {
            anyhow::bail!("service.batch_size must be greater than 0");
        }

        if self.service.max_path_query_results == 0 {
            anyhow::bail!("service.max_path_query_results must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.relgraph.db_path
    }
}
